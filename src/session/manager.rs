//! Session lifecycle: CreateSession / ActivateSession / CloseSession /
//! Timeout (C6, spec.md §4.6).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::RngCore;

use super::identity::{IdentityPolicy, IdentityToken};
use crate::core::{NodeId, SessionError, MAX_SESSION_TIMEOUT, MIN_SESSION_TIMEOUT};

/// Verifies username/password identities against an external user store
/// (spec.md §4.6 "compare against the user backend (external collaborator)").
pub trait UserBackend: Send + Sync {
    /// True if `user_name`/`password` is a valid credential pair.
    fn verify(&self, user_name: &str, password: &[u8]) -> bool;
}

/// A `UserBackend` that accepts nothing; useful when only anonymous/X.509
/// identities are configured.
pub struct DenyAllUsers;

impl UserBackend for DenyAllUsers {
    fn verify(&self, _user_name: &str, _password: &[u8]) -> bool {
        false
    }
}

/// A session's lifecycle phase (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet activated; only ActivateSession is permitted.
    Created,
    /// Activated by at least one ActivateSession call.
    Activated,
    /// Closed, explicitly or by timeout.
    Closed,
}

/// One client session.
pub struct Session {
    /// The session's own identifier, returned from CreateSession.
    pub session_id: NodeId,
    /// The opaque token ActivateSession/CloseSession are addressed by.
    pub authentication_token: NodeId,
    /// DER-encoded client certificate presented at CreateSession.
    pub client_certificate: Option<Vec<u8>>,
    /// The channel this session is currently bound to.
    pub channel_id: u32,
    /// Negotiated inactivity timeout.
    pub timeout: Duration,
    /// Time of the last service call on this session.
    pub last_activity: Instant,
    /// Current identity, set on successful activation.
    pub identity: Option<IdentityToken>,
    state: SessionState,
}

impl Session {
    /// Current lifecycle phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once activated and not yet closed.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Activated
    }
}

fn random_node_id(namespace: u16) -> NodeId {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    NodeId::opaque(namespace, bytes.to_vec())
}

fn clamp_timeout(requested: Duration) -> Duration {
    requested.clamp(MIN_SESSION_TIMEOUT, MAX_SESSION_TIMEOUT)
}

/// Owns every session on the server, keyed by authentication token
/// (spec.md §4.6).
pub struct SessionManager {
    sessions: HashMap<NodeId, Session>,
    identity_policy: IdentityPolicy,
    user_backend: Box<dyn UserBackend>,
}

impl SessionManager {
    /// Build a session manager bound to one identity policy and user
    /// backend.
    pub fn new(identity_policy: IdentityPolicy, user_backend: Box<dyn UserBackend>) -> Self {
        Self {
            sessions: HashMap::new(),
            identity_policy,
            user_backend,
        }
    }

    /// CreateSession (spec.md §4.6): allocates a session id and
    /// authentication token, clamps the requested timeout, and puts the
    /// session in `Created`.
    pub fn create_session(
        &mut self,
        channel_id: u32,
        client_certificate: Option<Vec<u8>>,
        requested_timeout: Duration,
    ) -> (NodeId, NodeId, Duration) {
        let session_id = random_node_id(1);
        let authentication_token = random_node_id(1);
        let timeout = clamp_timeout(requested_timeout);

        self.sessions.insert(
            authentication_token.clone(),
            Session {
                session_id: session_id.clone(),
                authentication_token: authentication_token.clone(),
                client_certificate,
                channel_id,
                timeout,
                last_activity: Instant::now(),
                identity: None,
                state: SessionState::Created,
            },
        );

        (session_id, authentication_token, timeout)
    }

    /// ActivateSession (spec.md §4.6): verifies the identity token is
    /// permitted by policy (and, for `UserName`, by the user backend), binds
    /// the session to the current channel, and transitions to `Activated`.
    pub fn activate_session(
        &mut self,
        authentication_token: &NodeId,
        channel_id: u32,
        identity: IdentityToken,
        decrypted_password: Option<&[u8]>,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(authentication_token)
            .ok_or(SessionError::NotFound)?;

        if session.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        if !self.identity_policy.permits(&identity) {
            return Err(SessionError::IdentityRejected(format!(
                "{} not permitted by endpoint policy",
                identity.kind()
            )));
        }

        if let IdentityToken::UserName { ref user_name, .. } = identity {
            let password = decrypted_password.unwrap_or(&[]);
            if !self.user_backend.verify(user_name, password) {
                return Err(SessionError::IdentityRejected("credentials rejected".into()));
            }
        }

        session.channel_id = channel_id;
        session.identity = Some(identity);
        session.state = SessionState::Activated;
        session.last_activity = Instant::now();
        Ok(())
    }

    /// CloseSession (spec.md §4.6). Returns the session so callers can tear
    /// down its subscriptions/continuation points before it is dropped.
    pub fn close_session(&mut self, authentication_token: &NodeId) -> Result<Session, SessionError> {
        let mut session = self
            .sessions
            .remove(authentication_token)
            .ok_or(SessionError::NotFound)?;
        session.state = SessionState::Closed;
        Ok(session)
    }

    /// Look up an activated session by authentication token, refreshing its
    /// activity timestamp (every service call does this implicitly).
    pub fn touch(&mut self, authentication_token: &NodeId) -> Result<&Session, SessionError> {
        let session = self
            .sessions
            .get_mut(authentication_token)
            .ok_or(SessionError::NotFound)?;
        match session.state {
            SessionState::Closed => Err(SessionError::Closed),
            SessionState::Created => Err(SessionError::NotActivated),
            SessionState::Activated => {
                session.last_activity = Instant::now();
                Ok(session)
            }
        }
    }

    /// Timeout sweep (spec.md §4.6 "Timeout", driven by the dispatcher's
    /// idle callback): closes and returns every session whose
    /// `last_activity + timeout` has elapsed.
    pub fn expire_timed_out(&mut self) -> Vec<Session> {
        let expired_tokens: Vec<NodeId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.last_activity.elapsed() >= s.timeout)
            .map(|(token, _)| token.clone())
            .collect();

        expired_tokens
            .into_iter()
            .filter_map(|token| self.sessions.remove(&token))
            .map(|mut s| {
                s.state = SessionState::Closed;
                s
            })
            .collect()
    }

    /// Number of sessions currently tracked (any state).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAll;
    impl UserBackend for AcceptAll {
        fn verify(&self, _user_name: &str, _password: &[u8]) -> bool {
            true
        }
    }

    fn manager(policy: IdentityPolicy) -> SessionManager {
        SessionManager::new(policy, Box::new(AcceptAll))
    }

    #[test]
    fn create_then_activate_anonymous() {
        let mut mgr = manager(IdentityPolicy {
            allow_anonymous: true,
            ..Default::default()
        });
        let (_, token, _) = mgr.create_session(1, None, Duration::from_secs(30));
        mgr.activate_session(&token, 1, IdentityToken::Anonymous, None).unwrap();
        assert!(mgr.touch(&token).unwrap().is_active());
    }

    #[test]
    fn anonymous_rejected_when_policy_disallows_it() {
        let mut mgr = manager(IdentityPolicy::default());
        let (_, token, _) = mgr.create_session(1, None, Duration::from_secs(30));
        let err = mgr.activate_session(&token, 1, IdentityToken::Anonymous, None).unwrap_err();
        assert!(matches!(err, SessionError::IdentityRejected(_)));
    }

    #[test]
    fn operation_before_activation_is_not_activated() {
        let mut mgr = manager(IdentityPolicy {
            allow_anonymous: true,
            ..Default::default()
        });
        let (_, token, _) = mgr.create_session(1, None, Duration::from_secs(30));
        assert_eq!(mgr.touch(&token), Err(SessionError::NotActivated));
    }

    #[test]
    fn requested_timeout_is_clamped() {
        let mut mgr = manager(IdentityPolicy::default());
        let (_, _, timeout) = mgr.create_session(1, None, Duration::from_secs(100_000));
        assert_eq!(timeout, MAX_SESSION_TIMEOUT);
        let (_, _, timeout) = mgr.create_session(1, None, Duration::from_millis(1));
        assert_eq!(timeout, MIN_SESSION_TIMEOUT);
    }

    #[test]
    fn close_session_removes_it() {
        let mut mgr = manager(IdentityPolicy {
            allow_anonymous: true,
            ..Default::default()
        });
        let (_, token, _) = mgr.create_session(1, None, Duration::from_secs(30));
        mgr.activate_session(&token, 1, IdentityToken::Anonymous, None).unwrap();
        mgr.close_session(&token).unwrap();
        assert_eq!(mgr.session_count(), 0);
        assert_eq!(mgr.touch(&token), Err(SessionError::NotFound));
    }

    #[test]
    fn expired_sessions_are_swept() {
        let mut mgr = manager(IdentityPolicy {
            allow_anonymous: true,
            ..Default::default()
        });
        let (_, token, _) = mgr.create_session(1, None, MIN_SESSION_TIMEOUT);
        mgr.activate_session(&token, 1, IdentityToken::Anonymous, None).unwrap();
        std::thread::sleep(MIN_SESSION_TIMEOUT + Duration::from_millis(5));
        let expired = mgr.expire_timed_out();
        assert_eq!(expired.len(), 1);
        assert_eq!(mgr.session_count(), 0);
    }
}
