//! The SecureChannel engine (C5, spec.md §4.5): ties the state machine,
//! token rollover, and sequence discipline together around one crypto
//! policy.

use std::time::Duration;

use super::sequence::{SequenceCounter, SequenceGuard};
use super::state::ChannelPhase;
use super::token::{TokenKeys, TokenRollover};
use crate::core::{ChannelError, FIRST_CHANNEL_ID};
use crate::crypto::{CryptoAdapter, SecurityPolicy};

/// One SecureChannel's full protocol state (spec.md §4.5, §3).
pub struct SecureChannelEngine {
    channel_id: u32,
    phase: ChannelPhase,
    policy: SecurityPolicy,
    adapter: CryptoAdapter,
    rollover: Option<TokenRollover>,
    next_token_id: u32,
    recv_sequence: SequenceGuard,
    send_sequence: SequenceCounter,
}

impl SecureChannelEngine {
    /// Start a fresh channel with the given id and security policy.
    /// `channel_id` must be nonzero (spec.md §4.5 "monotonic 32-bit,
    /// skipping 0").
    pub fn new(channel_id: u32, policy: SecurityPolicy) -> Self {
        assert_ne!(channel_id, 0, "channel id 0 is reserved");
        Self {
            channel_id,
            phase: ChannelPhase::Fresh,
            policy,
            adapter: CryptoAdapter::new(policy),
            rollover: None,
            next_token_id: FIRST_CHANNEL_ID,
            recv_sequence: SequenceGuard::new(),
            send_sequence: SequenceCounter::new(),
        }
    }

    /// This channel's id.
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    /// The bound crypto adapter, for key derivation and symmetric/asymmetric
    /// operations during Open/Renew.
    pub fn adapter(&self) -> &CryptoAdapter {
        &self.adapter
    }

    /// Mark the HEL/ACK handshake complete.
    pub fn on_handshake_complete(&mut self) {
        self.phase = self.phase.on_handshake_complete();
    }

    fn allocate_token_id(&mut self) -> u32 {
        let id = self.next_token_id;
        self.next_token_id = if id == u32::MAX { 1 } else { id + 1 };
        id
    }

    /// Open the channel: assign a token id and install its keys
    /// (spec.md §4.5 "Open" — key derivation from nonces happens one layer
    /// up, in the session/server code that calls this with the derived
    /// [`TokenKeys`]).
    pub fn open(&mut self, keys: TokenKeys, lifetime: Duration) -> u32 {
        let token_id = self.allocate_token_id();
        self.rollover = Some(TokenRollover::new(token_id, keys, lifetime));
        self.phase = self.phase.on_opened();
        token_id
    }

    /// Renew the channel: a new token id and keys take over, the old token
    /// remains valid for its grace period (spec.md §4.5 "Renew").
    pub fn renew(&mut self, keys: TokenKeys, lifetime: Duration) -> Result<u32, ChannelError> {
        let token_id = self.allocate_token_id();
        match &mut self.rollover {
            Some(rollover) => {
                rollover.renew(token_id, keys, lifetime);
                self.phase = self.phase.on_renewed();
                Ok(token_id)
            }
            None => Err(ChannelError::Closed),
        }
    }

    /// Validate one incoming symmetric message's token id and sequence
    /// number (spec.md §4.5 "Symmetric message path"). Returns the keys to
    /// verify/decrypt the message body with.
    ///
    /// Sequence violations abort the channel; an unknown token id does not
    /// (a retired-but-in-grace token is accepted, not treated as unknown).
    pub fn accept_incoming(
        &mut self,
        token_id: u32,
        sequence_number: u32,
    ) -> Result<&TokenKeys, ChannelError> {
        if self.phase.is_terminal() {
            return Err(ChannelError::Closed);
        }
        let rollover = self.rollover.as_mut().ok_or(ChannelError::Closed)?;
        let keys = match rollover.keys_for_incoming_token(token_id) {
            Ok(_) => {
                if let Err(e) = self.recv_sequence.check_and_accept(sequence_number) {
                    self.phase = self.phase.on_abort();
                    return Err(e);
                }
                rollover.keys_for_incoming_token(token_id).expect("just validated")
            }
            Err(e) => return Err(e),
        };
        if rollover.current_token_id() == token_id && matches!(self.phase, ChannelPhase::Renewed) {
            // Grace period ended the moment the new token was used.
            self.phase = self.phase.on_grace_period_ended();
        }
        Ok(keys)
    }

    /// Allocate the next outgoing sequence number.
    pub fn next_outgoing_sequence(&mut self) -> u32 {
        self.send_sequence.next()
    }

    /// Keys for signing/encrypting outgoing traffic (always the current
    /// token's).
    pub fn outgoing_keys(&self) -> Option<&TokenKeys> {
        self.rollover.as_ref().map(|r| r.keys_for_outgoing())
    }

    /// Begin an orderly close (spec.md §4.5 "State machine").
    pub fn request_close(&mut self) {
        self.phase = self.phase.on_close_requested();
    }

    /// Abort the channel on a hard failure (bad MAC, decrypt failure,
    /// timeout without progress).
    pub fn abort(&mut self) {
        self.phase = self.phase.on_abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys {
            sending: crate::crypto::SymmetricKeys {
                signing_key: vec![1; 32],
                encrypting_key: vec![2; 32],
                iv: vec![3; 16],
            },
            receiving: crate::crypto::SymmetricKeys {
                signing_key: vec![4; 32],
                encrypting_key: vec![5; 32],
                iv: vec![6; 16],
            },
        }
    }

    #[test]
    fn open_assigns_nonzero_token_and_opens_phase() {
        let mut engine = SecureChannelEngine::new(1, SecurityPolicy::Basic256Sha256);
        let token_id = engine.open(keys(), Duration::from_secs(3600));
        assert_ne!(token_id, 0);
        assert_eq!(engine.phase(), ChannelPhase::Open);
    }

    #[test]
    fn sequence_violation_aborts_channel() {
        let mut engine = SecureChannelEngine::new(1, SecurityPolicy::None);
        engine.open(keys(), Duration::from_secs(3600));
        let token = {
            let rollover = engine.rollover.as_ref().unwrap();
            rollover.current_token_id()
        };
        engine.accept_incoming(token, 5).unwrap();
        assert_eq!(
            engine.accept_incoming(token, 5),
            Err(ChannelError::SequenceViolation)
        );
        assert_eq!(engine.phase(), ChannelPhase::Closed);
    }

    #[test]
    fn unknown_token_does_not_abort_channel() {
        let mut engine = SecureChannelEngine::new(1, SecurityPolicy::None);
        engine.open(keys(), Duration::from_secs(3600));
        assert_eq!(
            engine.accept_incoming(9999, 1),
            Err(ChannelError::UnknownToken(9999))
        );
        assert_eq!(engine.phase(), ChannelPhase::Open);
    }

    #[test]
    fn renew_accepts_both_tokens_until_new_one_used() {
        let mut engine = SecureChannelEngine::new(1, SecurityPolicy::None);
        let first = engine.open(keys(), Duration::from_secs(3600));
        let second = engine.renew(keys(), Duration::from_secs(3600)).unwrap();
        assert_eq!(engine.phase(), ChannelPhase::Renewed);

        engine.accept_incoming(first, 1).unwrap();
        engine.accept_incoming(second, 2).unwrap();
        assert_eq!(engine.phase(), ChannelPhase::Open);
        assert_eq!(
            engine.accept_incoming(first, 3),
            Err(ChannelError::UnknownToken(first))
        );
    }

    #[test]
    #[should_panic]
    fn channel_id_zero_is_rejected() {
        SecureChannelEngine::new(0, SecurityPolicy::None);
    }
}
