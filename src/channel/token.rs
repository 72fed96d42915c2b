//! Token id and key rollover across a Renew (spec.md §4.5 "Renew").

use std::time::{Duration, Instant};

use crate::core::{ChannelError, RENEW_GRACE_FRACTION};
use crate::crypto::SymmetricKeys;

/// The symmetric keys bound to one token: separate sign/encrypt material for
/// each direction of traffic.
#[derive(Debug, Clone)]
pub struct TokenKeys {
    /// Keys this end uses to sign/encrypt outgoing messages.
    pub sending: SymmetricKeys,
    /// Keys this end uses to verify/decrypt incoming messages.
    pub receiving: SymmetricKeys,
}

struct IssuedToken {
    id: u32,
    keys: TokenKeys,
    issued_at: Instant,
    lifetime: Duration,
}

/// Tracks the current token and, during a renewal's grace period, the
/// previous one — retired on the first message authenticated with the new
/// token, or after 25% of the old token's lifetime, whichever comes first
/// (spec.md §4.5).
pub struct TokenRollover {
    current: IssuedToken,
    previous: Option<IssuedToken>,
    new_token_seen: bool,
}

impl TokenRollover {
    /// Start tracking the channel's first issued token.
    pub fn new(id: u32, keys: TokenKeys, lifetime: Duration) -> Self {
        Self {
            current: IssuedToken {
                id,
                keys,
                issued_at: Instant::now(),
                lifetime,
            },
            previous: None,
            new_token_seen: false,
        }
    }

    /// The current token's id.
    pub fn current_token_id(&self) -> u32 {
        self.current.id
    }

    /// Begin a renewal: the current token becomes the retiring previous
    /// token, and `id`/`keys`/`lifetime` become current.
    pub fn renew(&mut self, id: u32, keys: TokenKeys, lifetime: Duration) {
        let retiring = std::mem::replace(
            &mut self.current,
            IssuedToken {
                id,
                keys,
                issued_at: Instant::now(),
                lifetime,
            },
        );
        self.previous = Some(retiring);
        self.new_token_seen = false;
    }

    fn previous_still_valid(&self) -> bool {
        match &self.previous {
            None => false,
            Some(prev) => {
                if self.new_token_seen {
                    return false;
                }
                let grace = prev.lifetime.mul_f64(RENEW_GRACE_FRACTION);
                prev.issued_at.elapsed() < grace
            }
        }
    }

    /// Drop an expired previous token eagerly, so `active_token_ids` and
    /// lookups reflect grace-period expiry even without new traffic.
    pub fn expire_previous_if_stale(&mut self) {
        if self.previous.is_some() && !self.previous_still_valid() {
            self.previous = None;
        }
    }

    /// Look up the keys for an incoming token id: the current token, or the
    /// previous one if it is still within its grace period. Accepting the
    /// current token retires the previous one immediately.
    pub fn keys_for_incoming_token(&mut self, token_id: u32) -> Result<&TokenKeys, ChannelError> {
        if token_id == self.current.id {
            if self.previous.is_some() {
                self.new_token_seen = true;
                self.previous = None;
            }
            return Ok(&self.current.keys);
        }
        self.expire_previous_if_stale();
        match &self.previous {
            Some(prev) if prev.id == token_id => Ok(&prev.keys),
            _ => Err(ChannelError::UnknownToken(token_id)),
        }
    }

    /// Keys for outgoing traffic: always the current token.
    pub fn keys_for_outgoing(&self) -> &TokenKeys {
        &self.current.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys {
            sending: SymmetricKeys {
                signing_key: vec![1; 32],
                encrypting_key: vec![2; 32],
                iv: vec![3; 16],
            },
            receiving: SymmetricKeys {
                signing_key: vec![4; 32],
                encrypting_key: vec![5; 32],
                iv: vec![6; 16],
            },
        }
    }

    #[test]
    fn previous_token_accepted_during_grace_period() {
        let mut rollover = TokenRollover::new(1, keys(), Duration::from_secs(3600));
        rollover.renew(2, keys(), Duration::from_secs(3600));
        assert!(rollover.keys_for_incoming_token(1).is_ok());
        assert!(rollover.keys_for_incoming_token(2).is_ok());
    }

    #[test]
    fn new_token_message_retires_previous_immediately() {
        let mut rollover = TokenRollover::new(1, keys(), Duration::from_secs(3600));
        rollover.renew(2, keys(), Duration::from_secs(3600));
        rollover.keys_for_incoming_token(2).unwrap();
        assert_eq!(
            rollover.keys_for_incoming_token(1),
            Err(ChannelError::UnknownToken(1))
        );
    }

    #[test]
    fn grace_period_expiry_retires_previous() {
        let mut rollover = TokenRollover::new(1, keys(), Duration::from_millis(4));
        rollover.renew(2, keys(), Duration::from_millis(3600_000));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(
            rollover.keys_for_incoming_token(1),
            Err(ChannelError::UnknownToken(1))
        );
    }

    #[test]
    fn unknown_token_id_rejected() {
        let mut rollover = TokenRollover::new(1, keys(), Duration::from_secs(3600));
        assert_eq!(
            rollover.keys_for_incoming_token(99),
            Err(ChannelError::UnknownToken(99))
        );
    }
}
