//! Sequence number monotonicity, with wrap (spec.md §4.5, §3 "SecureChannel").

use crate::core::{ChannelError, SEQUENCE_NUMBER_WRAP};

/// Tracks the last accepted sequence number on the receive side of one
/// direction of a channel, enforcing spec.md §4.5's "strictly greater than
/// the last accepted (modulo the defined wrap)" rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceGuard {
    last_accepted: Option<u32>,
}

impl SequenceGuard {
    /// A fresh guard with no history; the first sequence number it sees is
    /// always accepted.
    pub fn new() -> Self {
        Self { last_accepted: None }
    }

    /// Validate and, if valid, record `seq` as the new high-water mark.
    pub fn check_and_accept(&mut self, seq: u32) -> Result<(), ChannelError> {
        let valid = match self.last_accepted {
            None => true,
            Some(last) => seq > last || (last >= SEQUENCE_NUMBER_WRAP && seq < 1024),
        };
        if valid {
            self.last_accepted = Some(seq);
            Ok(())
        } else {
            Err(ChannelError::SequenceViolation)
        }
    }

    /// The last accepted sequence number, if any.
    pub fn last_accepted(&self) -> Option<u32> {
        self.last_accepted
    }
}

/// Generates the monotonically increasing sequence numbers for one
/// direction of outgoing traffic, wrapping back to 1 at the same threshold
/// a peer's [`SequenceGuard`] will accept.
#[derive(Debug, Clone, Copy)]
pub struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    /// Start counting from 1 (0 is never a valid sequence number).
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Produce the next sequence number and advance, wrapping per
    /// `SEQUENCE_NUMBER_WRAP`.
    pub fn next(&mut self) -> u32 {
        let value = self.next;
        self.next = if value >= SEQUENCE_NUMBER_WRAP { 1 } else { value + 1 };
        value
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_numbers_accepted() {
        let mut guard = SequenceGuard::new();
        guard.check_and_accept(1).unwrap();
        guard.check_and_accept(2).unwrap();
        guard.check_and_accept(100).unwrap();
    }

    #[test]
    fn non_increasing_number_rejected() {
        let mut guard = SequenceGuard::new();
        guard.check_and_accept(5).unwrap();
        assert_eq!(guard.check_and_accept(5), Err(ChannelError::SequenceViolation));
        assert_eq!(guard.check_and_accept(3), Err(ChannelError::SequenceViolation));
    }

    #[test]
    fn wrap_near_max_is_accepted() {
        let mut guard = SequenceGuard::new();
        guard.check_and_accept(SEQUENCE_NUMBER_WRAP).unwrap();
        guard.check_and_accept(10).unwrap();
    }

    #[test]
    fn counter_wraps_at_threshold() {
        let mut counter = SequenceCounter::new();
        counter.next = SEQUENCE_NUMBER_WRAP;
        assert_eq!(counter.next(), SEQUENCE_NUMBER_WRAP);
        assert_eq!(counter.next(), 1);
    }
}
