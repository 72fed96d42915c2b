//! Channel manager bookkeeping (spec.md §5, SPEC_FULL.md §B): the global
//! directory of live SecureChannels the dispatcher consults to route an
//! incoming chunk to its engine.
//!
//! A single `RwLock` guards the whole map rather than per-channel locks —
//! channel open/close is rare compared to per-chunk routing, so the table
//! itself only ever needs a brief read lock on the hot path (spec.md §5
//! "single write lock... readers never blocked by writers" echoed from the
//! nodestore's own design).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::channel::SecureChannelEngine;
use crate::core::ChannelError;

/// The server-wide table of open SecureChannels, keyed by channel id.
#[derive(Default)]
pub struct ChannelTable {
    channels: RwLock<HashMap<u32, Arc<RwLock<SecureChannelEngine>>>>,
}

impl ChannelTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened channel.
    pub fn insert(&self, engine: SecureChannelEngine) -> Arc<RwLock<SecureChannelEngine>> {
        let channel_id = engine.channel_id();
        let handle = Arc::new(RwLock::new(engine));
        self.channels.write().unwrap().insert(channel_id, handle.clone());
        handle
    }

    /// Look up a channel by id for per-chunk routing.
    pub fn get(&self, channel_id: u32) -> Result<Arc<RwLock<SecureChannelEngine>>, ChannelError> {
        self.channels
            .read()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .ok_or(ChannelError::UnknownToken(channel_id))
    }

    /// Close and drop a channel's bookkeeping entry (spec.md §4.5 "Close").
    pub fn remove(&self, channel_id: u32) -> Option<Arc<RwLock<SecureChannelEngine>>> {
        self.channels.write().unwrap().remove(&channel_id)
    }

    /// Number of channels currently tracked.
    pub fn len(&self) -> usize {
        self.channels.read().unwrap().len()
    }

    /// True when no channel is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecurityPolicy;

    #[test]
    fn insert_then_get_finds_the_same_engine() {
        let table = ChannelTable::new();
        table.insert(SecureChannelEngine::new(7, SecurityPolicy::None));
        let handle = table.get(7).unwrap();
        assert_eq!(handle.read().unwrap().channel_id(), 7);
    }

    #[test]
    fn unknown_channel_id_is_an_error() {
        let table = ChannelTable::new();
        assert!(matches!(table.get(99), Err(ChannelError::UnknownToken(99))));
    }

    #[test]
    fn remove_drops_the_entry() {
        let table = ChannelTable::new();
        table.insert(SecureChannelEngine::new(3, SecurityPolicy::None));
        assert_eq!(table.len(), 1);
        table.remove(3);
        assert!(table.is_empty());
    }
}
