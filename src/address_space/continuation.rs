//! Browse continuation points (spec.md §4.8 "When results exceed
//! max-references-per-node, a continuation point is created").

use std::collections::HashMap;
use std::sync::Mutex;

use rand::RngCore;

use super::browse::ReferenceDescription;
use crate::core::AddressSpaceError;

fn random_token() -> Vec<u8> {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.to_vec()
}

/// Server-side table of outstanding Browse continuation points.
///
/// Each cookie is opaque to the client; real binding to a session (so one
/// session cannot resume another's continuation point) is the dispatcher's
/// job, keyed on top of this store by `(session_id, token)`.
#[derive(Default)]
pub struct ContinuationPointStore {
    points: Mutex<HashMap<Vec<u8>, Vec<ReferenceDescription>>>,
}

impl ContinuationPointStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `remaining` references under a freshly generated token.
    pub fn create(&self, remaining: Vec<ReferenceDescription>) -> Vec<u8> {
        let token = random_token();
        self.points.lock().unwrap().insert(token.clone(), remaining);
        token
    }

    /// `BrowseNext` with `release = false`: return up to `max_references`
    /// more entries, re-registering any leftover under the same token.
    pub fn resume(
        &self,
        token: &[u8],
        max_references: u32,
    ) -> Result<(Vec<ReferenceDescription>, Option<Vec<u8>>), AddressSpaceError> {
        let mut points = self.points.lock().unwrap();
        let mut remaining = points.remove(token).ok_or(AddressSpaceError::NotFound)?;

        if max_references == 0 || remaining.len() <= max_references as usize {
            Ok((remaining, None))
        } else {
            let rest = remaining.split_off(max_references as usize);
            points.insert(token.to_vec(), rest);
            Ok((remaining, Some(token.to_vec())))
        }
    }

    /// `BrowseNext` with `release = true`: discard the continuation point.
    pub fn release(&self, token: &[u8]) -> Result<(), AddressSpaceError> {
        self.points
            .lock()
            .unwrap()
            .remove(token)
            .map(|_| ())
            .ok_or(AddressSpaceError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExpandedNodeId, NodeId};
    use crate::nodestore::NodeClass;

    fn entry(id: u32) -> ReferenceDescription {
        ReferenceDescription {
            reference_type_id: NodeId::ns0(1),
            is_forward: true,
            target_node_id: ExpandedNodeId::local(NodeId::ns0(id)),
            browse_name: (0, format!("n{id}")),
            display_name: format!("n{id}"),
            node_class: NodeClass::Object,
            type_definition: None,
        }
    }

    #[test]
    fn resume_returns_remaining_then_exhausts() {
        let store = ContinuationPointStore::new();
        let token = store.create(vec![entry(1), entry(2), entry(3)]);

        let (first, next_token) = store.resume(&token, 2).unwrap();
        assert_eq!(first.len(), 2);
        let next_token = next_token.unwrap();

        let (second, next_token) = store.resume(&next_token, 2).unwrap();
        assert_eq!(second.len(), 1);
        assert!(next_token.is_none());
    }

    #[test]
    fn release_discards_the_point() {
        let store = ContinuationPointStore::new();
        let token = store.create(vec![entry(1)]);
        store.release(&token).unwrap();
        assert_eq!(store.resume(&token, 10).unwrap_err(), AddressSpaceError::NotFound);
    }
}
