//! Reference edges stored inside a node (spec.md §4.7, §4.8).

use crate::core::ExpandedNodeId;
use crate::core::NodeId;

/// One reference edge, owned by the node it originates from.
///
/// Adding the matching reverse edge on the target node is the address-space
/// service layer's job (spec.md §4.7: "because both nodes must be locked
/// together"), not the nodestore's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The reference type (e.g. HasComponent, HasSubtype, Organizes).
    pub reference_type: NodeId,
    /// Forward (`true`) or inverse (`false`) direction from this node.
    pub is_forward: bool,
    /// The referenced node, possibly on another server.
    pub target: ExpandedNodeId,
}

impl Reference {
    /// Build a forward reference.
    pub fn forward(reference_type: NodeId, target: impl Into<ExpandedNodeId>) -> Self {
        Self {
            reference_type,
            is_forward: true,
            target: target.into(),
        }
    }

    /// Build an inverse reference.
    pub fn inverse(reference_type: NodeId, target: impl Into<ExpandedNodeId>) -> Self {
        Self {
            reference_type,
            is_forward: false,
            target: target.into(),
        }
    }
}
