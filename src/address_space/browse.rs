//! Browse / BrowseNext (spec.md §4.8 "Browse").

use std::collections::HashSet;

use super::well_known;
use crate::core::{AddressSpaceError, ExpandedNodeId, NodeId};
use crate::nodestore::{NodeClass, NodeStore};

/// Which direction of reference a Browse considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseDirection {
    /// Outgoing references only.
    Forward,
    /// Incoming references only.
    Inverse,
    /// Both directions.
    Both,
}

/// One Browse request item.
#[derive(Debug, Clone)]
pub struct BrowseDescription {
    /// Node to browse from.
    pub node_id: NodeId,
    /// Which direction to follow.
    pub direction: BrowseDirection,
    /// Reference type to filter by; `None` means `References` (accept all).
    pub reference_type_id: Option<NodeId>,
    /// Whether subtypes of `reference_type_id` are also accepted.
    pub include_subtypes: bool,
    /// Bitmask of acceptable `NodeClass`es; 0 means accept all.
    pub node_class_mask: u32,
    /// Maximum references returned before a continuation point is created;
    /// 0 means unbounded.
    pub max_references_per_node: u32,
}

/// One result entry from Browse/BrowseNext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDescription {
    /// The reference's type.
    pub reference_type_id: NodeId,
    /// True if this is a forward reference from the browsed node.
    pub is_forward: bool,
    /// The referenced node.
    pub target_node_id: ExpandedNodeId,
    /// The target's browse name.
    pub browse_name: (u16, String),
    /// The target's display name.
    pub display_name: String,
    /// The target's node class.
    pub node_class: NodeClass,
    /// The target's type-definition node, if it has one.
    pub type_definition: Option<ExpandedNodeId>,
}

fn node_class_bit(class: NodeClass) -> u32 {
    match class {
        NodeClass::Object => 1 << 0,
        NodeClass::Variable => 1 << 1,
        NodeClass::Method => 1 << 2,
        NodeClass::ObjectType => 1 << 3,
        NodeClass::VariableType => 1 << 4,
        NodeClass::ReferenceType => 1 << 5,
        NodeClass::DataType => 1 << 6,
        NodeClass::View => 1 << 7,
    }
}

/// DFS over `HasSubtype` forward references from `root`, bounded by a
/// visited set so an accidental cycle terminates (spec.md §4.8
/// "Include-subtypes expansion").
fn collect_subtypes(nodestore: &NodeStore, root: &NodeId) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut stack = vec![root.clone()];
    let has_subtype = well_known::has_subtype();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(node_ref) = nodestore.get(&current) {
            let node = node_ref.read().unwrap();
            for reference in &node.references {
                if reference.is_forward && reference.reference_type == has_subtype {
                    if let Some(child) = local_node_id(&reference.target) {
                        if !visited.contains(&child) {
                            stack.push(child);
                        }
                    }
                }
            }
        }
    }
    visited
}

fn local_node_id(expanded: &ExpandedNodeId) -> Option<NodeId> {
    expanded.is_local().then(|| expanded.node_id.clone())
}

fn type_definition_of(nodestore: &NodeStore, node_id: &NodeId) -> Option<ExpandedNodeId> {
    let node_ref = nodestore.get(node_id)?;
    let node = node_ref.read().unwrap();
    let has_type_definition = well_known::has_type_definition();
    node.references
        .iter()
        .find(|r| r.is_forward && r.reference_type == has_type_definition)
        .map(|r| r.target.clone())
}

fn describe_reference(
    nodestore: &NodeStore,
    reference_type_id: NodeId,
    is_forward: bool,
    target: ExpandedNodeId,
) -> Option<ReferenceDescription> {
    let local = local_node_id(&target)?;
    let node_ref = nodestore.get(&local)?;
    let node = node_ref.read().unwrap();
    Some(ReferenceDescription {
        reference_type_id,
        is_forward,
        target_node_id: target,
        browse_name: node.browse_name.clone(),
        display_name: node.display_name.clone(),
        node_class: node.node_class(),
        type_definition: type_definition_of(nodestore, &local),
    })
}

/// Run one Browse item against `nodestore`, returning the (possibly
/// truncated) result list and leftover references for a continuation point.
pub fn browse(
    nodestore: &NodeStore,
    description: &BrowseDescription,
) -> Result<(Vec<ReferenceDescription>, Vec<ReferenceDescription>), AddressSpaceError> {
    let node_ref = nodestore
        .get(&description.node_id)
        .ok_or(AddressSpaceError::UnknownNode)?;

    let accepted_types: Option<HashSet<NodeId>> = match &description.reference_type_id {
        None => None,
        Some(filter) if description.include_subtypes => Some(collect_subtypes(nodestore, filter)),
        Some(filter) => Some(HashSet::from([filter.clone()])),
    };

    let mut all = Vec::new();
    {
        let node = node_ref.read().unwrap();
        for reference in &node.references {
            let direction_ok = match description.direction {
                BrowseDirection::Forward => reference.is_forward,
                BrowseDirection::Inverse => !reference.is_forward,
                BrowseDirection::Both => true,
            };
            if !direction_ok {
                continue;
            }
            if let Some(types) = &accepted_types {
                if !types.contains(&reference.reference_type) {
                    continue;
                }
            }
            if let Some(described) = describe_reference(
                nodestore,
                reference.reference_type.clone(),
                reference.is_forward,
                reference.target.clone(),
            ) {
                if description.node_class_mask != 0
                    && node_class_bit(described.node_class) & description.node_class_mask == 0
                {
                    continue;
                }
                all.push(described);
            }
        }
    }

    if description.max_references_per_node == 0 || all.len() <= description.max_references_per_node as usize {
        Ok((all, Vec::new()))
    } else {
        let rest = all.split_off(description.max_references_per_node as usize);
        Ok((all, rest))
    }
}
