//! TranslateBrowsePathsToNodeIds (spec.md §4.8).

use std::collections::HashSet;

use super::well_known;
use crate::codec::RelativePathElement;
use crate::core::NodeId;
use crate::nodestore::NodeStore;

/// One resolved (or partially resolved) path endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsePathTarget {
    /// The node reached.
    pub target_id: NodeId,
    /// `Some(i)` when resolution stopped partway through the path, at
    /// element `i`; `None` means the path fully resolved to `target_id`.
    pub remaining_path_index: Option<u32>,
}

fn accepted_types(nodestore: &NodeStore, element: &RelativePathElement) -> HashSet<NodeId> {
    if element.include_subtypes {
        collect_subtypes(nodestore, &element.reference_type_id)
    } else {
        HashSet::from([element.reference_type_id.clone()])
    }
}

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
                if reference.is_forward && reference.reference_type == has_subtype && reference.target.is_local() {
                    stack.push(reference.target.node_id.clone());
                }
            }
        }
    }
    visited
}

/// Resolve one relative browse path starting at `start` (spec.md §4.8
/// "TranslateBrowsePathsToNodeIds"). When multiple targets match a step, all
/// branches are followed independently.
pub fn translate_browse_path(
    nodestore: &NodeStore,
    start: &NodeId,
    path: &[RelativePathElement],
) -> Vec<BrowsePathTarget> {
    let mut frontier = vec![start.clone()];

    for (index, element) in path.iter().enumerate() {
        let types = accepted_types(nodestore, element);
        let mut next = Vec::new();

        for node_id in &frontier {
            let Some(node_ref) = nodestore.get(node_id) else { continue };
            let node = node_ref.read().unwrap();
            for reference in &node.references {
                if reference.is_forward != !element.is_inverse {
                    continue;
                }
                if !types.contains(&reference.reference_type) {
                    continue;
                }
                if !reference.target.is_local() {
                    continue;
                }
                let Some(target_ref) = nodestore.get(&reference.target.node_id) else { continue };
                let target = target_ref.read().unwrap();
                if target.browse_name == (element.target_namespace, element.target_name.clone()) {
                    next.push(reference.target.node_id.clone());
                }
            }
        }

        if next.is_empty() {
            return vec![BrowsePathTarget {
                target_id: NodeId::null(),
                remaining_path_index: Some(index as u32),
            }];
        }
        frontier = next;
    }

    frontier
        .into_iter()
        .map(|target_id| BrowsePathTarget {
            target_id,
            remaining_path_index: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodestore::{InsertOptions, Node, Reference};

    fn store() -> NodeStore {
        let store = NodeStore::new();
        let mut parent = Node::object(NodeId::ns0(1), (0, "Parent".into()), "Parent");
        let child_id = NodeId::ns0(2);
        parent
            .references
            .push(Reference::forward(well_known::organizes(), child_id.clone()));
        store.insert(parent, InsertOptions::default()).unwrap();
        store
            .insert(Node::object(child_id, (0, "Child".into()), "Child"), InsertOptions::default())
            .unwrap();
        store
    }

    #[test]
    fn resolves_single_step_path() {
        let store = store();
        let path = vec![RelativePathElement {
            reference_type_id: well_known::organizes(),
            include_subtypes: false,
            is_inverse: false,
            target_namespace: 0,
            target_name: "Child".to_string(),
        }];
        let results = translate_browse_path(&store, &NodeId::ns0(1), &path);
        assert_eq!(results, vec![BrowsePathTarget { target_id: NodeId::ns0(2), remaining_path_index: None }]);
    }

    #[test]
    fn unmatched_browse_name_reports_partial_failure() {
        let store = store();
        let path = vec![RelativePathElement {
            reference_type_id: well_known::organizes(),
            include_subtypes: false,
            is_inverse: false,
            target_namespace: 0,
            target_name: "NoSuchChild".to_string(),
        }];
        let results = translate_browse_path(&store, &NodeId::ns0(1), &path);
        assert_eq!(results[0].remaining_path_index, Some(0));
    }
}
