//! AddNode / DeleteNode, including type instantiation (spec.md §4.8).

use std::collections::HashSet;

use rand::RngCore;

use super::well_known;
use crate::core::{AddressSpaceError, NodeId};
use crate::nodestore::{InsertOptions, Node, NodeStore, Reference};

fn random_node_id(namespace: u16) -> NodeId {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    NodeId::opaque(namespace, bytes.to_vec())
}

/// Add `node` as a child of `parent`, linked by `reference_type`. When
/// `type_definition` is given, the type's (and its supertypes') children are
/// instantiated as new children of `node` (spec.md §4.8 "AddNode / DeleteNode
/// ... type instantiation").
pub fn add_node(
    nodestore: &NodeStore,
    parent: &NodeId,
    reference_type: NodeId,
    mut node: Node,
    type_definition: Option<NodeId>,
) -> Result<NodeId, AddressSpaceError> {
    nodestore.get(parent).ok_or(AddressSpaceError::UnknownNode)?;

    let new_id = node.node_id.clone();
    if let Some(type_id) = &type_definition {
        node.references
            .push(Reference::forward(well_known::has_type_definition(), type_id.clone()));
    }
    let node_ref = nodestore.insert(node, InsertOptions { unique: true })?;

    {
        let parent_ref = nodestore.get(parent).ok_or(AddressSpaceError::UnknownNode)?;
        let mut parent_node = parent_ref.write().unwrap();
        parent_node
            .references
            .push(Reference::forward(reference_type.clone(), new_id.clone()));
    }
    {
        let mut child = node_ref.write().unwrap();
        child.references.push(Reference::inverse(reference_type, parent.clone()));
    }

    if let Some(type_id) = type_definition {
        instantiate_children(nodestore, &type_id, &new_id, new_id.namespace)?;
    }

    Ok(new_id)
}

/// Walk from `type_id` up through `HasSubtype` inverse references to the
/// base type, subtype first (spec.md §4.8 "Masking is computed by walking
/// the type hierarchy ... subtype first").
fn type_hierarchy(nodestore: &NodeStore, type_id: &NodeId) -> Vec<NodeId> {
    let base_object = well_known::base_object_type();
    let base_variable = well_known::base_variable_type();
    let has_subtype = well_known::has_subtype();

    let mut chain = Vec::new();
    let mut current = type_id.clone();
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(current.clone()) {
            break;
        }
        chain.push(current.clone());
        if current == base_object || current == base_variable {
            break;
        }
        let Some(node_ref) = nodestore.get(&current) else { break };
        let node = node_ref.read().unwrap();
        let supertype = node
            .references
            .iter()
            .find(|r| !r.is_forward && r.reference_type == has_subtype && r.target.is_local())
            .map(|r| r.target.node_id.clone());
        drop(node);
        match supertype {
            Some(next) => current = next,
            None => break,
        }
    }
    chain
}

/// Recursively copy the type hierarchy's component/property children as new
/// instance children of `instance_id`, masking a supertype child whose
/// browse name a subtype child already claimed.
fn instantiate_children(
    nodestore: &NodeStore,
    type_id: &NodeId,
    instance_id: &NodeId,
    namespace: u16,
) -> Result<(), AddressSpaceError> {
    let has_component = well_known::has_component();
    let has_property = well_known::has_property();

    let mut claimed: HashSet<(u16, String)> = HashSet::new();

    for level_type in type_hierarchy(nodestore, type_id) {
        let Some(type_ref) = nodestore.get(&level_type) else { continue };
        let children: Vec<(NodeId, NodeId)> = {
            let type_node = type_ref.read().unwrap();
            type_node
                .references
                .iter()
                .filter(|r| r.is_forward && (r.reference_type == has_component || r.reference_type == has_property))
                .filter(|r| r.target.is_local())
                .map(|r| (r.reference_type.clone(), r.target.node_id.clone()))
                .collect()
        };

        for (reference_type, child_template_id) in children {
            let Some(template_ref) = nodestore.get(&child_template_id) else { continue };
            let template = template_ref.read().unwrap();
            let browse_key = template.browse_name.clone();
            if !claimed.insert(browse_key) {
                continue;
            }

            let mut instance_child = Node {
                node_id: random_node_id(namespace),
                browse_name: template.browse_name.clone(),
                display_name: template.display_name.clone(),
                description: template.description.clone(),
                references: Vec::new(),
                body: clone_body(&template.body),
            };
            let child_type_def = template
                .references
                .iter()
                .find(|r| r.is_forward && r.reference_type == well_known::has_type_definition())
                .map(|r| r.target.node_id.clone());
            drop(template);

            let child_id = instance_child.node_id.clone();
            if let Some(type_def) = &child_type_def {
                instance_child
                    .references
                    .push(Reference::forward(well_known::has_type_definition(), type_def.clone()));
            }
            let child_ref = nodestore.insert(instance_child, InsertOptions { unique: true })?;
            {
                let instance_ref = nodestore.get(instance_id).ok_or(AddressSpaceError::UnknownNode)?;
                let mut instance_node = instance_ref.write().unwrap();
                instance_node
                    .references
                    .push(Reference::forward(reference_type.clone(), child_id.clone()));
            }
            {
                let mut child = child_ref.write().unwrap();
                child.references.push(Reference::inverse(reference_type, instance_id.clone()));
            }

            if let Some(type_def) = child_type_def {
                instantiate_children(nodestore, &type_def, &child_id, namespace)?;
            }
        }
    }

    Ok(())
}

fn clone_body(body: &crate::nodestore::NodeBody) -> crate::nodestore::NodeBody {
    use crate::nodestore::{NodeBody, VariableValue};
    match body {
        NodeBody::Object => NodeBody::Object,
        NodeBody::Variable {
            value,
            data_type,
            value_rank,
            array_dimensions,
            writable,
        } => NodeBody::Variable {
            value: match value {
                VariableValue::Cached(dv) => VariableValue::Cached(dv.clone()),
                VariableValue::Source(_) => VariableValue::Cached(crate::codec::DataValue::default()),
            },
            data_type: data_type.clone(),
            value_rank: *value_rank,
            array_dimensions: array_dimensions.clone(),
            writable: *writable,
        },
        NodeBody::Method { .. } => NodeBody::Method { handler: None },
        NodeBody::ObjectType { is_abstract } => NodeBody::ObjectType { is_abstract: *is_abstract },
        NodeBody::VariableType { default_value, is_abstract } => NodeBody::VariableType {
            default_value: default_value.clone(),
            is_abstract: *is_abstract,
        },
        NodeBody::ReferenceType { symmetric } => NodeBody::ReferenceType { symmetric: *symmetric },
        NodeBody::DataType { is_abstract } => NodeBody::DataType { is_abstract: *is_abstract },
        NodeBody::View { contains_no_loops } => NodeBody::View { contains_no_loops: *contains_no_loops },
    }
}

/// Delete `node_id`. When `delete_target_references` is set, every other
/// node's inverse reference pointing at it is also removed (spec.md §4.8
/// "Deletion ... also removes all inverse references pointing at it").
pub fn delete_node(
    nodestore: &NodeStore,
    node_id: &NodeId,
    delete_target_references: bool,
) -> Result<(), AddressSpaceError> {
    nodestore.remove(node_id)?;

    if delete_target_references {
        nodestore.iterate(|_, node_ref| {
            let mut node = node_ref.write().unwrap();
            node.references.retain(|r| {
                !(r.target.is_local() && &r.target.node_id == node_id)
            });
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodestore::NodeBody;

    fn base_object_type_node() -> Node {
        Node {
            node_id: well_known::base_object_type(),
            browse_name: (0, "BaseObjectType".into()),
            display_name: "BaseObjectType".into(),
            description: None,
            references: Vec::new(),
            body: NodeBody::ObjectType { is_abstract: true },
        }
    }

    #[test]
    fn add_node_links_parent_and_child() {
        let store = NodeStore::new();
        store.insert(Node::object(NodeId::ns0(1), (0, "Root".into()), "Root"), InsertOptions::default()).unwrap();

        let child = Node::object(NodeId::ns0(2), (0, "Child".into()), "Child");
        add_node(&store, &NodeId::ns0(1), well_known::organizes(), child, None).unwrap();

        let parent_ref = store.get(&NodeId::ns0(1)).unwrap();
        assert!(parent_ref
            .read()
            .unwrap()
            .references
            .iter()
            .any(|r| r.is_forward && r.target.node_id == NodeId::ns0(2)));
    }

    #[test]
    fn instantiation_copies_type_component_as_instance_child() {
        let store = NodeStore::new();
        store.insert(base_object_type_node(), InsertOptions::default()).unwrap();

        let mut custom_type = Node {
            node_id: NodeId::ns0(3000),
            browse_name: (0, "CustomType".into()),
            display_name: "CustomType".into(),
            description: None,
            references: vec![Reference::inverse(well_known::has_subtype(), well_known::base_object_type())],
            body: NodeBody::ObjectType { is_abstract: false },
        };
        let template_child = Node::object(NodeId::ns0(3001), (0, "Sensor".into()), "Sensor");
        custom_type
            .references
            .push(Reference::forward(well_known::has_component(), NodeId::ns0(3001)));
        store.insert(custom_type, InsertOptions::default()).unwrap();
        store.insert(template_child, InsertOptions::default()).unwrap();

        store.insert(Node::object(NodeId::ns0(1), (0, "Root".into()), "Root"), InsertOptions::default()).unwrap();
        let instance = Node::object(NodeId::ns0(4), (0, "Device".into()), "Device");
        add_node(&store, &NodeId::ns0(1), well_known::organizes(), instance, Some(NodeId::ns0(3000))).unwrap();

        let instance_ref = store.get(&NodeId::ns0(4)).unwrap();
        let has_component = well_known::has_component();
        let component_refs: Vec<_> = instance_ref
            .read()
            .unwrap()
            .references
            .iter()
            .filter(|r| r.is_forward && r.reference_type == has_component)
            .map(|r| r.target.node_id.clone())
            .collect();
        assert_eq!(component_refs.len(), 1);
        let sensor_instance = store.get(&component_refs[0]).unwrap();
        assert_eq!(sensor_instance.read().unwrap().browse_name, (0, "Sensor".to_string()));
    }

    #[test]
    fn delete_node_removes_dangling_references() {
        let store = NodeStore::new();
        let mut parent = Node::object(NodeId::ns0(1), (0, "Root".into()), "Root");
        parent
            .references
            .push(Reference::forward(well_known::organizes(), NodeId::ns0(2)));
        store.insert(parent, InsertOptions::default()).unwrap();
        store.insert(Node::object(NodeId::ns0(2), (0, "Child".into()), "Child"), InsertOptions::default()).unwrap();

        delete_node(&store, &NodeId::ns0(2), true).unwrap();

        let parent_ref = store.get(&NodeId::ns0(1)).unwrap();
        assert!(parent_ref.read().unwrap().references.is_empty());
        assert!(store.get(&NodeId::ns0(2)).is_none());
    }
}
