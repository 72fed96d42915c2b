//! Call service (spec.md §4.8 "Call (method)").

use super::well_known;
use crate::codec::Variant;
use crate::core::{AddressSpaceError, NodeId, StatusCode};
use crate::nodestore::{NodeBody, NodeStore};

/// Result of one Call invocation.
pub struct CallResult {
    /// Output argument values from the method handler.
    pub output_arguments: Vec<Variant>,
    /// Per-input-argument status, in input order.
    pub input_argument_results: Vec<StatusCode>,
}

fn is_component_of(nodestore: &NodeStore, object: &NodeId, method: &NodeId) -> bool {
    let has_component = well_known::has_component();
    let Some(object_ref) = nodestore.get(object) else { return false };
    let direct = object_ref
        .read()
        .unwrap()
        .references
        .iter()
        .any(|r| r.is_forward && r.reference_type == has_component && r.target.is_local() && &r.target.node_id == method);
    if direct {
        return true;
    }

    let has_type_definition = well_known::has_type_definition();
    let type_id = object_ref
        .read()
        .unwrap()
        .references
        .iter()
        .find(|r| r.is_forward && r.reference_type == has_type_definition && r.target.is_local())
        .map(|r| r.target.node_id.clone());

    let Some(type_id) = type_id else { return false };
    let Some(type_ref) = nodestore.get(&type_id) else { return false };
    type_ref
        .read()
        .unwrap()
        .references
        .iter()
        .any(|r| r.is_forward && r.reference_type == has_component && r.target.is_local() && &r.target.node_id == method)
}

fn expected_input_count(nodestore: &NodeStore, method: &NodeId) -> Option<usize> {
    let has_property = well_known::has_property();
    let method_ref = nodestore.get(method)?;
    let args_node_id = method_ref
        .read()
        .unwrap()
        .references
        .iter()
        .find(|r| r.is_forward && r.reference_type == has_property)
        .and_then(|r| r.target.is_local().then(|| r.target.node_id.clone()))?;

    let args_ref = nodestore.get(&args_node_id)?;
    let args_node = args_ref.read().unwrap();
    let NodeBody::Variable {
        value: crate::nodestore::VariableValue::Cached(dv),
        ..
    } = &args_node.body
    else {
        return None;
    };
    match &dv.value {
        Some(Variant::Array { elements: Some(elements), .. }) => Some(elements.len()),
        _ => None,
    }
}

/// Invoke a method on `object` (spec.md §4.8 "Call"): verifies the method is
/// a `HasComponent` child of the object or its type, checks the input
/// argument count against the method's recorded `InputArguments` property
/// (when present), and invokes the attached handler.
pub fn call(
    nodestore: &NodeStore,
    object: &NodeId,
    method: &NodeId,
    inputs: Vec<Variant>,
) -> Result<CallResult, AddressSpaceError> {
    if !is_component_of(nodestore, object, method) {
        return Err(AddressSpaceError::NotFound);
    }

    if let Some(expected) = expected_input_count(nodestore, method) {
        if expected != inputs.len() {
            return Err(AddressSpaceError::TypeMismatch);
        }
    }

    let method_ref = nodestore.get(method).ok_or(AddressSpaceError::UnknownNode)?;
    let method_node = method_ref.read().unwrap();
    let NodeBody::Method { handler } = &method_node.body else {
        return Err(AddressSpaceError::InvalidAttribute);
    };
    let handler = handler.as_ref().ok_or(AddressSpaceError::NotFound)?;
    let (outputs, statuses) = handler.invoke(object, &inputs)?;

    Ok(CallResult {
        output_arguments: outputs,
        input_argument_results: statuses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MethodHandler;
    use crate::nodestore::{InsertOptions, Node, Reference};

    struct Echo;
    impl MethodHandler for Echo {
        fn invoke(
            &self,
            _object: &NodeId,
            inputs: &[Variant],
        ) -> Result<(Vec<Variant>, Vec<StatusCode>), AddressSpaceError> {
            Ok((inputs.to_vec(), vec![StatusCode::Good; inputs.len()]))
        }
    }

    fn store_with_method() -> NodeStore {
        let store = NodeStore::new();
        let mut object = Node::object(NodeId::ns0(1), (0, "Obj".into()), "Obj");
        object
            .references
            .push(Reference::forward(well_known::has_component(), NodeId::ns0(2)));
        store.insert(object, InsertOptions::default()).unwrap();

        let method = Node {
            node_id: NodeId::ns0(2),
            browse_name: (0, "DoThing".into()),
            display_name: "DoThing".into(),
            description: None,
            references: Vec::new(),
            body: NodeBody::Method { handler: Some(Box::new(Echo)) },
        };
        store.insert(method, InsertOptions::default()).unwrap();
        store
    }

    #[test]
    fn call_invokes_handler() {
        let store = store_with_method();
        let result = call(&store, &NodeId::ns0(1), &NodeId::ns0(2), vec![Variant::Null]).unwrap();
        assert_eq!(result.output_arguments, vec![Variant::Null]);
        assert_eq!(result.input_argument_results, vec![StatusCode::Good]);
    }

    #[test]
    fn call_rejects_method_not_a_component() {
        let store = store_with_method();
        store.insert(Node::object(NodeId::ns0(99), (0, "Other".into()), "Other"), InsertOptions::default()).unwrap();
        let err = call(&store, &NodeId::ns0(99), &NodeId::ns0(2), vec![]).unwrap_err();
        assert_eq!(err, AddressSpaceError::NotFound);
    }

    #[test]
    fn call_with_no_handler_fails() {
        let store = NodeStore::new();
        let mut object = Node::object(NodeId::ns0(1), (0, "Obj".into()), "Obj");
        object
            .references
            .push(Reference::forward(well_known::has_component(), NodeId::ns0(2)));
        store.insert(object, InsertOptions::default()).unwrap();
        store
            .insert(
                Node {
                    node_id: NodeId::ns0(2),
                    browse_name: (0, "NoHandler".into()),
                    display_name: "NoHandler".into(),
                    description: None,
                    references: Vec::new(),
                    body: NodeBody::Method { handler: None },
                },
                InsertOptions::default(),
            )
            .unwrap();
        let err = call(&store, &NodeId::ns0(1), &NodeId::ns0(2), vec![]).unwrap_err();
        assert_eq!(err, AddressSpaceError::NotFound);
    }
}
