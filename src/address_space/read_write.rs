//! Read / Write attribute services (spec.md §4.8).

use std::collections::HashSet;

use super::well_known;
use crate::codec::{DataValue, Scalar, Variant};
use crate::core::{AddressSpaceError, NodeId, StatusCode};
use crate::nodestore::{NodeBody, NodeStore, VariableValue};

/// The built-in OPC UA attribute ids this runtime exposes (Part 6 "Attribute
/// id" table; numeric values match the standard so wire-level ReadValueId
/// payloads need no translation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AttributeId {
    /// The node's own identity.
    NodeId = 1,
    /// The node's class.
    NodeClass = 2,
    /// The node's non-localized browse name.
    BrowseName = 3,
    /// The node's display name.
    DisplayName = 4,
    /// An optional human-readable description.
    Description = 5,
    /// Write mask (not separately modeled; always 0).
    WriteMask = 6,
    /// User write mask (not separately modeled; always 0).
    UserWriteMask = 7,
    /// ObjectType/VariableType/DataType abstractness.
    IsAbstract = 8,
    /// ReferenceType symmetry.
    Symmetric = 9,
    /// ReferenceType inverse name (not modeled; always null).
    InverseName = 10,
    /// View loop-freedom flag.
    ContainsNoLoops = 11,
    /// Object event-notifier byte (not modeled; always 0).
    EventNotifier = 12,
    /// A Variable's current value.
    Value = 13,
    /// A Variable's declared data type.
    DataType = 14,
    /// A Variable's value rank.
    ValueRank = 15,
    /// A Variable's per-dimension array bounds.
    ArrayDimensions = 16,
    /// Access level byte (derived from `writable`).
    AccessLevel = 17,
    /// User access level byte (derived from `writable`).
    UserAccessLevel = 18,
    /// Minimum sampling interval (not modeled; always 0.0).
    MinimumSamplingInterval = 19,
    /// Historizing flag (not modeled; always false).
    Historizing = 20,
    /// Method executable flag.
    Executable = 21,
    /// Method user-executable flag.
    UserExecutable = 22,
}

impl AttributeId {
    /// Map the wire `u32` to a known attribute id.
    pub fn from_u32(value: u32) -> Result<Self, AddressSpaceError> {
        Ok(match value {
            1 => AttributeId::NodeId,
            2 => AttributeId::NodeClass,
            3 => AttributeId::BrowseName,
            4 => AttributeId::DisplayName,
            5 => AttributeId::Description,
            6 => AttributeId::WriteMask,
            7 => AttributeId::UserWriteMask,
            8 => AttributeId::IsAbstract,
            9 => AttributeId::Symmetric,
            10 => AttributeId::InverseName,
            11 => AttributeId::ContainsNoLoops,
            12 => AttributeId::EventNotifier,
            13 => AttributeId::Value,
            14 => AttributeId::DataType,
            15 => AttributeId::ValueRank,
            16 => AttributeId::ArrayDimensions,
            17 => AttributeId::AccessLevel,
            18 => AttributeId::UserAccessLevel,
            19 => AttributeId::MinimumSamplingInterval,
            20 => AttributeId::Historizing,
            21 => AttributeId::Executable,
            22 => AttributeId::UserExecutable,
            _ => return Err(AddressSpaceError::InvalidAttribute),
        })
    }
}

fn sub_select(value: Variant, index_range: Option<&str>) -> Result<Variant, AddressSpaceError> {
    let Some(range) = index_range else { return Ok(value) };
    let Variant::Array { elements: Some(elements), .. } = value else {
        return Err(AddressSpaceError::InvalidIndexRange);
    };
    let (start, end) = parse_index_range(range, elements.len())?;
    Ok(Variant::Array {
        elements: Some(elements[start..end].to_vec()),
        dimensions: None,
    })
}

fn parse_index_range(range: &str, len: usize) -> Result<(usize, usize), AddressSpaceError> {
    let parts: Vec<&str> = range.split(':').collect();
    let (start, end) = match parts.as_slice() {
        [a] => {
            let start: usize = a.parse().map_err(|_| AddressSpaceError::InvalidIndexRange)?;
            (start, start + 1)
        }
        [a, b] => {
            let start: usize = a.parse().map_err(|_| AddressSpaceError::InvalidIndexRange)?;
            let end: usize = b.parse().map_err(|_| AddressSpaceError::InvalidIndexRange)?;
            (start, end + 1)
        }
        _ => return Err(AddressSpaceError::InvalidIndexRange),
    };
    if start >= end || end > len {
        return Err(AddressSpaceError::InvalidIndexRange);
    }
    Ok((start, end))
}

/// Read one attribute (spec.md §4.8 "Read").
pub fn read_attribute(
    nodestore: &NodeStore,
    node_id: &NodeId,
    attribute_id: AttributeId,
    index_range: Option<&str>,
) -> Result<DataValue, AddressSpaceError> {
    let node_ref = nodestore.get(node_id).ok_or(AddressSpaceError::UnknownNode)?;
    let node = node_ref.read().unwrap();

    let value = match attribute_id {
        AttributeId::NodeId => Variant::Scalar(Scalar::NodeId(node.node_id.clone())),
        AttributeId::NodeClass => Variant::Scalar(Scalar::Int32(node.node_class() as i32)),
        AttributeId::BrowseName => Variant::Scalar(Scalar::String(Some(node.browse_name.1.clone()))),
        AttributeId::DisplayName => Variant::Scalar(Scalar::String(Some(node.display_name.clone()))),
        AttributeId::Description => match &node.description {
            Some(d) => Variant::Scalar(Scalar::String(Some(d.clone()))),
            None => Variant::Null,
        },
        AttributeId::WriteMask | AttributeId::UserWriteMask => Variant::Scalar(Scalar::UInt32(0)),
        AttributeId::EventNotifier => Variant::Scalar(Scalar::Byte(0)),
        AttributeId::InverseName => Variant::Null,
        AttributeId::MinimumSamplingInterval => Variant::Scalar(Scalar::Double(0.0)),
        AttributeId::Historizing => Variant::Scalar(Scalar::Boolean(false)),

        AttributeId::IsAbstract => match &node.body {
            NodeBody::ObjectType { is_abstract }
            | NodeBody::VariableType { is_abstract, .. }
            | NodeBody::DataType { is_abstract } => Variant::Scalar(Scalar::Boolean(*is_abstract)),
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
        AttributeId::Symmetric => match &node.body {
            NodeBody::ReferenceType { symmetric } => Variant::Scalar(Scalar::Boolean(*symmetric)),
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
        AttributeId::ContainsNoLoops => match &node.body {
            NodeBody::View { contains_no_loops } => Variant::Scalar(Scalar::Boolean(*contains_no_loops)),
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
        AttributeId::Executable | AttributeId::UserExecutable => match &node.body {
            NodeBody::Method { handler } => Variant::Scalar(Scalar::Boolean(handler.is_some())),
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },

        AttributeId::Value => {
            let NodeBody::Variable { value, .. } = &node.body else {
                return Err(AddressSpaceError::InvalidAttribute);
            };
            return match value {
                VariableValue::Cached(data_value) => {
                    let mut data_value = data_value.clone();
                    if let Some(v) = data_value.value.take() {
                        data_value.value = Some(sub_select(v, index_range)?);
                    }
                    Ok(data_value)
                }
                VariableValue::Source(source) => source.read(&node.node_id, index_range),
            };
        }
        AttributeId::DataType => match &node.body {
            NodeBody::Variable { data_type, .. } => Variant::Scalar(Scalar::NodeId(data_type.clone())),
            NodeBody::VariableType { .. } => return Err(AddressSpaceError::InvalidAttribute),
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
        AttributeId::ValueRank => match &node.body {
            NodeBody::Variable { value_rank, .. } => Variant::Scalar(Scalar::Int32(*value_rank)),
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
        AttributeId::ArrayDimensions => match &node.body {
            NodeBody::Variable { array_dimensions, .. } => Variant::Array {
                elements: Some(array_dimensions.iter().map(|d| Scalar::UInt32(*d)).collect()),
                dimensions: None,
            },
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
        AttributeId::AccessLevel | AttributeId::UserAccessLevel => match &node.body {
            NodeBody::Variable { writable, .. } => {
                Variant::Scalar(Scalar::Byte(if *writable { 0x03 } else { 0x01 }))
            }
            _ => return Err(AddressSpaceError::InvalidAttribute),
        },
    };

    Ok(DataValue::of(value))
}

/// DFS over `HasSubtype` forward references from `root`, bounded by a
/// visited set so an accidental cycle terminates. Mirrors the same walk
/// `browse`'s `include_subtypes` expansion does, applied to data types
/// instead of reference/node-class filters.
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
                    let child = reference.target.node_id.clone();
                    if !visited.contains(&child) {
                        stack.push(child);
                    }
                }
            }
        }
    }
    visited
}

/// True when `value`'s own data type equals `declared` or is one of its
/// registered subtypes (spec.md §4.8 "Write": "written value's data type
/// must equal or be subtype of the node's data type"). A `Null` value or
/// empty array carries no type information and is always accepted.
fn value_type_is_compatible(nodestore: &NodeStore, declared: &NodeId, value: &Variant) -> bool {
    let actual = match value {
        Variant::Null => return true,
        Variant::Scalar(s) => s.data_type(),
        Variant::Array { elements: Some(items), .. } => match items.first() {
            Some(s) => s.data_type(),
            None => return true,
        },
        Variant::Array { elements: None, .. } => return true,
    };
    &actual == declared || collect_subtypes(nodestore, declared).contains(&actual)
}

/// Write one attribute (spec.md §4.8 "Write"). Only `Value` is writable in
/// this runtime; every other attribute is immutable once a node exists.
pub fn write_attribute(
    nodestore: &NodeStore,
    node_id: &NodeId,
    attribute_id: AttributeId,
    index_range: Option<&str>,
    data_value: DataValue,
) -> Result<(), AddressSpaceError> {
    if attribute_id != AttributeId::Value {
        return Err(AddressSpaceError::WriteNotSupported);
    }
    let node_ref = nodestore.get(node_id).ok_or(AddressSpaceError::UnknownNode)?;
    let mut node = node_ref.write().unwrap();
    let node_id = node.node_id.clone();
    let NodeBody::Variable { value, writable, data_type, .. } = &mut node.body else {
        return Err(AddressSpaceError::InvalidAttribute);
    };
    if !*writable {
        return Err(AddressSpaceError::WriteNotSupported);
    }
    if let Some(incoming) = &data_value.value {
        if !value_type_is_compatible(nodestore, data_type, incoming) {
            return Err(AddressSpaceError::TypeMismatch);
        }
    }

    match value {
        VariableValue::Cached(current) => {
            if index_range.is_some() {
                let existing = current.value.clone().unwrap_or(Variant::Null);
                let incoming = data_value.value.clone().unwrap_or(Variant::Null);
                current.value = Some(splice_index_range(existing, incoming, index_range.unwrap())?);
            } else {
                *current = data_value;
            }
            Ok(())
        }
        VariableValue::Source(source) => source.write(&node_id, index_range, data_value),
    }
}

fn splice_index_range(existing: Variant, incoming: Variant, range: &str) -> Result<Variant, AddressSpaceError> {
    let Variant::Array { elements: Some(mut elements), dimensions } = existing else {
        return Err(AddressSpaceError::InvalidIndexRange);
    };
    let Variant::Array { elements: Some(new_elements), .. } = incoming else {
        return Err(AddressSpaceError::InvalidIndexRange);
    };
    let (start, end) = parse_index_range(range, elements.len())?;
    if end - start != new_elements.len() {
        return Err(AddressSpaceError::InvalidIndexRange);
    }
    elements[start..end].clone_from_slice(&new_elements);
    Ok(Variant::Array { elements: Some(elements), dimensions })
}

/// `Good`-status convenience used by callers that want a status code rather
/// than a `Result` per-item (spec.md §4.8 "All writes are independent").
pub fn write_status(result: &Result<(), AddressSpaceError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::Good,
        Err(e) => StatusCode::from(e.clone()),
    }
}
