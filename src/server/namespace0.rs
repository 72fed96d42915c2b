//! Namespace-0 bootstrap: the small set of standard Server-object nodes
//! whose reads must reflect live runtime state (SPEC_FULL.md §B
//! "ServerStatus/NamespaceArray/ServiceLevel live nodes").
//!
//! The real OPC UA `ServerStatus` is a structured (`ExtensionObject`-typed)
//! value, and this runtime's [`crate::codec::Variant`] has no
//! `ExtensionObject`/nested-structure variant (spec.md Non-goals, see
//! `codec::variant`). Rather than grow the wire format to carry one
//! four-field node for this alone, the status is decomposed into separate
//! scalar/array-typed Variable nodes, each backed by a
//! [`ValueSource`](crate::core::traits::ValueSource) — the same mechanism
//! any externally-driven Variable uses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{DataValue, Scalar, Variant};
use crate::core::traits::ValueSource;
use crate::core::{AddressSpaceError, NodeId};
use crate::nodestore::{InsertOptions, Node, NodeBody, NodeStore, VariableValue};

/// Well-known standard NodeIds for the nodes this module creates (Part 6
/// "Server object" / "ServerStatus" identifiers).
pub mod ids {
    use crate::core::NodeId;

    /// The `Server` object itself.
    pub fn server_object() -> NodeId {
        NodeId::ns0(2253)
    }
    /// `Server_ServerStatus_State`, a coarse textual summary (this runtime's
    /// stand-in for the structured `ServerStatus.State` enum field).
    pub fn server_status_state() -> NodeId {
        NodeId::ns0(2259)
    }
    /// `Server_ServerStatus_CurrentTime`.
    pub fn server_status_current_time() -> NodeId {
        NodeId::ns0(2258)
    }
    /// `Server_ServerStatus_StartTime`.
    pub fn server_status_start_time() -> NodeId {
        NodeId::ns0(2257)
    }
    /// `Server_ServiceLevel`.
    pub fn service_level() -> NodeId {
        NodeId::ns0(2267)
    }
    /// `Server_NamespaceArray`.
    pub fn namespace_array() -> NodeId {
        NodeId::ns0(2255)
    }
}

/// 100-ns ticks between the Unix epoch and the OPC UA epoch
/// (1601-01-01 UTC).
const UNIX_TO_OPCUA_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

fn now_as_opcua_datetime() -> i64 {
    let unix_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64;
    UNIX_TO_OPCUA_EPOCH_TICKS + unix_nanos / 100
}

/// Backs `Server_ServerStatus_CurrentTime`: recomputed on every read.
struct CurrentTimeSource;

impl ValueSource for CurrentTimeSource {
    fn read(&self, _node: &NodeId, _index_range: Option<&str>) -> Result<DataValue, AddressSpaceError> {
        Ok(DataValue::of(Variant::Scalar(Scalar::DateTime(now_as_opcua_datetime()))))
    }

    fn write(&self, _node: &NodeId, _index_range: Option<&str>, _value: DataValue) -> Result<(), AddressSpaceError> {
        Err(AddressSpaceError::WriteNotSupported)
    }
}

/// Backs `Server_ServerStatus_State`: a textual summary toggled by
/// [`ServerRuntimeStatus::set_state`] and read back as a `String`.
struct RunStateSource {
    state: std::sync::Arc<std::sync::RwLock<String>>,
}

impl ValueSource for RunStateSource {
    fn read(&self, _node: &NodeId, _index_range: Option<&str>) -> Result<DataValue, AddressSpaceError> {
        let state = self.state.read().unwrap().clone();
        Ok(DataValue::of(Variant::Scalar(Scalar::String(Some(state)))))
    }

    fn write(&self, _node: &NodeId, _index_range: Option<&str>, _value: DataValue) -> Result<(), AddressSpaceError> {
        Err(AddressSpaceError::WriteNotSupported)
    }
}

/// Backs `Server_ServiceLevel`: a byte 0-255 tracking how well the server
/// can currently serve clients, driven by [`ServerRuntimeStatus`].
struct ServiceLevelSource {
    level: std::sync::Arc<AtomicU64>,
}

impl ValueSource for ServiceLevelSource {
    fn read(&self, _node: &NodeId, _index_range: Option<&str>) -> Result<DataValue, AddressSpaceError> {
        Ok(DataValue::of(Variant::Scalar(Scalar::Byte(self.level.load(Ordering::Relaxed) as u8))))
    }

    fn write(&self, _node: &NodeId, _index_range: Option<&str>, _value: DataValue) -> Result<(), AddressSpaceError> {
        Err(AddressSpaceError::WriteNotSupported)
    }
}

/// The live counters/flags namespace-0 status nodes read from; owned by the
/// [`crate::server::Server`] and updated as the server runs.
pub struct ServerRuntimeStatus {
    state: std::sync::Arc<std::sync::RwLock<String>>,
    service_level: std::sync::Arc<AtomicU64>,
}

impl ServerRuntimeStatus {
    fn new() -> Self {
        Self {
            state: std::sync::Arc::new(std::sync::RwLock::new("Running".to_string())),
            service_level: std::sync::Arc::new(AtomicU64::new(255)),
        }
    }

    /// Update the textual run state (e.g. "Running", "Suspended").
    pub fn set_state(&self, state: impl Into<String>) {
        *self.state.write().unwrap() = state.into();
    }

    /// Update the service level byte.
    pub fn set_service_level(&self, level: u8) {
        self.service_level.store(level as u64, Ordering::Relaxed);
    }
}

impl Default for ServerRuntimeStatus {
    fn default() -> Self {
        Self::new()
    }
}

fn variable_node(
    node_id: NodeId,
    browse_name: &str,
    data_type: NodeId,
    value: VariableValue,
    value_rank: i32,
) -> Node {
    Node {
        node_id,
        browse_name: (0, browse_name.to_string()),
        display_name: browse_name.to_string(),
        description: None,
        references: Vec::new(),
        body: NodeBody::Variable {
            value,
            data_type,
            value_rank,
            array_dimensions: Vec::new(),
            writable: false,
        },
    }
}

/// Populate the minimal namespace-0 `Server` object and its live status
/// variables. `namespace_uris` is the full namespace table (index 0 is
/// always `http://opcfoundation.org/UA/`) backing `NamespaceArray`.
pub fn bootstrap(nodestore: &NodeStore, namespace_uris: Vec<String>) -> Result<ServerRuntimeStatus, AddressSpaceError> {
    let runtime_status = ServerRuntimeStatus::new();

    nodestore.insert(
        Node::object(ids::server_object(), (0, "Server".into()), "Server"),
        InsertOptions { unique: true },
    )?;

    nodestore.insert(
        variable_node(
            ids::server_status_state(),
            "State",
            NodeId::ns0(12), // String
            VariableValue::Source(Box::new(RunStateSource {
                state: runtime_status.state.clone(),
            })),
            -1,
        ),
        InsertOptions { unique: true },
    )?;

    nodestore.insert(
        variable_node(
            ids::server_status_current_time(),
            "CurrentTime",
            NodeId::ns0(13), // DateTime
            VariableValue::Source(Box::new(CurrentTimeSource)),
            -1,
        ),
        InsertOptions { unique: true },
    )?;

    nodestore.insert(
        variable_node(
            ids::server_status_start_time(),
            "StartTime",
            NodeId::ns0(13),
            VariableValue::Cached(DataValue::of(Variant::Scalar(Scalar::DateTime(now_as_opcua_datetime())))),
            -1,
        ),
        InsertOptions { unique: true },
    )?;

    nodestore.insert(
        variable_node(
            ids::service_level(),
            "ServiceLevel",
            NodeId::ns0(3), // Byte
            VariableValue::Source(Box::new(ServiceLevelSource {
                level: runtime_status.service_level.clone(),
            })),
            -1,
        ),
        InsertOptions { unique: true },
    )?;

    nodestore.insert(
        variable_node(
            ids::namespace_array(),
            "NamespaceArray",
            NodeId::ns0(12), // String
            VariableValue::Cached(DataValue::of(Variant::Array {
                elements: Some(namespace_uris.into_iter().map(|u| Scalar::String(Some(u))).collect()),
                dimensions: None,
            })),
            1,
        ),
        InsertOptions { unique: true },
    )?;

    Ok(runtime_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{read_attribute, AttributeId};

    #[test]
    fn bootstrap_populates_live_nodes() {
        let store = NodeStore::new();
        let status = bootstrap(&store, vec!["http://opcfoundation.org/UA/".to_string()]).unwrap();

        let dv = read_attribute(&store, &ids::service_level(), AttributeId::Value, None).unwrap();
        assert_eq!(dv.value, Some(Variant::Scalar(Scalar::Byte(255))));

        status.set_service_level(100);
        let dv = read_attribute(&store, &ids::service_level(), AttributeId::Value, None).unwrap();
        assert_eq!(dv.value, Some(Variant::Scalar(Scalar::Byte(100))));
    }

    #[test]
    fn current_time_advances_between_reads() {
        let store = NodeStore::new();
        bootstrap(&store, vec!["http://opcfoundation.org/UA/".to_string()]).unwrap();
        let first = read_attribute(&store, &ids::server_status_current_time(), AttributeId::Value, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = read_attribute(&store, &ids::server_status_current_time(), AttributeId::Value, None).unwrap();
        assert_ne!(first.value, second.value);
    }

    #[test]
    fn namespace_array_contains_the_standard_namespace() {
        let store = NodeStore::new();
        bootstrap(&store, vec!["http://opcfoundation.org/UA/".to_string(), "urn:example".to_string()]).unwrap();
        let dv = read_attribute(&store, &ids::namespace_array(), AttributeId::Value, None).unwrap();
        match dv.value {
            Some(Variant::Array { elements: Some(els), .. }) => assert_eq!(els.len(), 2),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn state_reflects_updates() {
        let store = NodeStore::new();
        let status = bootstrap(&store, vec!["http://opcfoundation.org/UA/".to_string()]).unwrap();
        status.set_state("Suspended");
        let dv = read_attribute(&store, &ids::server_status_state(), AttributeId::Value, None).unwrap();
        assert_eq!(dv.value, Some(Variant::Scalar(Scalar::String(Some("Suspended".into())))));
    }
}
