//! NodeId and ExpandedNodeId (spec.md §3 "NodeId").

use std::fmt;

/// A GUID payload for the GUID NodeId variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(pub u32, pub u16, pub u16, pub [u8; 8]);

/// The identifier carried by a NodeId, one of four variants (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Numeric (u32) identifier — the most common form, used throughout
    /// namespace 0.
    Numeric(u32),
    /// Text identifier, unique within the namespace.
    String(String),
    /// 128-bit GUID identifier.
    Guid(Guid),
    /// Opaque byte-string identifier.
    Opaque(Vec<u8>),
}

/// Identifier for a node in the server address space (spec.md §3).
///
/// Two NodeIds are equal iff the namespace indices match and the same
/// variant carries an equal payload; `Hash`/`Eq` are derived so a NodeId can
/// key the nodestore directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// 16-bit namespace index.
    pub namespace: u16,
    /// The identifier payload.
    pub identifier: Identifier,
}

impl NodeId {
    /// Build a numeric NodeId in the given namespace.
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Build a numeric NodeId in namespace 0 (the OPC-UA-defined base nodes).
    pub fn ns0(value: u32) -> Self {
        Self::numeric(0, value)
    }

    /// Build a string NodeId.
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Build a GUID NodeId.
    pub fn guid(namespace: u16, guid: Guid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(guid),
        }
    }

    /// Build an opaque byte-string NodeId.
    pub fn opaque(namespace: u16, value: Vec<u8>) -> Self {
        Self {
            namespace,
            identifier: Identifier::Opaque(value),
        }
    }

    /// The null NodeId (`ns=0;i=0`), used as a sentinel.
    pub fn null() -> Self {
        Self::ns0(0)
    }

    /// True for the null NodeId.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && matches!(self.identifier, Identifier::Numeric(0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "ns={};i={}", self.namespace, v),
            Identifier::String(v) => write!(f, "ns={};s={}", self.namespace, v),
            Identifier::Guid(g) => write!(
                f,
                "ns={};g={:08x}-{:04x}-{:04x}-{}",
                self.namespace,
                g.0,
                g.1,
                g.2,
                g.3.iter().map(|b| format!("{:02x}", b)).collect::<String>()
            ),
            Identifier::Opaque(v) => write!(f, "ns={};b={}", self.namespace, hex_encode(v)),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A NodeId that may additionally carry a namespace URI and/or server index
/// for cross-server targets (spec.md §3 "Node").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedNodeId {
    /// The local (or remote) NodeId.
    pub node_id: NodeId,
    /// Namespace URI, present when the target is not in this server's table.
    pub namespace_uri: Option<String>,
    /// Server index, present for cross-server targets (0 = this server).
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Wrap a local NodeId with no namespace URI and server index 0.
    pub fn local(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }

    /// True when this target lives on this server (server index 0 and no URI).
    pub fn is_local(&self) -> bool {
        self.server_index == 0 && self.namespace_uri.is_none()
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        ExpandedNodeId::local(node_id)
    }
}
