//! The `Node` type: a common header plus a node-class-specific body
//! (spec.md §9 "tagged-variant Node instead of casting between aligned
//! structs").

use std::sync::Arc;

use super::reference::Reference;
use crate::codec::DataValue;
use crate::core::traits::{MethodHandler, ValueSource};
use crate::core::NodeId;

/// The seven node classes OPC UA defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    /// An instance carrying structure and references.
    Object,
    /// An instance carrying a sampled value.
    Variable,
    /// An invokable operation.
    Method,
    /// A template for Object instances.
    ObjectType,
    /// A template for Variable instances.
    VariableType,
    /// A reference's own metadata node.
    ReferenceType,
    /// A scalar or structured data type's metadata node.
    DataType,
    /// A named subset of the address space.
    View,
}

/// A Variable node's sampled value: either a constant cached in the node or
/// delegated to an external [`ValueSource`] (spec.md §9 "External value
/// source").
pub enum VariableValue {
    /// A value the server caches and serves directly.
    Cached(DataValue),
    /// A value backed by caller-supplied logic.
    Source(Box<dyn ValueSource>),
}

/// Body fields specific to one node class.
pub enum NodeBody {
    /// Object-class body: no extra fields beyond the common header.
    Object,
    /// Variable-class body.
    Variable {
        /// Current value.
        value: VariableValue,
        /// The NodeId of this variable's DataType node.
        data_type: NodeId,
        /// -1 scalar, 0 any-dimension array, N fixed-rank array.
        value_rank: i32,
        /// Per-dimension array bound, empty when `value_rank` < 1.
        array_dimensions: Vec<u32>,
        /// Whether writes are accepted.
        writable: bool,
    },
    /// Method-class body.
    Method {
        /// Invocation logic, absent for a method with no registered
        /// implementation (calls fail with `BadNotFound`).
        handler: Option<Box<dyn MethodHandler>>,
    },
    /// ObjectType-class body.
    ObjectType {
        /// Whether this type can be instantiated directly.
        is_abstract: bool,
    },
    /// VariableType-class body.
    VariableType {
        /// Default value for instances of this type.
        default_value: Option<DataValue>,
        /// Whether this type can be instantiated directly.
        is_abstract: bool,
    },
    /// ReferenceType-class body.
    ReferenceType {
        /// Whether this reference type is symmetric (forward == inverse).
        symmetric: bool,
    },
    /// DataType-class body.
    DataType {
        /// Whether this data type can be used directly (vs. only subtyped).
        is_abstract: bool,
    },
    /// View-class body.
    View {
        /// Whether the view contains no-delete nodes only.
        contains_no_loops: bool,
    },
}

impl NodeBody {
    /// The node class this body belongs to.
    pub fn node_class(&self) -> NodeClass {
        match self {
            NodeBody::Object => NodeClass::Object,
            NodeBody::Variable { .. } => NodeClass::Variable,
            NodeBody::Method { .. } => NodeClass::Method,
            NodeBody::ObjectType { .. } => NodeClass::ObjectType,
            NodeBody::VariableType { .. } => NodeClass::VariableType,
            NodeBody::ReferenceType { .. } => NodeClass::ReferenceType,
            NodeBody::DataType { .. } => NodeClass::DataType,
            NodeBody::View { .. } => NodeClass::View,
        }
    }
}

/// A node in the address space: identity, naming attributes common to every
/// class, references to other nodes, and a class-specific body.
pub struct Node {
    /// This node's identity.
    pub node_id: NodeId,
    /// Non-localized name used in browsing.
    pub browse_name: (u16, String),
    /// Human-readable display name.
    pub display_name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Outgoing and incoming reference edges.
    pub references: Vec<Reference>,
    /// The class-specific body.
    pub body: NodeBody,
}

impl Node {
    /// This node's class.
    pub fn node_class(&self) -> NodeClass {
        self.body.node_class()
    }

    /// Build a minimal Object node.
    pub fn object(node_id: NodeId, browse_name: (u16, String), display_name: impl Into<String>) -> Self {
        Self {
            node_id,
            browse_name,
            display_name: display_name.into(),
            description: None,
            references: Vec::new(),
            body: NodeBody::Object,
        }
    }
}

/// A shared, reference-counted handle to a node, the "borrowed ref" the
/// nodestore hands back from `get` (spec.md §4.7).
///
/// The underlying node stays alive for as long as any `NodeRef` to it
/// exists, even after `remove` has tombstoned it in the table — this is the
/// crate's stand-in for the original's epoch-deferred reclamation, reached
/// for instead of raw atomics because the crate forbids `unsafe` (spec.md §9
/// "RCU-style nodestore with borrow tokens").
pub type NodeRef = Arc<std::sync::RwLock<Node>>;
