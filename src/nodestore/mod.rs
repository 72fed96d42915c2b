//! The node store (C7, spec.md §4.7): a concurrent NodeId → Node map plus
//! the reference edges and node bodies it holds.

mod node;
mod reference;
mod store;

pub use node::{Node, NodeBody, NodeClass, NodeRef, VariableValue};
pub use reference::Reference;
pub use store::{InsertOptions, NodeStore};
