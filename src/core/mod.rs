//! Core types shared by every layer: status codes, NodeId, and the
//! capability traits used to extend the address space. Always included
//! regardless of feature flags.

mod constants;
mod error;
mod node_id;
pub(crate) mod traits;

pub use constants::*;
pub use error::*;
pub use node_id::*;
pub use traits::*;
