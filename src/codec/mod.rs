//! The wire codec (C1, spec.md §4.1): encoding for built-in scalars, NodeId
//! variants, `Variant`, `DataValue`, and the structured request/response
//! types the address-space and session services exchange.

mod data_value;
mod node_id;
mod primitives;
mod schema;
mod variant;

pub use data_value::DataValue;
pub use node_id::{read_expanded_node_id, read_node_id, write_expanded_node_id, write_node_id};
pub use primitives::{Reader, Writer};
pub use schema::{FieldDescriptor, FieldType, ReadValueId, RelativePathElement, StructLayout, READ_VALUE_ID_LAYOUT};
pub use variant::{Scalar, Variant};
