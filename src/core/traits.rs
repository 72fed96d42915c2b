//! Core capability traits shared across the address-space services.

use super::error::AddressSpaceError;
use crate::codec::DataValue;
use crate::core::NodeId;

/// An externally-provided value source attached to a Variable node.
///
/// Per the design notes (spec.md §9 "External value source"), the original
/// stores a function pointer plus a void handle per variable; here that
/// becomes an owned trait object held by the variable body. Dropping the
/// variable drops the source.
pub trait ValueSource: Send + Sync {
    /// Read the current value, optionally restricted to an index range.
    fn read(&self, node: &NodeId, index_range: Option<&str>) -> Result<DataValue, AddressSpaceError>;

    /// Write a new value, optionally restricted to an index range.
    ///
    /// The server performs no local caching when a value source is present:
    /// the callback is the sole owner of the value.
    fn write(
        &self,
        node: &NodeId,
        index_range: Option<&str>,
        value: DataValue,
    ) -> Result<(), AddressSpaceError>;
}

/// The implementation attached to a Method node (C8 "Call").
pub trait MethodHandler: Send + Sync {
    /// Invoke the method with the given input argument variants.
    ///
    /// Returns the output argument variants plus a per-input status code
    /// array (spec.md §4.8 "Call").
    fn invoke(
        &self,
        object: &NodeId,
        inputs: &[crate::codec::Variant],
    ) -> Result<(Vec<crate::codec::Variant>, Vec<crate::core::StatusCode>), AddressSpaceError>;
}
