//! Namespace-0 NodeIds the address-space services reason about directly.
//!
//! These are the standard OPC UA numeric identifiers (Part 6 "NodeIds
//! associated with the Base Information Model"); the runtime does not parse
//! a nodeset XML file (spec.md Non-goals "XML nodeset importer"), so the
//! small subset the services themselves need is hard-coded here instead.

use crate::core::NodeId;

/// The root reference type: everything is a `References` or subtype of it.
pub fn references() -> NodeId {
    NodeId::ns0(31)
}

/// `HasSubtype`, used to walk reference/object/variable type hierarchies.
pub fn has_subtype() -> NodeId {
    NodeId::ns0(45)
}

/// `HasTypeDefinition`, linking an instance to its type node.
pub fn has_type_definition() -> NodeId {
    NodeId::ns0(40)
}

/// `HasComponent`, the reference type Call's object/method check uses.
pub fn has_component() -> NodeId {
    NodeId::ns0(47)
}

/// `HasProperty`, used to locate `InputArguments`/`OutputArguments`.
pub fn has_property() -> NodeId {
    NodeId::ns0(46)
}

/// `Organizes`, the typical folder-to-child reference.
pub fn organizes() -> NodeId {
    NodeId::ns0(35)
}

/// Root of the object-type hierarchy; instantiation masking stops here.
pub fn base_object_type() -> NodeId {
    NodeId::ns0(58)
}

/// Root of the variable-type hierarchy; instantiation masking stops here.
pub fn base_variable_type() -> NodeId {
    NodeId::ns0(62)
}
