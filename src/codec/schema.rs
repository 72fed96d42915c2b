//! Structured-type layout metadata (spec.md §4.1 "schema table").
//!
//! Structured request/response types (`ReadValueId`, `BrowseDescription`,
//! ...) encode/decode via hand-written, non-generic methods — table-driven
//! in the sense that each method walks a fixed member list in declaration
//! order, never via runtime code generation. [`StructLayout`] captures that
//! member list as data, for introspection and for the `is_in_namespace_zero`
//! bookkeeping the address space needs when exposing a type's own
//! DataTypeEncoding entry (spec.md §4.8 "instantiate").

use super::primitives::{Reader, Writer};
use crate::core::{CodecError, NodeId};

/// A member's declared wire type, used only for documentation/introspection
/// (the actual encode/decode logic lives on the owning struct).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Fixed-width scalar, sized in bytes.
    Fixed(usize),
    /// Length-prefixed string or byte string.
    LengthPrefixed,
    /// A nested structured type, identified by name.
    Nested(&'static str),
    /// A NodeId in any of its wire forms.
    NodeId,
    /// A Variant.
    Variant,
}

/// One member of a structured type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Member name as declared in the OPC UA type dictionary.
    pub name: &'static str,
    /// The member's wire type.
    pub field_type: FieldType,
    /// Byte alignment padding inserted before this member in the in-memory
    /// representation (spec.md §4.1); the wire form has no padding.
    pub padding_hint: usize,
    /// True when this member is itself an array.
    pub is_array: bool,
    /// True when this member is conditionally present (reserved for types
    /// with an optional-fields bitmap, mirroring `DataValue`'s).
    pub is_optional: bool,
    /// True when the member's declared type lives in namespace 0.
    pub is_in_namespace_zero: bool,
}

/// The schema-table description of one structured type (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// The type's name.
    pub name: &'static str,
    /// Size in bytes of the Rust in-memory representation, for diagnostics.
    pub memory_size: usize,
    /// Member descriptors in encode order.
    pub members: &'static [FieldDescriptor],
}

/// A NodeId plus an index range and the requested attribute, the unit of
/// work in a `Read` service call (spec.md §4.8 "Read").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadValueId {
    /// The node to read.
    pub node_id: NodeId,
    /// The attribute id to read.
    pub attribute_id: u32,
    /// An optional index range string (e.g. `"1:4"`).
    pub index_range: Option<String>,
}

/// The schema-table description of [`ReadValueId`], demonstrating the
/// table-driven shape the wire codec uses for structured types.
pub const READ_VALUE_ID_LAYOUT: StructLayout = StructLayout {
    name: "ReadValueId",
    memory_size: std::mem::size_of::<ReadValueId>(),
    members: &[
        FieldDescriptor {
            name: "NodeId",
            field_type: FieldType::NodeId,
            padding_hint: 0,
            is_array: false,
            is_optional: false,
            is_in_namespace_zero: true,
        },
        FieldDescriptor {
            name: "AttributeId",
            field_type: FieldType::Fixed(4),
            padding_hint: 0,
            is_array: false,
            is_optional: false,
            is_in_namespace_zero: true,
        },
        FieldDescriptor {
            name: "IndexRange",
            field_type: FieldType::LengthPrefixed,
            padding_hint: 0,
            is_array: false,
            is_optional: false,
            is_in_namespace_zero: true,
        },
    ],
};

impl ReadValueId {
    /// Encode in the member order declared by [`READ_VALUE_ID_LAYOUT`].
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        super::node_id::write_node_id(w, &self.node_id)?;
        w.write_u32(self.attribute_id)?;
        w.write_string(self.index_range.as_deref())
    }

    /// Decode in the member order declared by [`READ_VALUE_ID_LAYOUT`].
    pub fn decode(r: &mut Reader) -> Result<Self, CodecError> {
        Ok(Self {
            node_id: super::node_id::read_node_id(r)?,
            attribute_id: r.read_u32()?,
            index_range: r.read_string()?,
        })
    }
}

/// One step of a relative browse path: a reference type plus target browse
/// name (spec.md §4.8 "TranslateBrowsePathsToNodeIds").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePathElement {
    /// The reference type to follow.
    pub reference_type_id: NodeId,
    /// Whether subtypes of `reference_type_id` are included.
    pub include_subtypes: bool,
    /// Whether the reference is followed as inverse (toward the source).
    pub is_inverse: bool,
    /// The target's browse name namespace index.
    pub target_namespace: u16,
    /// The target's browse name.
    pub target_name: String,
}

impl RelativePathElement {
    /// Encode this path element.
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        super::node_id::write_node_id(w, &self.reference_type_id)?;
        w.write_bool(self.include_subtypes)?;
        w.write_bool(self.is_inverse)?;
        w.write_u16(self.target_namespace)?;
        w.write_string(Some(&self.target_name))
    }

    /// Decode a path element.
    pub fn decode(r: &mut Reader) -> Result<Self, CodecError> {
        Ok(Self {
            reference_type_id: super::node_id::read_node_id(r)?,
            include_subtypes: r.read_bool()?,
            is_inverse: r.read_bool()?,
            target_namespace: r.read_u16()?,
            target_name: r.read_string()?.ok_or(CodecError::InvalidLength(-1))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_value_id_roundtrip() {
        let rv = ReadValueId {
            node_id: NodeId::ns0(2258),
            attribute_id: 13,
            index_range: None,
        };
        let mut w = Writer::new();
        rv.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(ReadValueId::decode(&mut r).unwrap(), rv);
        r.finish().unwrap();
    }

    #[test]
    fn layout_member_count_matches_encode_order() {
        assert_eq!(READ_VALUE_ID_LAYOUT.members.len(), 3);
        assert_eq!(READ_VALUE_ID_LAYOUT.members[0].name, "NodeId");
        assert_eq!(READ_VALUE_ID_LAYOUT.members[2].name, "IndexRange");
    }

    #[test]
    fn relative_path_element_roundtrip() {
        let el = RelativePathElement {
            reference_type_id: NodeId::ns0(47),
            include_subtypes: true,
            is_inverse: false,
            target_namespace: 2,
            target_name: "Temperature".to_string(),
        };
        let mut w = Writer::new();
        el.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(RelativePathElement::decode(&mut r).unwrap(), el);
    }
}
