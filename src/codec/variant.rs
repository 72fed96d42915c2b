//! `Variant`: the tagged union used for all attribute values (spec.md §4.1).
//!
//! The leading byte packs three fields: bits 0..5 are the built-in type id,
//! bit 6 flags an array payload, bit 7 flags that array dimensions follow.
//! An array's element count is written as `i32` (`-1` = null array).

use super::node_id::{read_expanded_node_id, read_node_id, write_expanded_node_id, write_node_id};
use super::primitives::{Reader, Writer};
use crate::core::{CodecError, ExpandedNodeId, Guid, NodeId, StatusCode};

const ARRAY_FLAG: u8 = 0x80;
const DIMENSIONS_FLAG: u8 = 0x40;
const TYPE_MASK: u8 = 0x3f;

/// One scalar value a `Variant` can hold.
///
/// Only the subset of built-in types this runtime's services actually
/// exchange is modeled; `ExtensionObject` and nested `Variant` are out of
/// scope (spec.md Non-goals).
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Type id 1.
    Boolean(bool),
    /// Type id 2.
    SByte(i8),
    /// Type id 3.
    Byte(u8),
    /// Type id 4.
    Int16(i16),
    /// Type id 5.
    UInt16(u16),
    /// Type id 6.
    Int32(i32),
    /// Type id 7.
    UInt32(u32),
    /// Type id 8.
    Int64(i64),
    /// Type id 9.
    UInt64(u64),
    /// Type id 10.
    Float(f32),
    /// Type id 11.
    Double(f64),
    /// Type id 12.
    String(Option<String>),
    /// Type id 13, 100-ns ticks since 1601-01-01 UTC.
    DateTime(i64),
    /// Type id 14.
    Guid(Guid),
    /// Type id 15.
    ByteString(Option<Vec<u8>>),
    /// Type id 17.
    NodeId(NodeId),
    /// Type id 18.
    ExpandedNodeId(ExpandedNodeId),
    /// Type id 19.
    StatusCode(StatusCode),
}

impl Scalar {
    /// The NodeId of this scalar's built-in data type (Part 6 "Built-in
    /// types" table; these ids coincide with the wire type tag).
    pub fn data_type(&self) -> NodeId {
        NodeId::ns0(self.type_id() as u32)
    }

    fn type_id(&self) -> u8 {
        match self {
            Scalar::Boolean(_) => 1,
            Scalar::SByte(_) => 2,
            Scalar::Byte(_) => 3,
            Scalar::Int16(_) => 4,
            Scalar::UInt16(_) => 5,
            Scalar::Int32(_) => 6,
            Scalar::UInt32(_) => 7,
            Scalar::Int64(_) => 8,
            Scalar::UInt64(_) => 9,
            Scalar::Float(_) => 10,
            Scalar::Double(_) => 11,
            Scalar::String(_) => 12,
            Scalar::DateTime(_) => 13,
            Scalar::Guid(_) => 14,
            Scalar::ByteString(_) => 15,
            Scalar::NodeId(_) => 17,
            Scalar::ExpandedNodeId(_) => 18,
            Scalar::StatusCode(_) => 19,
        }
    }

    fn write_body(&self, w: &mut Writer) -> Result<(), CodecError> {
        match self {
            Scalar::Boolean(v) => w.write_bool(*v),
            Scalar::SByte(v) => w.write_i8(*v),
            Scalar::Byte(v) => w.write_u8(*v),
            Scalar::Int16(v) => w.write_i16(*v),
            Scalar::UInt16(v) => w.write_u16(*v),
            Scalar::Int32(v) => w.write_i32(*v),
            Scalar::UInt32(v) => w.write_u32(*v),
            Scalar::Int64(v) => w.write_i64(*v),
            Scalar::UInt64(v) => w.write_u64(*v),
            Scalar::Float(v) => w.write_f32(*v),
            Scalar::Double(v) => w.write_f64(*v),
            Scalar::String(v) => w.write_string(v.as_deref()),
            Scalar::DateTime(v) => w.write_date_time(*v),
            Scalar::Guid(v) => w.write_guid(v),
            Scalar::ByteString(v) => w.write_byte_string(v.as_deref()),
            Scalar::NodeId(v) => write_node_id(w, v),
            Scalar::ExpandedNodeId(v) => write_expanded_node_id(w, v),
            Scalar::StatusCode(v) => w.write_u32(v.as_wire_code()),
        }
    }

    fn read_body(type_id: u8, r: &mut Reader) -> Result<Self, CodecError> {
        Ok(match type_id {
            1 => Scalar::Boolean(r.read_bool()?),
            2 => Scalar::SByte(r.read_i8()?),
            3 => Scalar::Byte(r.read_u8()?),
            4 => Scalar::Int16(r.read_i16()?),
            5 => Scalar::UInt16(r.read_u16()?),
            6 => Scalar::Int32(r.read_i32()?),
            7 => Scalar::UInt32(r.read_u32()?),
            8 => Scalar::Int64(r.read_i64()?),
            9 => Scalar::UInt64(r.read_u64()?),
            10 => Scalar::Float(r.read_f32()?),
            11 => Scalar::Double(r.read_f64()?),
            12 => Scalar::String(r.read_string()?),
            13 => Scalar::DateTime(r.read_date_time()?),
            14 => Scalar::Guid(r.read_guid()?),
            15 => Scalar::ByteString(r.read_byte_string()?),
            17 => Scalar::NodeId(read_node_id(r)?),
            18 => Scalar::ExpandedNodeId(read_expanded_node_id(r)?),
            19 => Scalar::StatusCode(StatusCode::from_wire_code(r.read_u32()?)),
            other => return Err(CodecError::UnknownTag(other)),
        })
    }
}

/// The body of a `Variant`: either a single scalar or an array of scalars of
/// the same type id, with optional multi-dimensional extents.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// No value present.
    Null,
    /// A single scalar value.
    Scalar(Scalar),
    /// An array of scalars, all sharing one type id, with optional
    /// dimensions (row-major, product must equal the element count).
    Array {
        /// Element values, `None` for a null array.
        elements: Option<Vec<Scalar>>,
        /// Array dimensions, when the array is declared multi-dimensional.
        dimensions: Option<Vec<i32>>,
    },
}

impl Variant {
    /// Encode this Variant.
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        match self {
            Variant::Null => w.write_u8(0),
            Variant::Scalar(s) => {
                w.write_u8(s.type_id())?;
                s.write_body(w)
            }
            Variant::Array { elements, dimensions } => {
                let type_id = elements
                    .as_ref()
                    .and_then(|e| e.first())
                    .map(|s| s.type_id())
                    .unwrap_or(0);
                let mut tag = type_id | ARRAY_FLAG;
                if dimensions.is_some() {
                    tag |= DIMENSIONS_FLAG;
                }
                w.write_u8(tag)?;
                match elements {
                    None => w.write_i32(-1)?,
                    Some(items) => {
                        w.write_i32(items.len() as i32)?;
                        for item in items {
                            item.write_body(w)?;
                        }
                    }
                }
                if let Some(dims) = dimensions {
                    let count: i64 = dims.iter().map(|d| *d as i64).product();
                    let actual = elements.as_ref().map(|e| e.len()).unwrap_or(0) as i64;
                    if count != actual {
                        return Err(CodecError::DimensionMismatch {
                            dims: dims.clone(),
                            count: actual as usize,
                        });
                    }
                    w.write_i32(dims.len() as i32)?;
                    for d in dims {
                        w.write_i32(*d)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Decode a Variant.
    pub fn decode(r: &mut Reader) -> Result<Self, CodecError> {
        let tag = r.read_u8()?;
        if tag == 0 {
            return Ok(Variant::Null);
        }
        let type_id = tag & TYPE_MASK;
        let is_array = tag & ARRAY_FLAG != 0;
        let has_dims = tag & DIMENSIONS_FLAG != 0;

        if !is_array {
            return Ok(Variant::Scalar(Scalar::read_body(type_id, r)?));
        }

        let len = r.read_i32()?;
        let elements = match len {
            -1 => None,
            n if n < -1 => return Err(CodecError::InvalidLength(n)),
            n => {
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(Scalar::read_body(type_id, r)?);
                }
                Some(items)
            }
        };

        let dimensions = if has_dims {
            let dim_count = r.read_i32()?;
            if dim_count < 0 {
                return Err(CodecError::InvalidLength(dim_count));
            }
            let mut dims = Vec::with_capacity(dim_count as usize);
            for _ in 0..dim_count {
                dims.push(r.read_i32()?);
            }
            let product: i64 = dims.iter().map(|d| *d as i64).product();
            let actual = elements.as_ref().map(|e| e.len()).unwrap_or(0) as i64;
            if product != actual {
                return Err(CodecError::DimensionMismatch {
                    dims,
                    count: actual as usize,
                });
            }
            Some(dims)
        } else {
            None
        };

        Ok(Variant::Array { elements, dimensions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Variant) {
        let mut w = Writer::new();
        v.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(Variant::decode(&mut r).unwrap(), v);
        r.finish().unwrap();
    }

    #[test]
    fn null_variant_is_one_byte() {
        let mut w = Writer::new();
        Variant::Null.encode(&mut w).unwrap();
        assert_eq!(w.into_bytes(), vec![0]);
    }

    #[test]
    fn data_type_matches_wire_type_id() {
        assert_eq!(Scalar::Double(1.0).data_type(), NodeId::ns0(11));
        assert_eq!(Scalar::String(None).data_type(), NodeId::ns0(12));
    }

    #[test]
    fn scalar_roundtrip() {
        roundtrip(Variant::Scalar(Scalar::Int32(-7)));
        roundtrip(Variant::Scalar(Scalar::String(Some("x".into()))));
        roundtrip(Variant::Scalar(Scalar::NodeId(NodeId::ns0(1))));
    }

    #[test]
    fn array_roundtrip() {
        roundtrip(Variant::Array {
            elements: Some(vec![Scalar::Int32(1), Scalar::Int32(2), Scalar::Int32(3)]),
            dimensions: None,
        });
    }

    #[test]
    fn null_array_roundtrip() {
        roundtrip(Variant::Array {
            elements: None,
            dimensions: None,
        });
    }

    #[test]
    fn dimension_mismatch_rejected_on_encode() {
        let v = Variant::Array {
            elements: Some(vec![Scalar::Int32(1), Scalar::Int32(2)]),
            dimensions: Some(vec![3]),
        };
        let mut w = Writer::new();
        assert!(matches!(v.encode(&mut w), Err(CodecError::DimensionMismatch { .. })));
    }

    #[test]
    fn multidim_array_roundtrip() {
        roundtrip(Variant::Array {
            elements: Some(vec![Scalar::Byte(1), Scalar::Byte(2), Scalar::Byte(3), Scalar::Byte(4)]),
            dimensions: Some(vec![2, 2]),
        });
    }
}
