//! NodeId / ExpandedNodeId wire encoding (spec.md §4.1).
//!
//! The encoding-type byte picks the smallest sufficient form: `0x00` two-byte
//! (namespace 0, u8 value), `0x01` four-byte (u8 namespace, u16 value),
//! `0x02` numeric (u16 namespace, u32 value), `0x03` string, `0x04` GUID,
//! `0x05` opaque byte-string. `ExpandedNodeId` ORs in `0x80` (namespace URI
//! follows) and `0x40` (server index follows) on top of the NodeId encoding.

use super::primitives::{Reader, Writer};
use crate::core::{CodecError, ExpandedNodeId, Guid, Identifier, NodeId};

const TWO_BYTE: u8 = 0x00;
const FOUR_BYTE: u8 = 0x01;
const NUMERIC: u8 = 0x02;
const STRING: u8 = 0x03;
const GUID: u8 = 0x04;
const OPAQUE: u8 = 0x05;

const NAMESPACE_URI_FLAG: u8 = 0x80;
const SERVER_INDEX_FLAG: u8 = 0x40;
const ENCODING_MASK: u8 = 0x3f;

/// Encode a NodeId, choosing the smallest sufficient wire form.
pub fn write_node_id(w: &mut Writer, id: &NodeId) -> Result<(), CodecError> {
    match &id.identifier {
        Identifier::Numeric(v) if id.namespace == 0 && *v <= u8::MAX as u32 => {
            w.write_u8(TWO_BYTE)?;
            w.write_u8(*v as u8)
        }
        Identifier::Numeric(v) if id.namespace <= u8::MAX as u16 && *v <= u16::MAX as u32 => {
            w.write_u8(FOUR_BYTE)?;
            w.write_u8(id.namespace as u8)?;
            w.write_u16(*v as u16)
        }
        Identifier::Numeric(v) => {
            w.write_u8(NUMERIC)?;
            w.write_u16(id.namespace)?;
            w.write_u32(*v)
        }
        Identifier::String(s) => {
            w.write_u8(STRING)?;
            w.write_u16(id.namespace)?;
            w.write_string(Some(s))
        }
        Identifier::Guid(g) => {
            w.write_u8(GUID)?;
            w.write_u16(id.namespace)?;
            w.write_guid(g)
        }
        Identifier::Opaque(b) => {
            w.write_u8(OPAQUE)?;
            w.write_u16(id.namespace)?;
            w.write_byte_string(Some(b))
        }
    }
}

/// Decode a NodeId.
pub fn read_node_id(r: &mut Reader) -> Result<NodeId, CodecError> {
    let tag = r.read_u8()?;
    match tag & ENCODING_MASK {
        TWO_BYTE => Ok(NodeId::numeric(0, r.read_u8()? as u32)),
        FOUR_BYTE => {
            let ns = r.read_u8()? as u16;
            let v = r.read_u16()? as u32;
            Ok(NodeId::numeric(ns, v))
        }
        NUMERIC => {
            let ns = r.read_u16()?;
            let v = r.read_u32()?;
            Ok(NodeId::numeric(ns, v))
        }
        STRING => {
            let ns = r.read_u16()?;
            let s = r.read_string()?.ok_or(CodecError::InvalidLength(-1))?;
            Ok(NodeId::string(ns, s))
        }
        GUID => {
            let ns = r.read_u16()?;
            let g: Guid = r.read_guid()?;
            Ok(NodeId::guid(ns, g))
        }
        OPAQUE => {
            let ns = r.read_u16()?;
            let b = r.read_byte_string()?.ok_or(CodecError::InvalidLength(-1))?;
            Ok(NodeId::opaque(ns, b))
        }
        other => Err(CodecError::UnknownTag(other)),
    }
}

/// Encode an ExpandedNodeId, ORing the namespace-URI / server-index flags
/// into the inner NodeId's encoding-type byte.
pub fn write_expanded_node_id(w: &mut Writer, id: &ExpandedNodeId) -> Result<(), CodecError> {
    let mut inner = Writer::new();
    write_node_id(&mut inner, &id.node_id)?;
    let mut bytes = inner.into_bytes();
    if id.namespace_uri.is_some() {
        bytes[0] |= NAMESPACE_URI_FLAG;
    }
    if id.server_index != 0 {
        bytes[0] |= SERVER_INDEX_FLAG;
    }
    w.write_bytes(&bytes)?;
    if let Some(uri) = &id.namespace_uri {
        w.write_string(Some(uri))?;
    }
    if id.server_index != 0 {
        w.write_u32(id.server_index)?;
    }
    Ok(())
}

/// Decode an ExpandedNodeId.
pub fn read_expanded_node_id(r: &mut Reader) -> Result<ExpandedNodeId, CodecError> {
    let tag = r.read_u8()?;
    let has_uri = tag & NAMESPACE_URI_FLAG != 0;
    let has_index = tag & SERVER_INDEX_FLAG != 0;

    // Re-synthesize a plain NodeId reader by masking the flag bits back out;
    // the tag byte has already been consumed, so decode the body directly.
    let node_id = match tag & ENCODING_MASK {
        TWO_BYTE => NodeId::numeric(0, r.read_u8()? as u32),
        FOUR_BYTE => {
            let ns = r.read_u8()? as u16;
            let v = r.read_u16()? as u32;
            NodeId::numeric(ns, v)
        }
        NUMERIC => {
            let ns = r.read_u16()?;
            let v = r.read_u32()?;
            NodeId::numeric(ns, v)
        }
        STRING => {
            let ns = r.read_u16()?;
            let s = r.read_string()?.ok_or(CodecError::InvalidLength(-1))?;
            NodeId::string(ns, s)
        }
        GUID => {
            let ns = r.read_u16()?;
            let g = r.read_guid()?;
            NodeId::guid(ns, g)
        }
        OPAQUE => {
            let ns = r.read_u16()?;
            let b = r.read_byte_string()?.ok_or(CodecError::InvalidLength(-1))?;
            NodeId::opaque(ns, b)
        }
        other => return Err(CodecError::UnknownTag(other)),
    };

    let namespace_uri = if has_uri { r.read_string()? } else { None };
    let server_index = if has_index { r.read_u32()? } else { 0 };

    Ok(ExpandedNodeId {
        node_id,
        namespace_uri,
        server_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(id: NodeId) {
        let mut w = Writer::new();
        write_node_id(&mut w, &id).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(read_node_id(&mut r).unwrap(), id);
        r.finish().unwrap();
    }

    #[test]
    fn two_byte_form_chosen_for_small_ns0_numeric() {
        let id = NodeId::ns0(42);
        let mut w = Writer::new();
        write_node_id(&mut w, &id).unwrap();
        assert_eq!(w.into_bytes(), vec![TWO_BYTE, 42]);
    }

    #[test]
    fn roundtrips_every_identifier_kind() {
        roundtrip(NodeId::ns0(5));
        roundtrip(NodeId::numeric(3, 70_000));
        roundtrip(NodeId::string(2, "my.node"));
        roundtrip(NodeId::guid(1, Guid(1, 2, 3, [9; 8])));
        roundtrip(NodeId::opaque(4, vec![1, 2, 3]));
    }

    #[test]
    fn expanded_with_uri_and_server_index_roundtrips() {
        let id = ExpandedNodeId {
            node_id: NodeId::numeric(1, 7),
            namespace_uri: Some("urn:test".to_string()),
            server_index: 3,
        };
        let mut w = Writer::new();
        write_expanded_node_id(&mut w, &id).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(read_expanded_node_id(&mut r).unwrap(), id);
    }

    #[test]
    fn expanded_local_has_no_extra_bytes() {
        let id: ExpandedNodeId = NodeId::ns0(1).into();
        let mut w = Writer::new();
        write_expanded_node_id(&mut w, &id).unwrap();
        assert_eq!(w.into_bytes(), vec![TWO_BYTE, 1]);
    }
}
