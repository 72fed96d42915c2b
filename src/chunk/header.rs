//! The chunk header (spec.md §4.2): 3-byte message type, 1-byte chunk type,
//! 4-byte little-endian chunk length (header included in the count).

use crate::codec::{Reader, Writer};
use crate::core::{
    ChunkError, CHUNK_HEADER_SIZE, CHUNK_TYPE_ABORT, CHUNK_TYPE_CONTINUATION, CHUNK_TYPE_FINAL,
    MESSAGE_TYPE_ACK, MESSAGE_TYPE_CLO, MESSAGE_TYPE_ERR, MESSAGE_TYPE_HEL, MESSAGE_TYPE_MSG,
    MESSAGE_TYPE_OPN,
};

/// The kind of message a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Client hello (transport handshake).
    Hello,
    /// Server acknowledge (transport handshake).
    Acknowledge,
    /// Transport-level error, terminates the connection.
    Error,
    /// OpenSecureChannel request/response.
    OpenSecureChannel,
    /// CloseSecureChannel request/response.
    CloseSecureChannel,
    /// A generic service request/response carried over an open channel.
    Message,
}

impl MessageKind {
    fn wire_bytes(self) -> [u8; 3] {
        match self {
            MessageKind::Hello => MESSAGE_TYPE_HEL,
            MessageKind::Acknowledge => MESSAGE_TYPE_ACK,
            MessageKind::Error => MESSAGE_TYPE_ERR,
            MessageKind::OpenSecureChannel => MESSAGE_TYPE_OPN,
            MessageKind::CloseSecureChannel => MESSAGE_TYPE_CLO,
            MessageKind::Message => MESSAGE_TYPE_MSG,
        }
    }

    fn from_wire_bytes(bytes: [u8; 3]) -> Result<Self, ChunkError> {
        Ok(match bytes {
            MESSAGE_TYPE_HEL => MessageKind::Hello,
            MESSAGE_TYPE_ACK => MessageKind::Acknowledge,
            MESSAGE_TYPE_ERR => MessageKind::Error,
            MESSAGE_TYPE_OPN => MessageKind::OpenSecureChannel,
            MESSAGE_TYPE_CLO => MessageKind::CloseSecureChannel,
            MESSAGE_TYPE_MSG => MessageKind::Message,
            other => return Err(ChunkError::InvalidMessageType(other)),
        })
    }

    /// Only `OpenSecureChannel`, `CloseSecureChannel`, and `Message` are
    /// ever split across multiple chunks; handshake and error messages are
    /// always a single final chunk (spec.md §4.2).
    pub fn is_chunkable(self) -> bool {
        matches!(
            self,
            MessageKind::OpenSecureChannel | MessageKind::CloseSecureChannel | MessageKind::Message
        )
    }
}

/// Whether this chunk finishes, continues, or aborts its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// The last chunk of a message.
    Final,
    /// More chunks follow.
    Continuation,
    /// The message is being discarded; no further chunks will arrive.
    Abort,
}

impl ChunkKind {
    fn wire_byte(self) -> u8 {
        match self {
            ChunkKind::Final => CHUNK_TYPE_FINAL,
            ChunkKind::Continuation => CHUNK_TYPE_CONTINUATION,
            ChunkKind::Abort => CHUNK_TYPE_ABORT,
        }
    }

    fn from_wire_byte(b: u8) -> Result<Self, ChunkError> {
        match b {
            CHUNK_TYPE_FINAL => Ok(ChunkKind::Final),
            CHUNK_TYPE_CONTINUATION => Ok(ChunkKind::Continuation),
            CHUNK_TYPE_ABORT => Ok(ChunkKind::Abort),
            other => Err(ChunkError::InvalidChunkType(other)),
        }
    }
}

/// The 8-byte header prefixing every chunk on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Which message this chunk belongs to.
    pub message_kind: MessageKind,
    /// This chunk's position in its message.
    pub chunk_kind: ChunkKind,
    /// Total chunk length in bytes, header included.
    pub length: u32,
}

impl ChunkHeader {
    /// Encode the header. Caller fills in `length` once the payload size is
    /// known; this never allocates.
    pub fn encode(&self, w: &mut Writer) -> Result<(), crate::core::CodecError> {
        w.write_bytes(&self.message_kind.wire_bytes())?;
        w.write_u8(self.chunk_kind.wire_byte())?;
        w.write_u32(self.length)
    }

    /// Decode a header from the first [`crate::core::CHUNK_HEADER_SIZE`]
    /// bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ChunkError> {
        if buf.len() < CHUNK_HEADER_SIZE {
            return Err(ChunkError::MalformedHeader);
        }
        let mut r = Reader::new(&buf[..CHUNK_HEADER_SIZE]);
        let message_type: [u8; 3] = r
            .read_bytes(3)
            .map_err(|_| ChunkError::MalformedHeader)?
            .try_into()
            .unwrap();
        let chunk_type = r.read_u8().map_err(|_| ChunkError::MalformedHeader)?;
        let length = r.read_u32().map_err(|_| ChunkError::MalformedHeader)?;

        let message_kind = MessageKind::from_wire_bytes(message_type)?;
        let chunk_kind = ChunkKind::from_wire_byte(chunk_type)?;
        if (length as usize) < CHUNK_HEADER_SIZE {
            return Err(ChunkError::MalformedHeader);
        }
        Ok(Self {
            message_kind,
            chunk_kind,
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let h = ChunkHeader {
            message_kind: MessageKind::Message,
            chunk_kind: ChunkKind::Final,
            length: 128,
        };
        let mut w = Writer::new();
        h.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), CHUNK_HEADER_SIZE);
        assert_eq!(ChunkHeader::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn unknown_message_type_rejected() {
        let mut bytes = vec![b'X', b'Y', b'Z', b'F'];
        bytes.extend_from_slice(&8u32.to_le_bytes());
        assert_eq!(
            ChunkHeader::decode(&bytes),
            Err(ChunkError::InvalidMessageType([b'X', b'Y', b'Z']))
        );
    }

    #[test]
    fn unknown_chunk_type_rejected() {
        let mut bytes = b"MSG".to_vec();
        bytes.push(b'Z');
        bytes.extend_from_slice(&8u32.to_le_bytes());
        assert_eq!(ChunkHeader::decode(&bytes), Err(ChunkError::InvalidChunkType(b'Z')));
    }

    #[test]
    fn length_smaller_than_header_rejected() {
        let mut bytes = b"MSG".to_vec();
        bytes.push(b'F');
        bytes.extend_from_slice(&3u32.to_le_bytes());
        assert_eq!(ChunkHeader::decode(&bytes), Err(ChunkError::MalformedHeader));
    }

    #[test]
    fn handshake_messages_are_not_chunkable() {
        assert!(!MessageKind::Hello.is_chunkable());
        assert!(!MessageKind::Acknowledge.is_chunkable());
        assert!(MessageKind::Message.is_chunkable());
    }
}
