//! HEL/ACK handshake bodies (spec.md §6 "HEL/ACK handshake (magic
//! `opc.tcp`)").
//!
//! These are the single-chunk message bodies exchanged before any
//! SecureChannel traffic; [`crate::channel::SecureChannelEngine`] only
//! learns that the handshake happened (`on_handshake_complete`), it does not
//! see these bytes itself.

use crate::codec::{Reader, Writer};
use crate::core::{CodecError, TransportError};

const ENDPOINT_URL_SCHEME: &str = "opc.tcp://";

/// The client's Hello: proposed buffer/message limits and the endpoint URL
/// it is connecting to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    /// Protocol version the client speaks.
    pub protocol_version: u32,
    /// Size of the client's receive buffer, in bytes.
    pub receive_buffer_size: u32,
    /// Size of the client's send buffer, in bytes.
    pub send_buffer_size: u32,
    /// Largest message the client will accept, 0 meaning no limit.
    pub max_message_size: u32,
    /// Largest chunk count per message the client will accept, 0 meaning no limit.
    pub max_chunk_count: u32,
    /// The `opc.tcp://host[:port][/path]` endpoint URL being connected to.
    pub endpoint_url: String,
}

impl HelloMessage {
    /// Encode the Hello body (the chunk header is written separately by the
    /// caller).
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        w.write_u32(self.protocol_version)?;
        w.write_u32(self.receive_buffer_size)?;
        w.write_u32(self.send_buffer_size)?;
        w.write_u32(self.max_message_size)?;
        w.write_u32(self.max_chunk_count)?;
        w.write_string(Some(&self.endpoint_url))
    }

    /// Decode a Hello body and confirm the endpoint URL carries the
    /// `opc.tcp://` scheme (spec.md §6's handshake magic).
    pub fn decode(buf: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new(buf);
        let hello = Self {
            protocol_version: r.read_u32()?,
            receive_buffer_size: r.read_u32()?,
            send_buffer_size: r.read_u32()?,
            max_message_size: r.read_u32()?,
            max_chunk_count: r.read_u32()?,
            endpoint_url: r.read_string()?.unwrap_or_default(),
        };
        if !hello.endpoint_url.starts_with(ENDPOINT_URL_SCHEME) {
            return Err(TransportError::BadHandshakeMagic);
        }
        Ok(hello)
    }
}

/// The server's Acknowledge: the negotiated buffer/message limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeMessage {
    /// Protocol version the server speaks (may be lower than the client's).
    pub protocol_version: u32,
    /// Size of the server's receive buffer, in bytes.
    pub receive_buffer_size: u32,
    /// Size of the server's send buffer, in bytes.
    pub send_buffer_size: u32,
    /// Largest message the server will accept, 0 meaning no limit.
    pub max_message_size: u32,
    /// Largest chunk count per message the server will accept, 0 meaning no limit.
    pub max_chunk_count: u32,
}

impl AcknowledgeMessage {
    /// Encode the Acknowledge body.
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        w.write_u32(self.protocol_version)?;
        w.write_u32(self.receive_buffer_size)?;
        w.write_u32(self.send_buffer_size)?;
        w.write_u32(self.max_message_size)?;
        w.write_u32(self.max_chunk_count)
    }

    /// Decode an Acknowledge body.
    pub fn decode(buf: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new(buf);
        Ok(Self {
            protocol_version: r.read_u32()?,
            receive_buffer_size: r.read_u32()?,
            send_buffer_size: r.read_u32()?,
            max_message_size: r.read_u32()?,
            max_chunk_count: r.read_u32()?,
        })
    }
}
