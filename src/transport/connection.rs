//! A connected, handshake-complete transport connection (spec.md §6).
//!
//! [`Connection`] owns the chunk-framed stream after HEL/ACK has completed;
//! everything above it (the SecureChannel engine, session manager,
//! dispatcher) deals only in whole chunks.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::chunk::{ChunkHeader, ChunkKind, MessageKind};
use crate::codec::Writer;
use crate::core::{TransportError, DEFAULT_MAX_CHUNK_SIZE};

use super::handshake::{AcknowledgeMessage, HelloMessage};
use super::stream::ChunkStream;

/// The OPC UA TCP protocol version this runtime speaks.
pub const PROTOCOL_VERSION: u32 = 0;

/// A chunk-framed connection with the HEL/ACK handshake already done.
pub struct Connection<S> {
    stream: ChunkStream<S>,
    peer_limits: NegotiatedLimits,
}

/// The buffer/message limits in effect after handshake, the smaller of what
/// each side proposed (spec.md §6 "Configuration surface": `max-message-size`,
/// `max-chunks-per-message`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedLimits {
    /// Bytes allowed per chunk.
    pub max_chunk_size: usize,
    /// Bytes allowed per reassembled message, 0 meaning no limit.
    pub max_message_size: u32,
    /// Chunks allowed per reassembled message, 0 meaning no limit.
    pub max_chunk_count: u32,
}

fn negotiate(local_chunk_size: u32, local_message_size: u32, local_chunk_count: u32, remote: (u32, u32, u32)) -> NegotiatedLimits {
    let min_nonzero = |a: u32, b: u32| match (a, b) {
        (0, x) | (x, 0) => x,
        (a, b) => a.min(b),
    };
    let negotiated_chunk_size = min_nonzero(local_chunk_size, remote.0);
    NegotiatedLimits {
        max_chunk_size: if negotiated_chunk_size == 0 {
            DEFAULT_MAX_CHUNK_SIZE
        } else {
            negotiated_chunk_size as usize
        },
        max_message_size: min_nonzero(local_message_size, remote.1),
        max_chunk_count: min_nonzero(local_chunk_count, remote.2),
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Client side: send Hello, read Acknowledge.
    pub async fn connect(mut stream: S, hello: HelloMessage) -> Result<(Self, AcknowledgeMessage), TransportError> {
        send_hello(&mut stream, &hello).await?;
        let ack = recv_acknowledge(&mut stream).await?;

        let peer_limits = negotiate(
            hello.send_buffer_size,
            hello.max_message_size,
            hello.max_chunk_count,
            (ack.receive_buffer_size, ack.max_message_size, ack.max_chunk_count),
        );
        Ok((
            Self {
                stream: ChunkStream::new(stream, peer_limits.max_chunk_size),
                peer_limits,
            },
            ack,
        ))
    }

    /// Server side: read Hello, send Acknowledge.
    pub async fn accept(mut stream: S, server_ack: AcknowledgeMessage) -> Result<(Self, HelloMessage), TransportError> {
        let hello = recv_hello(&mut stream).await?;
        send_acknowledge(&mut stream, &server_ack).await?;

        let peer_limits = negotiate(
            server_ack.send_buffer_size,
            server_ack.max_message_size,
            server_ack.max_chunk_count,
            (hello.receive_buffer_size, hello.max_message_size, hello.max_chunk_count),
        );
        Ok((
            Self {
                stream: ChunkStream::new(stream, peer_limits.max_chunk_size),
                peer_limits,
            },
            hello,
        ))
    }

    /// The limits negotiated during handshake.
    pub fn limits(&self) -> NegotiatedLimits {
        self.peer_limits
    }

    /// Read the next chunk (an OPN/MSG/CLO chunk; HEL/ACK only ever occur
    /// once, during handshake).
    pub async fn read_chunk(&mut self) -> Result<(ChunkHeader, Vec<u8>), TransportError> {
        self.stream.read_chunk().await
    }

    /// Write one chunk.
    pub async fn write_chunk(&mut self, message_kind: MessageKind, chunk_kind: ChunkKind, body: &[u8]) -> Result<(), TransportError> {
        let header = ChunkHeader {
            message_kind,
            chunk_kind,
            length: 0,
        };
        self.stream.write_chunk(header, body).await
    }
}

async fn send_hello<S: AsyncWrite + Unpin>(stream: &mut S, hello: &HelloMessage) -> Result<(), TransportError> {
    let mut body = Writer::new();
    hello.encode(&mut body)?;
    write_handshake_chunk(stream, MessageKind::Hello, &body.into_bytes()).await
}

async fn send_acknowledge<S: AsyncWrite + Unpin>(stream: &mut S, ack: &AcknowledgeMessage) -> Result<(), TransportError> {
    let mut body = Writer::new();
    ack.encode(&mut body)?;
    write_handshake_chunk(stream, MessageKind::Acknowledge, &body.into_bytes()).await
}

async fn write_handshake_chunk<S: AsyncWrite + Unpin>(stream: &mut S, kind: MessageKind, body: &[u8]) -> Result<(), TransportError> {
    use tokio::io::AsyncWriteExt;
    let header = ChunkHeader {
        message_kind: kind,
        chunk_kind: ChunkKind::Final,
        length: (crate::core::CHUNK_HEADER_SIZE + body.len()) as u32,
    };
    let mut w = Writer::new();
    header.encode(&mut w)?;
    let mut out = w.into_bytes();
    out.extend_from_slice(body);
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}

async fn recv_hello<S: AsyncRead + Unpin>(stream: &mut S) -> Result<HelloMessage, TransportError> {
    let (header, body) = read_handshake_chunk(stream).await?;
    if header.message_kind != MessageKind::Hello {
        return Err(TransportError::UnexpectedMessageKind);
    }
    HelloMessage::decode(&body)
}

async fn recv_acknowledge<S: AsyncRead + Unpin>(stream: &mut S) -> Result<AcknowledgeMessage, TransportError> {
    let (header, body) = read_handshake_chunk(stream).await?;
    if header.message_kind != MessageKind::Acknowledge {
        return Err(TransportError::UnexpectedMessageKind);
    }
    AcknowledgeMessage::decode(&body)
}

async fn read_handshake_chunk<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(ChunkHeader, Vec<u8>), TransportError> {
    use tokio::io::AsyncReadExt;
    let mut header_buf = [0u8; crate::core::CHUNK_HEADER_SIZE];
    stream.read_exact(&mut header_buf).await?;
    let header = ChunkHeader::decode(&header_buf)?;
    let body_len = header.length as usize - crate::core::CHUNK_HEADER_SIZE;
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}
