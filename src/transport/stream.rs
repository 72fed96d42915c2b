//! Chunk-stream I/O over an async byte stream (spec.md §6 "then OPN/MSG/CLO").
//!
//! Wraps any `AsyncRead + AsyncWrite` transport (a `TcpStream` in practice)
//! with framed chunk read/write built on [`crate::chunk::ChunkHeader`]. This
//! is the layer the SecureChannel engine's caller drives; it knows nothing
//! about security headers, sequence numbers, or message semantics, only
//! where one chunk ends and the next begins.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chunk::ChunkHeader;
use crate::core::{CHUNK_HEADER_SIZE, TransportError};

/// Framed chunk reader/writer over an async duplex stream.
pub struct ChunkStream<S> {
    inner: S,
    max_chunk_size: usize,
}

impl<S> ChunkStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream, rejecting any chunk whose declared length exceeds
    /// `max_chunk_size`.
    pub fn new(inner: S, max_chunk_size: usize) -> Self {
        Self { inner, max_chunk_size }
    }

    /// Read one chunk: its header and body.
    pub async fn read_chunk(&mut self) -> Result<(ChunkHeader, Vec<u8>), TransportError> {
        let mut header_buf = [0u8; CHUNK_HEADER_SIZE];
        self.inner.read_exact(&mut header_buf).await?;
        let header = ChunkHeader::decode(&header_buf)?;

        let body_len = header.length as usize - CHUNK_HEADER_SIZE;
        if header.length as usize > self.max_chunk_size {
            return Err(TransportError::Chunk(crate::core::ChunkError::TooLarge));
        }
        let mut body = vec![0u8; body_len];
        self.inner.read_exact(&mut body).await?;
        Ok((header, body))
    }

    /// Write one chunk: header followed by body. `header.length` is
    /// overwritten with `CHUNK_HEADER_SIZE + body.len()`.
    pub async fn write_chunk(&mut self, mut header: ChunkHeader, body: &[u8]) -> Result<(), TransportError> {
        header.length = (CHUNK_HEADER_SIZE + body.len()) as u32;
        let mut w = crate::codec::Writer::new();
        header.encode(&mut w)?;
        let mut out = w.into_bytes();
        out.extend_from_slice(body);
        self.inner.write_all(&out).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, MessageKind};
    use tokio::io::duplex;

    #[tokio::test]
    async fn write_then_read_roundtrips_a_chunk() {
        let (client, server) = duplex(4096);
        let mut writer = ChunkStream::new(client, 64 * 1024);
        let mut reader = ChunkStream::new(server, 64 * 1024);

        let header = ChunkHeader {
            message_kind: MessageKind::Message,
            chunk_kind: ChunkKind::Final,
            length: 0,
        };
        writer.write_chunk(header, b"hello").await.unwrap();

        let (decoded_header, body) = reader.read_chunk().await.unwrap();
        assert_eq!(decoded_header.message_kind, MessageKind::Message);
        assert_eq!(decoded_header.chunk_kind, ChunkKind::Final);
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected() {
        let (client, server) = duplex(4096);
        let mut writer = ChunkStream::new(client, 1024 * 1024);
        let mut reader = ChunkStream::new(server, 16);

        let header = ChunkHeader {
            message_kind: MessageKind::Message,
            chunk_kind: ChunkKind::Final,
            length: 0,
        };
        writer.write_chunk(header, &vec![0u8; 64]).await.unwrap();

        let err = reader.read_chunk().await.unwrap_err();
        assert!(matches!(err, TransportError::Chunk(crate::core::ChunkError::TooLarge)));
    }
}
