//! Per-channel chunk reassembly (spec.md §4.2).
//!
//! Buffers continuation chunks per request id until a final chunk arrives,
//! or discards the buffer and fails the request when an abort chunk
//! arrives. Enforces a max chunk count and max total message size.

use std::collections::HashMap;

use super::header::{ChunkHeader, ChunkKind};
use crate::core::ChunkError;

struct PendingMessage {
    payload: Vec<u8>,
    chunk_count: usize,
}

/// Reassembles chunked messages for one SecureChannel, tracking one pending
/// message per outstanding request id.
pub struct Reassembler {
    pending: HashMap<u32, PendingMessage>,
    max_chunk_count: usize,
    max_message_size: usize,
}

impl Reassembler {
    /// Build a reassembler with the given per-message caps.
    pub fn new(max_chunk_count: usize, max_message_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            max_chunk_count,
            max_message_size,
        }
    }

    /// Feed one chunk's header and payload (the header's `length` already
    /// validated by the caller to equal the bytes actually received).
    ///
    /// Returns `Some(bytes)` with the fully reassembled message once a final
    /// chunk is seen, `None` while more chunks are still expected.
    pub fn push(
        &mut self,
        request_id: u32,
        header: &ChunkHeader,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, ChunkError> {
        match header.chunk_kind {
            ChunkKind::Abort => {
                self.pending.remove(&request_id);
                Err(ChunkError::Aborted(request_id))
            }
            ChunkKind::Continuation | ChunkKind::Final => {
                let entry = self.pending.entry(request_id).or_insert_with(|| PendingMessage {
                    payload: Vec::new(),
                    chunk_count: 0,
                });
                entry.chunk_count += 1;
                if entry.chunk_count > self.max_chunk_count {
                    self.pending.remove(&request_id);
                    return Err(ChunkError::TooManyChunks);
                }
                entry.payload.extend_from_slice(body);
                if entry.payload.len() > self.max_message_size {
                    self.pending.remove(&request_id);
                    return Err(ChunkError::TooLarge);
                }
                if header.chunk_kind == ChunkKind::Final {
                    let finished = self.pending.remove(&request_id).unwrap();
                    Ok(Some(finished.payload))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Number of requests with reassembly currently in progress.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::header::MessageKind;

    fn header(kind: ChunkKind, len: u32) -> ChunkHeader {
        ChunkHeader {
            message_kind: MessageKind::Message,
            chunk_kind: kind,
            length: len,
        }
    }

    #[test]
    fn single_final_chunk_completes_immediately() {
        let mut r = Reassembler::new(10, 1024);
        let result = r.push(1, &header(ChunkKind::Final, 16), b"hello world").unwrap();
        assert_eq!(result, Some(b"hello world".to_vec()));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn continuation_then_final_concatenates() {
        let mut r = Reassembler::new(10, 1024);
        assert_eq!(r.push(1, &header(ChunkKind::Continuation, 12), b"abc").unwrap(), None);
        assert_eq!(r.pending_count(), 1);
        let result = r.push(1, &header(ChunkKind::Final, 12), b"def").unwrap();
        assert_eq!(result, Some(b"abcdef".to_vec()));
    }

    #[test]
    fn abort_discards_and_reports_request() {
        let mut r = Reassembler::new(10, 1024);
        r.push(1, &header(ChunkKind::Continuation, 12), b"abc").unwrap();
        let err = r.push(1, &header(ChunkKind::Abort, 8), b"").unwrap_err();
        assert_eq!(err, ChunkError::Aborted(1));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn too_many_chunks_rejected() {
        let mut r = Reassembler::new(2, 1024);
        r.push(1, &header(ChunkKind::Continuation, 12), b"a").unwrap();
        r.push(1, &header(ChunkKind::Continuation, 12), b"b").unwrap();
        let err = r.push(1, &header(ChunkKind::Final, 12), b"c").unwrap_err();
        assert_eq!(err, ChunkError::TooManyChunks);
    }

    #[test]
    fn oversized_message_rejected() {
        let mut r = Reassembler::new(10, 4);
        let err = r.push(1, &header(ChunkKind::Final, 12), b"toolong").unwrap_err();
        assert_eq!(err, ChunkError::TooLarge);
    }

    #[test]
    fn separate_requests_reassemble_independently() {
        let mut r = Reassembler::new(10, 1024);
        r.push(1, &header(ChunkKind::Continuation, 12), b"a").unwrap();
        r.push(2, &header(ChunkKind::Continuation, 12), b"b").unwrap();
        assert_eq!(r.pending_count(), 2);
        let first = r.push(1, &header(ChunkKind::Final, 12), b"1").unwrap();
        assert_eq!(first, Some(b"a1".to_vec()));
        assert_eq!(r.pending_count(), 1);
    }
}
