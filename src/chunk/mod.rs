//! The chunk framer (C2, spec.md §4.2): chunk headers and per-channel
//! reassembly of multi-chunk messages.

mod header;
mod reassembly;

pub use header::{ChunkHeader, ChunkKind, MessageKind};
pub use reassembly::Reassembler;
