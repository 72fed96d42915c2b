//! Transport layer (spec.md §6): the HEL/ACK handshake and the chunk-framed
//! TCP stream it hands off to the SecureChannel engine.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      SecureChannel / Dispatcher         │
//! ├─────────────────────────────────────────┤
//! │          Transport Layer                │  ← this module
//! │   HEL/ACK handshake, chunk framing       │
//! ├─────────────────────────────────────────┤
//! │                 TCP                      │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod handshake;
mod stream;

pub use connection::{Connection, NegotiatedLimits, PROTOCOL_VERSION};
pub use handshake::{AcknowledgeMessage, HelloMessage};
pub use stream::ChunkStream;
