//! Protocol constants fixed by the OPC UA binary protocol (spec.md §4, §6).
//!
//! These values are normative and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// CHUNK HEADER (C2, spec.md §4.2)
// =============================================================================

/// Chunk header size (3-byte message type + 1-byte chunk type + 4-byte length).
pub const CHUNK_HEADER_SIZE: usize = 8;

/// `HEL` handshake message type.
pub const MESSAGE_TYPE_HEL: [u8; 3] = *b"HEL";
/// `ACK` handshake message type.
pub const MESSAGE_TYPE_ACK: [u8; 3] = *b"ACK";
/// `ERR` handshake/abort message type.
pub const MESSAGE_TYPE_ERR: [u8; 3] = *b"ERR";
/// `OPN` OpenSecureChannel message type.
pub const MESSAGE_TYPE_OPN: [u8; 3] = *b"OPN";
/// `CLO` CloseSecureChannel message type.
pub const MESSAGE_TYPE_CLO: [u8; 3] = *b"CLO";
/// `MSG` generic service-request/response message type.
pub const MESSAGE_TYPE_MSG: [u8; 3] = *b"MSG";

/// Final chunk.
pub const CHUNK_TYPE_FINAL: u8 = b'F';
/// Continuation chunk (more chunks follow).
pub const CHUNK_TYPE_CONTINUATION: u8 = b'C';
/// Abort chunk (discard reassembly for this request).
pub const CHUNK_TYPE_ABORT: u8 = b'A';

/// Default maximum bytes per reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
/// Default maximum chunk count per reassembled message.
pub const DEFAULT_MAX_CHUNK_COUNT: usize = 4096;
/// Default maximum bytes per individual chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// SEQUENCE / TOKEN DISCIPLINE (C5, spec.md §3 "SecureChannel")
// =============================================================================

/// Sequence numbers wrap at this value; a wrap is permitted once every lower
/// number has been seen (spec.md §3).
pub const SEQUENCE_NUMBER_WRAP: u32 = u32::MAX - 1024;

/// Channel and token ids start at 1 and skip 0 (spec.md §4.5 "Open").
pub const FIRST_CHANNEL_ID: u32 = 1;

/// Grace-period fraction of the old token's lifetime during renewal
/// (spec.md §4.5 "Renew": 25% of the old lifetime, whichever comes first).
pub const RENEW_GRACE_FRACTION: f64 = 0.25;

// =============================================================================
// CERTIFICATE CHAIN (C4, spec.md §4.4)
// =============================================================================

/// Maximum certificate chain depth walked by the validator.
pub const MAX_CHAIN_DEPTH: usize = 10;

// =============================================================================
// TIMING (spec.md §4.5, §4.6)
// =============================================================================

/// Default SecureChannel lifetime if the client does not request one.
pub const DEFAULT_CHANNEL_LIFETIME: Duration = Duration::from_secs(3600);

/// Minimum session timeout accepted from a client.
pub const MIN_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum session timeout accepted from a client.
pub const MAX_SESSION_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default requested session timeout when the client specifies none.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(60_000);

// =============================================================================
// NODESTORE (C7, spec.md §4.7)
// =============================================================================

/// Minimum hash table size (number of buckets).
pub const NODESTORE_MIN_BUCKETS: usize = 32;
/// Load factor above which the table grows.
pub const NODESTORE_GROW_LOAD_FACTOR: f64 = 0.75;
/// Load factor below which the table shrinks.
pub const NODESTORE_SHRINK_LOAD_FACTOR: f64 = 0.125;

/// Primes used for nodestore bucket-count growth, smallest first.
pub const NODESTORE_PRIME_SIZES: &[usize] = &[
    32, 67, 131, 257, 521, 1031, 2053, 4099, 8209, 16411, 32771, 65537, 131101, 262147, 524287,
    1048573,
];

// =============================================================================
// SUBSCRIPTION ENGINE (C9, spec.md §4.9)
// =============================================================================

/// Default max notifications drained into a single NotificationMessage.
pub const DEFAULT_MAX_NOTIFICATIONS_PER_PUBLISH: usize = 1000;
