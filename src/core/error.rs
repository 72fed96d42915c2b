//! Status codes for the OPC UA runtime.

use thiserror::Error;

/// A 32-bit OPC UA status code.
///
/// The high bit pair of the word carries severity (Good/Uncertain/Bad); this
/// runtime only distinguishes `Good` from the `Bad*` kinds it can itself
/// produce, so `StatusCode` is modeled as an enum rather than a raw `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Operation succeeded.
    Good,

    // --- Decoding / framing (§7) ---
    /// Malformed structured type on the wire.
    BadDecodingError,
    /// A length prefix exceeded the channel's configured cap.
    BadEncodingLimitsExceeded,
    /// A chunked message exceeded the maximum total size.
    BadTcpMessageTooLarge,
    /// An unrecognized 3-byte message type was seen in a chunk header.
    BadTcpMessageTypeInvalid,

    // --- Security (§7) ---
    /// MAC verification or decryption failed.
    BadSecurityChecksFailed,
    /// A symmetric token id is neither the current nor retired token.
    BadSecureChannelTokenUnknown,
    /// The channel has been closed or aborted.
    BadSecureChannelClosed,
    /// Leaf certificate validity period violated.
    BadCertificateTimeInvalid,
    /// Issuer certificate validity period violated.
    BadCertificateIssuerTimeInvalid,
    /// Leaf certificate is on a revocation list.
    BadCertificateRevoked,
    /// An issuer in the chain is on a revocation list.
    BadCertificateIssuerRevoked,
    /// No trust anchor found for the chain.
    BadCertificateUntrusted,
    /// The chain could not be completed to a self-signed root.
    BadCertificateChainIncomplete,
    /// Key usage bits forbid the certificate's role (e.g. CA cert as leaf).
    BadCertificateUseNotAllowed,
    /// ApplicationUri missing or mismatched in subjectAltName.
    BadCertificateUriInvalid,

    // --- Session (§7) ---
    /// No session exists for the given session id.
    BadSessionIdInvalid,
    /// The session has timed out or been closed.
    BadSessionClosed,
    /// An operation was attempted on a session before ActivateSession.
    BadSessionNotActivated,
    /// The identity presented was rejected by the user backend.
    BadUserAccessDenied,
    /// The identity token was malformed or unsupported.
    BadIdentityTokenInvalid,

    // --- Address space (§7) ---
    /// No node exists for the given NodeId.
    BadNodeIdUnknown,
    /// A node with this NodeId already exists.
    BadNodeIdExists,
    /// The requested attribute id does not apply to this node class.
    BadAttributeIdInvalid,
    /// The supplied index range is malformed or out of bounds.
    BadIndexRangeInvalid,
    /// Written value's data type is incompatible with the node's data type.
    BadTypeMismatch,
    /// The attribute is not writable.
    BadWriteNotSupported,
    /// Requested item (method, reference, continuation point, ...) absent.
    BadNotFound,
    /// An invalid browse direction was requested.
    BadBrowseDirectionInvalid,

    // --- Subscription (§7) ---
    /// No subscription exists for the given id.
    BadSubscriptionIdInvalid,
    /// No notification is available for the requested sequence number.
    BadMessageNotAvailable,
    /// Too many outstanding Publish requests for this session.
    BadTooManyPublishRequests,
    /// No subscription exists on the session at all.
    BadNoSubscription,

    // --- Resource / dispatch (§7) ---
    /// Allocation failed.
    BadOutOfMemory,
    /// An invariant the engine relies on was violated.
    BadInternalError,
    /// The request's type id has no registered handler.
    BadServiceUnsupported,
}

impl StatusCode {
    /// True for the single `Good` value.
    pub fn is_good(self) -> bool {
        matches!(self, StatusCode::Good)
    }

    /// True for every non-`Good` value.
    pub fn is_bad(self) -> bool {
        !self.is_good()
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

impl StatusCode {
    /// The 32-bit wire value for this status code (high word only; the
    /// runtime does not model the `Bad`/`Uncertain` sub-flag bits OPC UA
    /// reserves in the low word).
    pub fn as_wire_code(self) -> u32 {
        match self {
            StatusCode::Good => 0x0000_0000,
            StatusCode::BadDecodingError => 0x8007_0000,
            StatusCode::BadEncodingLimitsExceeded => 0x8008_0000,
            StatusCode::BadTcpMessageTooLarge => 0x8009_0000,
            StatusCode::BadTcpMessageTypeInvalid => 0x800A_0000,
            StatusCode::BadSecurityChecksFailed => 0x800B_0000,
            StatusCode::BadSecureChannelTokenUnknown => 0x800C_0000,
            StatusCode::BadSecureChannelClosed => 0x800D_0000,
            StatusCode::BadCertificateTimeInvalid => 0x8010_0000,
            StatusCode::BadCertificateIssuerTimeInvalid => 0x8011_0000,
            StatusCode::BadCertificateRevoked => 0x8012_0000,
            StatusCode::BadCertificateIssuerRevoked => 0x8013_0000,
            StatusCode::BadCertificateUntrusted => 0x8014_0000,
            StatusCode::BadCertificateChainIncomplete => 0x8015_0000,
            StatusCode::BadCertificateUseNotAllowed => 0x8016_0000,
            StatusCode::BadCertificateUriInvalid => 0x8017_0000,
            StatusCode::BadSessionIdInvalid => 0x8020_0000,
            StatusCode::BadSessionClosed => 0x8021_0000,
            StatusCode::BadSessionNotActivated => 0x8022_0000,
            StatusCode::BadUserAccessDenied => 0x8023_0000,
            StatusCode::BadIdentityTokenInvalid => 0x8024_0000,
            StatusCode::BadNodeIdUnknown => 0x8030_0000,
            StatusCode::BadNodeIdExists => 0x8031_0000,
            StatusCode::BadAttributeIdInvalid => 0x8032_0000,
            StatusCode::BadIndexRangeInvalid => 0x8033_0000,
            StatusCode::BadTypeMismatch => 0x8034_0000,
            StatusCode::BadWriteNotSupported => 0x8035_0000,
            StatusCode::BadNotFound => 0x8036_0000,
            StatusCode::BadBrowseDirectionInvalid => 0x8037_0000,
            StatusCode::BadSubscriptionIdInvalid => 0x8040_0000,
            StatusCode::BadMessageNotAvailable => 0x8041_0000,
            StatusCode::BadTooManyPublishRequests => 0x8042_0000,
            StatusCode::BadNoSubscription => 0x8043_0000,
            StatusCode::BadOutOfMemory => 0x8050_0000,
            StatusCode::BadInternalError => 0x8051_0000,
            StatusCode::BadServiceUnsupported => 0x8052_0000,
        }
    }

    /// Recover a `StatusCode` from its wire value, falling back to
    /// `BadInternalError` for a `Bad` word this runtime never itself
    /// produces but may still see on the wire.
    pub fn from_wire_code(code: u32) -> Self {
        match code {
            0x0000_0000 => StatusCode::Good,
            0x8007_0000 => StatusCode::BadDecodingError,
            0x8008_0000 => StatusCode::BadEncodingLimitsExceeded,
            0x8009_0000 => StatusCode::BadTcpMessageTooLarge,
            0x800A_0000 => StatusCode::BadTcpMessageTypeInvalid,
            0x800B_0000 => StatusCode::BadSecurityChecksFailed,
            0x800C_0000 => StatusCode::BadSecureChannelTokenUnknown,
            0x800D_0000 => StatusCode::BadSecureChannelClosed,
            0x8010_0000 => StatusCode::BadCertificateTimeInvalid,
            0x8011_0000 => StatusCode::BadCertificateIssuerTimeInvalid,
            0x8012_0000 => StatusCode::BadCertificateRevoked,
            0x8013_0000 => StatusCode::BadCertificateIssuerRevoked,
            0x8014_0000 => StatusCode::BadCertificateUntrusted,
            0x8015_0000 => StatusCode::BadCertificateChainIncomplete,
            0x8016_0000 => StatusCode::BadCertificateUseNotAllowed,
            0x8017_0000 => StatusCode::BadCertificateUriInvalid,
            0x8020_0000 => StatusCode::BadSessionIdInvalid,
            0x8021_0000 => StatusCode::BadSessionClosed,
            0x8022_0000 => StatusCode::BadSessionNotActivated,
            0x8023_0000 => StatusCode::BadUserAccessDenied,
            0x8024_0000 => StatusCode::BadIdentityTokenInvalid,
            0x8030_0000 => StatusCode::BadNodeIdUnknown,
            0x8031_0000 => StatusCode::BadNodeIdExists,
            0x8032_0000 => StatusCode::BadAttributeIdInvalid,
            0x8033_0000 => StatusCode::BadIndexRangeInvalid,
            0x8034_0000 => StatusCode::BadTypeMismatch,
            0x8035_0000 => StatusCode::BadWriteNotSupported,
            0x8036_0000 => StatusCode::BadNotFound,
            0x8037_0000 => StatusCode::BadBrowseDirectionInvalid,
            0x8040_0000 => StatusCode::BadSubscriptionIdInvalid,
            0x8041_0000 => StatusCode::BadMessageNotAvailable,
            0x8042_0000 => StatusCode::BadTooManyPublishRequests,
            0x8043_0000 => StatusCode::BadNoSubscription,
            0x8050_0000 => StatusCode::BadOutOfMemory,
            0x8052_0000 => StatusCode::BadServiceUnsupported,
            _ => StatusCode::BadInternalError,
        }
    }
}

/// Errors from the wire codec (C1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Ran out of bytes while decoding a fixed-size field.
    #[error("unexpected end of data")]
    UnexpectedEof,
    /// A length prefix was negative but not the null sentinel (-1).
    #[error("invalid length prefix: {0}")]
    InvalidLength(i32),
    /// Trailing bytes remained after decoding a structure.
    #[error("trailing garbage after structure")]
    TrailingData,
    /// An encoding-type / type-id byte did not match any known variant.
    #[error("unknown encoding tag: {0}")]
    UnknownTag(u8),
    /// A Variant's declared dimensions do not multiply to its element count.
    #[error("variant dimensions {dims:?} do not match element count {count}")]
    DimensionMismatch {
        /// The declared array dimensions.
        dims: Vec<i32>,
        /// The actual element count.
        count: usize,
    },
    /// The encoded length would exceed the channel's configured cap.
    #[error("encoding limit exceeded: {0} > {1}")]
    LimitExceeded(usize, usize),
}

impl From<CodecError> for StatusCode {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::LimitExceeded(_, _) => StatusCode::BadEncodingLimitsExceeded,
            _ => StatusCode::BadDecodingError,
        }
    }
}

/// Errors from the chunk framer (C2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// The reassembled message exceeded `max_message_size`.
    #[error("message too large")]
    TooLarge,
    /// The total chunk count for one message exceeded `max_chunks_per_message`.
    #[error("too many chunks")]
    TooManyChunks,
    /// The 3-byte message type was not one of HEL/ACK/ERR/OPN/CLO/MSG.
    #[error("invalid message type {0:?}")]
    InvalidMessageType([u8; 3]),
    /// The 1-byte chunk type was not F/C/A.
    #[error("invalid chunk type {0}")]
    InvalidChunkType(u8),
    /// A chunk's declared length did not match the bytes available.
    #[error("malformed chunk header")]
    MalformedHeader,
    /// An abort chunk truncated this request's reassembly.
    #[error("reassembly aborted for request {0}")]
    Aborted(u32),
}

impl From<ChunkError> for StatusCode {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::TooLarge | ChunkError::TooManyChunks => StatusCode::BadTcpMessageTooLarge,
            ChunkError::InvalidMessageType(_) => StatusCode::BadTcpMessageTypeInvalid,
            ChunkError::InvalidChunkType(_) | ChunkError::MalformedHeader => {
                StatusCode::BadSecurityChecksFailed
            }
            ChunkError::Aborted(_) => StatusCode::BadSecureChannelClosed,
        }
    }
}

/// Errors from the crypto adapter (C3).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signature generation failed.
    #[error("sign failed: {0}")]
    SignFailed(String),
    /// Signature verification failed.
    #[error("verify failed")]
    VerifyFailed,
    /// Symmetric or asymmetric encryption failed.
    #[error("encrypt failed: {0}")]
    EncryptFailed(String),
    /// Symmetric or asymmetric decryption failed (bad padding/tag/key).
    #[error("decrypt failed")]
    DecryptFailed,
    /// Key derivation from nonces failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
    /// The requested security policy is not recognized.
    #[error("unknown security policy: {0}")]
    UnknownPolicy(String),
}

impl From<CryptoError> for StatusCode {
    fn from(_: CryptoError) -> Self {
        StatusCode::BadSecurityChecksFailed
    }
}

/// Errors from the SecureChannel engine (C5).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Sequence number did not strictly increase (modulo wrap).
    #[error("sequence number violation")]
    SequenceViolation,
    /// The token id on an incoming chunk is neither current nor retired.
    #[error("unknown token id {0}")]
    UnknownToken(u32),
    /// Codec-level failure while decoding/encoding a channel message.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Chunk framing failure.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),
    /// Cryptographic failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// Certificate chain rejected.
    #[error("certificate rejected: {0:?}")]
    Certificate(StatusCode),
    /// The channel is already closed.
    #[error("channel closed")]
    Closed,
}

impl From<ChannelError> for StatusCode {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::SequenceViolation => StatusCode::BadSecurityChecksFailed,
            ChannelError::UnknownToken(_) => StatusCode::BadSecureChannelTokenUnknown,
            ChannelError::Codec(c) => c.into(),
            ChannelError::Chunk(c) => c.into(),
            ChannelError::Crypto(c) => c.into(),
            ChannelError::Certificate(s) => s,
            ChannelError::Closed => StatusCode::BadSecureChannelClosed,
        }
    }
}

/// Errors from the transport layer: the HEL/ACK handshake and the
/// chunk-stream I/O carrying it and every OPN/MSG/CLO chunk afterward.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The stream ended, or a write/read syscall failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Chunk header or reassembly failure.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),
    /// Codec failure decoding/encoding a HEL/ACK body.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The peer's HEL did not start with the `opc.tcp` magic.
    #[error("bad handshake magic")]
    BadHandshakeMagic,
    /// A HEL/ACK arrived where some other message type was expected, or
    /// vice versa.
    #[error("unexpected message kind")]
    UnexpectedMessageKind,
    /// The peer's requested endpoint URL exceeds the configured limit.
    #[error("endpoint url too long")]
    EndpointUrlTooLong,
    /// The connection was closed before the handshake completed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<TransportError> for StatusCode {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Io(_) | TransportError::ConnectionClosed => StatusCode::BadSecureChannelClosed,
            TransportError::Chunk(c) => c.into(),
            TransportError::Codec(c) => c.into(),
            TransportError::BadHandshakeMagic | TransportError::UnexpectedMessageKind => {
                StatusCode::BadTcpMessageTypeInvalid
            }
            TransportError::EndpointUrlTooLong => StatusCode::BadEncodingLimitsExceeded,
        }
    }
}

/// Errors from the session manager (C6).
#[derive(Debug, Error)]
pub enum SessionError {
    /// No such session.
    #[error("session not found")]
    NotFound,
    /// Session exists but has timed out / been closed.
    #[error("session closed")]
    Closed,
    /// An operation required an activated session.
    #[error("session not activated")]
    NotActivated,
    /// Client signature verification failed during Activate.
    #[error("signature verification failed")]
    BadSignature,
    /// The identity token type is not permitted by the endpoint's policy.
    #[error("identity rejected: {0}")]
    IdentityRejected(String),
}

impl From<SessionError> for StatusCode {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => StatusCode::BadSessionIdInvalid,
            SessionError::Closed => StatusCode::BadSessionClosed,
            SessionError::NotActivated => StatusCode::BadSessionNotActivated,
            SessionError::BadSignature => StatusCode::BadUserAccessDenied,
            SessionError::IdentityRejected(_) => StatusCode::BadIdentityTokenInvalid,
        }
    }
}

/// Errors from the address-space services (C8).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressSpaceError {
    /// No node exists for the given NodeId.
    #[error("unknown node")]
    UnknownNode,
    /// A node with this NodeId already exists.
    #[error("node exists")]
    NodeExists,
    /// The attribute id does not apply to this node class.
    #[error("invalid attribute id")]
    InvalidAttribute,
    /// The index range was malformed or out of bounds.
    #[error("invalid index range")]
    InvalidIndexRange,
    /// Data type mismatch on write.
    #[error("type mismatch")]
    TypeMismatch,
    /// Attribute is read-only.
    #[error("write not supported")]
    WriteNotSupported,
    /// Browse direction was not forward/inverse/both.
    #[error("invalid browse direction")]
    InvalidBrowseDirection,
    /// Referenced item (method, continuation point, ...) not found.
    #[error("not found")]
    NotFound,
}

impl From<AddressSpaceError> for StatusCode {
    fn from(e: AddressSpaceError) -> Self {
        match e {
            AddressSpaceError::UnknownNode => StatusCode::BadNodeIdUnknown,
            AddressSpaceError::NodeExists => StatusCode::BadNodeIdExists,
            AddressSpaceError::InvalidAttribute => StatusCode::BadAttributeIdInvalid,
            AddressSpaceError::InvalidIndexRange => StatusCode::BadIndexRangeInvalid,
            AddressSpaceError::TypeMismatch => StatusCode::BadTypeMismatch,
            AddressSpaceError::WriteNotSupported => StatusCode::BadWriteNotSupported,
            AddressSpaceError::InvalidBrowseDirection => StatusCode::BadBrowseDirectionInvalid,
            AddressSpaceError::NotFound => StatusCode::BadNotFound,
        }
    }
}

/// Errors surfaced from the certificate validator (C4), carried as a status
/// code directly since the validator's contract (spec.md §4.4) is to return
/// one of a fixed set of `Bad*` codes rather than a structured error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("certificate validation failed: {0:?}")]
pub struct CertificateError(pub StatusCode);
