//! # ua-runtime
//!
//! Core of an OPC UA (IEC 62541) server/client runtime: a networked
//! industrial-automation protocol stack exposing a typed, hierarchical
//! information model over a session-oriented, message-framed transport with
//! pluggable cryptographic security.
//!
//! This crate covers:
//!
//! - The SecureChannel / Session protocol engine (chunk framing, encryption,
//!   sequence/token discipline, request/response correlation).
//! - The nodestore + address space (the concurrent, typed node graph with
//!   reference cross-linking and type-instantiation semantics).
//! - The attribute service layer (read/write, browse,
//!   translate-browse-path, call, subscription/monitored-item dispatch).
//! - The certificate chain validator (path building, revocation, trust
//!   anchoring).
//!
//! Discovery, pub/sub, the XML nodeset importer, and the event-filter
//! grammar are out of scope for this crate.
//!
//! ## Feature Flags
//!
//! - `transport` (default): async chunk I/O over TCP via tokio.
//! - `client` (default, implies `transport`): high-level client API.
//! - `server` (default, implies `transport`): high-level server API.
//!
//! ## Modules
//!
//! - [`core`]: NodeId, status codes, and capability traits (always included).
//! - [`codec`]: wire encoding for built-in and structured types.
//! - [`chunk`]: chunk framing and reassembly.
//! - [`crypto`]: the crypto adapter abstraction over signing/encryption.
//! - [`certs`]: certificate chain validation.
//! - [`channel`]: the SecureChannel engine.
//! - [`session`]: session lifecycle and activation.
//! - [`nodestore`]: the concurrent node map.
//! - [`address_space`]: browse/read/write/translate/call services.
//! - [`subscriptions`]: monitored items and the publish/notify loop.
//! - [`dispatch`]: request routing by type id.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;

pub mod codec;
pub mod chunk;
pub mod crypto;
pub mod certs;
pub mod channel;
pub mod session;
pub mod nodestore;
pub mod address_space;
pub mod subscriptions;
pub mod dispatch;

#[cfg(feature = "transport")]
pub mod transport;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{DataValue, Variant};
    pub use crate::core::*;
}
