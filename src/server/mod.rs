//! The server runtime: configuration, channel bookkeeping, namespace-0
//! bootstrap, default service handlers, and the top-level [`Server`] state
//! (spec.md §4, §5, §10).

mod channel_table;
mod config;
mod namespace0;
#[allow(clippy::module_inception)]
mod server;
mod services;

pub use channel_table::ChannelTable;
pub use config::{EndpointSecurity, ServerConfig, ServerConfigBuilder, SECURITY_MODE_NONE, SECURITY_MODE_SIGN, SECURITY_MODE_SIGN_AND_ENCRYPT};
pub use namespace0::ServerRuntimeStatus;
pub use server::{default_dispatcher, Server};
