//! Server configuration surface (SPEC_FULL.md §A.3): the knobs a deployment
//! sets once at startup, split between a plain data struct and a fluent
//! builder over it.

use std::sync::Arc;
use std::time::Duration;

use crate::certs::CertificateStore;
use crate::crypto::SecurityPolicy;
use crate::core::{
    DEFAULT_CHANNEL_LIFETIME, DEFAULT_MAX_CHUNK_COUNT, DEFAULT_MAX_MESSAGE_SIZE, MAX_SESSION_TIMEOUT,
    MIN_SESSION_TIMEOUT,
};

/// One endpoint's security policy plus the certificate/key pair it signs
/// and decrypts with (spec.md §4.3, §4.4).
#[derive(Clone)]
pub struct EndpointSecurity {
    /// The security policy this endpoint offers.
    pub policy: SecurityPolicy,
    /// Security modes accepted on this policy (spec.md §4.5): bit 0 =
    /// None, bit 1 = Sign, bit 2 = SignAndEncrypt.
    pub security_modes: u8,
    /// DER-encoded server certificate presented to clients.
    pub certificate_der: Vec<u8>,
    /// PKCS#1 DER-encoded server private key.
    pub private_key_der: Vec<u8>,
}

/// Security mode bit for "None" (no signing, no encryption).
pub const SECURITY_MODE_NONE: u8 = 1 << 0;
/// Security mode bit for "Sign" (signed, not encrypted).
pub const SECURITY_MODE_SIGN: u8 = 1 << 1;
/// Security mode bit for "SignAndEncrypt".
pub const SECURITY_MODE_SIGN_AND_ENCRYPT: u8 = 1 << 2;

/// Full server configuration (SPEC_FULL.md §A.3).
#[derive(Clone)]
pub struct ServerConfig {
    /// `opc.tcp://` endpoint URLs this server is reachable at.
    pub endpoint_urls: Vec<String>,
    /// One entry per offered security policy/mode combination.
    pub endpoint_security: Vec<EndpointSecurity>,
    /// Trust/issuer/revocation source for the certificate chain validator.
    pub certificate_store: Arc<dyn CertificateStore>,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Maximum concurrent subscriptions, across all sessions.
    pub max_subscriptions: usize,
    /// Maximum monitored items, across all subscriptions.
    pub max_monitored_items: usize,
    /// Floor clamped onto any client-requested session timeout.
    pub min_session_timeout: Duration,
    /// Ceiling clamped onto any client-requested session timeout.
    pub max_session_timeout: Duration,
    /// Upper bound on a SecureChannel's requested lifetime.
    pub max_channel_lifetime: Duration,
    /// Maximum chunks accepted per reassembled message.
    pub max_chunks_per_message: usize,
    /// Maximum bytes accepted per reassembled message.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Start a builder with defaults matching the protocol constants
    /// (spec.md §4, §6).
    pub fn builder(certificate_store: Arc<dyn CertificateStore>) -> ServerConfigBuilder {
        ServerConfigBuilder::new(certificate_store)
    }
}

/// Fluent builder for [`ServerConfig`].
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Start from a store and otherwise-default limits.
    pub fn new(certificate_store: Arc<dyn CertificateStore>) -> Self {
        Self {
            config: ServerConfig {
                endpoint_urls: Vec::new(),
                endpoint_security: Vec::new(),
                certificate_store,
                max_sessions: 100,
                max_subscriptions: 1000,
                max_monitored_items: 10_000,
                min_session_timeout: MIN_SESSION_TIMEOUT,
                max_session_timeout: MAX_SESSION_TIMEOUT,
                max_channel_lifetime: DEFAULT_CHANNEL_LIFETIME,
                max_chunks_per_message: DEFAULT_MAX_CHUNK_COUNT,
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            },
        }
    }

    /// Add a reachable endpoint URL.
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_urls.push(url.into());
        self
    }

    /// Offer one more security-policy/mode/certificate combination.
    pub fn endpoint_security(mut self, security: EndpointSecurity) -> Self {
        self.config.endpoint_security.push(security);
        self
    }

    /// Set the session cap.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Set the subscription cap.
    pub fn max_subscriptions(mut self, max: usize) -> Self {
        self.config.max_subscriptions = max;
        self
    }

    /// Set the monitored-item cap.
    pub fn max_monitored_items(mut self, max: usize) -> Self {
        self.config.max_monitored_items = max;
        self
    }

    /// Set the session timeout range.
    pub fn session_timeout_range(mut self, min: Duration, max: Duration) -> Self {
        self.config.min_session_timeout = min;
        self.config.max_session_timeout = max;
        self
    }

    /// Set the maximum SecureChannel lifetime.
    pub fn max_channel_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_channel_lifetime = lifetime;
        self
    }

    /// Set the maximum chunks accepted per message.
    pub fn max_chunks_per_message(mut self, max: usize) -> Self {
        self.config.max_chunks_per_message = max;
        self
    }

    /// Set the maximum bytes accepted per message.
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.config.max_message_size = max;
        self
    }

    /// Build the finished configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
