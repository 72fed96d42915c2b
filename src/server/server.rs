//! The concrete OPC UA server: owns the address space, channel table,
//! session manager, subscription engine, and dispatcher as explicit fields
//! (spec.md §4, §5, §9 "Global mutable state" rewrite note, §10).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::address_space::ContinuationPointStore;
use crate::certs::{CertificateStore, MemoryCertificateStore};
use crate::channel::{SecureChannelEngine, TokenKeys};
use crate::core::{AddressSpaceError, ChannelError, NodeId, DEFAULT_CHANNEL_LIFETIME, FIRST_CHANNEL_ID};
use crate::crypto::SecurityPolicy;
use crate::dispatch::{Dispatcher, RequestContext, ServiceFault};
use crate::nodestore::NodeStore;
use crate::session::{DenyAllUsers, IdentityPolicy, SessionManager};
use crate::subscriptions::SubscriptionEngine;

use super::channel_table::ChannelTable;
use super::config::ServerConfig;
use super::namespace0::{self, ServerRuntimeStatus};
use super::services;

/// Everything one running server instance owns (spec.md §4 "server process
/// owns one address space, one channel table, one session manager";
/// spec.md §9 rewrite note: no module-level globals, every piece of state
/// is reachable only through a `Server` value).
pub struct Server {
    /// Static and per-endpoint configuration.
    pub config: ServerConfig,
    /// The address space nodes are read from and written to.
    pub nodestore: NodeStore,
    /// Live SecureChannels, keyed by channel id.
    pub channel_table: ChannelTable,
    /// Outstanding Browse continuation points.
    pub continuation_points: ContinuationPointStore,
    /// Client sessions.
    pub sessions: SessionManager,
    /// Per-session subscriptions and pending Publish requests.
    pub subscriptions: SubscriptionEngine,
    /// Live namespace-0 status counters (ServerStatus/ServiceLevel stand-ins).
    pub runtime_status: ServerRuntimeStatus,
    /// Request-type-id -> service mapping. `None` only while a request is
    /// being dispatched (see [`Server::dispatch_request`]); registered
    /// handlers take `&mut Server`, so routing a request must briefly move
    /// the dispatcher out before it can hand the server back to itself.
    dispatcher: Option<Dispatcher<Server>>,
    next_channel_id: AtomicU32,
    next_subscription_id: AtomicU32,
    next_monitored_item_id: AtomicU32,
}

impl Server {
    /// Build a server over a fresh address space, registering the default
    /// services and bootstrapping the namespace-0 status nodes.
    pub fn new(config: ServerConfig, identity_policy: IdentityPolicy) -> Result<Self, AddressSpaceError> {
        let nodestore = NodeStore::new();
        let runtime_status = namespace0::bootstrap(&nodestore, vec!["http://opcfoundation.org/UA/".to_string()])?;

        Ok(Self {
            config,
            nodestore,
            channel_table: ChannelTable::new(),
            continuation_points: ContinuationPointStore::new(),
            sessions: SessionManager::new(identity_policy, Box::new(DenyAllUsers)),
            subscriptions: SubscriptionEngine::new(),
            runtime_status,
            dispatcher: Some(default_dispatcher()),
            next_channel_id: AtomicU32::new(FIRST_CHANNEL_ID),
            next_subscription_id: AtomicU32::new(1),
            next_monitored_item_id: AtomicU32::new(1),
        })
    }

    /// A server with an in-memory certificate store and no endpoints
    /// configured, for unit tests that only exercise the address space and
    /// service handlers.
    pub fn in_memory_for_tests() -> Self {
        let store: Arc<dyn CertificateStore> = Arc::new(MemoryCertificateStore::default());
        let config = ServerConfig::builder(store).build();
        Self::new(config, IdentityPolicy::default()).expect("bootstrap of a fresh nodestore cannot fail")
    }

    /// Route one decoded request body to its registered service
    /// (spec.md §4.10). `channel_id` is the SecureChannel the request
    /// arrived on (spec.md §3 "Session is bound to the channel that
    /// activated it") and is threaded to every handler as a
    /// [`RequestContext`]. Temporarily takes ownership of the dispatcher so
    /// the handler it invokes can mutate the rest of `self`.
    pub fn dispatch_request(&mut self, channel_id: u32, request_type_id: &NodeId, body: &[u8]) -> Result<Vec<u8>, ServiceFault> {
        let dispatcher = self.dispatcher.take().expect("dispatcher always present between calls");
        let req = RequestContext { channel_id };
        let result = dispatcher.dispatch(self, &req, request_type_id, body);
        self.dispatcher = Some(dispatcher);
        result
    }

    /// True when a service is registered for `request_type_id`, for
    /// capability checks (e.g. building a GetEndpoints response) that must
    /// not themselves recurse into dispatch.
    pub fn has_service(&self, request_type_id: &NodeId) -> bool {
        self.dispatcher
            .as_ref()
            .expect("dispatcher always present between calls")
            .is_registered(request_type_id)
    }

    /// OpenSecureChannel, "Issue" mode (spec.md §4.5 "Open"): allocates a
    /// channel id, derives the first token's keys from the two nonces, and
    /// registers the new engine in [`ChannelTable`]. Returns the channel id,
    /// token id, this side's nonce, and the revised lifetime.
    pub fn open_secure_channel(
        &self,
        policy: SecurityPolicy,
        client_nonce: &[u8],
        requested_lifetime: Duration,
    ) -> Result<(u32, u32, Vec<u8>, Duration), ChannelError> {
        let channel_id = self.next_channel_id.fetch_add(1, Ordering::Relaxed).max(FIRST_CHANNEL_ID);
        let mut engine = SecureChannelEngine::new(channel_id, policy);

        let server_nonce = engine.adapter().generate_nonce();
        let sending = engine.adapter().derive_keys_from_nonces(client_nonce, &server_nonce)?;
        let receiving = engine.adapter().derive_keys_from_nonces(&server_nonce, client_nonce)?;

        let lifetime = if requested_lifetime.is_zero() {
            DEFAULT_CHANNEL_LIFETIME
        } else {
            requested_lifetime
        };
        let token_id = engine.open(TokenKeys { sending, receiving }, lifetime);
        self.channel_table.insert(engine);

        Ok((channel_id, token_id, server_nonce, lifetime))
    }

    /// CloseSecureChannel (spec.md §4.5 "State machine"): drops the
    /// channel's bookkeeping entry. Idempotent on an already-unknown id.
    pub fn close_secure_channel(&self, channel_id: u32) {
        self.channel_table.remove(channel_id);
    }
}

/// Build a dispatcher with the default Read/Write/Browse/
/// TranslateBrowsePathsToNodeIds/Call/AddNodes services registered
/// (spec.md §4.8, §4.10).
pub fn default_dispatcher() -> Dispatcher<Server> {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(services::read_request_type_id(), "Read", services::handle_read);
    dispatcher.register(services::write_request_type_id(), "Write", services::handle_write);
    dispatcher.register(services::browse_request_type_id(), "Browse", services::handle_browse);
    dispatcher.register(
        services::translate_browse_paths_request_type_id(),
        "TranslateBrowsePathsToNodeIds",
        services::handle_translate_browse_paths,
    );
    dispatcher.register(services::call_request_type_id(), "Call", services::handle_call);
    dispatcher.register(services::add_nodes_request_type_id(), "AddNodes", services::handle_add_nodes);
    dispatcher.register(
        services::create_session_request_type_id(),
        "CreateSession",
        services::handle_create_session,
    );
    dispatcher.register(
        services::activate_session_request_type_id(),
        "ActivateSession",
        services::handle_activate_session,
    );
    dispatcher.register(
        services::close_session_request_type_id(),
        "CloseSession",
        services::handle_close_session,
    );
    dispatcher.register(
        services::create_subscription_request_type_id(),
        "CreateSubscription",
        services::handle_create_subscription,
    );
    dispatcher.register(
        services::create_monitored_items_request_type_id(),
        "CreateMonitoredItems",
        services::handle_create_monitored_items,
    );
    dispatcher.register(services::publish_request_type_id(), "Publish", services::handle_publish);
    dispatcher.register(services::republish_request_type_id(), "Republish", services::handle_republish);
    dispatcher.register(
        services::delete_subscriptions_request_type_id(),
        "DeleteSubscriptions",
        services::handle_delete_subscriptions,
    );
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dispatcher_has_services_registered() {
        let dispatcher = default_dispatcher();
        assert!(dispatcher.is_registered(&services::read_request_type_id()));
        assert!(dispatcher.is_registered(&services::call_request_type_id()));
    }

    #[test]
    fn bootstrap_populates_the_server_object() {
        let server = Server::in_memory_for_tests();
        assert!(server.nodestore.get(&NodeId::ns0(2253)).is_some());
    }

    #[test]
    fn dispatch_request_routes_a_read_request_into_the_server() {
        let mut server = Server::in_memory_for_tests();
        let channel_id = 1;
        let (_session_id, token, _timeout) =
            server.sessions.create_session(channel_id, None, Duration::from_secs(30));
        server
            .sessions
            .activate_session(&token, channel_id, crate::session::IdentityToken::Anonymous, None)
            .unwrap();

        let mut w = crate::codec::Writer::new();
        crate::codec::write_node_id(&mut w, &token).unwrap();
        w.write_i32(1).unwrap();
        crate::codec::write_node_id(&mut w, &NodeId::ns0(2267)).unwrap();
        w.write_u32(crate::address_space::AttributeId::Value as u32).unwrap();
        w.write_string(None).unwrap();
        let body = w.into_bytes();

        let response = server
            .dispatch_request(channel_id, &services::read_request_type_id(), &body)
            .unwrap();
        let mut r = crate::codec::Reader::new(&response);
        assert_eq!(r.read_i32().unwrap(), 1);
    }

    #[test]
    fn dispatch_request_reports_service_fault_for_unknown_type() {
        let mut server = Server::in_memory_for_tests();
        let fault = server.dispatch_request(0, &NodeId::ns0(99_999), &[]).unwrap_err();
        assert_eq!(fault.status, crate::core::StatusCode::BadServiceUnsupported);
    }

    #[test]
    fn open_secure_channel_registers_a_channel() {
        let server = Server::in_memory_for_tests();
        let (channel_id, token_id, server_nonce, _lifetime) = server
            .open_secure_channel(crate::crypto::SecurityPolicy::None, b"client-nonce", Duration::from_secs(0))
            .unwrap();
        assert_ne!(channel_id, 0);
        assert_ne!(token_id, 0);
        assert!(!server_nonce.is_empty());
        assert_eq!(server.channel_table.len(), 1);

        server.close_secure_channel(channel_id);
        assert!(server.channel_table.is_empty());
    }
}
