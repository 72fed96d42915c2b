//! The concrete OPC UA client (spec.md §4, §6): drives HEL/ACK,
//! OpenSecureChannel, CreateSession/ActivateSession, and the attribute
//! services (C1/C2/C3/C5) against a remote server over a chunk-framed
//! [`Connection`].
//!
//! This runtime's service bodies carry no RequestHeader/ResponseHeader
//! (see [`crate::server::services`] — a simplification shared by both
//! sides), so a request is just its NodeId-keyed type id followed by the
//! service body, and a response is just the body the matching handler
//! returned. [`Client::call_service`] is the one place that convention
//! lives on this side of the wire.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::address_space::{AttributeId, BrowseDescription, BrowseDirection, BrowsePathTarget, CallResult, ReferenceDescription};
use crate::channel::{SecureChannelEngine, TokenKeys};
use crate::chunk::{ChunkKind, MessageKind};
use crate::codec::{read_expanded_node_id, read_node_id, write_node_id, DataValue, Reader, RelativePathElement, Variant, Writer};
use crate::core::{
    ChannelError, CodecError, NodeId, StatusCode, TransportError, DEFAULT_CHANNEL_LIFETIME, DEFAULT_MAX_CHUNK_COUNT,
    DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SESSION_TIMEOUT,
};
use crate::crypto::SecurityPolicy;
use crate::nodestore::NodeClass;
use crate::session::IdentityToken;
use crate::subscriptions::{Acknowledgement, DataChangeTrigger, Deadband, DiscardPolicy, EventFilterOperand, MonitoringFilter, WhereClause};
use crate::transport::{AcknowledgeMessage, Connection, HelloMessage, PROTOCOL_VERSION};

/// Failure modes a client call can report.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport handshake or chunk I/O failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The SecureChannel engine rejected a handshake or renewal.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    /// A request or response body failed to encode/decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The server reported a Bad status for a service call.
    #[error("server reported {status:?} for {service}")]
    ServiceFault {
        /// The service that failed.
        service: &'static str,
        /// The status the server reported.
        status: StatusCode,
    },
    /// A reply carried a different message kind than was expected.
    #[error("unexpected message kind in server reply")]
    UnexpectedMessageKind,
    /// A call that needs an active session was made before one exists.
    #[error("no active session")]
    NoSession,
}

/// Request type ids this client speaks (the real OPC UA
/// `_Encoding_DefaultBinary` identifiers, matching
/// [`crate::server::services`] on the other end of the wire).
mod type_ids {
    use crate::core::NodeId;

    pub fn read() -> NodeId {
        NodeId::ns0(631)
    }
    pub fn write() -> NodeId {
        NodeId::ns0(673)
    }
    pub fn browse() -> NodeId {
        NodeId::ns0(527)
    }
    pub fn translate_browse_paths() -> NodeId {
        NodeId::ns0(554)
    }
    pub fn call() -> NodeId {
        NodeId::ns0(712)
    }
    pub fn add_nodes() -> NodeId {
        NodeId::ns0(488)
    }
    pub fn create_session() -> NodeId {
        NodeId::ns0(461)
    }
    pub fn activate_session() -> NodeId {
        NodeId::ns0(467)
    }
    pub fn close_session() -> NodeId {
        NodeId::ns0(473)
    }
    pub fn create_subscription() -> NodeId {
        NodeId::ns0(787)
    }
    pub fn create_monitored_items() -> NodeId {
        NodeId::ns0(751)
    }
    pub fn publish() -> NodeId {
        NodeId::ns0(826)
    }
    pub fn republish() -> NodeId {
        NodeId::ns0(832)
    }
    pub fn delete_subscriptions() -> NodeId {
        NodeId::ns0(845)
    }
}

/// What a connected client negotiated when opening its session
/// (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// The session id returned by CreateSession.
    pub session_id: NodeId,
    /// The opaque token every subsequent service call is (implicitly, on
    /// this runtime) addressed by.
    pub authentication_token: NodeId,
    /// The timeout the server actually granted.
    pub revised_timeout: Duration,
}

/// The one-shot parameters a client connects with.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The `opc.tcp://` endpoint URL to connect to.
    pub endpoint_url: String,
    /// Security policy to request for the SecureChannel.
    pub security_policy: SecurityPolicy,
    /// Requested SecureChannel lifetime (0 asks for the server default).
    pub requested_channel_lifetime: Duration,
    /// Requested session inactivity timeout.
    pub requested_session_timeout: Duration,
}

impl ClientConfig {
    /// A `SecurityPolicy::None` config with the protocol's default
    /// timeouts, naming only the endpoint to connect to.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            security_policy: SecurityPolicy::None,
            requested_channel_lifetime: DEFAULT_CHANNEL_LIFETIME,
            requested_session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// One Browse result: the references found plus an optional continuation
/// point for BrowseNext (spec.md §4.8 "Browse").
#[derive(Debug, Clone)]
pub struct BrowseResult {
    /// The service status for this description.
    pub status: StatusCode,
    /// Opaque token to resume with, if the node had more references than
    /// fit in one response.
    pub continuation_point: Option<Vec<u8>>,
    /// The references returned.
    pub references: Vec<ReferenceDescription>,
}

/// The publishing parameters CreateSubscription actually granted
/// (spec.md §4.9).
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionInfo {
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// The revised publishing interval.
    pub revised_publishing_interval: Duration,
    /// The revised lifetime counter.
    pub revised_lifetime_count: u32,
    /// The revised keep-alive counter.
    pub revised_max_keep_alive_count: u32,
}

/// One item to monitor, as requested by CreateMonitoredItems.
#[derive(Debug, Clone)]
pub struct MonitoredItemRequest {
    /// Node whose attribute is monitored.
    pub node_id: NodeId,
    /// Attribute id being monitored (usually `Value`).
    pub attribute_id: AttributeId,
    /// Client-chosen handle echoed back in notifications.
    pub client_handle: u32,
    /// Requested sampling interval.
    pub sampling_interval: Duration,
    /// The attached filter.
    pub filter: MonitoringFilter,
    /// Requested queue size.
    pub queue_size: u32,
    /// Behavior once the item's queue is full.
    pub discard_policy: DiscardPolicy,
}

/// One CreateMonitoredItems result.
#[derive(Debug, Clone, Copy)]
pub struct MonitoredItemResult {
    /// Per-item service status.
    pub status: StatusCode,
    /// Server-assigned monitored item id (0 on failure).
    pub monitored_item_id: u32,
    /// The revised sampling interval.
    pub revised_sampling_interval: Duration,
    /// The revised queue size.
    pub revised_queue_size: u32,
}

/// One subscription's notification batch delivered by Publish
/// (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct SubscriptionNotification {
    /// The subscription this batch reports on.
    pub subscription_id: u32,
    /// The batch's sequence number, used to acknowledge or Republish it.
    pub sequence_number: u32,
    /// (client handle, sampled value) pairs; empty for a keep-alive.
    pub notifications: Vec<(u32, DataValue)>,
    /// Per-acknowledgement result this Publish request carried.
    pub ack_results: Vec<bool>,
}

/// A connected OPC UA client: one TCP connection, one open SecureChannel,
/// and (once [`Client::create_session`]/[`Client::activate_session`] have
/// run) one active session.
pub struct Client<S> {
    connection: Connection<S>,
    channel: SecureChannelEngine,
    endpoint_url: String,
    session: Option<SessionInfo>,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Complete HEL/ACK and OpenSecureChannel (Issue mode) over `stream`,
    /// leaving the client ready for CreateSession.
    pub async fn connect(stream: S, config: &ClientConfig) -> Result<Self, ClientError> {
        let hello = HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: DEFAULT_MAX_CHUNK_SIZE as u32,
            send_buffer_size: DEFAULT_MAX_CHUNK_SIZE as u32,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE as u32,
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT as u32,
            endpoint_url: config.endpoint_url.clone(),
        };
        let (mut connection, _ack): (Connection<S>, AcknowledgeMessage) = Connection::connect(stream, hello).await?;
        debug!(endpoint = %config.endpoint_url, "HEL/ACK complete");

        let channel = open_secure_channel(&mut connection, config).await?;
        Ok(Self {
            connection,
            channel,
            endpoint_url: config.endpoint_url.clone(),
            session: None,
        })
    }

    /// The session established by [`Client::create_session`] and
    /// [`Client::activate_session`], if any.
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// CreateSession (spec.md §4.6).
    pub async fn create_session(&mut self, session_name: &str, requested_timeout: Duration) -> Result<(), ClientError> {
        let mut body = Writer::new();
        body.write_string(None)?; // client description: unused by this runtime's handler
        body.write_string(Some(&self.endpoint_url))?;
        body.write_string(Some(session_name))?;
        body.write_f64(requested_timeout.as_secs_f64() * 1000.0)?;
        body.write_byte_string(None)?; // client nonce: carried by OpenSecureChannel instead
        body.write_byte_string(None)?; // client certificate

        let response = self.call_service(type_ids::create_session(), "CreateSession", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let session_id = read_node_id(&mut r)?;
        let authentication_token = read_node_id(&mut r)?;
        let revised_timeout_ms = r.read_f64()?;
        let _server_nonce = r.read_byte_string()?;

        self.session = Some(SessionInfo {
            session_id,
            authentication_token,
            revised_timeout: Duration::from_secs_f64((revised_timeout_ms / 1000.0).max(0.0)),
        });
        Ok(())
    }

    /// ActivateSession (spec.md §4.6).
    pub async fn activate_session(&mut self, identity: IdentityToken) -> Result<(), ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();

        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        encode_identity_token(&mut body, &identity)?;

        let response = self.call_service(type_ids::activate_session(), "ActivateSession", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let status = StatusCode::from_wire_code(r.read_u32()?);
        fail_if_bad(status, "ActivateSession")
    }

    /// CloseSession (spec.md §4.6).
    pub async fn close_session(&mut self, delete_subscriptions: bool) -> Result<(), ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();

        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_bool(delete_subscriptions)?;

        let response = self.call_service(type_ids::close_session(), "CloseSession", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let status = StatusCode::from_wire_code(r.read_u32()?);
        self.session = None;
        fail_if_bad(status, "CloseSession")
    }

    /// Read (spec.md §4.8): one `DataValue` per (node, attribute) pair, in
    /// request order.
    pub async fn read(&mut self, items: &[(NodeId, AttributeId, Option<String>)]) -> Result<Vec<DataValue>, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(items.len() as i32)?;
        for (node_id, attribute_id, index_range) in items {
            write_node_id(&mut body, node_id)?;
            body.write_u32(*attribute_id as u32)?;
            body.write_string(index_range.as_deref())?;
        }

        let response = self.call_service(type_ids::read(), "Read", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let count = r.read_i32()?.max(0) as usize;
        (0..count).map(|_| DataValue::decode(&mut r).map_err(ClientError::from)).collect()
    }

    /// Write (spec.md §4.8): one status per (node, attribute, value) triple.
    pub async fn write(&mut self, items: &[(NodeId, AttributeId, Option<String>, DataValue)]) -> Result<Vec<StatusCode>, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(items.len() as i32)?;
        for (node_id, attribute_id, index_range, value) in items {
            write_node_id(&mut body, node_id)?;
            body.write_u32(*attribute_id as u32)?;
            body.write_string(index_range.as_deref())?;
            value.encode(&mut body)?;
        }

        let response = self.call_service(type_ids::write(), "Write", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let count = r.read_i32()?.max(0) as usize;
        (0..count).map(|_| Ok(StatusCode::from_wire_code(r.read_u32()?))).collect()
    }

    /// Browse (spec.md §4.8): one result (status, continuation point,
    /// references) per description.
    pub async fn browse(&mut self, descriptions: &[BrowseDescription]) -> Result<Vec<BrowseResult>, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(descriptions.len() as i32)?;
        for d in descriptions {
            encode_browse_description(&mut body, d)?;
        }

        let response = self.call_service(type_ids::browse(), "Browse", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let count = r.read_i32()?.max(0) as usize;
        (0..count).map(|_| decode_browse_result(&mut r)).collect()
    }

    /// TranslateBrowsePathsToNodeIds (spec.md §4.8): one target list per
    /// (starting node, relative path).
    pub async fn translate_browse_paths(
        &mut self,
        paths: &[(NodeId, Vec<RelativePathElement>)],
    ) -> Result<Vec<Vec<BrowsePathTarget>>, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(paths.len() as i32)?;
        for (starting_node, elements) in paths {
            write_node_id(&mut body, starting_node)?;
            body.write_i32(elements.len() as i32)?;
            for e in elements {
                encode_relative_path_element(&mut body, e)?;
            }
        }

        let response = self
            .call_service(type_ids::translate_browse_paths(), "TranslateBrowsePathsToNodeIds", body.into_bytes())
            .await?;
        let mut r = Reader::new(&response);
        let path_count = r.read_i32()?.max(0) as usize;
        let mut results = Vec::with_capacity(path_count);
        for _ in 0..path_count {
            let target_count = r.read_i32()?.max(0) as usize;
            let mut targets = Vec::with_capacity(target_count);
            for _ in 0..target_count {
                let target_id = read_node_id(&mut r)?;
                let remaining = r.read_i32()?;
                targets.push(BrowsePathTarget {
                    target_id,
                    remaining_path_index: if remaining < 0 { None } else { Some(remaining as u32) },
                });
            }
            results.push(targets);
        }
        Ok(results)
    }

    /// Call (spec.md §4.8 "Call (method)"): invoke one method, returning
    /// its output arguments and per-input-argument status.
    pub async fn call(&mut self, object_id: &NodeId, method_id: &NodeId, inputs: Vec<Variant>) -> Result<CallResult, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(1)?;
        write_node_id(&mut body, object_id)?;
        write_node_id(&mut body, method_id)?;
        body.write_i32(inputs.len() as i32)?;
        for v in &inputs {
            v.encode(&mut body)?;
        }

        let response = self.call_service(type_ids::call(), "Call", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let _count = r.read_i32()?;
        let status = StatusCode::from_wire_code(r.read_u32()?);
        let input_result_count = r.read_i32()?.max(0) as usize;
        let mut input_argument_results = Vec::with_capacity(input_result_count);
        for _ in 0..input_result_count {
            input_argument_results.push(StatusCode::from_wire_code(r.read_u32()?));
        }
        let output_count = r.read_i32()?.max(0) as usize;
        let mut output_arguments = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            output_arguments.push(Variant::decode(&mut r)?);
        }
        fail_if_bad(status, "Call")?;
        Ok(CallResult { output_arguments, input_argument_results })
    }

    /// AddNodes (spec.md §4.8 "AddNode"): add a plain Object node under
    /// `parent`, returning the assigned NodeId.
    pub async fn add_object_node(
        &mut self,
        parent: &NodeId,
        reference_type: &NodeId,
        requested_new_node_id: &NodeId,
        browse_name: (u16, &str),
        type_definition: Option<&NodeId>,
    ) -> Result<NodeId, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(1)?;
        write_node_id(&mut body, parent)?;
        write_node_id(&mut body, reference_type)?;
        write_node_id(&mut body, requested_new_node_id)?;
        body.write_u16(browse_name.0)?;
        body.write_string(Some(browse_name.1))?;
        body.write_bool(type_definition.is_some())?;
        if let Some(td) = type_definition {
            write_node_id(&mut body, td)?;
        }

        let response = self.call_service(type_ids::add_nodes(), "AddNodes", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let _count = r.read_i32()?;
        let status = StatusCode::from_wire_code(r.read_u32()?);
        let new_id = read_node_id(&mut r)?;
        fail_if_bad(status, "AddNodes")?;
        Ok(new_id)
    }

    /// CreateSubscription (spec.md §4.9): open a new subscription on the
    /// active session.
    pub async fn create_subscription(
        &mut self,
        publishing_interval: Duration,
        requested_lifetime_count: u32,
        requested_max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
    ) -> Result<SubscriptionInfo, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_f64(publishing_interval.as_secs_f64() * 1000.0)?;
        body.write_u32(requested_lifetime_count)?;
        body.write_u32(requested_max_keep_alive_count)?;
        body.write_u32(max_notifications_per_publish)?;
        body.write_bool(true)?; // publishing enabled
        body.write_u8(0)?; // priority: unused by this runtime

        let response = self.call_service(type_ids::create_subscription(), "CreateSubscription", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let subscription_id = r.read_u32()?;
        let revised_publishing_interval_ms = r.read_f64()?;
        let revised_lifetime_count = r.read_u32()?;
        let revised_max_keep_alive_count = r.read_u32()?;
        Ok(SubscriptionInfo {
            subscription_id,
            revised_publishing_interval: Duration::from_secs_f64((revised_publishing_interval_ms / 1000.0).max(0.0)),
            revised_lifetime_count,
            revised_max_keep_alive_count,
        })
    }

    /// CreateMonitoredItems (spec.md §4.9): attach monitored items to an
    /// existing subscription, one result per item in request order.
    pub async fn create_monitored_items(
        &mut self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> Result<Vec<MonitoredItemResult>, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_u32(subscription_id)?;
        body.write_u8(0)?; // timestamps to return: unused by this runtime
        body.write_i32(items.len() as i32)?;
        for item in items {
            write_node_id(&mut body, &item.node_id)?;
            body.write_u32(item.attribute_id as u32)?;
            body.write_string(None)?;
            body.write_u8(1)?; // monitoring mode: reporting, unused by this runtime
            body.write_u32(item.client_handle)?;
            body.write_f64(item.sampling_interval.as_secs_f64() * 1000.0)?;
            encode_monitoring_filter(&mut body, &item.filter)?;
            body.write_u32(item.queue_size)?;
            body.write_u8(match item.discard_policy {
                DiscardPolicy::DiscardOldest => 0,
                DiscardPolicy::DiscardNewest => 1,
            })?;
        }

        let response = self
            .call_service(type_ids::create_monitored_items(), "CreateMonitoredItems", body.into_bytes())
            .await?;
        let mut r = Reader::new(&response);
        let count = r.read_i32()?.max(0) as usize;
        let mut results = Vec::with_capacity(count);
        for _ in 0..count {
            let status = StatusCode::from_wire_code(r.read_u32()?);
            let monitored_item_id = r.read_u32()?;
            let revised_sampling_interval_ms = r.read_f64()?;
            let revised_queue_size = r.read_u32()?;
            results.push(MonitoredItemResult {
                status,
                monitored_item_id,
                revised_sampling_interval: Duration::from_secs_f64((revised_sampling_interval_ms / 1000.0).max(0.0)),
                revised_queue_size,
            });
        }
        Ok(results)
    }

    /// Publish (spec.md §4.9 "Publish responses"): acknowledge previously
    /// delivered notifications and collect whatever the server can report
    /// immediately, plus any subscriptions that expired server-side.
    pub async fn publish(
        &mut self,
        acknowledgements: &[Acknowledgement],
    ) -> Result<(Vec<SubscriptionNotification>, Vec<u32>), ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(acknowledgements.len() as i32)?;
        for ack in acknowledgements {
            body.write_u32(ack.subscription_id)?;
            body.write_u32(ack.sequence_number)?;
        }

        let response = self.call_service(type_ids::publish(), "Publish", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let response_count = r.read_i32()?.max(0) as usize;
        let mut notifications = Vec::with_capacity(response_count);
        for _ in 0..response_count {
            let subscription_id = r.read_u32()?;
            let (sequence_number, items) = decode_notification_message(&mut r)?;
            let ack_count = r.read_i32()?.max(0) as usize;
            let mut ack_results = Vec::with_capacity(ack_count);
            for _ in 0..ack_count {
                ack_results.push(r.read_bool()?);
            }
            notifications.push(SubscriptionNotification { subscription_id, sequence_number, notifications: items, ack_results });
        }
        let expired_count = r.read_i32()?.max(0) as usize;
        let mut expired = Vec::with_capacity(expired_count);
        for _ in 0..expired_count {
            expired.push(r.read_u32()?);
        }
        Ok((notifications, expired))
    }

    /// Republish (spec.md §4.9 "Republish"): resend one previously issued
    /// notification message by sequence number.
    pub async fn republish(&mut self, subscription_id: u32, sequence_number: u32) -> Result<(u32, Vec<(u32, DataValue)>), ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_u32(subscription_id)?;
        body.write_u32(sequence_number)?;

        let response = self.call_service(type_ids::republish(), "Republish", body.into_bytes()).await?;
        let mut r = Reader::new(&response);
        let status = StatusCode::from_wire_code(r.read_u32()?);
        let (returned_sequence, items) = decode_notification_message(&mut r)?;
        fail_if_bad(status, "Republish")?;
        Ok((returned_sequence, items))
    }

    /// DeleteSubscriptions (spec.md §4.9): remove one or more subscriptions
    /// by id, one status per item in request order.
    pub async fn delete_subscriptions(&mut self, subscription_ids: &[u32]) -> Result<Vec<StatusCode>, ClientError> {
        let authentication_token = self.require_session()?.authentication_token.clone();
        let mut body = Writer::new();
        write_node_id(&mut body, &authentication_token)?;
        body.write_i32(subscription_ids.len() as i32)?;
        for id in subscription_ids {
            body.write_u32(*id)?;
        }

        let response = self
            .call_service(type_ids::delete_subscriptions(), "DeleteSubscriptions", body.into_bytes())
            .await?;
        let mut r = Reader::new(&response);
        let count = r.read_i32()?.max(0) as usize;
        (0..count).map(|_| Ok(StatusCode::from_wire_code(r.read_u32()?))).collect()
    }

    /// CloseSecureChannel (spec.md §4.5 "State machine"). Consumes the
    /// client; the connection is not usable afterward.
    pub async fn close_secure_channel(mut self) -> Result<(), ClientError> {
        self.channel.request_close();
        self.connection.write_chunk(MessageKind::CloseSecureChannel, ChunkKind::Final, &[]).await?;
        Ok(())
    }

    fn require_session(&self) -> Result<&SessionInfo, ClientError> {
        self.session.as_ref().ok_or(ClientError::NoSession)
    }

    /// Send one request body prefixed with its type id over a `Message`
    /// chunk, and return the matching response body (see the module doc
    /// comment for the convention).
    async fn call_service(&mut self, request_type_id: NodeId, name: &'static str, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let mut framed = Writer::new();
        write_node_id(&mut framed, &request_type_id)?;
        framed.write_bytes(&body)?;
        let _sequence = self.channel.next_outgoing_sequence();

        self.connection.write_chunk(MessageKind::Message, ChunkKind::Final, &framed.into_bytes()).await?;
        debug!(service = name, "request sent");

        let (header, payload) = self.connection.read_chunk().await?;
        if header.message_kind != MessageKind::Message {
            return Err(ClientError::UnexpectedMessageKind);
        }
        let mut r = Reader::new(&payload);
        let status = StatusCode::from_wire_code(r.read_u32()?);
        let rest = r.read_bytes(r.remaining())?.to_vec();
        fail_if_bad(status, name)?;
        Ok(rest)
    }
}

async fn open_secure_channel<S>(connection: &mut Connection<S>, config: &ClientConfig) -> Result<SecureChannelEngine, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut engine = SecureChannelEngine::new(1, config.security_policy);
    engine.on_handshake_complete();
    let client_nonce = engine.adapter().generate_nonce();

    let mut request = Writer::new();
    request.write_byte_string(Some(&client_nonce))?;
    request.write_u32(config.requested_channel_lifetime.as_millis() as u32)?;
    connection
        .write_chunk(MessageKind::OpenSecureChannel, ChunkKind::Final, &request.into_bytes())
        .await?;

    let (header, payload) = connection.read_chunk().await?;
    if header.message_kind != MessageKind::OpenSecureChannel {
        return Err(ClientError::UnexpectedMessageKind);
    }
    let mut r = Reader::new(&payload);
    let _channel_id = r.read_u32()?;
    let _token_id = r.read_u32()?;
    let server_nonce = r.read_byte_string()?.unwrap_or_default();
    let revised_lifetime_ms = r.read_u32()?;

    let sending = engine
        .adapter()
        .derive_keys_from_nonces(&client_nonce, &server_nonce)
        .map_err(ChannelError::Crypto)?;
    let receiving = engine
        .adapter()
        .derive_keys_from_nonces(&server_nonce, &client_nonce)
        .map_err(ChannelError::Crypto)?;
    engine.open(TokenKeys { sending, receiving }, Duration::from_millis(revised_lifetime_ms as u64));

    Ok(engine)
}

fn fail_if_bad(status: StatusCode, service: &'static str) -> Result<(), ClientError> {
    if status.is_good() {
        Ok(())
    } else {
        Err(ClientError::ServiceFault { service, status })
    }
}

const IDENTITY_KIND_ANONYMOUS: u8 = 0;
const IDENTITY_KIND_USER_NAME: u8 = 1;
const IDENTITY_KIND_X509: u8 = 2;

fn encode_identity_token(w: &mut Writer, identity: &IdentityToken) -> Result<(), CodecError> {
    match identity {
        IdentityToken::Anonymous => w.write_u8(IDENTITY_KIND_ANONYMOUS),
        IdentityToken::UserName { user_name, encrypted_password } => {
            w.write_u8(IDENTITY_KIND_USER_NAME)?;
            w.write_string(Some(user_name))?;
            w.write_byte_string(Some(encrypted_password))
        }
        IdentityToken::X509 { certificate_der, signature } => {
            w.write_u8(IDENTITY_KIND_X509)?;
            w.write_byte_string(Some(certificate_der))?;
            w.write_byte_string(Some(signature))
        }
    }
}

fn encode_browse_description(w: &mut Writer, d: &BrowseDescription) -> Result<(), CodecError> {
    write_node_id(w, &d.node_id)?;
    w.write_u8(match d.direction {
        BrowseDirection::Forward => 0,
        BrowseDirection::Inverse => 1,
        BrowseDirection::Both => 2,
    })?;
    w.write_bool(d.reference_type_id.is_some())?;
    if let Some(rt) = &d.reference_type_id {
        write_node_id(w, rt)?;
    }
    w.write_bool(d.include_subtypes)?;
    w.write_u32(d.node_class_mask)?;
    w.write_u32(d.max_references_per_node)
}

fn encode_relative_path_element(w: &mut Writer, e: &RelativePathElement) -> Result<(), CodecError> {
    write_node_id(w, &e.reference_type_id)?;
    w.write_bool(e.include_subtypes)?;
    w.write_bool(e.is_inverse)?;
    w.write_u16(e.target_namespace)?;
    w.write_string(Some(&e.target_name))
}

fn encode_monitoring_filter(w: &mut Writer, filter: &MonitoringFilter) -> Result<(), CodecError> {
    match filter {
        MonitoringFilter::DataChange(f) => {
            w.write_u8(0)?;
            w.write_u8(match f.trigger {
                DataChangeTrigger::Status => 0,
                DataChangeTrigger::StatusValue => 1,
                DataChangeTrigger::StatusValueTimestamp => 2,
            })?;
            let (kind, value) = match f.deadband {
                Deadband::None => (0u8, 0.0),
                Deadband::Absolute(v) => (1u8, v),
                Deadband::Percent(v) => (2u8, v),
            };
            w.write_u8(kind)?;
            w.write_f64(value)?;
            w.write_f64(f.range.0)?;
            w.write_f64(f.range.1)
        }
        MonitoringFilter::Event(f) => {
            w.write_u8(1)?;
            w.write_i32(f.select_clauses.len() as i32)?;
            for clause in &f.select_clauses {
                w.write_string(Some(clause))?;
            }
            encode_where_clause(w, &f.where_clause)
        }
    }
}

fn encode_where_clause(w: &mut Writer, clause: &WhereClause) -> Result<(), CodecError> {
    match clause {
        WhereClause::True => w.write_u8(0),
        WhereClause::Equals(left, right) => {
            w.write_u8(1)?;
            encode_filter_operand(w, left)?;
            encode_filter_operand(w, right)
        }
        WhereClause::GreaterThan(left, right) => {
            w.write_u8(2)?;
            encode_filter_operand(w, left)?;
            encode_filter_operand(w, right)
        }
        WhereClause::And(left, right) => {
            w.write_u8(3)?;
            encode_where_clause(w, left)?;
            encode_where_clause(w, right)
        }
        WhereClause::Or(left, right) => {
            w.write_u8(4)?;
            encode_where_clause(w, left)?;
            encode_where_clause(w, right)
        }
    }
}

fn encode_filter_operand(w: &mut Writer, operand: &EventFilterOperand) -> Result<(), CodecError> {
    match operand {
        EventFilterOperand::Literal(v) => {
            w.write_u8(0)?;
            v.encode(w)
        }
        EventFilterOperand::Attribute(s) => {
            w.write_u8(1)?;
            w.write_string(Some(s))
        }
    }
}

fn decode_notification_message(r: &mut Reader) -> Result<(u32, Vec<(u32, DataValue)>), ClientError> {
    let sequence_number = r.read_u32()?;
    let count = r.read_i32()?.max(0) as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let client_handle = r.read_u32()?;
        let value = DataValue::decode(r)?;
        items.push((client_handle, value));
    }
    Ok((sequence_number, items))
}

fn decode_browse_result(r: &mut Reader) -> Result<BrowseResult, ClientError> {
    let status = StatusCode::from_wire_code(r.read_u32()?);
    let continuation_point = r.read_byte_string()?;
    let reference_count = r.read_i32()?.max(0) as usize;
    let mut references = Vec::with_capacity(reference_count);
    for _ in 0..reference_count {
        let reference_type_id = read_node_id(r)?;
        let is_forward = r.read_bool()?;
        let target_node_id = read_expanded_node_id(r)?;
        let browse_namespace = r.read_u16()?;
        let browse_name = r.read_string()?.unwrap_or_default();
        let display_name = r.read_string()?.unwrap_or_default();
        let node_class = node_class_from_i32(r.read_i32()?);
        references.push(ReferenceDescription {
            reference_type_id,
            is_forward,
            target_node_id,
            browse_name: (browse_namespace, browse_name),
            display_name,
            node_class,
            type_definition: None,
        });
    }
    Ok(BrowseResult { status, continuation_point, references })
}

/// Inverse of the plain `as i32` cast `handle_browse` applies to
/// [`NodeClass`]'s declaration order (Object first).
fn node_class_from_i32(v: i32) -> NodeClass {
    match v {
        1 => NodeClass::Variable,
        2 => NodeClass::Method,
        3 => NodeClass::ObjectType,
        4 => NodeClass::VariableType,
        5 => NodeClass::ReferenceType,
        6 => NodeClass::DataType,
        7 => NodeClass::View,
        _ => NodeClass::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::read_attribute;
    use crate::codec::Scalar;
    use crate::core::AddressSpaceError;
    use crate::nodestore::{InsertOptions, Node, NodeBody, NodeStore, VariableValue};
    use tokio::io::duplex;

    /// A minimal counterpart to [`Client`] that understands exactly the
    /// wire conventions [`Client`] speaks, driving a plain [`NodeStore`]
    /// instead of the full `server::Server` so these tests don't reach
    /// across the `client`/`server` feature boundary.
    async fn run_test_server(stream: impl AsyncRead + AsyncWrite + Unpin, store: std::sync::Arc<NodeStore>) {
        let ack = AcknowledgeMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: DEFAULT_MAX_CHUNK_SIZE as u32,
            send_buffer_size: DEFAULT_MAX_CHUNK_SIZE as u32,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE as u32,
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT as u32,
        };
        let (mut connection, _hello) = Connection::accept(stream, ack).await.unwrap();

        let (header, payload) = connection.read_chunk().await.unwrap();
        assert_eq!(header.message_kind, MessageKind::OpenSecureChannel);
        let mut r = Reader::new(&payload);
        let _client_nonce = r.read_byte_string().unwrap();
        let _requested_lifetime = r.read_u32().unwrap();

        let mut response = Writer::new();
        response.write_u32(7).unwrap(); // channel id
        response.write_u32(1).unwrap(); // token id
        response.write_byte_string(Some(b"server-nonce")).unwrap();
        response.write_u32(3_600_000).unwrap();
        connection
            .write_chunk(MessageKind::OpenSecureChannel, ChunkKind::Final, &response.into_bytes())
            .await
            .unwrap();

        loop {
            let Ok((header, payload)) = connection.read_chunk().await else { break };
            if header.message_kind == MessageKind::CloseSecureChannel {
                break;
            }
            let mut r = Reader::new(&payload);
            let request_type_id = read_node_id(&mut r).unwrap();
            let body = &payload[payload.len() - r.remaining()..];

            let reply_body = if request_type_id == type_ids::create_session() {
                let mut w = Writer::new();
                write_node_id(&mut w, &NodeId::numeric(1, 42)).unwrap();
                write_node_id(&mut w, &NodeId::numeric(1, 43)).unwrap();
                w.write_f64(30_000.0).unwrap();
                w.write_byte_string(None).unwrap();
                w.into_bytes()
            } else if request_type_id == type_ids::activate_session() {
                let mut w = Writer::new();
                w.write_u32(StatusCode::Good.as_wire_code()).unwrap();
                w.into_bytes()
            } else if request_type_id == type_ids::close_session() {
                let mut w = Writer::new();
                w.write_u32(StatusCode::Good.as_wire_code()).unwrap();
                w.into_bytes()
            } else if request_type_id == type_ids::read() {
                let mut br = Reader::new(body);
                let _authentication_token = read_node_id(&mut br).unwrap();
                let count = br.read_i32().unwrap().max(0) as usize;
                let mut w = Writer::new();
                w.write_i32(count as i32).unwrap();
                for _ in 0..count {
                    let node_id = read_node_id(&mut br).unwrap();
                    let _attribute_id = br.read_u32().unwrap();
                    let _index_range = br.read_string().unwrap();
                    let dv = read_attribute(&store, &node_id, AttributeId::Value, None).unwrap_or_else(|e: AddressSpaceError| DataValue {
                        status: Some(StatusCode::from(e)),
                        ..Default::default()
                    });
                    dv.encode(&mut w).unwrap();
                }
                w.into_bytes()
            } else if request_type_id == type_ids::write() {
                let mut br = Reader::new(body);
                let _authentication_token = read_node_id(&mut br).unwrap();
                let count = br.read_i32().unwrap().max(0) as usize;
                let mut w = Writer::new();
                w.write_i32(count as i32).unwrap();
                for _ in 0..count {
                    let node_id = read_node_id(&mut br).unwrap();
                    let _attribute_id = br.read_u32().unwrap();
                    let _index_range = br.read_string().unwrap();
                    let dv = DataValue::decode(&mut br).unwrap();
                    let result = crate::address_space::write_attribute(&store, &node_id, AttributeId::Value, None, dv);
                    w.write_u32(crate::address_space::write_status(&result).as_wire_code()).unwrap();
                }
                w.into_bytes()
            } else {
                let mut w = Writer::new();
                w.write_i32(0).unwrap();
                w.into_bytes()
            };

            let mut framed = Writer::new();
            framed.write_u32(StatusCode::Good.as_wire_code()).unwrap();
            framed.write_bytes(&reply_body).unwrap();
            connection
                .write_chunk(MessageKind::Message, ChunkKind::Final, &framed.into_bytes())
                .await
                .unwrap();
        }
    }

    fn store_with_variable() -> std::sync::Arc<NodeStore> {
        let store = std::sync::Arc::new(NodeStore::new());
        store
            .insert(
                Node {
                    node_id: NodeId::numeric(1, 100),
                    browse_name: (1, "Temp".into()),
                    display_name: "Temp".into(),
                    description: None,
                    references: Vec::new(),
                    body: NodeBody::Variable {
                        value: VariableValue::Cached(DataValue::of(Variant::Scalar(Scalar::Double(21.5)))),
                        data_type: NodeId::ns0(11),
                        value_rank: -1,
                        array_dimensions: Vec::new(),
                        writable: true,
                    },
                },
                InsertOptions { unique: true },
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn connect_create_session_and_read() {
        let (client_stream, server_stream) = duplex(8192);
        let store = store_with_variable();

        let server_store = store.clone();
        let server = tokio::spawn(async move { run_test_server(server_stream, server_store).await });

        let config = ClientConfig::new("opc.tcp://localhost:4840");
        let mut client = Client::connect(client_stream, &config).await.unwrap();
        client.create_session("test-session", Duration::from_secs(30)).await.unwrap();
        assert!(client.session().is_some());
        client.activate_session(IdentityToken::Anonymous).await.unwrap();

        let values = client.read(&[(NodeId::numeric(1, 100), AttributeId::Value, None)]).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, Some(Variant::Scalar(Scalar::Double(21.5))));

        client.close_session(false).await.unwrap();
        client.close_secure_channel().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn write_then_read_back_observes_new_value() {
        let (client_stream, server_stream) = duplex(8192);
        let store = store_with_variable();

        let server_store = store.clone();
        let server = tokio::spawn(async move { run_test_server(server_stream, server_store).await });

        let config = ClientConfig::new("opc.tcp://localhost:4840");
        let mut client = Client::connect(client_stream, &config).await.unwrap();
        client.create_session("test-session", Duration::from_secs(30)).await.unwrap();
        client.activate_session(IdentityToken::Anonymous).await.unwrap();

        let statuses = client
            .write(&[(
                NodeId::numeric(1, 100),
                AttributeId::Value,
                None,
                DataValue::of(Variant::Scalar(Scalar::Double(99.0))),
            )])
            .await
            .unwrap();
        assert_eq!(statuses, vec![StatusCode::Good]);

        let values = client.read(&[(NodeId::numeric(1, 100), AttributeId::Value, None)]).await.unwrap();
        assert_eq!(values[0].value, Some(Variant::Scalar(Scalar::Double(99.0))));

        client.close_secure_channel().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_before_session_is_rejected() {
        let (client_stream, server_stream) = duplex(8192);
        let store = store_with_variable();
        let server = tokio::spawn(async move { run_test_server(server_stream, store).await });

        let config = ClientConfig::new("opc.tcp://localhost:4840");
        let mut client = Client::connect(client_stream, &config).await.unwrap();
        assert!(matches!(client.activate_session(IdentityToken::Anonymous).await, Err(ClientError::NoSession)));

        client.close_secure_channel().await.unwrap();
        server.await.unwrap();
    }
}
