//! Wire bodies for the services registered into `Dispatcher<Server>`
//! (spec.md §4.8 "Read", "Write", "Browse", "Call"): decode the request,
//! call the matching `address_space` function, encode the response.
//!
//! Request type ids are the real OPC UA `_Encoding_DefaultBinary` numeric
//! identifiers (Part 6), so a real client's request lands on the right
//! handler without any translation layer.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::address_space::{
    add_node, browse, call, read_attribute, translate_browse_path, write_attribute, write_status, AttributeId,
    BrowseDescription, BrowseDirection, CallResult,
};
use crate::codec::{read_node_id, write_expanded_node_id, write_node_id, DataValue, Reader, RelativePathElement, Variant, Writer};
use crate::core::{CodecError, NodeId, StatusCode};
use crate::dispatch::RequestContext;
use crate::nodestore::Node;
use crate::session::IdentityToken;
use crate::subscriptions::{
    Acknowledgement, DataChangeFilter, DataChangeTrigger, Deadband, DiscardPolicy, EventFilter, EventFilterOperand,
    MonitoredItem, MonitoringFilter, NotificationMessage, Subscription, WhereClause,
};

use super::Server;

/// Look up the authentication token's session, refresh its activity
/// timestamp, and confirm it is bound to the channel the request arrived on
/// (spec.md §3 "Session is bound to the channel that activated it"). Called
/// by every service except CreateSession/ActivateSession/CloseSession.
fn require_active_session(server: &mut Server, req: &RequestContext, authentication_token: &NodeId) -> Result<(), StatusCode> {
    let session = server.sessions.touch(authentication_token).map_err(StatusCode::from)?;
    if session.channel_id != req.channel_id {
        return Err(StatusCode::BadSessionIdInvalid);
    }
    Ok(())
}

/// `CreateSessionRequest_Encoding_DefaultBinary`.
pub fn create_session_request_type_id() -> NodeId {
    NodeId::ns0(461)
}
/// `ActivateSessionRequest_Encoding_DefaultBinary`.
pub fn activate_session_request_type_id() -> NodeId {
    NodeId::ns0(467)
}
/// `CloseSessionRequest_Encoding_DefaultBinary`.
pub fn close_session_request_type_id() -> NodeId {
    NodeId::ns0(473)
}

/// `ReadRequest_Encoding_DefaultBinary`.
pub fn read_request_type_id() -> NodeId {
    NodeId::ns0(631)
}
/// `WriteRequest_Encoding_DefaultBinary`.
pub fn write_request_type_id() -> NodeId {
    NodeId::ns0(673)
}
/// `BrowseRequest_Encoding_DefaultBinary`.
pub fn browse_request_type_id() -> NodeId {
    NodeId::ns0(527)
}
/// `TranslateBrowsePathsToNodeIdsRequest_Encoding_DefaultBinary`.
pub fn translate_browse_paths_request_type_id() -> NodeId {
    NodeId::ns0(554)
}
/// `CallRequest_Encoding_DefaultBinary`.
pub fn call_request_type_id() -> NodeId {
    NodeId::ns0(712)
}
/// `AddNodesRequest_Encoding_DefaultBinary`.
pub fn add_nodes_request_type_id() -> NodeId {
    NodeId::ns0(488)
}

/// `CreateSubscriptionRequest_Encoding_DefaultBinary`.
pub fn create_subscription_request_type_id() -> NodeId {
    NodeId::ns0(787)
}
/// `CreateMonitoredItemsRequest_Encoding_DefaultBinary`.
pub fn create_monitored_items_request_type_id() -> NodeId {
    NodeId::ns0(751)
}
/// `PublishRequest_Encoding_DefaultBinary`.
pub fn publish_request_type_id() -> NodeId {
    NodeId::ns0(826)
}
/// `RepublishRequest_Encoding_DefaultBinary`.
pub fn republish_request_type_id() -> NodeId {
    NodeId::ns0(832)
}
/// `DeleteSubscriptionsRequest_Encoding_DefaultBinary`.
pub fn delete_subscriptions_request_type_id() -> NodeId {
    NodeId::ns0(845)
}

fn read_i32_len(r: &mut Reader) -> Result<usize, CodecError> {
    let len = r.read_i32()?;
    if len < 0 {
        return Ok(0);
    }
    Ok(len as usize)
}

fn read_value_id(r: &mut Reader) -> Result<(NodeId, u32, Option<String>), CodecError> {
    let node_id = read_node_id(r)?;
    let attribute_id = r.read_u32()?;
    let index_range = r.read_string()?;
    Ok((node_id, attribute_id, index_range))
}

/// Read (spec.md §4.8 "Read"): an authentication token, then a list of
/// (NodeId, AttributeId, IndexRange) triples in, one `DataValue` per item
/// out.
pub fn handle_read(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        let (node_id, attribute_id, index_range) = read_value_id(&mut r).map_err(StatusCode::from)?;
        let dv = match AttributeId::from_u32(attribute_id) {
            Ok(attr) => read_attribute(&server.nodestore, &node_id, attr, index_range.as_deref())
                .unwrap_or_else(|e| DataValue {
                    status: Some(StatusCode::from(e)),
                    ..Default::default()
                }),
            Err(_) => DataValue {
                status: Some(StatusCode::BadAttributeIdInvalid),
                ..Default::default()
            },
        };
        results.push(dv);
    }

    let mut w = Writer::new();
    w.write_i32(results.len() as i32).map_err(StatusCode::from)?;
    for dv in &results {
        dv.encode(&mut w).map_err(StatusCode::from)?;
    }
    Ok(w.into_bytes())
}

/// Write (spec.md §4.8 "Write"): an authentication token, then a list of
/// (NodeId, AttributeId, IndexRange, DataValue) quads in, one status code
/// per item out.
pub fn handle_write(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut statuses = Vec::with_capacity(count);
    for _ in 0..count {
        let (node_id, attribute_id, index_range) = read_value_id(&mut r).map_err(StatusCode::from)?;
        let dv = DataValue::decode(&mut r).map_err(StatusCode::from)?;
        let status = match AttributeId::from_u32(attribute_id) {
            Ok(attr) => {
                let result = write_attribute(&server.nodestore, &node_id, attr, index_range.as_deref(), dv);
                write_status(&result)
            }
            Err(_) => StatusCode::BadAttributeIdInvalid,
        };
        statuses.push(status);
    }

    let mut w = Writer::new();
    w.write_i32(statuses.len() as i32).map_err(StatusCode::from)?;
    for s in &statuses {
        w.write_u32(s.as_wire_code()).map_err(StatusCode::from)?;
    }
    Ok(w.into_bytes())
}

fn decode_browse_description(r: &mut Reader) -> Result<BrowseDescription, CodecError> {
    let node_id = read_node_id(r)?;
    let direction = match r.read_u8()? {
        0 => BrowseDirection::Forward,
        1 => BrowseDirection::Inverse,
        _ => BrowseDirection::Both,
    };
    let has_reference_type = r.read_bool()?;
    let reference_type_id = if has_reference_type { Some(read_node_id(r)?) } else { None };
    let include_subtypes = r.read_bool()?;
    let node_class_mask = r.read_u32()?;
    let max_references_per_node = r.read_u32()?;
    Ok(BrowseDescription {
        node_id,
        direction,
        reference_type_id,
        include_subtypes,
        node_class_mask,
        max_references_per_node,
    })
}

/// Browse (spec.md §4.8 "Browse"): an authentication token, then one or
/// more `BrowseDescription`s in, one result (status, reference list,
/// continuation point) per item out. A non-empty result tail becomes a
/// continuation point token clients pass back to BrowseNext.
pub fn handle_browse(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut w = Writer::new();
    w.write_i32(count as i32).map_err(StatusCode::from)?;
    for _ in 0..count {
        let description = decode_browse_description(&mut r).map_err(StatusCode::from)?;
        match browse(&server.nodestore, &description) {
            Ok((refs, rest)) => {
                w.write_u32(StatusCode::Good.as_wire_code()).map_err(StatusCode::from)?;
                let continuation_point = if rest.is_empty() {
                    None
                } else {
                    Some(server.continuation_points.create(rest))
                };
                w.write_byte_string(continuation_point.as_deref()).map_err(StatusCode::from)?;
                w.write_i32(refs.len() as i32).map_err(StatusCode::from)?;
                for rd in &refs {
                    write_node_id(&mut w, &rd.reference_type_id).map_err(StatusCode::from)?;
                    w.write_bool(rd.is_forward).map_err(StatusCode::from)?;
                    write_expanded_node_id(&mut w, &rd.target_node_id).map_err(StatusCode::from)?;
                    w.write_u16(rd.browse_name.0).map_err(StatusCode::from)?;
                    w.write_string(Some(&rd.browse_name.1)).map_err(StatusCode::from)?;
                    w.write_string(Some(&rd.display_name)).map_err(StatusCode::from)?;
                    w.write_i32(rd.node_class as i32).map_err(StatusCode::from)?;
                }
            }
            Err(e) => {
                w.write_u32(StatusCode::from(e).as_wire_code()).map_err(StatusCode::from)?;
                w.write_byte_string(None).map_err(StatusCode::from)?;
                w.write_i32(0).map_err(StatusCode::from)?;
            }
        }
    }
    Ok(w.into_bytes())
}

fn decode_relative_path_element(r: &mut Reader) -> Result<RelativePathElement, CodecError> {
    let reference_type_id = read_node_id(r)?;
    let include_subtypes = r.read_bool()?;
    let is_inverse = r.read_bool()?;
    let target_namespace = r.read_u16()?;
    let target_name = r.read_string()?.unwrap_or_default();
    Ok(RelativePathElement {
        reference_type_id,
        include_subtypes,
        is_inverse,
        target_namespace,
        target_name,
    })
}

/// TranslateBrowsePathsToNodeIds (spec.md §4.8): an authentication token,
/// then one starting node plus one relative path in, one resolved target
/// out.
pub fn handle_translate_browse_paths(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let path_count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut w = Writer::new();
    w.write_i32(path_count as i32).map_err(StatusCode::from)?;
    for _ in 0..path_count {
        let starting_node = read_node_id(&mut r).map_err(StatusCode::from)?;
        let element_count = read_i32_len(&mut r).map_err(StatusCode::from)?;
        let mut elements = Vec::with_capacity(element_count);
        for _ in 0..element_count {
            elements.push(decode_relative_path_element(&mut r).map_err(StatusCode::from)?);
        }
        let targets = translate_browse_path(&server.nodestore, &starting_node, &elements);
        w.write_i32(targets.len() as i32).map_err(StatusCode::from)?;
        for target in &targets {
            write_node_id(&mut w, &target.target_id).map_err(StatusCode::from)?;
            w.write_i32(target.remaining_path_index.map(|i| i as i32).unwrap_or(-1))
                .map_err(StatusCode::from)?;
        }
    }
    Ok(w.into_bytes())
}

fn encode_call_result(w: &mut Writer, status: StatusCode, result: Option<&CallResult>) -> Result<(), CodecError> {
    w.write_u32(status.as_wire_code())?;
    let input_results = result.map(|r| r.input_argument_results.as_slice()).unwrap_or(&[]);
    w.write_i32(input_results.len() as i32)?;
    for s in input_results {
        w.write_u32(s.as_wire_code())?;
    }
    let outputs = result.map(|r| r.output_arguments.as_slice()).unwrap_or(&[]);
    w.write_i32(outputs.len() as i32)?;
    for v in outputs {
        v.encode(w)?;
    }
    Ok(())
}

/// Call (spec.md §4.8 "Call (method)"): an authentication token, then one
/// or more method invocations in, one status/output-argument result per
/// item out.
pub fn handle_call(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut w = Writer::new();
    w.write_i32(count as i32).map_err(StatusCode::from)?;
    for _ in 0..count {
        let object_id = read_node_id(&mut r).map_err(StatusCode::from)?;
        let method_id = read_node_id(&mut r).map_err(StatusCode::from)?;
        let input_count = read_i32_len(&mut r).map_err(StatusCode::from)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(Variant::decode(&mut r).map_err(StatusCode::from)?);
        }
        match call(&server.nodestore, &object_id, &method_id, inputs) {
            Ok(result) => encode_call_result(&mut w, StatusCode::Good, Some(&result)).map_err(StatusCode::from)?,
            Err(e) => encode_call_result(&mut w, StatusCode::from(e), None).map_err(StatusCode::from)?,
        }
    }
    Ok(w.into_bytes())
}

/// AddNodes (spec.md §4.8 "AddNode"): an authentication token, then one or
/// more (parent, reference type, new node, type definition) requests in,
/// one (status, assigned NodeId) result per item out. Only a plain Object
/// node with a caller-supplied id is accepted here; the server never
/// invents browse names.
pub fn handle_add_nodes(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut w = Writer::new();
    w.write_i32(count as i32).map_err(StatusCode::from)?;
    for _ in 0..count {
        let parent = read_node_id(&mut r).map_err(StatusCode::from)?;
        let reference_type = read_node_id(&mut r).map_err(StatusCode::from)?;
        let requested_new_node_id = read_node_id(&mut r).map_err(StatusCode::from)?;
        let browse_namespace = r.read_u16().map_err(StatusCode::from)?;
        let browse_name = r.read_string().map_err(StatusCode::from)?.unwrap_or_default();
        let has_type_definition = r.read_bool().map_err(StatusCode::from)?;
        let type_definition = if has_type_definition {
            Some(read_node_id(&mut r).map_err(StatusCode::from)?)
        } else {
            None
        };

        let node = Node::object(requested_new_node_id, (browse_namespace, browse_name.clone()), browse_name);
        match add_node(&server.nodestore, &parent, reference_type, node, type_definition) {
            Ok(new_id) => {
                w.write_u32(StatusCode::Good.as_wire_code()).map_err(StatusCode::from)?;
                write_node_id(&mut w, &new_id).map_err(StatusCode::from)?;
            }
            Err(e) => {
                w.write_u32(StatusCode::from(e).as_wire_code()).map_err(StatusCode::from)?;
                write_node_id(&mut w, &NodeId::null()).map_err(StatusCode::from)?;
            }
        }
    }
    Ok(w.into_bytes())
}

const IDENTITY_KIND_ANONYMOUS: u8 = 0;
const IDENTITY_KIND_USER_NAME: u8 = 1;
const IDENTITY_KIND_X509: u8 = 2;

fn decode_identity_token(r: &mut Reader) -> Result<IdentityToken, CodecError> {
    match r.read_u8()? {
        IDENTITY_KIND_USER_NAME => {
            let user_name = r.read_string()?.unwrap_or_default();
            let encrypted_password = r.read_byte_string()?.unwrap_or_default();
            Ok(IdentityToken::UserName { user_name, encrypted_password })
        }
        IDENTITY_KIND_X509 => {
            let certificate_der = r.read_byte_string()?.unwrap_or_default();
            let signature = r.read_byte_string()?.unwrap_or_default();
            Ok(IdentityToken::X509 { certificate_der, signature })
        }
        IDENTITY_KIND_ANONYMOUS | _ => Ok(IdentityToken::Anonymous),
    }
}

/// CreateSession (spec.md §4.6): binds the new session to the channel the
/// request arrived on; ActivateSession rebinds it if the client later
/// activates over a different channel.
pub fn handle_create_session(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let _client_description = r.read_string().map_err(StatusCode::from)?;
    let _endpoint_url = r.read_string().map_err(StatusCode::from)?;
    let _session_name = r.read_string().map_err(StatusCode::from)?;
    let requested_timeout_ms = r.read_f64().map_err(StatusCode::from)?;
    let _client_nonce = r.read_byte_string().map_err(StatusCode::from)?;
    let client_certificate = r.read_byte_string().map_err(StatusCode::from)?;

    let (session_id, authentication_token, timeout) = server.sessions.create_session(
        req.channel_id,
        client_certificate,
        Duration::from_secs_f64((requested_timeout_ms / 1000.0).max(0.0)),
    );

    let mut w = Writer::new();
    write_node_id(&mut w, &session_id).map_err(StatusCode::from)?;
    write_node_id(&mut w, &authentication_token).map_err(StatusCode::from)?;
    w.write_f64(timeout.as_secs_f64() * 1000.0).map_err(StatusCode::from)?;
    w.write_byte_string(None).map_err(StatusCode::from)?;
    Ok(w.into_bytes())
}

/// ActivateSession (spec.md §4.6).
pub fn handle_activate_session(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    let identity = decode_identity_token(&mut r).map_err(StatusCode::from)?;

    let status = match server.sessions.activate_session(&authentication_token, req.channel_id, identity, None) {
        Ok(()) => StatusCode::Good,
        Err(e) => StatusCode::from(e),
    };

    let mut w = Writer::new();
    w.write_u32(status.as_wire_code()).map_err(StatusCode::from)?;
    Ok(w.into_bytes())
}

/// CloseSession (spec.md §4.6).
pub fn handle_close_session(server: &mut Server, _req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    let _delete_subscriptions = r.read_bool().map_err(StatusCode::from)?;

    let status = match server.sessions.close_session(&authentication_token) {
        Ok(_) => StatusCode::Good,
        Err(e) => StatusCode::from(e),
    };

    let mut w = Writer::new();
    w.write_u32(status.as_wire_code()).map_err(StatusCode::from)?;
    Ok(w.into_bytes())
}

fn decode_where_clause(r: &mut Reader) -> Result<WhereClause, CodecError> {
    match r.read_u8()? {
        1 => Ok(WhereClause::Equals(decode_filter_operand(r)?, decode_filter_operand(r)?)),
        2 => Ok(WhereClause::GreaterThan(decode_filter_operand(r)?, decode_filter_operand(r)?)),
        3 => Ok(WhereClause::And(Box::new(decode_where_clause(r)?), Box::new(decode_where_clause(r)?))),
        4 => Ok(WhereClause::Or(Box::new(decode_where_clause(r)?), Box::new(decode_where_clause(r)?))),
        _ => Ok(WhereClause::True),
    }
}

fn decode_filter_operand(r: &mut Reader) -> Result<EventFilterOperand, CodecError> {
    match r.read_u8()? {
        1 => Ok(EventFilterOperand::Attribute(r.read_string()?.unwrap_or_default())),
        _ => Ok(EventFilterOperand::Literal(Variant::decode(r)?)),
    }
}

/// Decode a monitoring filter: a data-change filter (trigger, deadband,
/// EURange) or an event filter (select clauses plus a where-clause tree),
/// tagged by a leading kind byte (spec.md §4.9 "Monitoring filter").
fn decode_monitoring_filter(r: &mut Reader) -> Result<MonitoringFilter, CodecError> {
    match r.read_u8()? {
        1 => {
            let select_count = read_i32_len(r)?;
            let mut select_clauses = Vec::with_capacity(select_count);
            for _ in 0..select_count {
                select_clauses.push(r.read_string()?.unwrap_or_default());
            }
            let where_clause = decode_where_clause(r)?;
            Ok(MonitoringFilter::Event(EventFilter { select_clauses, where_clause }))
        }
        _ => {
            let trigger = match r.read_u8()? {
                0 => DataChangeTrigger::Status,
                2 => DataChangeTrigger::StatusValueTimestamp,
                _ => DataChangeTrigger::StatusValue,
            };
            let deadband_kind = r.read_u8()?;
            let deadband_value = r.read_f64()?;
            let deadband = match deadband_kind {
                1 => Deadband::Absolute(deadband_value),
                2 => Deadband::Percent(deadband_value),
                _ => Deadband::None,
            };
            let range = (r.read_f64()?, r.read_f64()?);
            Ok(MonitoringFilter::DataChange(DataChangeFilter { trigger, deadband, range }))
        }
    }
}

fn encode_notification_message(w: &mut Writer, message: &NotificationMessage) -> Result<(), CodecError> {
    w.write_u32(message.sequence_number)?;
    w.write_i32(message.notifications.len() as i32)?;
    for notification in &message.notifications {
        w.write_u32(notification.client_handle)?;
        notification.value.encode(w)?;
    }
    Ok(())
}

/// CreateSubscription (spec.md §4.9): allocates a subscription id and
/// registers a new `Subscription` with the server's engine, returning the
/// (possibly revised) publishing parameters.
pub fn handle_create_subscription(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let requested_publishing_interval_ms = r.read_f64().map_err(StatusCode::from)?;
    let requested_lifetime_count = r.read_u32().map_err(StatusCode::from)?.max(1);
    let requested_max_keep_alive_count = r.read_u32().map_err(StatusCode::from)?.max(1);
    let max_notifications_per_publish = r.read_u32().map_err(StatusCode::from)?.max(1);
    let _publishing_enabled = r.read_bool().map_err(StatusCode::from)?;
    let _priority = r.read_u8().map_err(StatusCode::from)?;

    let subscription_id = server.next_subscription_id.fetch_add(1, Ordering::Relaxed);
    let publishing_interval = Duration::from_secs_f64((requested_publishing_interval_ms / 1000.0).max(0.0));
    server.subscriptions.add_subscription(Subscription::new(
        subscription_id,
        publishing_interval,
        requested_lifetime_count,
        requested_max_keep_alive_count,
        max_notifications_per_publish as usize,
    ));

    let mut w = Writer::new();
    w.write_u32(subscription_id).map_err(StatusCode::from)?;
    w.write_f64(publishing_interval.as_secs_f64() * 1000.0).map_err(StatusCode::from)?;
    w.write_u32(requested_lifetime_count).map_err(StatusCode::from)?;
    w.write_u32(requested_max_keep_alive_count).map_err(StatusCode::from)?;
    Ok(w.into_bytes())
}

/// CreateMonitoredItems (spec.md §4.9): attaches one or more monitored
/// items to an existing subscription, one (status, id, revised parameters)
/// result per item.
pub fn handle_create_monitored_items(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let subscription_id = r.read_u32().map_err(StatusCode::from)?;
    let _timestamps_to_return = r.read_u8().map_err(StatusCode::from)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut w = Writer::new();
    w.write_i32(count as i32).map_err(StatusCode::from)?;
    for _ in 0..count {
        let node_id = read_node_id(&mut r).map_err(StatusCode::from)?;
        let attribute_id = r.read_u32().map_err(StatusCode::from)?;
        let _index_range = r.read_string().map_err(StatusCode::from)?;
        let _monitoring_mode = r.read_u8().map_err(StatusCode::from)?;
        let client_handle = r.read_u32().map_err(StatusCode::from)?;
        let sampling_interval_ms = r.read_f64().map_err(StatusCode::from)?.max(0.0);
        let filter = decode_monitoring_filter(&mut r).map_err(StatusCode::from)?;
        let queue_size = r.read_u32().map_err(StatusCode::from)?.max(1);
        let discard_policy = match r.read_u8().map_err(StatusCode::from)? {
            1 => DiscardPolicy::DiscardNewest,
            _ => DiscardPolicy::DiscardOldest,
        };

        let monitored_item_id = server.next_monitored_item_id.fetch_add(1, Ordering::Relaxed);
        match server.subscriptions.subscription_mut(subscription_id) {
            Some(subscription) => {
                subscription.add_monitored_item(MonitoredItem::new(
                    monitored_item_id,
                    client_handle,
                    node_id,
                    attribute_id,
                    Duration::from_secs_f64(sampling_interval_ms / 1000.0),
                    filter,
                    queue_size as usize,
                    discard_policy,
                ));
                w.write_u32(StatusCode::Good.as_wire_code()).map_err(StatusCode::from)?;
                w.write_u32(monitored_item_id).map_err(StatusCode::from)?;
                w.write_f64(sampling_interval_ms).map_err(StatusCode::from)?;
                w.write_u32(queue_size).map_err(StatusCode::from)?;
            }
            None => {
                w.write_u32(StatusCode::BadSubscriptionIdInvalid.as_wire_code()).map_err(StatusCode::from)?;
                w.write_u32(0).map_err(StatusCode::from)?;
                w.write_f64(0.0).map_err(StatusCode::from)?;
                w.write_u32(0).map_err(StatusCode::from)?;
            }
        }
    }
    Ok(w.into_bytes())
}

/// Publish (spec.md §4.9 "Publish responses"): queues this request's
/// acknowledgements, samples every due monitored item, and returns whatever
/// the engine can immediately match against the newly queued request.
pub fn handle_publish(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let ack_count = read_i32_len(&mut r).map_err(StatusCode::from)?;
    let mut acknowledgements = Vec::with_capacity(ack_count);
    for _ in 0..ack_count {
        let subscription_id = r.read_u32().map_err(StatusCode::from)?;
        let sequence_number = r.read_u32().map_err(StatusCode::from)?;
        acknowledgements.push(Acknowledgement { subscription_id, sequence_number });
    }
    server.subscriptions.queue_publish_request(acknowledgements);

    let now = Instant::now();
    let nodestore = &server.nodestore;
    server.subscriptions.tick_sampling(now, |node_id, attribute_id| {
        let attribute = AttributeId::from_u32(attribute_id).ok()?;
        read_attribute(nodestore, node_id, attribute, None).ok()
    });
    let (responses, expired) = server.subscriptions.service_publish_requests();

    let mut w = Writer::new();
    w.write_i32(responses.len() as i32).map_err(StatusCode::from)?;
    for response in &responses {
        w.write_u32(response.subscription_id).map_err(StatusCode::from)?;
        encode_notification_message(&mut w, &response.message).map_err(StatusCode::from)?;
        w.write_i32(response.ack_results.len() as i32).map_err(StatusCode::from)?;
        for ok in &response.ack_results {
            w.write_bool(*ok).map_err(StatusCode::from)?;
        }
    }
    w.write_i32(expired.len() as i32).map_err(StatusCode::from)?;
    for id in &expired {
        w.write_u32(*id).map_err(StatusCode::from)?;
    }
    Ok(w.into_bytes())
}

/// Republish (spec.md §4.9 "Republish"): resend one previously issued
/// notification message by subscription id and sequence number.
pub fn handle_republish(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let subscription_id = r.read_u32().map_err(StatusCode::from)?;
    let retransmit_sequence_number = r.read_u32().map_err(StatusCode::from)?;

    let mut w = Writer::new();
    match server.subscriptions.republish(subscription_id, retransmit_sequence_number) {
        Ok(message) => {
            w.write_u32(StatusCode::Good.as_wire_code()).map_err(StatusCode::from)?;
            encode_notification_message(&mut w, &message).map_err(StatusCode::from)?;
        }
        Err(_) => {
            w.write_u32(StatusCode::BadMessageNotAvailable.as_wire_code()).map_err(StatusCode::from)?;
            let empty = NotificationMessage { sequence_number: 0, notifications: Vec::new() };
            encode_notification_message(&mut w, &empty).map_err(StatusCode::from)?;
        }
    }
    Ok(w.into_bytes())
}

/// DeleteSubscriptions (spec.md §4.9): remove one or more subscriptions by
/// id, one status per item.
pub fn handle_delete_subscriptions(server: &mut Server, req: &RequestContext, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    let mut r = Reader::new(body);
    let authentication_token = read_node_id(&mut r).map_err(StatusCode::from)?;
    require_active_session(server, req, &authentication_token)?;
    let count = read_i32_len(&mut r).map_err(StatusCode::from)?;

    let mut w = Writer::new();
    w.write_i32(count as i32).map_err(StatusCode::from)?;
    for _ in 0..count {
        let subscription_id = r.read_u32().map_err(StatusCode::from)?;
        let status = if server.subscriptions.remove_subscription(subscription_id).is_some() {
            StatusCode::Good
        } else {
            StatusCode::BadSubscriptionIdInvalid
        };
        w.write_u32(status.as_wire_code()).map_err(StatusCode::from)?;
    }
    Ok(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Scalar, Variant};
    use crate::nodestore::{InsertOptions as InsOpts, NodeBody, VariableValue};
    use crate::server::Server;

    fn server_with_variable() -> Server {
        let server = Server::in_memory_for_tests();
        server
            .nodestore
            .insert(
                Node {
                    node_id: NodeId::ns0(5000),
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
                InsOpts { unique: true },
            )
            .unwrap();
        server
    }

    const TEST_CHANNEL: u32 = 7;

    /// Create and activate an anonymous session bound to `TEST_CHANNEL`,
    /// returning its authentication token alongside the request context
    /// every session-bound handler now requires.
    fn activated_session(server: &mut Server) -> (RequestContext, NodeId) {
        let req = RequestContext { channel_id: TEST_CHANNEL };
        let (_session_id, token, _timeout) = server.sessions.create_session(TEST_CHANNEL, None, Duration::from_secs(30));
        server
            .sessions
            .activate_session(&token, TEST_CHANNEL, IdentityToken::Anonymous, None)
            .unwrap();
        (req, token)
    }

    fn encode_read_request(token: &NodeId, node_id: &NodeId, attribute_id: u32) -> Vec<u8> {
        let mut w = Writer::new();
        write_node_id(&mut w, token).unwrap();
        w.write_i32(1).unwrap();
        write_node_id(&mut w, node_id).unwrap();
        w.write_u32(attribute_id).unwrap();
        w.write_string(None).unwrap();
        w.into_bytes()
    }

    #[test]
    fn read_request_returns_cached_value() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);
        let body = encode_read_request(&token, &NodeId::ns0(5000), AttributeId::Value as u32);
        let response = handle_read(&mut server, &req, &body).unwrap();

        let mut r = Reader::new(&response);
        assert_eq!(r.read_i32().unwrap(), 1);
        let dv = DataValue::decode(&mut r).unwrap();
        assert_eq!(dv.value, Some(Variant::Scalar(Scalar::Double(21.5))));
    }

    #[test]
    fn read_without_a_session_is_rejected() {
        let mut server = server_with_variable();
        let req = RequestContext { channel_id: TEST_CHANNEL };
        let body = encode_read_request(&NodeId::ns0(999), &NodeId::ns0(5000), AttributeId::Value as u32);
        let err = handle_read(&mut server, &req, &body).unwrap_err();
        assert_eq!(err, StatusCode::BadSessionIdInvalid);
    }

    #[test]
    fn read_from_a_different_channel_than_activated_is_rejected() {
        let mut server = server_with_variable();
        let (_req, token) = activated_session(&mut server);
        let wrong_channel = RequestContext { channel_id: TEST_CHANNEL + 1 };
        let body = encode_read_request(&token, &NodeId::ns0(5000), AttributeId::Value as u32);
        let err = handle_read(&mut server, &wrong_channel, &body).unwrap_err();
        assert_eq!(err, StatusCode::BadSessionIdInvalid);
    }

    #[test]
    fn write_request_then_read_observes_new_value() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);

        let mut w = Writer::new();
        write_node_id(&mut w, &token).unwrap();
        w.write_i32(1).unwrap();
        write_node_id(&mut w, &NodeId::ns0(5000)).unwrap();
        w.write_u32(AttributeId::Value as u32).unwrap();
        w.write_string(None).unwrap();
        DataValue::of(Variant::Scalar(Scalar::Double(99.0))).encode(&mut w).unwrap();
        let write_body = w.into_bytes();

        let write_response = handle_write(&mut server, &req, &write_body).unwrap();
        let mut r = Reader::new(&write_response);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::Good);

        let read_body = encode_read_request(&token, &NodeId::ns0(5000), AttributeId::Value as u32);
        let read_response = handle_read(&mut server, &req, &read_body).unwrap();
        let mut r = Reader::new(&read_response);
        r.read_i32().unwrap();
        let dv = DataValue::decode(&mut r).unwrap();
        assert_eq!(dv.value, Some(Variant::Scalar(Scalar::Double(99.0))));
    }

    #[test]
    fn read_with_unknown_attribute_reports_bad_status_per_item() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);
        let body = encode_read_request(&token, &NodeId::ns0(5000), 9999);
        let response = handle_read(&mut server, &req, &body).unwrap();
        let mut r = Reader::new(&response);
        r.read_i32().unwrap();
        let dv = DataValue::decode(&mut r).unwrap();
        assert_eq!(dv.status, Some(StatusCode::BadAttributeIdInvalid));
    }

    #[test]
    fn create_session_binds_to_the_requesting_channel() {
        let mut server = Server::in_memory_for_tests();
        let req = RequestContext { channel_id: 42 };

        let mut body = Writer::new();
        body.write_string(None).unwrap();
        body.write_string(Some("opc.tcp://localhost")).unwrap();
        body.write_string(Some("session")).unwrap();
        body.write_f64(30_000.0).unwrap();
        body.write_byte_string(None).unwrap();
        body.write_byte_string(None).unwrap();

        let response = handle_create_session(&mut server, &req, &body.into_bytes()).unwrap();
        let mut r = Reader::new(&response);
        let _session_id = read_node_id(&mut r).unwrap();
        let authentication_token = read_node_id(&mut r).unwrap();

        let mut activate_body = Writer::new();
        write_node_id(&mut activate_body, &authentication_token).unwrap();
        activate_body.write_u8(IDENTITY_KIND_ANONYMOUS).unwrap();
        handle_activate_session(&mut server, &req, &activate_body.into_bytes()).unwrap();

        let read_req = RequestContext { channel_id: 42 };
        let read_body = encode_read_request(&authentication_token, &NodeId::ns0(2267), AttributeId::Value as u32);
        assert!(handle_read(&mut server, &read_req, &read_body).is_ok());

        let other_channel = RequestContext { channel_id: 43 };
        assert_eq!(
            handle_read(&mut server, &other_channel, &read_body).unwrap_err(),
            StatusCode::BadSessionIdInvalid
        );
    }

    fn encode_status_value_filter(w: &mut Writer) {
        w.write_u8(0).unwrap(); // DataChange
        w.write_u8(1).unwrap(); // StatusValue
        w.write_u8(0).unwrap(); // Deadband::None
        w.write_f64(0.0).unwrap();
        w.write_f64(0.0).unwrap();
        w.write_f64(0.0).unwrap();
    }

    #[test]
    fn subscription_lifecycle_samples_publishes_republishes_and_deletes() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);

        let mut sub_body = Writer::new();
        write_node_id(&mut sub_body, &token).unwrap();
        sub_body.write_f64(100.0).unwrap();
        sub_body.write_u32(10).unwrap();
        sub_body.write_u32(3).unwrap();
        sub_body.write_u32(100).unwrap();
        sub_body.write_bool(true).unwrap();
        sub_body.write_u8(0).unwrap();
        let sub_response = handle_create_subscription(&mut server, &req, &sub_body.into_bytes()).unwrap();
        let mut r = Reader::new(&sub_response);
        let subscription_id = r.read_u32().unwrap();
        let _revised_interval = r.read_f64().unwrap();
        let _revised_lifetime = r.read_u32().unwrap();
        let _revised_keep_alive = r.read_u32().unwrap();

        let mut item_body = Writer::new();
        write_node_id(&mut item_body, &token).unwrap();
        item_body.write_u32(subscription_id).unwrap();
        item_body.write_u8(0).unwrap();
        item_body.write_i32(1).unwrap();
        write_node_id(&mut item_body, &NodeId::ns0(5000)).unwrap();
        item_body.write_u32(AttributeId::Value as u32).unwrap();
        item_body.write_string(None).unwrap();
        item_body.write_u8(1).unwrap();
        item_body.write_u32(77).unwrap();
        item_body.write_f64(0.0).unwrap();
        encode_status_value_filter(&mut item_body);
        item_body.write_u32(10).unwrap();
        item_body.write_u8(0).unwrap();

        let item_response = handle_create_monitored_items(&mut server, &req, &item_body.into_bytes()).unwrap();
        let mut r = Reader::new(&item_response);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::Good);
        let _monitored_item_id = r.read_u32().unwrap();

        let mut publish_body = Writer::new();
        write_node_id(&mut publish_body, &token).unwrap();
        publish_body.write_i32(0).unwrap();
        let publish_response = handle_publish(&mut server, &req, &publish_body.into_bytes()).unwrap();
        let mut r = Reader::new(&publish_response);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), subscription_id);
        let sequence_number = r.read_u32().unwrap();
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), 77);
        let dv = DataValue::decode(&mut r).unwrap();
        assert_eq!(dv.value, Some(Variant::Scalar(Scalar::Double(21.5))));
        assert_eq!(r.read_i32().unwrap(), 0); // no acknowledgements carried on this request
        assert_eq!(r.read_i32().unwrap(), 0); // no expired subscriptions

        let mut republish_body = Writer::new();
        write_node_id(&mut republish_body, &token).unwrap();
        republish_body.write_u32(subscription_id).unwrap();
        republish_body.write_u32(sequence_number).unwrap();
        let republish_response = handle_republish(&mut server, &req, &republish_body.into_bytes()).unwrap();
        let mut r = Reader::new(&republish_response);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::Good);
        let (republished_sequence, _) = (r.read_u32().unwrap(), r.read_i32().unwrap());
        assert_eq!(republished_sequence, sequence_number);

        let mut delete_body = Writer::new();
        write_node_id(&mut delete_body, &token).unwrap();
        delete_body.write_i32(1).unwrap();
        delete_body.write_u32(subscription_id).unwrap();
        let delete_response = handle_delete_subscriptions(&mut server, &req, &delete_body.into_bytes()).unwrap();
        let mut r = Reader::new(&delete_response);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::Good);
    }

    #[test]
    fn create_monitored_items_with_unknown_subscription_reports_bad_subscription_id() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);

        let mut item_body = Writer::new();
        write_node_id(&mut item_body, &token).unwrap();
        item_body.write_u32(999).unwrap();
        item_body.write_u8(0).unwrap();
        item_body.write_i32(1).unwrap();
        write_node_id(&mut item_body, &NodeId::ns0(5000)).unwrap();
        item_body.write_u32(AttributeId::Value as u32).unwrap();
        item_body.write_string(None).unwrap();
        item_body.write_u8(1).unwrap();
        item_body.write_u32(1).unwrap();
        item_body.write_f64(0.0).unwrap();
        encode_status_value_filter(&mut item_body);
        item_body.write_u32(10).unwrap();
        item_body.write_u8(0).unwrap();

        let response = handle_create_monitored_items(&mut server, &req, &item_body.into_bytes()).unwrap();
        let mut r = Reader::new(&response);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::BadSubscriptionIdInvalid);
    }

    #[test]
    fn republish_with_unknown_sequence_number_reports_bad_message_not_available() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);

        let mut republish_body = Writer::new();
        write_node_id(&mut republish_body, &token).unwrap();
        republish_body.write_u32(1).unwrap();
        republish_body.write_u32(1).unwrap();
        let response = handle_republish(&mut server, &req, &republish_body.into_bytes()).unwrap();
        let mut r = Reader::new(&response);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::BadMessageNotAvailable);
    }

    #[test]
    fn delete_subscriptions_with_unknown_id_reports_bad_subscription_id() {
        let mut server = server_with_variable();
        let (req, token) = activated_session(&mut server);

        let mut delete_body = Writer::new();
        write_node_id(&mut delete_body, &token).unwrap();
        delete_body.write_i32(1).unwrap();
        delete_body.write_u32(999).unwrap();
        let response = handle_delete_subscriptions(&mut server, &req, &delete_body.into_bytes()).unwrap();
        let mut r = Reader::new(&response);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(StatusCode::from_wire_code(r.read_u32().unwrap()), StatusCode::BadSubscriptionIdInvalid);
    }
}
