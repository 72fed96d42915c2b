//! Request routing by type id (C10, spec.md §4.10).
//!
//! Maintains a mapping from a request's binary-encoding NodeId to a
//! (decoder, handler, encoder) triplet. The handler receives already-decoded
//! bytes and a caller-supplied context (the server's service state) and
//! returns already-encoded response bytes; all transport, security, and
//! session bookkeeping happens in C5/C6 around this call, not inside it.

use std::collections::HashMap;

use crate::core::{NodeId, StatusCode};

/// Per-request data the transport/channel layer knows and every service
/// handler needs, but that isn't itself part of the decoded request body
/// (spec.md §3 "Session is bound to the channel that activated it").
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// The SecureChannel the request arrived on.
    pub channel_id: u32,
}

/// A registered service: request type id, display name (for logging/faults),
/// and the boxed decode-handle-encode pipeline.
type ServiceFn<Ctx> = Box<dyn Fn(&mut Ctx, &RequestContext, &[u8]) -> Result<Vec<u8>, StatusCode> + Send + Sync>;

struct Route<Ctx> {
    name: &'static str,
    handle: ServiceFn<Ctx>,
}

/// A ServiceFault: the generic failure response for an unroutable or
/// failing request (spec.md §4.10 "Unknown request ids -> ServiceFault with
/// BadServiceUnsupported").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceFault {
    /// The status code explaining the fault.
    pub status: StatusCode,
}

/// The dispatcher's static request-type-id -> service mapping.
///
/// `Ctx` is the caller's service state (in this crate, `server::Server`);
/// routes close over it so each registered handler can read/mutate the
/// nodestore, session table, or subscription engine it needs.
pub struct Dispatcher<Ctx> {
    routes: HashMap<NodeId, Route<Ctx>>,
}

impl<Ctx> Dispatcher<Ctx> {
    /// Build an empty dispatcher.
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a service under its request type id.
    pub fn register(
        &mut self,
        request_type_id: NodeId,
        name: &'static str,
        handle: impl Fn(&mut Ctx, &RequestContext, &[u8]) -> Result<Vec<u8>, StatusCode> + Send + Sync + 'static,
    ) {
        self.routes.insert(
            request_type_id,
            Route {
                name,
                handle: Box::new(handle),
            },
        );
    }

    /// True when a service is registered for `request_type_id`.
    pub fn is_registered(&self, request_type_id: &NodeId) -> bool {
        self.routes.contains_key(request_type_id)
    }

    /// Look up the display name of a registered service, for logging.
    pub fn service_name(&self, request_type_id: &NodeId) -> Option<&'static str> {
        self.routes.get(request_type_id).map(|r| r.name)
    }

    /// Route `body` to the service registered for `request_type_id`.
    ///
    /// Unknown ids and handler failures both surface as a `ServiceFault`
    /// (spec.md §4.10); the caller maps that to the wire ServiceFault
    /// response.
    pub fn dispatch(
        &self,
        ctx: &mut Ctx,
        req: &RequestContext,
        request_type_id: &NodeId,
        body: &[u8],
    ) -> Result<Vec<u8>, ServiceFault> {
        match self.routes.get(request_type_id) {
            Some(route) => {
                tracing::debug!(service = route.name, "dispatching request");
                (route.handle)(ctx, req, body).map_err(|status| ServiceFault { status })
            }
            None => {
                tracing::warn!(?request_type_id, "no service registered for request type");
                Err(ServiceFault {
                    status: StatusCode::BadServiceUnsupported,
                })
            }
        }
    }
}

impl<Ctx> Default for Dispatcher<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_service_is_invoked() {
        let mut dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.register(NodeId::ns0(1), "Echo", |ctx, _req, body| {
            *ctx += 1;
            Ok(body.to_vec())
        });

        let mut ctx = 0u32;
        let req = RequestContext { channel_id: 7 };
        let result = dispatcher.dispatch(&mut ctx, &req, &NodeId::ns0(1), b"hello").unwrap();
        assert_eq!(result, b"hello");
        assert_eq!(ctx, 1);
    }

    #[test]
    fn unknown_request_type_is_a_service_fault() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let mut ctx = 0u32;
        let req = RequestContext { channel_id: 0 };
        let fault = dispatcher.dispatch(&mut ctx, &req, &NodeId::ns0(99), b"").unwrap_err();
        assert_eq!(fault.status, StatusCode::BadServiceUnsupported);
    }

    #[test]
    fn handler_failure_becomes_service_fault() {
        let mut dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.register(NodeId::ns0(2), "AlwaysFails", |_, _, _| Err(StatusCode::BadNotFound));
        let mut ctx = 0u32;
        let req = RequestContext { channel_id: 0 };
        let fault = dispatcher.dispatch(&mut ctx, &req, &NodeId::ns0(2), b"").unwrap_err();
        assert_eq!(fault.status, StatusCode::BadNotFound);
    }
}
