//! Request dispatch (C10, spec.md §4.10): a static request-type-id -> service
//! mapping, plus the `ServiceFault` produced for an unroutable request.

mod registry;

pub use registry::{Dispatcher, RequestContext, ServiceFault};
