//! The subscription engine (C9, spec.md §4.9): monitored items, the
//! publishing timer tick, and Publish/Republish request handling.

mod monitored_item;
mod publish;
mod subscription;

pub use monitored_item::{
    DataChangeFilter, DataChangeTrigger, Deadband, DiscardPolicy, EventFilter, EventFilterOperand,
    MonitoredItem, MonitoredItemNotification, MonitoringFilter, WhereClause,
};
pub use publish::{Acknowledgement, PublishResponse, SubscriptionEngine};
pub use subscription::{NotificationMessage, Subscription};
