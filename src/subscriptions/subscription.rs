//! One subscription: its monitored items, publishing counters, and
//! retransmission queue (spec.md §4.9).

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::core::SessionError;

use super::monitored_item::{MonitoredItem, MonitoredItemNotification};

/// A batch of notifications assigned one sequence number, sent to the
/// client in a Publish response (spec.md §4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// Monotonically increasing per-subscription sequence number.
    pub sequence_number: u32,
    /// Data-change notifications carried in this message; empty for a
    /// keep-alive.
    pub notifications: Vec<MonitoredItemNotification>,
}

impl NotificationMessage {
    /// True for a keep-alive (no notifications) message.
    pub fn is_keep_alive(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// One subscription: a publishing timer, monitored items, and the
/// retransmission queue used by acks/Republish (spec.md §4.9).
pub struct Subscription {
    /// Server-assigned subscription id.
    pub id: u32,
    /// Requested publishing interval.
    pub publishing_interval: Duration,
    /// Max notifications drained into one NotificationMessage.
    pub max_notifications_per_publish: usize,
    /// Whether publishing is currently enabled.
    pub publishing_enabled: bool,

    max_lifetime_count: u32,
    max_keep_alive_count: u32,
    lifetime_counter: u32,
    keep_alive_counter: u32,

    monitored_items: HashMap<u32, MonitoredItem>,
    retransmission: BTreeMap<u32, NotificationMessage>,
    next_sequence_number: u32,
}

impl Subscription {
    /// Build a new subscription with full lifetime/keep-alive counters.
    pub fn new(
        id: u32,
        publishing_interval: Duration,
        max_lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: usize,
    ) -> Self {
        Self {
            id,
            publishing_interval,
            max_notifications_per_publish,
            publishing_enabled: true,
            max_lifetime_count,
            max_keep_alive_count,
            lifetime_counter: max_lifetime_count,
            keep_alive_counter: max_keep_alive_count,
            monitored_items: HashMap::new(),
            retransmission: BTreeMap::new(),
            next_sequence_number: 1,
        }
    }

    /// Add a monitored item, keyed by its own id.
    pub fn add_monitored_item(&mut self, item: MonitoredItem) {
        self.monitored_items.insert(item.id, item);
    }

    /// Remove a monitored item by id.
    pub fn remove_monitored_item(&mut self, id: u32) -> Option<MonitoredItem> {
        self.monitored_items.remove(&id)
    }

    /// Number of currently registered monitored items.
    pub fn monitored_item_count(&self) -> usize {
        self.monitored_items.len()
    }

    /// Sample every monitored item whose interval has elapsed, using
    /// `read_value` to fetch the current attribute value (spec.md §4.9 "On
    /// each tick: sample each monitored item whose sampling interval has
    /// elapsed").
    pub fn sample_due_items(
        &mut self,
        now: Instant,
        mut read_value: impl FnMut(&crate::core::NodeId, u32) -> Option<crate::codec::DataValue>,
    ) {
        if !self.publishing_enabled {
            return;
        }
        for item in self.monitored_items.values_mut() {
            if item.due(now) {
                if let Some(value) = read_value(&item.node_id, item.attribute_id) {
                    item.sample(now, value);
                }
            }
        }
    }

    fn any_item_has_pending(&self) -> bool {
        self.monitored_items.values().any(|i| i.has_pending())
    }

    /// Drain pending notifications across all items (bounded by
    /// `max_notifications_per_publish`) into a new NotificationMessage, or
    /// produce a keep-alive if the keep-alive counter has elapsed
    /// (spec.md §4.9 "if no notifications and keep-alive counter reached,
    /// send a keep-alive").
    ///
    /// Returns `None` when a Publish response should not be sent yet.
    pub fn drain_for_publish(&mut self) -> Option<NotificationMessage> {
        if self.any_item_has_pending() {
            let mut collected = Vec::new();
            'outer: for item in self.monitored_items.values_mut() {
                for notification in item.drain(self.max_notifications_per_publish - collected.len()) {
                    collected.push(notification);
                    if collected.len() >= self.max_notifications_per_publish {
                        break 'outer;
                    }
                }
            }
            let message = NotificationMessage {
                sequence_number: self.next_sequence_number,
                notifications: collected,
            };
            self.next_sequence_number += 1;
            self.retransmission.insert(message.sequence_number, message.clone());
            self.lifetime_counter = self.max_lifetime_count;
            self.keep_alive_counter = self.max_keep_alive_count;
            return Some(message);
        }

        if self.keep_alive_counter == 0 {
            let message = NotificationMessage {
                sequence_number: self.next_sequence_number,
                notifications: Vec::new(),
            };
            self.next_sequence_number += 1;
            self.keep_alive_counter = self.max_keep_alive_count;
            return Some(message);
        }

        self.keep_alive_counter -= 1;
        None
    }

    /// Decrement the lifetime counter when no Publish request was available
    /// to service this tick (spec.md §4.9 "Lifetime counter decrements when
    /// no Publish is available; reaching zero terminates the subscription").
    /// Returns `true` when the subscription has expired.
    pub fn tick_no_publish_available(&mut self) -> bool {
        if self.lifetime_counter == 0 {
            return true;
        }
        self.lifetime_counter -= 1;
        self.lifetime_counter == 0
    }

    /// Remove acknowledged sequence numbers from the retransmission queue
    /// (spec.md §4.9 "Acknowledgement").
    pub fn acknowledge(&mut self, sequence_number: u32) -> bool {
        self.retransmission.remove(&sequence_number).is_some()
    }

    /// Republish a specific message by sequence number, if still present
    /// (spec.md §4.9 "Republish").
    pub fn republish(&self, sequence_number: u32) -> Result<NotificationMessage, SessionError> {
        self.retransmission
            .get(&sequence_number)
            .cloned()
            .ok_or(SessionError::NotFound)
    }
}
