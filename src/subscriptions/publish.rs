//! Publish request routing across a session's subscriptions (spec.md §4.9).

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::codec::DataValue;
use crate::core::{NodeId, SessionError};

use super::subscription::{NotificationMessage, Subscription};

/// One acknowledgement carried on a Publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Subscription the sequence number belongs to.
    pub subscription_id: u32,
    /// The sequence number being acknowledged.
    pub sequence_number: u32,
}

/// The response to one serviced Publish request.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResponse {
    /// The subscription this response reports on.
    pub subscription_id: u32,
    /// The notification batch (possibly a keep-alive).
    pub message: NotificationMessage,
    /// Per-acknowledgement result (true = recognized and removed).
    pub ack_results: Vec<bool>,
}

/// Owns every subscription for one session and the FIFO of outstanding
/// Publish requests waiting to be matched against one (spec.md §4.9,
/// §5 "Publish responses for a subscription are strictly ordered").
#[derive(Default)]
pub struct SubscriptionEngine {
    subscriptions: HashMap<u32, Subscription>,
    pending_publish_requests: VecDeque<Vec<Acknowledgement>>,
}

impl SubscriptionEngine {
    /// Build an engine with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription.
    pub fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    /// Remove a subscription by id.
    pub fn remove_subscription(&mut self, id: u32) -> Option<Subscription> {
        self.subscriptions.remove(&id)
    }

    /// Number of subscriptions currently owned.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Look up a subscription by id for in-place mutation, e.g. attaching a
    /// newly created monitored item to it.
    pub fn subscription_mut(&mut self, id: u32) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&id)
    }

    /// Queue a Publish request's acknowledgements for the next tick that has
    /// something to report.
    pub fn queue_publish_request(&mut self, acknowledgements: Vec<Acknowledgement>) {
        self.pending_publish_requests.push_back(acknowledgements);
    }

    /// Number of outstanding Publish requests.
    pub fn pending_publish_count(&self) -> usize {
        self.pending_publish_requests.len()
    }

    /// Sample every subscription's due monitored items.
    pub fn tick_sampling(&mut self, now: Instant, mut read_value: impl FnMut(&NodeId, u32) -> Option<DataValue>) {
        for subscription in self.subscriptions.values_mut() {
            subscription.sample_due_items(now, &mut read_value);
        }
    }

    /// Drain at most one subscription's notifications per queued Publish
    /// request, in subscription-id order, applying that request's
    /// acknowledgements first (spec.md §4.9 "dequeue one Publish, drain
    /// notifications ... respond").
    ///
    /// Subscriptions with nothing to report (and no elapsed keep-alive)
    /// leave their Publish request queued for a later tick; their lifetime
    /// counter is decremented instead (spec.md §4.9 "Lifetime counter
    /// decrements when no Publish is available").
    pub fn service_publish_requests(&mut self) -> (Vec<PublishResponse>, Vec<u32>) {
        let mut responses = Vec::new();
        let mut expired = Vec::new();

        let mut subscription_ids: Vec<u32> = self.subscriptions.keys().copied().collect();
        subscription_ids.sort_unstable();

        for id in subscription_ids {
            let Some(subscription) = self.subscriptions.get_mut(&id) else { continue };

            if let Some(message) = subscription.drain_for_publish() {
                let Some(acks) = self.pending_publish_requests.pop_front() else {
                    // Nothing queued to carry this notification out; put it back
                    // for the next Publish request by re-queuing is not needed —
                    // the message already lives in the retransmission queue and
                    // will be picked up by the next request via Republish.
                    continue;
                };
                let ack_results = acks
                    .iter()
                    .filter(|a| a.subscription_id == id)
                    .map(|a| subscription.acknowledge(a.sequence_number))
                    .collect();
                responses.push(PublishResponse {
                    subscription_id: id,
                    message,
                    ack_results,
                });
            } else if subscription.tick_no_publish_available() {
                expired.push(id);
            }
        }

        for id in &expired {
            self.subscriptions.remove(id);
        }

        (responses, expired)
    }

    /// Republish a specific sequence number from a still-tracked subscription.
    pub fn republish(&self, subscription_id: u32, sequence_number: u32) -> Result<NotificationMessage, SessionError> {
        self.subscriptions
            .get(&subscription_id)
            .ok_or(SessionError::NotFound)?
            .republish(sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Scalar, Variant};
    use crate::subscriptions::monitored_item::{
        DataChangeFilter, DataChangeTrigger, Deadband, DiscardPolicy, MonitoredItem, MonitoringFilter,
    };
    use std::time::Duration;

    fn sub_with_item(id: u32) -> Subscription {
        let mut sub = Subscription::new(id, Duration::from_millis(10), 10, 3, 100);
        sub.add_monitored_item(MonitoredItem::new(
            1,
            1,
            NodeId::ns0(id),
            13,
            Duration::from_millis(0),
            MonitoringFilter::DataChange(DataChangeFilter {
                trigger: DataChangeTrigger::StatusValue,
                deadband: Deadband::None,
                range: (0.0, 0.0),
            }),
            10,
            DiscardPolicy::DiscardOldest,
        ));
        sub
    }

    #[test]
    fn publish_request_is_matched_to_subscription_with_pending_data() {
        let mut engine = SubscriptionEngine::new();
        engine.add_subscription(sub_with_item(1));
        engine.tick_sampling(Instant::now(), |_, _| {
            Some(DataValue::of(Variant::Scalar(Scalar::Double(1.0))))
        });
        engine.queue_publish_request(Vec::new());

        let (responses, expired) = engine.service_publish_requests();
        assert_eq!(responses.len(), 1);
        assert!(expired.is_empty());
        assert_eq!(responses[0].subscription_id, 1);
    }

    #[test]
    fn no_publish_request_decrements_lifetime_until_expiry() {
        let mut engine = SubscriptionEngine::new();
        let sub = Subscription::new(2, Duration::from_millis(10), 2, 10, 100);
        engine.add_subscription(sub);

        let (_, expired) = engine.service_publish_requests();
        assert!(expired.is_empty());
        let (_, expired) = engine.service_publish_requests();
        assert_eq!(expired, vec![2]);
        assert_eq!(engine.subscription_count(), 0);
    }
}
