//! Monitored items: per-item sampling, filtering, and queueing
//! (spec.md §4.9 "Monitored-item sampling").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::codec::{DataValue, Scalar, Variant};
use crate::core::NodeId;

/// When a data-change filter considers a sample significant enough to
/// report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChangeTrigger {
    /// Report only when the status changes.
    Status,
    /// Report when the status or value changes.
    StatusValue,
    /// Report when the status, value, or source timestamp changes.
    StatusValueTimestamp,
}

/// Deadband applied to numeric value changes before they are reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deadband {
    /// No deadband; any change per `DataChangeTrigger` is reported.
    None,
    /// Absolute difference must exceed this value.
    Absolute(f64),
    /// Percent-of-range difference must exceed this value (0-100).
    Percent(f64),
}

/// A data-change filter: trigger mode plus optional deadband.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataChangeFilter {
    /// Which changes are considered significant.
    pub trigger: DataChangeTrigger,
    /// Deadband suppressing small numeric changes.
    pub deadband: Deadband,
    /// EURange low/high, used by `Deadband::Percent`.
    pub range: (f64, f64),
}

fn numeric_value(value: &Variant) -> Option<f64> {
    match value {
        Variant::Scalar(Scalar::Double(v)) => Some(*v),
        Variant::Scalar(Scalar::Float(v)) => Some(*v as f64),
        Variant::Scalar(Scalar::Int32(v)) => Some(*v as f64),
        Variant::Scalar(Scalar::Int64(v)) => Some(*v as f64),
        Variant::Scalar(Scalar::UInt32(v)) => Some(*v as f64),
        _ => None,
    }
}

impl DataChangeFilter {
    fn passes_deadband(&self, old: &DataValue, new: &DataValue) -> bool {
        let (Deadband::Absolute(limit) | Deadband::Percent(limit)) = self.deadband else {
            return true;
        };
        let (Some(old_v), Some(new_v)) = (
            old.value.as_ref().and_then(numeric_value),
            new.value.as_ref().and_then(numeric_value),
        ) else {
            return true;
        };
        let delta = (new_v - old_v).abs();
        match self.deadband {
            Deadband::Absolute(_) => delta > limit,
            Deadband::Percent(_) => {
                let span = (self.range.1 - self.range.0).abs();
                span == 0.0 || (delta / span) * 100.0 > limit
            }
            Deadband::None => true,
        }
    }

    /// True when `new` should be reported relative to `old` per this filter.
    pub fn is_significant(&self, old: &DataValue, new: &DataValue) -> bool {
        let changed = match self.trigger {
            DataChangeTrigger::Status => old.status != new.status,
            DataChangeTrigger::StatusValue => old.status != new.status || old.value != new.value,
            DataChangeTrigger::StatusValueTimestamp => {
                old.status != new.status || old.value != new.value || old.source_timestamp != new.source_timestamp
            }
        };
        changed && self.passes_deadband(old, new)
    }
}

/// A single filter leaf in an event where-clause (spec.md §4.9 "a tree of
/// filter operators over operands"); nested operators compose these.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFilterOperand {
    /// A literal comparison value.
    Literal(Variant),
    /// An attribute of the event, by simple attribute path.
    Attribute(String),
}

/// One node of an event where-clause's operator tree.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// `left == right`.
    Equals(EventFilterOperand, EventFilterOperand),
    /// `left > right`, numeric operands only.
    GreaterThan(EventFilterOperand, EventFilterOperand),
    /// Logical AND of two subclauses.
    And(Box<WhereClause>, Box<WhereClause>),
    /// Logical OR of two subclauses.
    Or(Box<WhereClause>, Box<WhereClause>),
    /// Always true; the default when no where-clause is configured.
    True,
}

/// An event filter: which event fields to report, plus a predicate over
/// them (spec.md §4.9 "Event filter").
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    /// Simple attribute operands selecting which event fields are reported.
    pub select_clauses: Vec<String>,
    /// The where-clause predicate.
    pub where_clause: WhereClause,
}

/// The filter attached to a monitored item.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitoringFilter {
    /// Data-change filter over a Variable's Value attribute.
    DataChange(DataChangeFilter),
    /// Event filter over an Object's event notifications.
    Event(EventFilter),
}

/// How a monitored item's queue behaves once it reaches `queue_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardPolicy {
    /// Drop the oldest queued sample to make room for the new one.
    DiscardOldest,
    /// Drop the new sample, keeping the queue as-is.
    DiscardNewest,
}

/// One sampled value queued for the next Publish.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemNotification {
    /// The client-assigned handle identifying this item in notifications.
    pub client_handle: u32,
    /// The sampled value.
    pub value: DataValue,
}

/// One monitored item: a sampling interval, a filter, and a bounded queue
/// of pending notifications (spec.md §4.9).
pub struct MonitoredItem {
    /// Server-assigned monitored item id.
    pub id: u32,
    /// Client-supplied handle echoed back in notifications.
    pub client_handle: u32,
    /// Node being monitored.
    pub node_id: NodeId,
    /// Attribute id being monitored (usually Value).
    pub attribute_id: u32,
    /// Minimum time between samples.
    pub sampling_interval: Duration,
    /// The attached filter.
    pub filter: MonitoringFilter,
    /// Queue capacity.
    pub queue_size: usize,
    /// Behavior once the queue is full.
    pub discard_policy: DiscardPolicy,

    queue: VecDeque<MonitoredItemNotification>,
    last_value: Option<DataValue>,
    last_sampled_at: Option<Instant>,
}

impl MonitoredItem {
    /// Build a new monitored item with an empty queue.
    pub fn new(
        id: u32,
        client_handle: u32,
        node_id: NodeId,
        attribute_id: u32,
        sampling_interval: Duration,
        filter: MonitoringFilter,
        queue_size: usize,
        discard_policy: DiscardPolicy,
    ) -> Self {
        Self {
            id,
            client_handle,
            node_id,
            attribute_id,
            sampling_interval,
            filter,
            queue_size: queue_size.max(1),
            discard_policy,
            queue: VecDeque::new(),
            last_value: None,
            last_sampled_at: None,
        }
    }

    /// True once `sampling_interval` has elapsed since the last sample.
    pub fn due(&self, now: Instant) -> bool {
        match self.last_sampled_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.sampling_interval,
        }
    }

    /// Offer a freshly read value. Enqueues it (applying the discard policy
    /// at capacity) if the attached filter considers it significant.
    pub fn sample(&mut self, now: Instant, value: DataValue) {
        self.last_sampled_at = Some(now);

        let significant = match (&self.filter, &self.last_value) {
            (MonitoringFilter::DataChange(filter), Some(old)) => filter.is_significant(old, &value),
            (MonitoringFilter::DataChange(_), None) => true,
            (MonitoringFilter::Event(_), _) => false,
        };

        if significant {
            if self.queue.len() >= self.queue_size {
                match self.discard_policy {
                    DiscardPolicy::DiscardOldest => {
                        self.queue.pop_front();
                    }
                    DiscardPolicy::DiscardNewest => {
                        self.last_value = Some(value);
                        return;
                    }
                }
            }
            self.queue.push_back(MonitoredItemNotification {
                client_handle: self.client_handle,
                value: value.clone(),
            });
        }
        self.last_value = Some(value);
    }

    /// Drain up to `max` queued notifications.
    pub fn drain(&mut self, max: usize) -> Vec<MonitoredItemNotification> {
        let n = self.queue.len().min(max);
        self.queue.drain(..n).collect()
    }

    /// True when notifications are queued.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dv(v: f64) -> DataValue {
        DataValue::of(Variant::Scalar(Scalar::Double(v)))
    }

    #[test]
    fn first_sample_is_always_significant() {
        let mut item = MonitoredItem::new(
            1,
            10,
            NodeId::ns0(1),
            13,
            Duration::from_millis(100),
            MonitoringFilter::DataChange(DataChangeFilter {
                trigger: DataChangeTrigger::StatusValue,
                deadband: Deadband::None,
                range: (0.0, 100.0),
            }),
            10,
            DiscardPolicy::DiscardOldest,
        );
        item.sample(Instant::now(), dv(1.0));
        assert_eq!(item.drain(10).len(), 1);
    }

    #[test]
    fn deadband_suppresses_small_changes() {
        let mut item = MonitoredItem::new(
            1,
            10,
            NodeId::ns0(1),
            13,
            Duration::from_millis(100),
            MonitoringFilter::DataChange(DataChangeFilter {
                trigger: DataChangeTrigger::StatusValue,
                deadband: Deadband::Absolute(1.0),
                range: (0.0, 100.0),
            }),
            10,
            DiscardPolicy::DiscardOldest,
        );
        item.sample(Instant::now(), dv(10.0));
        item.drain(10);
        item.sample(Instant::now(), dv(10.5));
        assert!(!item.has_pending());
        item.sample(Instant::now(), dv(12.0));
        assert!(item.has_pending());
    }

    #[test]
    fn discard_oldest_drops_front_at_capacity() {
        let mut item = MonitoredItem::new(
            1,
            10,
            NodeId::ns0(1),
            13,
            Duration::from_millis(0),
            MonitoringFilter::DataChange(DataChangeFilter {
                trigger: DataChangeTrigger::StatusValue,
                deadband: Deadband::None,
                range: (0.0, 100.0),
            }),
            2,
            DiscardPolicy::DiscardOldest,
        );
        for v in [1.0, 2.0, 3.0] {
            item.sample(Instant::now(), dv(v));
        }
        let drained = item.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].value, dv(2.0));
        assert_eq!(drained[1].value, dv(3.0));
    }

    #[test]
    fn due_becomes_true_after_sampling_interval_elapses() {
        let item = MonitoredItem::new(
            1,
            10,
            NodeId::ns0(1),
            13,
            Duration::from_millis(1),
            MonitoringFilter::DataChange(DataChangeFilter {
                trigger: DataChangeTrigger::Status,
                deadband: Deadband::None,
                range: (0.0, 0.0),
            }),
            10,
            DiscardPolicy::DiscardOldest,
        );
        assert!(item.due(Instant::now()));
    }
}
