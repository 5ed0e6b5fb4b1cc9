//! # Lifecycle events emitted by the broker.
//!
//! The [`EventKind`] enum classifies notifications across three categories:
//! - **Message lifecycle**: enqueue, dispatch, delivery, retry, dead-letter
//! - **Topic management**: creation, subscriber add/remove, strategy swap, drain
//! - **Listener plumbing**: overflow and panic reports from the fan-out layer
//!
//! The [`Event`] struct carries the metadata for a notification: topic name,
//! message id, subscriber id, attempt count, failure reason, retry delay,
//! queue length, flushed batch.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact emission order when events
//! are observed out of order.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::message::MessageId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of broker events.
///
/// [`Event::name`] maps each kind to the stable snake_case string delivered
/// to external listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Message lifecycle ===
    /// A published message was accepted into a topic queue.
    ///
    /// Sets: `topic`, `message`, `queue_length`, `at`, `seq`
    MessageEnqueued,

    /// A dispatch round started for a message.
    ///
    /// Sets: `topic`, `message`, `attempt`; `subscriber` on redelivery rounds
    Delivering,

    /// Every targeted subscriber handled the message; terminal.
    ///
    /// Sets: `topic`, `message`, `attempt`
    Delivered,

    /// One subscriber's handler failed for one message.
    ///
    /// Sets: `topic`, `message`, `subscriber`, `attempt`, `reason`
    DeliveryFailed,

    /// A redelivery was scheduled for a failing subscriber.
    ///
    /// Sets: `topic`, `message`, `subscriber`, `attempt`, `delay_ms`
    RetryScheduled,

    /// The message exhausted its retries and was archived; terminal.
    ///
    /// Sets: `topic`, `message`, `attempt`, `reason`
    DeadLettered,

    /// A publish was rejected because the topic queue is full.
    ///
    /// Sets: `topic`, `queue_length`
    Backpressure,

    // === Topic management ===
    /// A topic was registered with the broker.
    ///
    /// Sets: `topic`
    TopicCreated,

    /// A subscriber was added to a topic.
    ///
    /// Sets: `topic`, `subscriber`
    SubscriberAdded,

    /// A subscriber was removed from a topic.
    ///
    /// Sets: `topic`, `subscriber`
    SubscriberRemoved,

    /// The topic's delivery strategy was hot-swapped.
    ///
    /// Sets: `topic`, `reason` (label of the new strategy)
    StrategySwapped,

    /// A batched flush dispatched the accumulated messages.
    ///
    /// Sets: `topic`, `batch` (flushed ids), `reason` (`"batch_size"` or `"max_wait"`)
    BatchFlushed,

    /// Queued messages were removed without dispatch.
    ///
    /// Sets: `topic`, `queue_length` (number of drained messages)
    TopicDrained,

    // === Listener plumbing ===
    /// An event listener dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber` (listener name), `reason`
    ListenerOverflow,

    /// An event listener panicked while processing an event.
    ///
    /// Sets: `subscriber` (listener name), `reason` (panic info)
    ListenerPanicked,
}

/// Broker event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Topic name, if applicable.
    pub topic: Option<Arc<str>>,
    /// Message id, if applicable.
    pub message: Option<MessageId>,
    /// Subscriber or listener id, if applicable.
    pub subscriber: Option<Arc<str>>,
    /// Attempt count at emission time (starting from 1).
    pub attempt: Option<u32>,
    /// Human-readable reason (failure text, swap label, flush trigger).
    pub reason: Option<Arc<str>>,
    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Queue length observed at emission time.
    pub queue_length: Option<usize>,
    /// Message ids flushed together, for [`EventKind::BatchFlushed`].
    pub batch: Option<Arc<[MessageId]>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            topic: None,
            message: None,
            subscriber: None,
            attempt: None,
            reason: None,
            delay_ms: None,
            queue_length: None,
            batch: None,
        }
    }

    /// Returns the stable external name of this event.
    ///
    /// These strings are the notification vocabulary listeners see and must
    /// never change for an existing kind.
    pub fn name(&self) -> &'static str {
        match self.kind {
            EventKind::MessageEnqueued => "message_enqueued",
            EventKind::Delivering => "delivering",
            EventKind::Delivered => "delivered",
            EventKind::DeliveryFailed => "failed",
            EventKind::RetryScheduled => "retry_scheduled",
            EventKind::DeadLettered => "dead_letter",
            EventKind::Backpressure => "backpressure",
            EventKind::TopicCreated => "topic_created",
            EventKind::SubscriberAdded => "subscriber_added",
            EventKind::SubscriberRemoved => "subscriber_removed",
            EventKind::StrategySwapped => "strategy_swapped",
            EventKind::BatchFlushed => "batch_flush",
            EventKind::TopicDrained => "topic_drained",
            EventKind::ListenerOverflow => "listener_overflow",
            EventKind::ListenerPanicked => "listener_panicked",
        }
    }

    /// Attaches a topic name.
    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Attaches a message id.
    #[inline]
    pub fn with_message(mut self, id: MessageId) -> Self {
        self.message = Some(id);
        self
    }

    /// Attaches a subscriber (or listener) id.
    #[inline]
    pub fn with_subscriber(mut self, id: impl Into<Arc<str>>) -> Self {
        self.subscriber = Some(id.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an observed queue length.
    #[inline]
    pub fn with_queue_length(mut self, len: usize) -> Self {
        self.queue_length = Some(len);
        self
    }

    /// Attaches the ids flushed together in one batch.
    #[inline]
    pub fn with_batch(mut self, ids: Vec<MessageId>) -> Self {
        self.batch = Some(Arc::from(ids));
        self
    }

    /// Creates a listener overflow event.
    #[inline]
    pub(crate) fn listener_overflow(listener: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::ListenerOverflow)
            .with_subscriber(listener)
            .with_reason(reason)
    }

    /// Creates a listener panic event.
    #[inline]
    pub(crate) fn listener_panicked(listener: &'static str, info: String) -> Self {
        Event::now(EventKind::ListenerPanicked)
            .with_subscriber(listener)
            .with_reason(info)
    }

    #[inline]
    pub(crate) fn is_listener_overflow(&self) -> bool {
        matches!(self.kind, EventKind::ListenerOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::MessageEnqueued);
        let b = Event::now(EventKind::Delivering);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_set_fields() {
        let ev = Event::now(EventKind::RetryScheduled)
            .with_topic("orders")
            .with_message(MessageId(7))
            .with_subscriber("billing")
            .with_attempt(2)
            .with_delay(Duration::from_millis(200))
            .with_reason("boom");

        assert_eq!(ev.topic.as_deref(), Some("orders"));
        assert_eq!(ev.message, Some(MessageId(7)));
        assert_eq!(ev.subscriber.as_deref(), Some("billing"));
        assert_eq!(ev.attempt, Some(2));
        assert_eq!(ev.delay_ms, Some(200));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }

    #[test]
    fn external_names_are_stable() {
        let cases = [
            (EventKind::MessageEnqueued, "message_enqueued"),
            (EventKind::Delivering, "delivering"),
            (EventKind::Delivered, "delivered"),
            (EventKind::DeliveryFailed, "failed"),
            (EventKind::RetryScheduled, "retry_scheduled"),
            (EventKind::DeadLettered, "dead_letter"),
            (EventKind::Backpressure, "backpressure"),
            (EventKind::StrategySwapped, "strategy_swapped"),
            (EventKind::BatchFlushed, "batch_flush"),
        ];
        for (kind, name) in cases {
            assert_eq!(Event::now(kind).name(), name);
        }
    }
}
