//! # Message: immutable payload plus delivery bookkeeping.
//!
//! A [`Message`] is created by `publish` and owned by the topic it was
//! published to. The payload and routing fields never change; the delivery
//! metadata ([`MessageStatus`], attempt counter, timestamps) is mutated only
//! inside the broker core as the message moves through its lifecycle.
//!
//! ## Lifecycle
//! ```text
//! Created ──► Queued ──► Delivering ──► Delivered            (terminal)
//!               ▲            │
//!               │            ▼
//!               │         Failed ──► RetryScheduled ──► (re-Queued)
//!               │            │
//!               └────────────┴─────► DeadLetter              (terminal)
//! ```
//!
//! ## Rules
//! - `attempts` increments only on the `Queued → Delivering` transition.
//! - A message is in exactly one status at any time.
//! - `DeadLetter` is reached only through `Failed`, after the retry policy
//!   gives up.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

/// Unique message identifier, assigned at publish time.
///
/// Ids are allocated from a per-broker monotonic counter and stay stable for
/// the message's whole lifetime, including across retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub(crate) u64);

impl MessageId {
    /// Returns the raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageStatus {
    /// Created by `publish`, not yet accepted into a topic queue.
    Created,
    /// Waiting in the topic's pending queue for dispatch.
    Queued,
    /// A dispatch round for this message is in progress.
    Delivering,
    /// Every targeted subscriber handled the message. Terminal.
    Delivered,
    /// The most recent dispatch round had at least one failing subscriber.
    Failed,
    /// A redelivery has been scheduled after a failed attempt.
    RetryScheduled,
    /// Retries exhausted (or a fatal handler error); archived. Terminal.
    DeadLetter,
}

impl MessageStatus {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            MessageStatus::Created => "created",
            MessageStatus::Queued => "queued",
            MessageStatus::Delivering => "delivering",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
            MessageStatus::RetryScheduled => "retry_scheduled",
            MessageStatus::DeadLetter => "dead_letter",
        }
    }

    /// Returns `true` for the two terminal statuses.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::DeadLetter)
    }
}

/// A published message: immutable payload, mutable delivery metadata.
#[derive(Clone, Debug)]
pub struct Message {
    id: MessageId,
    topic: Arc<str>,
    payload: Bytes,
    status: MessageStatus,
    attempts: u32,
    created_at: SystemTime,
    last_attempt_at: Option<SystemTime>,
}

impl Message {
    /// Creates a new message in [`MessageStatus::Created`].
    pub(crate) fn new(id: MessageId, topic: Arc<str>, payload: Bytes) -> Self {
        Self {
            id,
            topic,
            payload,
            status: MessageStatus::Created,
            attempts: 0,
            created_at: SystemTime::now(),
            last_attempt_at: None,
        }
    }

    /// Returns the message id.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the topic the message was published to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the topic name as a shared handle.
    pub(crate) fn topic_arc(&self) -> Arc<str> {
        Arc::clone(&self.topic)
    }

    /// Returns the opaque payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the current delivery status.
    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Returns the number of dispatch attempts made so far.
    ///
    /// Incremented only when a delivery attempt actually starts, never on
    /// enqueue or retry scheduling.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Returns the start time of the most recent dispatch attempt, if any.
    pub fn last_attempt_at(&self) -> Option<SystemTime> {
        self.last_attempt_at
    }

    /// Accepts the message into a topic queue (`Created`/`RetryScheduled` → `Queued`).
    pub(crate) fn mark_queued(&mut self) {
        debug_assert!(
            matches!(
                self.status,
                MessageStatus::Created | MessageStatus::RetryScheduled
            ),
            "queued from {:?}",
            self.status
        );
        self.status = MessageStatus::Queued;
    }

    /// Starts a dispatch round (`Queued` → `Delivering`); bumps the attempt counter.
    pub(crate) fn begin_attempt(&mut self) {
        debug_assert!(
            matches!(self.status, MessageStatus::Queued),
            "delivering from {:?}",
            self.status
        );
        self.status = MessageStatus::Delivering;
        self.attempts += 1;
        self.last_attempt_at = Some(SystemTime::now());
    }

    /// Records a failed dispatch round (`Delivering` → `Failed`).
    pub(crate) fn mark_failed(&mut self) {
        debug_assert!(
            matches!(self.status, MessageStatus::Delivering),
            "failed from {:?}",
            self.status
        );
        self.status = MessageStatus::Failed;
    }

    /// Parks the message while redeliveries are outstanding
    /// (`Failed`/`Delivering` → `RetryScheduled`).
    ///
    /// `Delivering` is a legal source: a redelivery round that succeeds for
    /// its target returns the message here when other targets still have
    /// scheduled redeliveries.
    pub(crate) fn mark_retry_scheduled(&mut self) {
        debug_assert!(
            matches!(
                self.status,
                MessageStatus::Failed | MessageStatus::Delivering
            ),
            "retry from {:?}",
            self.status
        );
        self.status = MessageStatus::RetryScheduled;
    }

    /// Retires the message as delivered (`Delivering`/`RetryScheduled` → `Delivered`).
    ///
    /// `RetryScheduled` is a legal source: the last outstanding redelivery may
    /// resolve while the message itself sits between rounds.
    pub(crate) fn mark_delivered(&mut self) {
        debug_assert!(
            matches!(
                self.status,
                MessageStatus::Delivering | MessageStatus::RetryScheduled
            ),
            "delivered from {:?}",
            self.status
        );
        self.status = MessageStatus::Delivered;
    }

    /// Retires the message as permanently failed (`Failed` → `DeadLetter`).
    pub(crate) fn mark_dead_letter(&mut self) {
        debug_assert!(
            matches!(self.status, MessageStatus::Failed),
            "dead_letter from {:?}",
            self.status
        );
        self.status = MessageStatus::DeadLetter;
    }
}
