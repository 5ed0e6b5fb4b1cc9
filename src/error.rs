//! Error types used by the broker and by subscriber handlers.
//!
//! This module defines the broker's error taxonomy:
//!
//! - [`PublishError`] — returned to publishers (`TopicNotFound`, `Backpressure`).
//! - [`SubscribeError`] / [`UnsubscribeError`] — subscription management failures.
//! - [`TopicNotFound`] — administrative operations against an unknown topic.
//! - [`DeliveryError`] — raised by a subscriber's `handle`; contained by the
//!   broker and fed into the retry/dead-letter path, never surfaced to publishers.
//! - [`ShutdownError`] — shutdown grace period exceeded.
//!
//! All enums provide `as_label()` returning a short stable snake_case label
//! for logs and metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors returned by [`Broker::publish`](crate::Broker::publish).
///
/// Both variants are recoverable: the caller may retry after creating the
/// topic or after the queue drains.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PublishError {
    /// The target topic is not registered with this broker.
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// Name of the missing topic.
        topic: String,
    },

    /// The topic's pending queue is at capacity; the message was rejected.
    ///
    /// The broker rejects rather than blocking the publisher or dropping
    /// older messages, so the failure is explicit and retriable.
    #[error("topic {topic} at capacity ({queue_length} queued)")]
    Backpressure {
        /// Name of the saturated topic.
        topic: String,
        /// Queue length observed at rejection time.
        queue_length: usize,
    },
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::TopicNotFound { .. } => "publish_topic_not_found",
            PublishError::Backpressure { .. } => "publish_backpressure",
        }
    }
}

/// Errors returned by [`Broker::subscribe`](crate::Broker::subscribe).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SubscribeError {
    /// The target topic is not registered with this broker.
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// Name of the missing topic.
        topic: String,
    },
}

impl SubscribeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscribeError::TopicNotFound { .. } => "subscribe_topic_not_found",
        }
    }
}

/// Errors returned by [`Broker::unsubscribe`](crate::Broker::unsubscribe).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum UnsubscribeError {
    /// No subscriber with the handle's id is registered on the handle's topic.
    #[error("subscription not found: {subscriber} on {topic}")]
    NotFound {
        /// Topic named by the handle.
        topic: String,
        /// Subscriber id named by the handle.
        subscriber: String,
    },
}

impl UnsubscribeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            UnsubscribeError::NotFound { .. } => "unsubscribe_not_found",
        }
    }
}

/// Administrative operation against a topic this broker does not know.
///
/// Returned by strategy/retry configuration, [`drain`](crate::Broker::drain)
/// and [`metrics`](crate::Broker::metrics).
#[derive(Error, Debug)]
#[error("topic not found: {0}")]
pub struct TopicNotFound(pub String);

/// # Errors produced by message delivery to a subscriber.
///
/// Returned by [`Subscriber::handle`](crate::Subscriber::handle) or raised by
/// the dispatch layer (timeout, caught panic). The broker never propagates
/// these to the publisher; they only drive the retry/dead-letter path for the
/// failing (message, subscriber) pair.
///
/// `Fail` and `Timeout` are retryable; `Fatal` sends the message straight to
/// the dead-letter store regardless of the retry policy.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Handler failed but a later attempt may succeed.
    #[error("delivery failed: {reason}")]
    Fail {
        /// The underlying failure message.
        reason: String,
    },

    /// Handler exceeded the topic's delivery timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable failure; retrying cannot help.
    #[error("fatal delivery error (no retry): {reason}")]
    Fatal {
        /// The underlying failure message.
        reason: String,
    },
}

impl DeliveryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Fail { .. } => "delivery_failed",
            DeliveryError::Timeout { .. } => "delivery_timeout",
            DeliveryError::Fatal { .. } => "delivery_fatal",
        }
    }

    /// Indicates whether a retry may succeed.
    ///
    /// Returns `true` for [`DeliveryError::Fail`] and [`DeliveryError::Timeout`],
    /// `false` for [`DeliveryError::Fatal`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Fail { .. } | DeliveryError::Timeout { .. }
        )
    }
}

/// Errors produced by [`Broker::shutdown`](crate::Broker::shutdown).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// Shutdown grace period was exceeded; some topic actors were still busy
    /// and had to be aborted.
    #[error("shutdown grace {grace:?} exceeded; stuck topics: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Topics whose actors did not stop in time.
        stuck: Vec<String>,
    },
}

impl ShutdownError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownError::GraceExceeded { .. } => "shutdown_grace_exceeded",
        }
    }
}
