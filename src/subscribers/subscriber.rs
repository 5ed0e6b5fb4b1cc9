//! # Subscriber abstraction.
//!
//! This module defines the [`Subscriber`] trait, the capability object a
//! topic delivers messages to. The common handle type is [`SubscriberRef`],
//! an `Arc<dyn Subscriber>` suitable for sharing across the broker.
//!
//! A subscriber receives one message at a time and may fail; failures are
//! contained by the broker and drive the retry/dead-letter path for that
//! (message, subscriber) pair only.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::DeliveryError;
use crate::message::Message;

/// Shared reference to a subscriber.
pub type SubscriberRef = Arc<dyn Subscriber>;

/// # Message handler registered on a topic.
///
/// A `Subscriber` has a stable [`id`](Subscriber::id) (unique per topic;
/// re-subscribing the same id is a no-op) and an async, fallible
/// [`handle`](Subscriber::handle) method.
///
/// ### Implementation requirements
/// - Handlers are invoked one message at a time, in enqueue order, except
///   that redeliveries may arrive after newer messages already succeeded.
/// - Delivery is at-least-once: a retried message is handed over again with
///   the same id, so handlers must be idempotent.
/// - Return [`DeliveryError::Fatal`] to send a message straight to the
///   dead-letter store without further retries.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use topicbus::{DeliveryError, Message, Subscriber};
///
/// struct Billing;
///
/// #[async_trait]
/// impl Subscriber for Billing {
///     fn id(&self) -> &str { "billing" }
///
///     async fn handle(&self, message: &Message) -> Result<(), DeliveryError> {
///         // process message.payload() ...
///         let _ = message.payload();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Returns a stable, human-readable subscriber id, unique per topic.
    fn id(&self) -> &str;

    /// Handles one message.
    ///
    /// A returned error marks this delivery attempt failed for this
    /// subscriber only; other subscribers of the same message are
    /// unaffected.
    async fn handle(&self, message: &Message) -> Result<(), DeliveryError>;
}
