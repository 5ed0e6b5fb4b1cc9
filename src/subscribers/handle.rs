//! Subscription handle returned by [`Broker::subscribe`](crate::Broker::subscribe).

use std::sync::Arc;

/// Identifies one (topic, subscriber) registration.
///
/// Pass it back to [`Broker::unsubscribe`](crate::Broker::unsubscribe) to
/// cancel future deliveries to that subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: Arc<str>,
    subscriber: Arc<str>,
}

impl SubscriptionHandle {
    pub(crate) fn new(topic: Arc<str>, subscriber: Arc<str>) -> Self {
        Self { topic, subscriber }
    }

    /// Returns the topic this subscription is registered on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the subscriber id.
    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    pub(crate) fn subscriber_arc(&self) -> Arc<str> {
        Arc::clone(&self.subscriber)
    }
}
