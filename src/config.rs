//! # Global broker configuration.
//!
//! [`BrokerConfig`] defines broker-wide defaults: event bus capacity, the
//! default queue bound and delivery strategy for new topics, the global
//! retry policy, the default delivery timeout, and the shutdown grace
//! period.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use topicbus::{BrokerConfig, DeliveryStrategy, RetryPolicy};
//!
//! let mut cfg = BrokerConfig::default();
//! cfg.max_queue_length = 256;
//! cfg.retry = RetryPolicy { max_attempts: 3, ..RetryPolicy::default() };
//! cfg.strategy = DeliveryStrategy::Immediate;
//! cfg.grace = Duration::from_secs(10);
//!
//! assert_eq!(cfg.max_queue_length, 256);
//! ```

use std::time::Duration;

use crate::policies::{DeliveryStrategy, RetryPolicy};

/// Global configuration for a broker instance.
///
/// Per-topic values can override `max_queue_length`, `strategy`, `retry`
/// and `delivery_timeout` through [`TopicSpec`](crate::TopicSpec).
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Default pending-queue bound for new topics.
    pub max_queue_length: usize,
    /// Default delivery strategy for new topics.
    pub strategy: DeliveryStrategy,
    /// Global retry policy, used by topics without a per-topic override.
    pub retry: RetryPolicy,
    /// Default per-delivery timeout (0 = no timeout).
    pub delivery_timeout: Duration,
    /// Maximum time to wait for topic actors during shutdown.
    pub grace: Duration,
}

impl Default for BrokerConfig {
    /// Provides a default configuration:
    /// - `bus_capacity = 1024`
    /// - `max_queue_length = 1024`
    /// - `strategy = DeliveryStrategy::Immediate`
    /// - `retry = RetryPolicy::default()`
    /// - `delivery_timeout = 0s` (no timeout)
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            max_queue_length: 1024,
            strategy: DeliveryStrategy::default(),
            retry: RetryPolicy::default(),
            delivery_timeout: Duration::from_secs(0),
            grace: Duration::from_secs(30),
        }
    }
}

impl BrokerConfig {
    /// Returns the default delivery timeout, treating `0s` as `None`.
    pub fn default_delivery_timeout(&self) -> Option<Duration> {
        if self.delivery_timeout.is_zero() {
            None
        } else {
            Some(self.delivery_timeout)
        }
    }
}
