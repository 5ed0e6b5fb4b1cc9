//! # Topic specification.
//!
//! Defines [`TopicSpec`], the configuration bundle describing how a topic
//! behaves: queue bound, delivery strategy, retry policy override, and
//! delivery timeout.
//!
//! A spec can be created:
//! - **Explicitly** with [`TopicSpec::new`] (full control)
//! - **From config** with [`TopicSpec::with_defaults`] (inherit broker defaults)

use std::time::Duration;

use crate::config::BrokerConfig;
use crate::policies::{DeliveryStrategy, RetryPolicy};

/// Specification for creating a topic.
///
/// Bundles together:
/// - The pending-queue bound (`max_queue_length`)
/// - The delivery strategy ([`DeliveryStrategy`])
/// - An optional retry policy override (topics without one follow the
///   broker's global policy, including later global changes)
/// - An optional per-delivery timeout
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use topicbus::{BrokerConfig, DeliveryStrategy, TopicSpec};
///
/// // Explicit configuration:
/// let spec = TopicSpec::new(
///     5,
///     DeliveryStrategy::Batched {
///         batch_size: 3,
///         max_wait: Duration::from_secs(1),
///     },
/// );
/// assert_eq!(spec.max_queue_length(), 5);
///
/// // Inherit from broker config:
/// let cfg = BrokerConfig::default();
/// let spec2 = TopicSpec::with_defaults(&cfg);
/// // `cfg.delivery_timeout = 0s` is treated as `None`
/// assert!(spec2.delivery_timeout().is_none());
/// ```
#[derive(Clone, Debug)]
pub struct TopicSpec {
    max_queue_length: usize,
    strategy: DeliveryStrategy,
    retry: Option<RetryPolicy>,
    delivery_timeout: Option<Duration>,
}

impl TopicSpec {
    /// Creates a new topic specification with explicit parameters.
    ///
    /// ### Parameters
    /// - `max_queue_length`: pending-queue bound (clamped to a minimum of 1)
    /// - `strategy`: dispatch timing policy
    pub fn new(max_queue_length: usize, strategy: DeliveryStrategy) -> Self {
        Self {
            max_queue_length: max_queue_length.max(1),
            strategy,
            retry: None,
            delivery_timeout: None,
        }
    }

    /// Creates a topic specification inheriting broker defaults.
    ///
    /// Uses `BrokerConfig::default_delivery_timeout()` so that `0s` in
    /// config is treated as `None`. The retry policy is left unset, so the
    /// topic follows the broker's global policy.
    pub fn with_defaults(cfg: &BrokerConfig) -> Self {
        Self {
            max_queue_length: cfg.max_queue_length.max(1),
            strategy: cfg.strategy,
            retry: None,
            delivery_timeout: cfg.default_delivery_timeout(),
        }
    }

    /// Returns the pending-queue bound.
    pub fn max_queue_length(&self) -> usize {
        self.max_queue_length
    }

    /// Returns the delivery strategy.
    pub fn strategy(&self) -> DeliveryStrategy {
        self.strategy
    }

    /// Returns the retry policy override, if configured.
    pub fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }

    /// Returns the delivery timeout, if configured.
    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout
    }

    /// Returns a new spec with an updated queue bound.
    pub fn with_max_queue_length(mut self, max: usize) -> Self {
        self.max_queue_length = max.max(1);
        self
    }

    /// Returns a new spec with an updated delivery strategy.
    pub fn with_strategy(mut self, strategy: DeliveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns a new spec with a retry policy override.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Returns a new spec with an updated delivery timeout.
    pub fn with_delivery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}
