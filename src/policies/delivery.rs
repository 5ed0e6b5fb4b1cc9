//! # Delivery strategies: when queued messages are handed to subscribers.
//!
//! [`DeliveryStrategy`] controls dispatch timing per topic:
//!
//! - [`DeliveryStrategy::Immediate`] — dispatch on enqueue.
//! - [`DeliveryStrategy::Batched`] — accumulate, then flush on a size or
//!   time threshold, whichever is reached first.
//!
//! ## Choosing the right strategy
//!
//! **Latency-sensitive topics** (commands, invalidations):
//! ```text
//! DeliveryStrategy::Immediate      → each message dispatched as it arrives
//! ```
//!
//! **Throughput-oriented topics** (telemetry, fan-in aggregation):
//! ```text
//! DeliveryStrategy::Batched {
//!     batch_size: 64,              → flush once 64 messages accumulated
//!     max_wait: 250ms,             → or once the oldest waits this long
//! }
//! ```
//!
//! Strategies are hot-swappable per topic at runtime; a swap transfers the
//! still-queued messages to the new strategy without loss, duplication or
//! reordering. Swapping to `Immediate` dispatches the backlog at once.

use std::time::Duration;

/// Per-topic dispatch timing policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStrategy {
    /// Dispatch every message as soon as it is enqueued.
    Immediate,
    /// Accumulate messages and flush them together.
    ///   - `batch_size`: flush once this many messages are pending
    ///     (minimum 1).
    ///   - `max_wait`: flush once the oldest pending message has waited
    ///     this long, even if the batch is not full.
    Batched {
        batch_size: usize,
        max_wait: Duration,
    },
}

impl Default for DeliveryStrategy {
    /// Returns [`DeliveryStrategy::Immediate`].
    fn default() -> Self {
        DeliveryStrategy::Immediate
    }
}

impl DeliveryStrategy {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryStrategy::Immediate => "immediate",
            DeliveryStrategy::Batched { .. } => "batched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_immediate() {
        assert_eq!(DeliveryStrategy::default(), DeliveryStrategy::Immediate);
    }

    #[test]
    fn labels() {
        assert_eq!(DeliveryStrategy::Immediate.as_label(), "immediate");
        let batched = DeliveryStrategy::Batched {
            batch_size: 3,
            max_wait: Duration::from_secs(1),
        };
        assert_eq!(batched.as_label(), "batched");
    }
}
