//! # Retry policy for failed deliveries.
//!
//! [`RetryPolicy`] decides, after a failed delivery attempt, whether to
//! schedule a redelivery and how long to wait first. It is parameterized by:
//! - [`RetryPolicy::max_attempts`] — the attempt budget before dead-lettering;
//! - [`RetryPolicy::first`] — the delay after the first failed attempt;
//! - [`RetryPolicy::factor`] — the multiplicative growth factor;
//! - [`RetryPolicy::max`] — the maximum delay cap;
//! - [`RetryPolicy::jitter`] — randomization applied to the computed delay.
//!
//! The delay after attempt `n` is `first × factor^(n-1)`, clamped to `max`,
//! then jittered. The base delay is derived purely from the attempt number,
//! so jitter output never feeds back into subsequent calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use topicbus::{JitterPolicy, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy {
//!     max_attempts: 3,
//!     first: Duration::from_millis(100),
//!     factor: 2.0,
//!     max: Duration::from_secs(10),
//!     jitter: JitterPolicy::None,
//! };
//!
//! // After attempt 1: retry in `first`.
//! assert_eq!(policy.decide(1), RetryDecision::Retry(Duration::from_millis(100)));
//! // After attempt 2: first × factor = 200ms.
//! assert_eq!(policy.decide(2), RetryDecision::Retry(Duration::from_millis(200)));
//! // Attempt budget spent: give up.
//! assert_eq!(policy.decide(3), RetryDecision::GiveUp);
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Outcome of a retry decision after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule a redelivery after the given delay.
    Retry(Duration),
    /// Stop retrying; the message is dead-lettered.
    GiveUp,
}

/// Capped exponential backoff with a fixed attempt budget.
///
/// The policy gives up once `max_attempts` delivery attempts have been made;
/// until then each failure schedules a redelivery with a growing delay.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total delivery attempts allowed before giving up (minimum 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub first: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended; 2.0 = doubling).
    pub factor: f64,
    /// Maximum delay cap for redeliveries.
    pub max: Duration,
    /// Jitter applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for RetryPolicy {
    /// Returns a policy with:
    /// - `max_attempts = 5`;
    /// - `first = 100ms`;
    /// - `factor = 2.0` (doubling);
    /// - `max = 30s`;
    /// - no jitter.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            first: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: JitterPolicy::None,
        }
    }
}

impl RetryPolicy {
    /// Decides what to do after `attempts` delivery attempts have failed.
    ///
    /// `attempts` is the message's attempt counter at decision time, so it is
    /// at least 1. Returns [`RetryDecision::GiveUp`] once the budget is
    /// spent, otherwise [`RetryDecision::Retry`] with the backoff delay for
    /// that attempt.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts >= self.max_attempts.max(1) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.delay_after(attempts))
    }

    /// Computes the (jittered) delay after the given attempt number.
    ///
    /// The base is `first × factor^(attempts-1)`, clamped to
    /// [`RetryPolicy::max`]. Non-finite or negative intermediate values clamp
    /// to `max` as well, so a huge attempt number cannot overflow.
    fn delay_after(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max.as_secs_f64();
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exponent);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
