//! # Jitter policy for redelivery delays.
//!
//! [`JitterPolicy`] adds randomness to retry delays so that many messages
//! failing against the same subscriber do not come back for redelivery at
//! the same instant.
//!
//! - [`JitterPolicy::None`] — no randomization, predictable delays
//! - [`JitterPolicy::Full`] — random delay in [0, delay] (most aggressive)
//! - [`JitterPolicy::Equal`] — delay/2 + random[0, delay/2] (balanced)
//! - [`JitterPolicy::Decorrelated`] — grows from the previous delay, capped

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of redelivery delays.
///
/// ## Trade-offs
/// - **None**: predictable, but synchronized redeliveries can stampede a
///   recovering subscriber
/// - **Full**: maximum randomness, aggressive load spreading
/// - **Equal**: balanced (recommended for most use cases)
/// - **Decorrelated**: stateful, prevents retry correlation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact computed delay.
    ///
    /// Use when only one message is likely to be retrying, when predictable
    /// timing is required, or in tests.
    None,

    /// Full jitter: random delay in [0, delay].
    ///
    /// Can significantly shorten the delay; use when maximum load spreading
    /// is needed.
    Full,

    /// Equal jitter: delay = delay/2 + random[0, delay/2].
    ///
    /// Preserves ~75% of the computed delay on average.
    Equal,

    /// Decorrelated jitter: delay = random[base, prev * 3], capped at max.
    ///
    /// Considers the previous delay and grows independently. Requires
    /// context (base, prev, max) via [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl Default for JitterPolicy {
    /// Returns [`JitterPolicy::None`].
    fn default() -> Self {
        JitterPolicy::None
    }
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    ///
    /// ### Note
    /// For `Decorrelated`, this method returns the input unchanged; use
    /// [`apply_decorrelated`](Self::apply_decorrelated), which takes the
    /// additional context it needs.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => self.full_jitter(delay),
            JitterPolicy::Equal => self.equal_jitter(delay),
            JitterPolicy::Decorrelated => delay,
        }
    }

    /// Applies decorrelated jitter with full context.
    ///
    /// ### Note
    /// If called on a non-Decorrelated policy, falls back to `apply(prev)`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let mut rng = rand::rng();
        let base_ms = base.as_millis() as u64;
        let prev_ms = prev.as_millis() as u64;
        let max_ms = max.as_millis() as u64;

        let upper_bound = (prev_ms.saturating_mul(3)).min(max_ms);
        let clamped_upper = upper_bound.max(base_ms);

        if base_ms >= clamped_upper {
            return base;
        }

        let jittered_ms = rng.random_range(base_ms..=clamped_upper);
        Duration::from_millis(jittered_ms)
    }

    /// Full jitter: random[0, delay]
    fn full_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::rng();
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.random_range(0..=ms))
    }

    /// Equal jitter: delay/2 + random[0, delay/2]
    fn equal_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::rng();
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let half = ms / 2;
        let jitter = if half == 0 {
            0
        } else {
            rng.random_range(0..=half)
        };
        Duration::from_millis(half + jitter)
    }
}
