//! Per-topic counters, updated atomically with the matching state transition.
//!
//! [`TopicMetrics`] is shared between the publish path (which reserves queue
//! capacity) and the topic actor (which records dispatch outcomes). All
//! counters are read-only for callers via [`MetricsSnapshot`]; only
//! `queue_length` feeds a control decision (backpressure admission).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Read-only view of one topic's counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages accepted into the queue.
    pub published_count: u64,
    /// Messages that reached terminal `Delivered`.
    pub delivered_count: u64,
    /// Failed delivery attempts, counted per (message, subscriber).
    pub failed_count: u64,
    /// Messages that reached terminal `DeadLetter`.
    pub dead_letter_count: u64,
    /// Currently registered subscribers.
    pub subscriber_count: usize,
    /// Messages currently awaiting dispatch.
    pub queue_length: usize,
}

/// Shared atomic counters for one topic.
#[derive(Debug, Default)]
pub(crate) struct TopicMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
    subscribers: AtomicUsize,
    queue_length: AtomicUsize,
}

impl TopicMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attempts to reserve one queue slot against `max`.
    ///
    /// Lock-free compare-and-swap loop: returns `Err(observed_length)` when
    /// the queue is full, otherwise increments `queue_length` and returns
    /// `Ok(())`. This is the backpressure admission check; it never blocks.
    pub(crate) fn try_reserve(&self, max: usize) -> Result<(), usize> {
        let mut len = self.queue_length.load(Ordering::Acquire);
        loop {
            if len >= max {
                return Err(len);
            }
            match self.queue_length.compare_exchange_weak(
                len,
                len + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => len = current,
            }
        }
    }

    /// Releases one reserved queue slot (dispatch started or message drained).
    pub(crate) fn release_slot(&self) {
        self.queue_length.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn queue_length(&self) -> usize {
        self.queue_length.load(Ordering::Acquire)
    }

    pub(crate) fn inc_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_subscribers(&self) {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dec_subscribers(&self) {
        self.subscribers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published_count: self.published.load(Ordering::Relaxed),
            delivered_count: self.delivered.load(Ordering::Relaxed),
            failed_count: self.failed.load(Ordering::Relaxed),
            dead_letter_count: self.dead_lettered.load(Ordering::Relaxed),
            subscriber_count: self.subscribers.load(Ordering::Relaxed),
            queue_length: self.queue_length(),
        }
    }
}
