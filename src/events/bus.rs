//! # Event bus for broadcasting broker lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (topic actors, the
//! publish path, the listener fan-out).
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks or suspends.
//! - **Bounded capacity**: a single ring buffer stores recent events for all
//!   receivers; slow receivers observe `RecvError::Lagged(n)` and skip the
//!   `n` oldest items.
//! - **No persistence**: events are dropped if no receiver is attached at
//!   send time.
//!
//! Delivery to external listeners goes through the
//! [`ListenerSet`](crate::listeners::ListenerSet), which consumes one bus
//! receiver and fans out behind per-listener bounded queues, so a slow
//! listener can never slow the dispatch path down.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for broker events.
///
/// Multiple publishers can publish concurrently; each receiver observes
/// clones of every event sent after it subscribed. Cheap to clone
/// (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// Capacity is shared across all receivers; the minimum is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped; the call still
    /// returns immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver observing subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
