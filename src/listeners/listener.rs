//! # Event listener trait.
//!
//! Provides [`EventListener`], the extension point for plugging external
//! observers (metrics, structured logging, alerting) into the broker.
//!
//! Each listener gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-listener bounded queue** (capacity via [`EventListener::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as
//!   `EventKind::ListenerPanicked`)
//!
//! ## Rules
//! - A slow listener only affects its own queue.
//! - Queue overflow drops the event **for this listener only** and emits
//!   `EventKind::ListenerOverflow`; other listeners are unaffected.
//! - Events are processed sequentially (FIFO) per listener.
//! - Listeners never block publishers or message dispatch, and a listener
//!   failure never feeds back into message state.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use topicbus::{Event, EventKind, EventListener};
//!
//! struct Metrics;
//!
//! #[async_trait]
//! impl EventListener for Metrics {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::DeadLettered) {
//!             // export a counter, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "metrics" }      // prefer short, descriptive names
//!     fn queue_capacity(&self) -> usize { 2048 }        // larger buffer for metrics
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// External observer of broker lifecycle events.
///
/// Each listener runs in isolation:
/// - **Bounded queue** buffers events (capacity via [`Self::queue_capacity`]).
/// - **Dedicated worker task** processes events sequentially (FIFO).
/// - **Panic isolation**: panics are caught and emitted as `ListenerPanicked`.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this listener's queue.
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, never from the dispatch path.
    /// Use [`Event::name`] for the stable external event name and the
    /// optional fields for context (message id, topic, attempt, reason).
    async fn on_event(&self, event: &Event);

    /// Returns the listener name used in overflow/panic events.
    ///
    /// Prefer short, descriptive names (e.g., "metrics", "audit", "slack").
    /// The default uses `type_name::<Self>()`, which can be verbose -
    /// override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this listener.
    ///
    /// Overflow behavior:
    /// 1) the new event is dropped for this listener only,
    /// 2) an `EventKind::ListenerOverflow` is emitted,
    /// 3) other listeners are unaffected.
    ///
    /// The broker clamps capacity to a minimum of 1.
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
