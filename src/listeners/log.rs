//! # Simple logging listener for debugging and demos.
//!
//! [`LogListener`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [message_enqueued] topic=orders id=1 queue=1
//! [delivering] topic=orders id=1 attempt=1
//! [failed] topic=orders id=1 sub=billing reason="connection refused"
//! [retry_scheduled] topic=orders id=1 sub=billing delay_ms=200
//! [dead_letter] topic=orders id=1 reason="connection refused"
//! [backpressure] topic=orders queue=5
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::listeners::EventListener;

/// Simple stdout logging listener.
///
/// Prints human-readable event descriptions for debugging and demonstration
/// purposes. Not intended for production use - implement a custom
/// [`EventListener`] for structured logging or metrics collection.
pub struct LogListener;

#[async_trait]
impl EventListener for LogListener {
    async fn on_event(&self, e: &Event) {
        let name = e.name();
        match e.kind {
            EventKind::MessageEnqueued => {
                println!(
                    "[{name}] topic={:?} id={:?} queue={:?}",
                    e.topic, e.message, e.queue_length
                );
            }
            EventKind::Delivering | EventKind::Delivered => {
                println!(
                    "[{name}] topic={:?} id={:?} attempt={:?}",
                    e.topic, e.message, e.attempt
                );
            }
            EventKind::DeliveryFailed => {
                println!(
                    "[{name}] topic={:?} id={:?} sub={:?} reason={:?}",
                    e.topic, e.message, e.subscriber, e.reason
                );
            }
            EventKind::RetryScheduled => {
                println!(
                    "[{name}] topic={:?} id={:?} sub={:?} delay_ms={:?}",
                    e.topic, e.message, e.subscriber, e.delay_ms
                );
            }
            EventKind::DeadLettered => {
                println!(
                    "[{name}] topic={:?} id={:?} reason={:?}",
                    e.topic, e.message, e.reason
                );
            }
            EventKind::Backpressure | EventKind::TopicDrained => {
                println!("[{name}] topic={:?} queue={:?}", e.topic, e.queue_length);
            }
            EventKind::BatchFlushed => {
                println!(
                    "[{name}] topic={:?} batch={:?} trigger={:?}",
                    e.topic, e.batch, e.reason
                );
            }
            EventKind::StrategySwapped => {
                println!("[{name}] topic={:?} strategy={:?}", e.topic, e.reason);
            }
            EventKind::TopicCreated
            | EventKind::SubscriberAdded
            | EventKind::SubscriberRemoved => {
                println!("[{name}] topic={:?} sub={:?}", e.topic, e.subscriber);
            }
            EventKind::ListenerOverflow | EventKind::ListenerPanicked => {
                println!("[{name}] listener={:?} reason={:?}", e.subscriber, e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
