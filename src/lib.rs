//! # topicbus
//!
//! **topicbus** is an embeddable, in-process, topic-based publish/subscribe
//! broker for Rust.
//!
//! It provides bounded topic queues with reject-on-full backpressure,
//! pluggable delivery strategies (immediate or batched), capped exponential
//! retry with jitter, dead-letter capture, and a non-blocking event bus for
//! external observers. The crate is designed as a building block to embed
//! inside a larger service, not as a networked broker.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  Publishers (many)                       Subscribers (per topic)
//!       │ publish(topic, payload)
//!       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Broker (façade)                                                  │
//! │  - topic registry (name → actor handle)                           │
//! │  - backpressure admission (lock-free slot reservation)            │
//! │  - Bus (broadcast events) + ListenerSet (observer fan-out)        │
//! │  - DeadLetterStore (append-only archive)                          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │  TopicActor  │   │  TopicActor  │   │  TopicActor  │  (one per topic)
//!  │ queue        │   │ queue        │   │ queue        │
//!  │ subscribers  │   │ subscribers  │   │ subscribers  │
//!  │ strategy     │   │ strategy     │   │ strategy     │
//!  └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!   │ dispatch rounds (sequential per topic, concurrent across topics)
//!   ▼
//!  subscriber.handle(message)  → Ok        → (all ok) Delivered
//!                              → Err(..)   → RetryPolicy.decide(attempts)
//!                                            ├─ Retry(delay) → timer → redeliver
//!                                            └─ GiveUp       → DeadLetterStore
//!
//!  Every transition publishes an Event:
//!   message_enqueued, delivering, delivered, failed, retry_scheduled,
//!   dead_letter, backpressure, strategy_swapped, batch_flush, ...
//!        │
//!        ▼
//!   Bus ──► forwarder ──► ListenerSet ──► [queue]→worker→listener.on_event()
//! ```
//!
//! ### Message lifecycle
//! ```text
//! publish() ─► Created ─► Queued ─► Delivering ─► Delivered      (terminal)
//!                           ▲           │
//!                           │           ▼
//!                           │        Failed ─► RetryScheduled
//!                           └───────────┴────► DeadLetter        (terminal)
//! ```
//!
//! ## Guarantees
//! | Concern           | Contract                                                               |
//! |-------------------|------------------------------------------------------------------------|
//! | **Backpressure**  | `publish` on a full queue returns a typed error; never blocks or drops. |
//! | **Ordering**      | Per (topic, subscriber) enqueue order; redeliveries may arrive late.   |
//! | **Isolation**     | A failing subscriber retries alone; others are unaffected.             |
//! | **Delivery**      | At-least-once; subscribers must be idempotent.                         |
//! | **Terminality**   | Every admitted message ends `Delivered` or `DeadLetter` (or is drained).|
//! | **Observability** | Listeners never block dispatch; their failures never touch messages.   |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use topicbus::{
//!     Broker, BrokerConfig, DeliveryError, DeliveryStrategy, Message,
//!     RetryPolicy, SubscriberFn, SubscriberRef, TopicSpec,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Broker::new(BrokerConfig::default());
//!
//!     broker.create_topic(
//!         "orders",
//!         TopicSpec::new(1024, DeliveryStrategy::Immediate)
//!             .with_retry(RetryPolicy { max_attempts: 3, ..RetryPolicy::default() }),
//!     );
//!
//!     let worker: SubscriberRef = SubscriberFn::arc("worker", |message: Message| async move {
//!         println!("got {} bytes", message.payload().len());
//!         Ok::<_, DeliveryError>(())
//!     });
//!     let handle = broker.subscribe("orders", worker)?;
//!
//!     broker.publish("orders", "order #42")?;
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     broker.unsubscribe(&handle).await?;
//!     broker.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod dead_letter;
mod error;
mod events;
mod listeners;
mod message;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{Broker, MetricsSnapshot, TopicSpec};
pub use config::BrokerConfig;
pub use dead_letter::{DeadLetter, DeadLetterStore};
pub use error::{
    DeliveryError, PublishError, ShutdownError, SubscribeError, TopicNotFound, UnsubscribeError,
};
pub use events::{Event, EventKind};
pub use listeners::{EventListener, LogListener};
pub use message::{Message, MessageId, MessageStatus};
pub use policies::{DeliveryStrategy, JitterPolicy, RetryDecision, RetryPolicy};
pub use subscribers::{Subscriber, SubscriberFn, SubscriberRef, SubscriptionHandle};
