//! # One delivery attempt to one subscriber.
//!
//! Executes a single handler invocation with optional timeout, panic
//! containment and failure-event publishing.
//!
//! - **Execute ONE attempt** of `subscriber.handle(message)`
//! - **Apply timeout** if configured (wraps the handler in `tokio::time::timeout`)
//! - **Contain panics** (`catch_unwind`; a panicking handler is a failed
//!   attempt, never a crashed dispatch loop)
//! - **Publish events** for observability (failed attempts)
//!
//! ## Event flow
//!
//! ```text
//! Success:
//!   handle() → Ok(())   → (no per-subscriber event; Delivered is emitted by
//!                          the topic actor when the whole message retires)
//!
//! Failure:
//!   handle() → Err(..)  → publish DeliveryFailed
//!
//! Timeout:
//!   timeout exceeded    → publish DeliveryFailed (Timeout error)
//!
//! Panic:
//!   handler panicked    → publish DeliveryFailed (Fail with panic info)
//! ```
//!
//! ## Rules
//! - Publishes **at most one** event per attempt: `DeliveryFailed` on error.
//! - Failures affect only this (message, subscriber) pair; the caller keeps
//!   dispatching to the remaining subscribers.

use std::time::Duration;

use futures::FutureExt;
use tokio::time;

use crate::error::DeliveryError;
use crate::events::{Bus, Event, EventKind};
use crate::message::Message;
use crate::subscribers::SubscriberRef;

/// Executes a single delivery attempt, publishing a failure event on error.
///
/// ### Flow
/// 1. Invoke the handler (wrapped in `catch_unwind`)
/// 2. Apply the optional timeout
/// 3. On error, publish `DeliveryFailed` with subscriber id, attempt and
///    reason, and return the error for the caller's retry decision
pub(crate) async fn deliver_once(
    message: &Message,
    subscriber: &SubscriberRef,
    timeout: Option<Duration>,
    bus: &Bus,
) -> Result<(), DeliveryError> {
    let attempt = std::panic::AssertUnwindSafe(subscriber.handle(message)).catch_unwind();

    let res = if let Some(dur) = timeout.filter(|d| *d > Duration::ZERO) {
        match time::timeout(dur, attempt).await {
            Ok(r) => flatten_panic(r),
            Err(_elapsed) => Err(DeliveryError::Timeout { timeout: dur }),
        }
    } else {
        flatten_panic(attempt.await)
    };

    if let Err(e) = &res {
        publish_failed(bus, message, subscriber.id(), e);
    }
    res
}

/// Converts a caught handler panic into a retryable delivery failure.
fn flatten_panic(
    res: Result<Result<(), DeliveryError>, Box<dyn std::any::Any + Send>>,
) -> Result<(), DeliveryError> {
    match res {
        Ok(inner) => inner,
        Err(panic_err) => {
            let info = {
                let any = &*panic_err;
                if let Some(msg) = any.downcast_ref::<&'static str>() {
                    (*msg).to_string()
                } else if let Some(msg) = any.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "unknown panic".to_string()
                }
            };
            Err(DeliveryError::Fail {
                reason: format!("handler panicked: {info}"),
            })
        }
    }
}

/// Publishes `DeliveryFailed` with error details.
fn publish_failed(bus: &Bus, message: &Message, subscriber: &str, err: &DeliveryError) {
    bus.publish(
        Event::now(EventKind::DeliveryFailed)
            .with_topic(message.topic_arc())
            .with_message(message.id())
            .with_subscriber(subscriber.to_string())
            .with_attempt(message.attempts())
            .with_reason(err.to_string()),
    );
}
