//! # Subscriber abstractions.
//!
//! This module provides the subscriber-side types:
//! - [`Subscriber`] - trait for message handlers registered on topics
//! - [`SubscriberFn`] - closure-backed subscriber implementation
//! - [`SubscriberRef`] - shared reference to a subscriber (`Arc<dyn Subscriber>`)
//! - [`SubscriptionHandle`] - token identifying one (topic, subscriber) registration

mod handle;
mod subscriber;
mod subscriber_fn;

pub use handle::SubscriptionHandle;
pub use subscriber::{Subscriber, SubscriberRef};
pub use subscriber_fn::SubscriberFn;
