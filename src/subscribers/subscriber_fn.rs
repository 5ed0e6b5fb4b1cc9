//! # Closure-backed subscriber (`SubscriberFn`)
//!
//! [`SubscriberFn`] wraps a closure `F: Fn(Message) -> Fut`, producing a
//! fresh future per delivery. The closure receives its own clone of the
//! message (payload bytes are shared, not copied), so no shared mutable
//! state is required; when shared state is needed, capture an `Arc<...>`
//! explicitly inside the closure.
//!
//! ## Example
//! ```rust
//! use topicbus::{DeliveryError, Message, SubscriberFn, SubscriberRef};
//!
//! let sub: SubscriberRef = SubscriberFn::arc("audit", |message: Message| async move {
//!     let _ = message.payload();
//!     Ok::<_, DeliveryError>(())
//! });
//!
//! assert_eq!(sub.id(), "audit");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::message::Message;
use crate::subscribers::subscriber::Subscriber;

/// Closure-backed subscriber implementation.
///
/// Wraps a closure that *creates* a new future per delivered message.
#[derive(Debug)]
pub struct SubscriberFn<F> {
    id: Cow<'static, str>,
    f: F,
}

impl<F> SubscriberFn<F> {
    /// Creates a new closure-backed subscriber.
    ///
    /// Prefer [`SubscriberFn::arc`] when you immediately need a
    /// [`SubscriberRef`](crate::SubscriberRef).
    pub fn new(id: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { id: id.into(), f }
    }

    /// Creates the subscriber and returns it as a shared handle.
    pub fn arc(id: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(id, f))
    }
}

#[async_trait]
impl<F, Fut> Subscriber for SubscriberFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, message: &Message) -> Result<(), DeliveryError> {
        (self.f)(message.clone()).await
    }
}
