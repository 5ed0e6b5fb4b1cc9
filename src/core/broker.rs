//! # Broker: the coordinating façade.
//!
//! The [`Broker`] owns the topic registry, the event bus, the listener
//! fan-out and the dead-letter store. It is an explicit, constructed
//! instance: pass it by reference (or `Arc`) to publishers and subscribers;
//! multiple independent brokers per process work fine, which keeps tests
//! hermetic.
//!
//! ## Key responsibilities
//! - admit publishes against each topic's queue bound (reject-on-full)
//! - route commands to per-topic actors (subscribe, strategy/retry config,
//!   drain)
//! - forward bus events to registered [`EventListener`]s
//! - perform graceful shutdown with a configurable grace period
//!
//! ## High-level architecture
//! ```text
//! publish(topic, payload)
//!   ├─► registry lookup ──► metrics.try_reserve(max_queue_length)
//!   │                         ├─ full → Backpressure event + typed error
//!   │                         └─ ok   → Command::Publish ──► TopicActor
//!   │
//! TopicActor (one per topic)            TopicActor ... (concurrent)
//!   └─ publish(Event) ──► Bus ──► forwarder ──► ListenerSet ──► listeners
//!
//! shutdown():
//!   cancel() → topic actors stop at safe points
//!            → join all within cfg.grace (stuck actors are aborted)
//!            → listener queues close
//! ```
//!
//! ## Concurrency
//! - `publish` never suspends: admission is a lock-free reservation and the
//!   actor handoff is a non-blocking send.
//! - Dispatch for one topic is serialized inside its actor; distinct topics
//!   proceed concurrently.
//! - The registry lock is held only for lookups and never across `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::core::metrics::MetricsSnapshot;
use crate::core::spec::TopicSpec;
use crate::core::topic::{Command, TopicActor, TopicHandle};
use crate::dead_letter::DeadLetterStore;
use crate::error::{
    PublishError, ShutdownError, SubscribeError, TopicNotFound, UnsubscribeError,
};
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{EventListener, ListenerSet};
use crate::message::{Message, MessageId};
use crate::policies::{DeliveryStrategy, RetryPolicy};
use crate::subscribers::{SubscriberRef, SubscriptionHandle};

/// In-process topic-based pub/sub broker.
///
/// See the [crate docs](crate) for the full architecture. Create one with
/// [`Broker::new`] inside a Tokio runtime (topic actors and listener workers
/// are spawned tasks).
pub struct Broker {
    cfg: BrokerConfig,
    bus: Bus,
    listeners: Arc<ListenerSet>,
    topics: RwLock<HashMap<String, TopicHandle>>,
    global_retry: Arc<RwLock<RetryPolicy>>,
    dead_letters: Arc<DeadLetterStore>,
    next_message_id: AtomicU64,
    cancel: CancellationToken,
}

impl Broker {
    /// Creates a broker with the given configuration.
    ///
    /// Must be called within a Tokio runtime: the broker spawns a forwarder
    /// task that feeds bus events to registered listeners.
    pub fn new(cfg: BrokerConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let listeners = Arc::new(ListenerSet::new(bus.clone()));
        let global_retry = Arc::new(RwLock::new(cfg.retry));
        let broker = Self {
            cfg,
            bus,
            listeners,
            topics: RwLock::new(HashMap::new()),
            global_retry,
            dead_letters: Arc::new(DeadLetterStore::new()),
            next_message_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        };
        broker.spawn_forwarder();
        broker
    }

    /// Forwards bus events to the listener set until shutdown.
    fn spawn_forwarder(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.listeners);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(Arc::new(ev)),
                        Err(broadcast::error::RecvError::Closed) => break,
                        // Listeners already get overflow accounting from
                        // their own queues; skipped events are dropped here.
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    },
                }
            }
        });
    }

    /// Registers a topic and spawns its actor.
    ///
    /// Returns `false` (and changes nothing) if the topic already exists.
    pub fn create_topic(&self, name: &str, spec: TopicSpec) -> bool {
        let mut topics = self.topics.write().expect("topic registry lock poisoned");
        if topics.contains_key(name) {
            return false;
        }
        let topic_name: Arc<str> = Arc::from(name);
        let handle = TopicActor::spawn(
            Arc::clone(&topic_name),
            &spec,
            self.bus.clone(),
            Arc::clone(&self.global_retry),
            Arc::clone(&self.dead_letters),
            &self.cancel,
        );
        topics.insert(name.to_string(), handle);
        drop(topics);

        self.bus
            .publish(Event::now(EventKind::TopicCreated).with_topic(topic_name));
        true
    }

    /// Publishes a message to a topic.
    ///
    /// Never suspends: either the message is admitted (capacity reserved and
    /// handed to the topic actor) or a typed error comes back immediately.
    /// Emits `MessageEnqueued` on success, `Backpressure` on rejection.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
    ) -> Result<MessageId, PublishError> {
        let topics = self.topics.read().expect("topic registry lock poisoned");
        let handle = topics.get(topic).ok_or_else(|| PublishError::TopicNotFound {
            topic: topic.to_string(),
        })?;

        if let Err(observed) = handle.metrics.try_reserve(handle.max_queue_length) {
            self.bus.publish(
                Event::now(EventKind::Backpressure)
                    .with_topic(Arc::clone(&handle.name))
                    .with_queue_length(observed),
            );
            return Err(PublishError::Backpressure {
                topic: topic.to_string(),
                queue_length: observed,
            });
        }

        let id = MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        let message = Message::new(id, Arc::clone(&handle.name), payload.into());
        if handle.tx.send(Command::Publish(message)).is_err() {
            // Actor gone (shutdown in progress); give the slot back.
            handle.metrics.release_slot();
            return Err(PublishError::TopicNotFound {
                topic: topic.to_string(),
            });
        }
        Ok(id)
    }

    /// Registers a subscriber on a topic. Idempotent per subscriber id.
    ///
    /// The registration is effective before any publish issued after this
    /// call returns (commands to one topic are processed in order).
    pub fn subscribe(
        &self,
        topic: &str,
        subscriber: SubscriberRef,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        let topics = self.topics.read().expect("topic registry lock poisoned");
        let handle = topics.get(topic).ok_or_else(|| SubscribeError::TopicNotFound {
            topic: topic.to_string(),
        })?;
        let subscriber_id: Arc<str> = Arc::from(subscriber.id());
        if handle.tx.send(Command::Subscribe(subscriber)).is_err() {
            return Err(SubscribeError::TopicNotFound {
                topic: topic.to_string(),
            });
        }
        Ok(SubscriptionHandle::new(
            Arc::clone(&handle.name),
            subscriber_id,
        ))
    }

    /// Removes a subscriber.
    ///
    /// Cancels future deliveries only: an in-flight attempt completes, and a
    /// redelivery already scheduled for this subscriber is dropped when due.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), UnsubscribeError> {
        let not_found = || UnsubscribeError::NotFound {
            topic: handle.topic().to_string(),
            subscriber: handle.subscriber().to_string(),
        };
        let (reply, rx) = oneshot::channel();
        {
            let topics = self.topics.read().expect("topic registry lock poisoned");
            let th = topics.get(handle.topic()).ok_or_else(not_found)?;
            th.tx
                .send(Command::Unsubscribe {
                    id: handle.subscriber_arc(),
                    reply,
                })
                .map_err(|_| not_found())?;
        }
        match rx.await {
            Ok(true) => Ok(()),
            _ => Err(not_found()),
        }
    }

    /// Hot-swaps a topic's delivery strategy.
    ///
    /// Queued messages transfer to the new strategy without loss,
    /// duplication or reordering; swapping to `Immediate` dispatches the
    /// backlog at once. Emits `StrategySwapped`.
    pub fn set_delivery_strategy(
        &self,
        topic: &str,
        strategy: DeliveryStrategy,
    ) -> Result<(), TopicNotFound> {
        let topics = self.topics.read().expect("topic registry lock poisoned");
        let handle = topics
            .get(topic)
            .ok_or_else(|| TopicNotFound(topic.to_string()))?;
        handle
            .tx
            .send(Command::SetStrategy(strategy))
            .map_err(|_| TopicNotFound(topic.to_string()))
    }

    /// Configures the retry policy.
    ///
    /// `topic = None` replaces the global policy, picked up by every topic
    /// without a per-topic override (including for failures already counted).
    /// `topic = Some(name)` installs an override for that topic.
    pub fn set_retry_policy(
        &self,
        topic: Option<&str>,
        policy: RetryPolicy,
    ) -> Result<(), TopicNotFound> {
        match topic {
            None => {
                *self
                    .global_retry
                    .write()
                    .expect("retry policy lock poisoned") = policy;
                Ok(())
            }
            Some(name) => {
                let topics = self.topics.read().expect("topic registry lock poisoned");
                let handle = topics
                    .get(name)
                    .ok_or_else(|| TopicNotFound(name.to_string()))?;
                handle
                    .tx
                    .send(Command::SetRetryPolicy(policy))
                    .map_err(|_| TopicNotFound(name.to_string()))
            }
        }
    }

    /// Removes and returns all queued (not yet dispatched) messages.
    ///
    /// Attempts already in flight are unaffected; redeliveries already
    /// scheduled keep their timers. Emits `TopicDrained`.
    pub async fn drain(&self, topic: &str) -> Result<Vec<Message>, TopicNotFound> {
        let (reply, rx) = oneshot::channel();
        {
            let topics = self.topics.read().expect("topic registry lock poisoned");
            let handle = topics
                .get(topic)
                .ok_or_else(|| TopicNotFound(topic.to_string()))?;
            handle
                .tx
                .send(Command::Drain { reply })
                .map_err(|_| TopicNotFound(topic.to_string()))?;
        }
        rx.await.map_err(|_| TopicNotFound(topic.to_string()))
    }

    /// Returns a point-in-time snapshot of a topic's counters.
    pub fn metrics(&self, topic: &str) -> Result<MetricsSnapshot, TopicNotFound> {
        let topics = self.topics.read().expect("topic registry lock poisoned");
        let handle = topics
            .get(topic)
            .ok_or_else(|| TopicNotFound(topic.to_string()))?;
        Ok(handle.metrics.snapshot())
    }

    /// Registers an event listener.
    ///
    /// The listener observes events emitted after registration, from its own
    /// worker task, behind its own bounded queue.
    pub fn register_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.add(listener);
    }

    /// Returns the dead-letter store shared by all topics of this broker.
    pub fn dead_letters(&self) -> Arc<DeadLetterStore> {
        Arc::clone(&self.dead_letters)
    }

    /// Returns the sorted list of registered topic names.
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.read().expect("topic registry lock poisoned");
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Stops all topic actors and listener workers.
    ///
    /// Waits up to `cfg.grace` for actors to reach a safe point; actors
    /// still busy after the grace period are aborted and reported in
    /// [`ShutdownError::GraceExceeded`]. Queued messages that were neither
    /// dispatched nor drained are dropped with the actors.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.cancel.cancel();
        let handles: Vec<(String, TopicHandle)> = {
            let mut topics = self.topics.write().expect("topic registry lock poisoned");
            topics.drain().collect()
        };

        let grace = self.cfg.grace;
        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();
        for (name, mut handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if time::timeout(remaining, &mut handle.join).await.is_err() {
                handle.join.abort();
                stuck.push(name);
            }
        }
        for worker in self.listeners.close() {
            let _ = worker.await;
        }

        if stuck.is_empty() {
            Ok(())
        } else {
            stuck.sort_unstable();
            Err(ShutdownError::GraceExceeded { grace, stuck })
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        // Actors and timers hold a child token each; dropping the broker
        // without an explicit shutdown still stops them.
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::message::MessageStatus;
    use crate::policies::JitterPolicy;
    use crate::subscribers::SubscriberFn;
    use std::sync::Mutex;
    use std::time::Duration;

    fn retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            first: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: JitterPolicy::None,
        }
    }

    fn collector(id: &'static str) -> (SubscriberRef, Arc<Mutex<Vec<MessageId>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = SubscriberFn::arc(id, move |m: Message| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(m.id());
                Ok::<_, DeliveryError>(())
            }
        });
        (sub, seen)
    }

    fn failing(id: &'static str) -> SubscriberRef {
        SubscriberFn::arc(id, |_m: Message| async {
            Err::<(), DeliveryError>(DeliveryError::Fail {
                reason: "boom".into(),
            })
        })
    }

    async fn next_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = time::timeout(Duration::from_secs(30), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bus closed");
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn immediate_delivery_preserves_order() {
        let broker = Broker::new(BrokerConfig::default());
        assert!(broker.create_topic("orders", TopicSpec::new(16, DeliveryStrategy::Immediate)));
        let (sub, seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        let m1 = broker.publish("orders", "m1").unwrap();
        let m2 = broker.publish("orders", "m2").unwrap();
        let m3 = broker.publish("orders", "m3").unwrap();

        for _ in 0..3 {
            next_event(&mut rx, EventKind::Delivered).await;
        }
        assert_eq!(*seen.lock().unwrap(), vec![m1, m2, m3]);

        let snap = broker.metrics("orders").unwrap();
        assert_eq!(snap.published_count, 3);
        assert_eq!(snap.delivered_count, 3);
        assert_eq!(snap.failed_count, 0);
        assert_eq!(snap.queue_length, 0);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_fails() {
        let broker = Broker::new(BrokerConfig::default());
        let err = broker.publish("nowhere", "x").unwrap_err();
        assert!(matches!(err, PublishError::TopicNotFound { .. }));
        let err = broker.subscribe("nowhere", failing("s")).unwrap_err();
        assert!(matches!(err, SubscribeError::TopicNotFound { .. }));
        assert!(broker.metrics("nowhere").is_err());
        assert!(broker.drain("nowhere").await.is_err());
    }

    #[tokio::test]
    async fn create_topic_is_exclusive() {
        let broker = Broker::new(BrokerConfig::default());
        let spec = TopicSpec::with_defaults(&BrokerConfig::default());
        assert!(broker.create_topic("orders", spec.clone()));
        assert!(!broker.create_topic("orders", spec));
        assert_eq!(broker.topics(), vec!["orders".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn backpressure_rejects_overflow_and_keeps_queue_intact() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(
                5,
                DeliveryStrategy::Batched {
                    batch_size: 100,
                    max_wait: Duration::from_secs(1),
                },
            ),
        );
        let (sub, seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        for i in 0..5 {
            broker.publish("orders", format!("m{i}")).unwrap();
        }
        // Sixth publish: queue is at capacity, typed rejection, no growth.
        let err = broker.publish("orders", "m5").unwrap_err();
        match err {
            PublishError::Backpressure {
                ref topic,
                queue_length,
            } => {
                assert_eq!(topic, "orders");
                assert_eq!(queue_length, 5);
            }
            other => panic!("expected backpressure, got {other:?}"),
        }
        let ev = next_event(&mut rx, EventKind::Backpressure).await;
        assert_eq!(ev.queue_length, Some(5));
        assert_eq!(broker.metrics("orders").unwrap().queue_length, 5);

        // The first five are unaffected and dispatch normally on flush.
        let flush = next_event(&mut rx, EventKind::BatchFlushed).await;
        assert_eq!(flush.reason.as_deref(), Some("max_wait"));
        for _ in 0..5 {
            next_event(&mut rx, EventKind::Delivered).await;
        }
        assert_eq!(seen.lock().unwrap().len(), 5);
        assert_eq!(broker.metrics("orders").unwrap().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bound_reaches_dead_letter_after_exact_attempts() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate).with_retry(retry(3)),
        );
        broker.subscribe("orders", failing("bad")).unwrap();

        let mut rx = broker.bus.subscribe();
        let id = broker.publish("orders", "doomed").unwrap();

        let ev = next_event(&mut rx, EventKind::DeadLettered).await;
        assert_eq!(ev.message, Some(id));
        assert_eq!(ev.attempt, Some(3));

        let dead = broker.dead_letters().snapshot();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.id(), id);
        assert_eq!(dead[0].message.attempts(), 3);
        assert_eq!(dead[0].message.status(), MessageStatus::DeadLetter);
        assert_eq!(&*dead[0].reason, "delivery failed: boom");

        let snap = broker.metrics("orders").unwrap();
        assert_eq!(snap.dead_letter_count, 1);
        assert_eq!(snap.failed_count, 3);
        assert_eq!(snap.delivered_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_subscriber_event_sequence() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate).with_retry(retry(2)),
        );
        broker.subscribe("orders", failing("bad")).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "doomed").unwrap();

        // Only the message lifecycle matters here; management events
        // (subscriber_added etc.) interleave freely and are skipped.
        let lifecycle = [
            EventKind::MessageEnqueued,
            EventKind::Delivering,
            EventKind::Delivered,
            EventKind::DeliveryFailed,
            EventKind::RetryScheduled,
            EventKind::DeadLettered,
        ];
        let mut names = Vec::new();
        loop {
            let ev = time::timeout(Duration::from_secs(30), rx.recv())
                .await
                .expect("timed out")
                .expect("bus closed");
            if !lifecycle.contains(&ev.kind) {
                continue;
            }
            let terminal = ev.kind == EventKind::DeadLettered;
            names.push(ev.name());
            if terminal {
                break;
            }
        }
        assert_eq!(
            names,
            vec![
                "message_enqueued",
                "delivering",
                "failed",
                "retry_scheduled",
                "delivering",
                "failed",
                "dead_letter",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_delay_follows_capped_backoff() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate).with_retry(retry(3)),
        );
        broker.subscribe("orders", failing("bad")).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "doomed").unwrap();

        let first = next_event(&mut rx, EventKind::RetryScheduled).await;
        assert_eq!(first.delay_ms, Some(100));
        let second = next_event(&mut rx, EventKind::RetryScheduled).await;
        assert_eq!(second.delay_ms, Some(200));
        next_event(&mut rx, EventKind::DeadLettered).await;
    }

    #[tokio::test(start_paused = true)]
    async fn batched_max_wait_flushes_partial_batch() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(
                16,
                DeliveryStrategy::Batched {
                    batch_size: 3,
                    max_wait: Duration::from_secs(1),
                },
            ),
        );
        let (sub, seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        let m1 = broker.publish("orders", "m1").unwrap();
        let m2 = broker.publish("orders", "m2").unwrap();

        let flush = next_event(&mut rx, EventKind::BatchFlushed).await;
        assert_eq!(flush.reason.as_deref(), Some("max_wait"));
        assert_eq!(flush.batch.as_deref(), Some(&[m1, m2][..]));

        for _ in 0..2 {
            next_event(&mut rx, EventKind::Delivered).await;
        }
        assert_eq!(*seen.lock().unwrap(), vec![m1, m2]);
    }

    #[tokio::test(start_paused = true)]
    async fn batched_size_threshold_flushes_immediately() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(
                16,
                DeliveryStrategy::Batched {
                    batch_size: 2,
                    max_wait: Duration::from_secs(3600),
                },
            ),
        );
        let (sub, seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "m1").unwrap();
        broker.publish("orders", "m2").unwrap();

        let flush = next_event(&mut rx, EventKind::BatchFlushed).await;
        assert_eq!(flush.reason.as_deref(), Some("batch_size"));
        for _ in 0..2 {
            next_event(&mut rx, EventKind::Delivered).await;
        }
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn strategy_swap_neither_drops_nor_duplicates() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(
                16,
                DeliveryStrategy::Batched {
                    batch_size: 100,
                    max_wait: Duration::from_secs(3600),
                },
            ),
        );
        let (sub, seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(broker.publish("orders", format!("m{i}")).unwrap());
        }

        // Swap twice while the backlog sits queued; nothing dispatches until
        // the final swap to Immediate.
        broker
            .set_delivery_strategy(
                "orders",
                DeliveryStrategy::Batched {
                    batch_size: 50,
                    max_wait: Duration::from_secs(3600),
                },
            )
            .unwrap();
        next_event(&mut rx, EventKind::StrategySwapped).await;
        assert!(seen.lock().unwrap().is_empty());

        broker
            .set_delivery_strategy("orders", DeliveryStrategy::Immediate)
            .unwrap();
        for _ in 0..4 {
            next_event(&mut rx, EventKind::Delivered).await;
        }

        // Exactly once each, in enqueue order.
        assert_eq!(*seen.lock().unwrap(), ids);
        let snap = broker.metrics("orders").unwrap();
        assert_eq!(snap.delivered_count, 4);
        assert_eq!(snap.queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_subscriber_does_not_block_others() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate).with_retry(retry(2)),
        );
        broker.subscribe("orders", failing("bad")).unwrap();
        let (good, seen) = collector("good");
        broker.subscribe("orders", good).unwrap();

        let mut rx = broker.bus.subscribe();
        let id = broker.publish("orders", "shared").unwrap();

        // The healthy subscriber got the message on the first round; the
        // failing one drags the message into the dead-letter store alone.
        let ev = next_event(&mut rx, EventKind::DeadLettered).await;
        assert_eq!(ev.message, Some(id));
        assert_eq!(*seen.lock().unwrap(), vec![id]);

        // Redeliveries targeted only the failing subscriber.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_per_id() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic("orders", TopicSpec::new(16, DeliveryStrategy::Immediate));
        let (first, seen) = collector("worker");
        let (second, _ignored) = collector("worker");
        broker.subscribe("orders", first).unwrap();
        broker.subscribe("orders", second).unwrap();

        let mut rx = broker.bus.subscribe();
        let id = broker.publish("orders", "once").unwrap();
        next_event(&mut rx, EventKind::Delivered).await;

        assert_eq!(*seen.lock().unwrap(), vec![id]);
        assert_eq!(broker.metrics("orders").unwrap().subscriber_count, 1);
    }

    #[tokio::test]
    async fn unsubscribe_cancels_future_deliveries_only() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic("orders", TopicSpec::new(16, DeliveryStrategy::Immediate));
        let (sub, seen) = collector("worker");
        let handle = broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        let m1 = broker.publish("orders", "before").unwrap();
        next_event(&mut rx, EventKind::Delivered).await;

        broker.unsubscribe(&handle).await.unwrap();
        assert!(broker.unsubscribe(&handle).await.is_err());

        broker.publish("orders", "after").unwrap();
        next_event(&mut rx, EventKind::Delivered).await;
        assert_eq!(*seen.lock().unwrap(), vec![m1]);
        assert_eq!(broker.metrics("orders").unwrap().subscriber_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_drops_scheduled_redelivery() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate).with_retry(retry(5)),
        );
        let handle = broker.subscribe("orders", failing("bad")).unwrap();

        let mut rx = broker.bus.subscribe();
        let id = broker.publish("orders", "orphaned").unwrap();
        next_event(&mut rx, EventKind::RetryScheduled).await;

        // Remove the subscriber before its retry timer fires; the pair
        // resolves as cancelled and the message retires.
        broker.unsubscribe(&handle).await.unwrap();
        let ev = next_event(&mut rx, EventKind::Delivered).await;
        assert_eq!(ev.message, Some(id));
        assert!(broker.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn drain_returns_queued_messages_without_dispatch() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(
                16,
                DeliveryStrategy::Batched {
                    batch_size: 100,
                    max_wait: Duration::from_secs(3600),
                },
            ),
        );
        let (sub, seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(broker.publish("orders", format!("m{i}")).unwrap());
        }

        let drained = broker.drain("orders").await.unwrap();
        assert_eq!(
            drained.iter().map(|m| m.id()).collect::<Vec<_>>(),
            ids,
            "drain preserves enqueue order"
        );
        for m in &drained {
            assert_eq!(m.status(), MessageStatus::Queued);
            assert_eq!(m.attempts(), 0);
        }
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(broker.metrics("orders").unwrap().queue_length, 0);

        // The topic keeps working after a drain.
        let mut rx = broker.bus.subscribe();
        broker.set_delivery_strategy("orders", DeliveryStrategy::Immediate).unwrap();
        broker.publish("orders", "fresh").unwrap();
        next_event(&mut rx, EventKind::Delivered).await;
    }

    #[tokio::test(start_paused = true)]
    async fn global_retry_policy_applies_without_override() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic("orders", TopicSpec::new(16, DeliveryStrategy::Immediate));
        broker.subscribe("orders", failing("bad")).unwrap();
        broker.set_retry_policy(None, retry(1)).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "doomed").unwrap();

        // max_attempts = 1: no retry is ever scheduled.
        let ev = next_event(&mut rx, EventKind::DeadLettered).await;
        assert_eq!(ev.attempt, Some(1));
        assert_eq!(broker.dead_letters().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_skips_retries() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate).with_retry(retry(5)),
        );
        let poison: SubscriberRef = SubscriberFn::arc("poison", |_m: Message| async {
            Err::<(), DeliveryError>(DeliveryError::Fatal {
                reason: "unparseable".into(),
            })
        });
        broker.subscribe("orders", poison).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "bad-payload").unwrap();

        let ev = next_event(&mut rx, EventKind::DeadLettered).await;
        assert_eq!(ev.attempt, Some(1));
        let dead = broker.dead_letters().snapshot();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("unparseable"));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_timeout_counts_as_failure() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(16, DeliveryStrategy::Immediate)
                .with_retry(retry(1))
                .with_delivery_timeout(Some(Duration::from_millis(50))),
        );
        let slow: SubscriberRef = SubscriberFn::arc("slow", |_m: Message| async {
            time::sleep(Duration::from_secs(60)).await;
            Ok::<_, DeliveryError>(())
        });
        broker.subscribe("orders", slow).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "too-slow").unwrap();

        next_event(&mut rx, EventKind::DeadLettered).await;
        let dead = broker.dead_letters().snapshot();
        assert!(dead[0].reason.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn every_message_reaches_exactly_one_terminal_status() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic(
            "orders",
            TopicSpec::new(32, DeliveryStrategy::Immediate).with_retry(retry(2)),
        );
        // One subscriber fails only for odd payload sizes.
        let picky: SubscriberRef = SubscriberFn::arc("picky", |m: Message| async move {
            if m.payload().len() % 2 == 1 {
                Err(DeliveryError::Fail {
                    reason: "odd".into(),
                })
            } else {
                Ok(())
            }
        });
        broker.subscribe("orders", picky).unwrap();

        let mut rx = broker.bus.subscribe();
        for payload in ["a", "bb", "ccc", "dddd", "eeeee", "ffffff"] {
            broker.publish("orders", payload).unwrap();
        }

        // 3 even payloads deliver, 3 odd payloads dead-letter after retries.
        let mut delivered = 0;
        let mut dead = 0;
        while delivered + dead < 6 {
            let ev = time::timeout(Duration::from_secs(30), rx.recv())
                .await
                .expect("timed out")
                .expect("bus closed");
            match ev.kind {
                EventKind::Delivered => delivered += 1,
                EventKind::DeadLettered => dead += 1,
                _ => {}
            }
        }
        assert_eq!(delivered, 3);
        assert_eq!(dead, 3);

        let snap = broker.metrics("orders").unwrap();
        assert_eq!(snap.delivered_count, 3);
        assert_eq!(snap.dead_letter_count, 3);
        assert_eq!(snap.queue_length, 0);
        assert_eq!(broker.dead_letters().len(), 3);
    }

    #[tokio::test]
    async fn listener_receives_named_events() {
        struct Recorder {
            names: Arc<Mutex<Vec<&'static str>>>,
        }

        #[async_trait::async_trait]
        impl EventListener for Recorder {
            async fn on_event(&self, event: &Event) {
                self.names.lock().unwrap().push(event.name());
            }

            fn name(&self) -> &'static str {
                "recorder"
            }
        }

        let broker = Broker::new(BrokerConfig::default());
        let names = Arc::new(Mutex::new(Vec::new()));
        broker.register_event_listener(Arc::new(Recorder {
            names: Arc::clone(&names),
        }));
        broker.create_topic("orders", TopicSpec::new(16, DeliveryStrategy::Immediate));
        let (sub, _seen) = collector("worker");
        broker.subscribe("orders", sub).unwrap();

        let mut rx = broker.bus.subscribe();
        broker.publish("orders", "hello").unwrap();
        next_event(&mut rx, EventKind::Delivered).await;

        // Listener delivery is asynchronous; poll briefly for the tail.
        for _ in 0..50 {
            if names.lock().unwrap().contains(&"delivered") {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        let names = names.lock().unwrap();
        assert!(names.contains(&"topic_created"));
        assert!(names.contains(&"subscriber_added"));
        assert!(names.contains(&"message_enqueued"));
        assert!(names.contains(&"delivering"));
        assert!(names.contains(&"delivered"));
    }

    #[tokio::test]
    async fn shutdown_stops_actors_within_grace() {
        let broker = Broker::new(BrokerConfig::default());
        broker.create_topic("a", TopicSpec::new(16, DeliveryStrategy::Immediate));
        broker.create_topic("b", TopicSpec::new(16, DeliveryStrategy::Immediate));
        let (sub, _seen) = collector("worker");
        broker.subscribe("a", sub).unwrap();
        broker.publish("a", "x").unwrap();

        broker.shutdown().await.unwrap();

        // Everything is gone; publishes now fail as not-found.
        assert!(broker.topics().is_empty());
        assert!(matches!(
            broker.publish("a", "y").unwrap_err(),
            PublishError::TopicNotFound { .. }
        ));
    }
}
