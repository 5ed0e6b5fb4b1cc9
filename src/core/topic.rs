//! # TopicActor: single-owner task for one topic.
//!
//! Owns everything mutable about a topic — the pending queue, the subscriber
//! list, the delivery strategy, and the redelivery bookkeeping — so every
//! mutation is serialized through one task and enqueue/flush/swap races
//! cannot happen.
//!
//! ## Architecture
//! ```text
//! Broker ──► Command (mpsc) ──► TopicActor::run()
//!
//! loop {
//!   select! {
//!     ├─► cancel.cancelled()      → break
//!     ├─► rx.recv()               → Publish / Subscribe / Unsubscribe /
//!     │                             SetStrategy / SetRetryPolicy / Drain /
//!     │                             RetryDue
//!     └─► sleep_until(batch due)  → flush("max_wait")
//!   }
//! }
//! ```
//!
//! ## Dispatch rounds
//! A round is one `Delivering` transition: the first round targets every
//! registered subscriber in registration order; redelivery rounds target the
//! single subscriber whose retry timer fired. Failures are isolated per
//! (message, subscriber) pair:
//! ```text
//! dispatch_round(message, targets)
//!   ├─► begin_attempt() → publish Delivering
//!   ├─► deliver_once() per target (sequential, registration order)
//!   ├─► all ok, nothing outstanding  → Delivered
//!   ├─► retryable failures → RetryPolicy.decide(attempts)
//!   │     ├─► Retry(delay) → RetryScheduled + one timer per failed target
//!   │     └─► GiveUp       → DeadLetter (archived with last reason)
//!   └─► fatal failure      → DeadLetter immediately
//! }
//! ```
//!
//! ## Rules
//! - Rounds run **sequentially** within one topic (never parallel); distinct
//!   topics dispatch concurrently.
//! - Retry timers are detached tasks that post `RetryDue` back to the actor;
//!   they suspend nothing but themselves.
//! - A due redelivery dispatches immediately: its delay already elapsed, so
//!   it does not re-enter batch accumulation, and it does not consume
//!   backpressure capacity.
//! - Swapping strategies keeps the pending queue intact; swapping to
//!   `Immediate` dispatches the backlog at once.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::dispatch::deliver_once;
use crate::core::metrics::TopicMetrics;
use crate::core::spec::TopicSpec;
use crate::dead_letter::DeadLetterStore;
use crate::events::{Bus, Event, EventKind};
use crate::message::{Message, MessageId};
use crate::policies::{DeliveryStrategy, RetryDecision, RetryPolicy};
use crate::subscribers::SubscriberRef;

/// Control and data messages accepted by a topic actor.
pub(crate) enum Command {
    /// Enqueue a freshly published message (capacity already reserved).
    Publish(Message),
    /// Register a subscriber (idempotent per id).
    Subscribe(SubscriberRef),
    /// Remove a subscriber; replies whether it was registered.
    Unsubscribe {
        id: Arc<str>,
        reply: oneshot::Sender<bool>,
    },
    /// Hot-swap the delivery strategy.
    SetStrategy(DeliveryStrategy),
    /// Install a per-topic retry policy override.
    SetRetryPolicy(RetryPolicy),
    /// Remove and return all queued (not yet dispatched) messages.
    Drain {
        reply: oneshot::Sender<Vec<Message>>,
    },
    /// A retry timer fired for one (message, subscriber) pair.
    RetryDue {
        id: MessageId,
        subscriber: Arc<str>,
    },
}

/// Broker-side handle to a running topic actor.
pub(crate) struct TopicHandle {
    pub(crate) name: Arc<str>,
    pub(crate) tx: mpsc::UnboundedSender<Command>,
    pub(crate) metrics: Arc<TopicMetrics>,
    pub(crate) max_queue_length: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) join: JoinHandle<()>,
}

/// A fresh message waiting for dispatch.
struct PendingDispatch {
    message: Message,
    enqueued_at: Instant,
}

/// A message parked between dispatch rounds with redeliveries outstanding.
struct RetryState {
    message: Message,
    /// Scheduled redeliveries not yet resolved.
    outstanding: usize,
}

/// Single-owner task holding all mutable state of one topic.
pub(crate) struct TopicActor {
    name: Arc<str>,
    rx: mpsc::UnboundedReceiver<Command>,
    /// Cloned into retry timer tasks so redeliveries come back to this actor.
    tx: mpsc::UnboundedSender<Command>,
    bus: Bus,
    metrics: Arc<TopicMetrics>,
    dead_letters: Arc<DeadLetterStore>,
    cancel: CancellationToken,

    subscribers: Vec<SubscriberRef>,
    strategy: DeliveryStrategy,
    retry_override: Option<RetryPolicy>,
    global_retry: Arc<RwLock<RetryPolicy>>,
    delivery_timeout: Option<Duration>,

    pending: VecDeque<PendingDispatch>,
    retrying: HashMap<MessageId, RetryState>,
}

impl TopicActor {
    /// Spawns the actor task and returns the broker-side handle.
    pub(crate) fn spawn(
        name: Arc<str>,
        spec: &TopicSpec,
        bus: Bus,
        global_retry: Arc<RwLock<RetryPolicy>>,
        dead_letters: Arc<DeadLetterStore>,
        parent: &CancellationToken,
    ) -> TopicHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(TopicMetrics::new());
        let cancel = parent.child_token();

        let actor = TopicActor {
            name: Arc::clone(&name),
            rx,
            tx: tx.clone(),
            bus,
            metrics: Arc::clone(&metrics),
            dead_letters,
            cancel: cancel.clone(),
            subscribers: Vec::new(),
            strategy: spec.strategy(),
            retry_override: spec.retry(),
            global_retry,
            delivery_timeout: spec.delivery_timeout(),
            pending: VecDeque::new(),
            retrying: HashMap::new(),
        };
        let join = tokio::spawn(actor.run());

        TopicHandle {
            name,
            tx,
            metrics,
            max_queue_length: spec.max_queue_length(),
            cancel,
            join,
        }
    }

    /// Runs the actor until cancellation or until the broker drops its sender.
    async fn run(mut self) {
        loop {
            let deadline = self.batch_deadline();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                _ = sleep_until_opt(deadline) => self.flush("max_wait").await,
            }
        }
    }

    /// Returns when the oldest pending message must be flushed, if batching.
    fn batch_deadline(&self) -> Option<Instant> {
        match self.strategy {
            DeliveryStrategy::Batched { max_wait, .. } => {
                self.pending.front().map(|p| p.enqueued_at + max_wait)
            }
            DeliveryStrategy::Immediate => None,
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Publish(mut message) => {
                message.mark_queued();
                self.metrics.inc_published();
                self.bus.publish(
                    Event::now(EventKind::MessageEnqueued)
                        .with_topic(Arc::clone(&self.name))
                        .with_message(message.id())
                        .with_queue_length(self.metrics.queue_length()),
                );
                self.pending.push_back(PendingDispatch {
                    message,
                    enqueued_at: Instant::now(),
                });
                self.pump().await;
            }
            Command::Subscribe(subscriber) => {
                if self.has_subscriber(subscriber.id()) {
                    return;
                }
                let id: Arc<str> = Arc::from(subscriber.id());
                self.subscribers.push(subscriber);
                self.metrics.inc_subscribers();
                self.bus.publish(
                    Event::now(EventKind::SubscriberAdded)
                        .with_topic(Arc::clone(&self.name))
                        .with_subscriber(id),
                );
            }
            Command::Unsubscribe { id, reply } => {
                let before = self.subscribers.len();
                self.subscribers.retain(|s| s.id() != &*id);
                let removed = self.subscribers.len() < before;
                if removed {
                    self.metrics.dec_subscribers();
                    self.bus.publish(
                        Event::now(EventKind::SubscriberRemoved)
                            .with_topic(Arc::clone(&self.name))
                            .with_subscriber(id),
                    );
                }
                let _ = reply.send(removed);
            }
            Command::SetStrategy(strategy) => {
                self.strategy = strategy;
                self.bus.publish(
                    Event::now(EventKind::StrategySwapped)
                        .with_topic(Arc::clone(&self.name))
                        .with_reason(strategy.as_label()),
                );
                // The backlog transfers as-is; a swap to Immediate (or to a
                // batch size the backlog already satisfies) dispatches now.
                self.pump().await;
            }
            Command::SetRetryPolicy(policy) => {
                self.retry_override = Some(policy);
            }
            Command::Drain { reply } => {
                let mut drained = Vec::with_capacity(self.pending.len());
                while let Some(p) = self.pending.pop_front() {
                    self.metrics.release_slot();
                    drained.push(p.message);
                }
                self.bus.publish(
                    Event::now(EventKind::TopicDrained)
                        .with_topic(Arc::clone(&self.name))
                        .with_queue_length(drained.len()),
                );
                let _ = reply.send(drained);
            }
            Command::RetryDue { id, subscriber } => {
                self.redeliver(id, subscriber).await;
            }
        }
    }

    /// Applies the current strategy to the pending queue.
    async fn pump(&mut self) {
        match self.strategy {
            DeliveryStrategy::Immediate => {
                while let Some(p) = self.pending.pop_front() {
                    self.metrics.release_slot();
                    self.dispatch_round(p.message, None, 0).await;
                }
            }
            DeliveryStrategy::Batched { batch_size, .. } => {
                if self.pending.len() >= batch_size.max(1) {
                    self.flush("batch_size").await;
                }
            }
        }
    }

    /// Dispatches the whole accumulated batch in enqueue order.
    async fn flush(&mut self, trigger: &'static str) {
        if self.pending.is_empty() {
            return;
        }
        let mut batch = Vec::with_capacity(self.pending.len());
        while let Some(p) = self.pending.pop_front() {
            self.metrics.release_slot();
            batch.push(p.message);
        }
        let ids: Vec<MessageId> = batch.iter().map(|m| m.id()).collect();
        self.bus.publish(
            Event::now(EventKind::BatchFlushed)
                .with_topic(Arc::clone(&self.name))
                .with_batch(ids)
                .with_reason(trigger),
        );
        for message in batch {
            self.dispatch_round(message, None, 0).await;
        }
    }

    /// Handles a fired retry timer for one (message, subscriber) pair.
    async fn redeliver(&mut self, id: MessageId, subscriber: Arc<str>) {
        // Entry gone means the message already retired (a fatal failure or a
        // give-up on another subscriber's path); the redelivery is moot.
        let Some(mut state) = self.retrying.remove(&id) else {
            return;
        };
        state.outstanding -= 1;

        if !self.has_subscriber(&subscriber) {
            // Unsubscribed while the timer ran: the pair resolves as
            // cancelled. If nothing else is outstanding the message retires.
            if state.outstanding == 0 {
                self.retire_delivered(state.message);
            } else {
                self.retrying.insert(id, state);
            }
            return;
        }

        let mut message = state.message;
        message.mark_queued();
        self.dispatch_round(message, Some(subscriber), state.outstanding)
            .await;
    }

    /// Runs one dispatch round: one `Delivering` transition, one handler
    /// invocation per target, then settlement (retire / park / schedule).
    ///
    /// `only` narrows the round to a single subscriber (redelivery);
    /// `outstanding_others` counts redeliveries for this message that are
    /// still scheduled elsewhere and must keep the message parked.
    async fn dispatch_round(
        &mut self,
        mut message: Message,
        only: Option<Arc<str>>,
        outstanding_others: usize,
    ) {
        let targets: Vec<SubscriberRef> = match &only {
            Some(id) => self
                .subscribers
                .iter()
                .filter(|s| s.id() == &**id)
                .cloned()
                .collect(),
            None => self.subscribers.clone(),
        };

        message.begin_attempt();
        let mut ev = Event::now(EventKind::Delivering)
            .with_topic(Arc::clone(&self.name))
            .with_message(message.id())
            .with_attempt(message.attempts());
        if let Some(id) = &only {
            ev = ev.with_subscriber(Arc::clone(id));
        }
        self.bus.publish(ev);

        let mut retryable: Vec<Arc<str>> = Vec::new();
        let mut last_reason: Option<String> = None;
        let mut fatal_reason: Option<String> = None;
        for sub in &targets {
            match deliver_once(&message, sub, self.delivery_timeout, &self.bus).await {
                Ok(()) => {}
                Err(e) => {
                    self.metrics.inc_failed();
                    let reason = e.to_string();
                    if e.is_retryable() {
                        retryable.push(Arc::from(sub.id()));
                    } else {
                        fatal_reason = Some(reason.clone());
                    }
                    last_reason = Some(reason);
                }
            }
        }

        if let Some(reason) = fatal_reason {
            message.mark_failed();
            self.retire_dead_letter(message, reason);
            return;
        }

        if retryable.is_empty() {
            if outstanding_others == 0 {
                self.retire_delivered(message);
            } else {
                message.mark_retry_scheduled();
                self.retrying.insert(
                    message.id(),
                    RetryState {
                        message,
                        outstanding: outstanding_others,
                    },
                );
            }
            return;
        }

        message.mark_failed();
        match self.effective_retry().decide(message.attempts()) {
            RetryDecision::Retry(delay) => {
                message.mark_retry_scheduled();
                for sub in &retryable {
                    self.bus.publish(
                        Event::now(EventKind::RetryScheduled)
                            .with_topic(Arc::clone(&self.name))
                            .with_message(message.id())
                            .with_subscriber(Arc::clone(sub))
                            .with_attempt(message.attempts())
                            .with_delay(delay),
                    );
                    self.spawn_retry_timer(message.id(), Arc::clone(sub), delay);
                }
                let outstanding = outstanding_others + retryable.len();
                self.retrying.insert(
                    message.id(),
                    RetryState {
                        message,
                        outstanding,
                    },
                );
            }
            RetryDecision::GiveUp => {
                let reason =
                    last_reason.unwrap_or_else(|| "delivery failed".to_string());
                self.retire_dead_letter(message, reason);
            }
        }
    }

    /// Retires a message as delivered (terminal).
    fn retire_delivered(&mut self, mut message: Message) {
        message.mark_delivered();
        self.metrics.inc_delivered();
        self.bus.publish(
            Event::now(EventKind::Delivered)
                .with_topic(Arc::clone(&self.name))
                .with_message(message.id())
                .with_attempt(message.attempts()),
        );
    }

    /// Retires a message as permanently failed (terminal) and archives it.
    ///
    /// Expects the message in `Failed`.
    fn retire_dead_letter(&mut self, mut message: Message, reason: String) {
        message.mark_dead_letter();
        self.metrics.inc_dead_lettered();
        let reason: Arc<str> = Arc::from(reason);
        self.bus.publish(
            Event::now(EventKind::DeadLettered)
                .with_topic(Arc::clone(&self.name))
                .with_message(message.id())
                .with_attempt(message.attempts())
                .with_reason(Arc::clone(&reason)),
        );
        self.dead_letters.push(message, reason);
    }

    /// Starts a detached timer that posts `RetryDue` back to this actor.
    ///
    /// The timer suspends only itself; broker shutdown cancels it.
    fn spawn_retry_timer(&self, id: MessageId, subscriber: Arc<str>, delay: Duration) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    let _ = tx.send(Command::RetryDue { id, subscriber });
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    fn effective_retry(&self) -> RetryPolicy {
        match self.retry_override {
            Some(policy) => policy,
            None => *self
                .global_retry
                .read()
                .expect("retry policy lock poisoned"),
        }
    }

    fn has_subscriber(&self, id: &str) -> bool {
        self.subscribers.iter().any(|s| s.id() == id)
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => time::sleep_until(d).await,
        None => futures::future::pending::<()>().await,
    }
}
