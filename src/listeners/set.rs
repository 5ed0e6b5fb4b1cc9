//! # Non-blocking event fan-out to registered listeners.
//!
//! Provides [`ListenerSet`] — distributes broker events to any number of
//! [`EventListener`]s without ever blocking the emitter.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► listener1.on_event()
//!     │    (bounded)         └──────► panic → ListenerPanicked
//!     ├──► [queue 2] ──► worker 2 ──► listener2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► worker N ──► listenerN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-listener ordering**: listener A may process event N while B
//!   processes N+5
//! - **Overflow**: event dropped for that listener only, `ListenerOverflow`
//!   emitted
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Isolation**: a slow or panicking listener doesn't affect others
//! - **Per-listener FIFO**: each listener sees events in order
//! - **Dynamic registration**: listeners can be added while the broker runs;
//!   a new listener only observes events emitted after it was added
//!
//! ## Panic handling
//! Worker tasks use `catch_unwind` to isolate panics: the panic is caught,
//! converted to a `ListenerPanicked` event, and the worker continues with
//! the next event.

use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};
use crate::listeners::EventListener;

/// Per-listener channel metadata.
struct ListenerChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for registered event listeners.
///
/// Manages per-listener queues and worker tasks, providing concurrent
/// delivery, overflow accounting and panic containment.
pub(crate) struct ListenerSet {
    channels: RwLock<Vec<ListenerChannel>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    bus: Bus,
}

impl ListenerSet {
    /// Creates an empty set.
    ///
    /// The bus is used to report overflow and panic incidents back into the
    /// event stream.
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            bus,
        }
    }

    /// Registers a listener and spawns its worker task.
    ///
    /// ### Per-listener setup
    /// - Bounded mpsc queue (capacity from [`EventListener::queue_capacity`],
    ///   clamped to a minimum of 1)
    /// - Dedicated worker task (runs until the queue closes)
    /// - Panic isolation via `catch_unwind`
    pub(crate) fn add(&self, listener: Arc<dyn EventListener>) {
        let cap = listener.queue_capacity().max(1);
        let name = listener.name();
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
        let bus_for_worker = self.bus.clone();

        let handle = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let fut = listener.on_event(ev.as_ref());

                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
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
                    bus_for_worker.publish(Event::listener_panicked(listener.name(), info));
                }
            }
        });

        self.channels
            .write()
            .expect("listener channels lock poisoned")
            .push(ListenerChannel { name, sender: tx });
        self.workers
            .lock()
            .expect("listener workers lock poisoned")
            .push(handle);
    }

    /// Emits an event to all registered listeners.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full: drops the event for that listener, emits
    ///   `ListenerOverflow`
    /// - On queue closed: emits `ListenerOverflow` with reason "closed"
    ///
    /// ### Overflow prevention
    /// `ListenerOverflow` events are not re-reported if they themselves
    /// overflow, so a saturated listener cannot trigger an event storm.
    pub(crate) fn emit(&self, event: Arc<Event>) {
        let is_overflow_evt = event.is_listener_overflow();

        let channels = self
            .channels
            .read()
            .expect("listener channels lock poisoned");
        for channel in channels.iter() {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::listener_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::listener_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Closes all listener queues and hands back the worker handles.
    ///
    /// Workers drain whatever is already queued and then exit; await the
    /// returned handles to observe that. Events emitted after close are
    /// dropped.
    pub(crate) fn close(&self) -> Vec<JoinHandle<()>> {
        self.channels
            .write()
            .expect("listener channels lock poisoned")
            .clear();
        std::mem::take(
            &mut *self
                .workers
                .lock()
                .expect("listener workers lock poisoned"),
        )
    }
}
