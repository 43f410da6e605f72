//! In-process publish/subscribe.
//!
//! [`EventBus`] delivers every published event three ways:
//!
//! - synchronously to topic handlers registered with [`EventBus::subscribe`],
//!   in subscription order
//! - to typed [`JobObserver`]s attached with [`EventBus::observe`]
//! - to a `tokio::sync::broadcast` stream, plus a bounded ring buffer of
//!   recent events for late joiners
//!
//! A handler that returns an error or panics is logged and skipped. The
//! remaining handlers still run and the bus stays usable.

mod observer;
mod types;

pub use observer::JobObserver;
pub use types::*;

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;

use tagforged_common::SubscriptionId;

use crate::config::EventsConfig;

/// Default number of events retained in the ring buffer.
const DEFAULT_RECENT_EVENTS: usize = 100;

/// A topic handler.
pub type Handler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Receipt returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: String,
}

struct HandlerEntry {
    id: SubscriptionId,
    topic: String,
    handler: Handler,
}

struct ObserverEntry {
    id: SubscriptionId,
    observer: Arc<dyn JobObserver>,
}

/// Topic handlers, typed observers, a broadcast channel and a ring buffer
/// of recent events.
pub struct EventBus {
    handlers: RwLock<Vec<HandlerEntry>>,
    observers: RwLock<Vec<ObserverEntry>>,
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
    recent_limit: usize,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size, not the ring
    /// buffer.
    pub fn new(capacity: usize) -> Self {
        Self::with_recent_limit(capacity, DEFAULT_RECENT_EVENTS)
    }

    pub fn with_recent_limit(capacity: usize, recent_limit: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            tx,
            recent: RwLock::new(VecDeque::with_capacity(recent_limit)),
            recent_limit,
        }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::with_recent_limit(config.channel_capacity, config.recent_limit)
    }

    /// Register `handler` for `topic` ([`topics::ALL`] matches every topic).
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let subscription = Subscription {
            id: SubscriptionId::new(),
            topic: topic.into(),
        };
        self.handlers.write().push(HandlerEntry {
            id: subscription.id,
            topic: subscription.topic.clone(),
            handler: Arc::new(handler),
        });
        subscription
    }

    /// Remove a handler. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| h.id != subscription.id);
        handlers.len() != before
    }

    /// Number of handlers that would receive an event on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .iter()
            .filter(|h| h.topic == topic || h.topic == topics::ALL)
            .count()
    }

    /// Attach a typed job observer.
    pub fn observe(&self, observer: Arc<dyn JobObserver>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.observers.write().push(ObserverEntry { id, observer });
        id
    }

    /// Detach an observer. Returns false if it was not attached.
    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| o.id != id);
        observers.len() != before
    }

    /// Subscribe to the broadcast stream of every event.
    pub fn receiver(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish `payload` under its default topic.
    pub fn emit(&self, payload: EventPayload) {
        self.publish(payload.topic(), payload);
    }

    /// Publish `payload` under `topic`.
    ///
    /// Handlers are snapshotted before any is invoked, so a handler may
    /// subscribe, unsubscribe or publish without deadlocking. Changes take
    /// effect from the next publish.
    pub fn publish(&self, topic: &str, payload: EventPayload) {
        let event = Event::new(topic, payload);

        {
            let mut recent = self.recent.write();
            if self.recent_limit > 0 {
                if recent.len() >= self.recent_limit {
                    recent.pop_back();
                }
                recent.push_front(event.clone());
            }
        }

        let handlers: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .read()
            .iter()
            .filter(|h| h.topic == topic || h.topic == topics::ALL)
            .map(|h| (h.id, Arc::clone(&h.handler)))
            .collect();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("Handler {} for '{}' failed: {:#}", id, topic, e);
                }
                Err(panic) => {
                    tracing::warn!(
                        "Handler {} for '{}' panicked: {}",
                        id,
                        topic,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        self.notify_observers(&event.payload);

        // Ignore send errors (no receivers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }

    fn notify_observers(&self, payload: &EventPayload) {
        let observers: Vec<(SubscriptionId, Arc<dyn JobObserver>)> = {
            let observers = self.observers.read();
            if observers.is_empty() {
                return;
            }
            observers
                .iter()
                .map(|o| (o.id, Arc::clone(&o.observer)))
                .collect()
        };

        for (id, observer) in observers {
            let result = catch_unwind(AssertUnwindSafe(|| match payload {
                EventPayload::JobStarted { job } => observer.on_job_started(job),
                EventPayload::JobProgress { job, progress } => {
                    observer.on_job_progress(job, *progress)
                }
                EventPayload::JobCompleted { job } => observer.on_job_completed(job),
                EventPayload::JobFailed { job, error } => observer.on_job_failed(job, error),
                EventPayload::JobCancelled { job } => observer.on_job_cancelled(job),
                EventPayload::QueueDrained => observer.on_queue_drained(),
                _ => {}
            }));
            if let Err(panic) = result {
                tracing::warn!(
                    "Observer {} panicked: {}",
                    id,
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
