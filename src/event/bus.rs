//! In-process event bus
//!
//! Asynchronous publish/subscribe used by all other components to announce
//! state changes. Each subscriber owns a bounded queue drained on its own
//! logical worker, so a slow subscriber never blocks the publisher or its
//! peers; when a queue is full the event is dropped for that subscriber and
//! a `bus.subscriber_overflow` event is emitted instead.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::types::{Event, EventKind, EventPattern, REGISTRY_SOURCE};

/// Event bus errors
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,
}

/// Subscriber registration
struct SubscriberEntry {
    pattern: EventPattern,
    sender: mpsc::Sender<Event>,
}

/// Handle to a pull-based subscription
///
/// Dropping the subscription (or calling [`EventBus::unsubscribe`]) stops
/// further delivery; events already enqueued are still readable.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Subscription id, usable with [`EventBus::unsubscribe`]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event; `None` once unsubscribed and drained
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for an already-enqueued event
    pub fn try_next(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

/// Handle to a push-based (handler) subscription
pub struct HandlerSubscription {
    id: Uuid,
    worker: JoinHandle<()>,
}

impl HandlerSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Abort the handler worker without unsubscribing
    pub fn abort(&self) {
        self.worker.abort();
    }
}

/// Filter over the event history ring buffer
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Type tag pattern (same syntax as subscriptions)
    pub pattern: Option<EventPattern>,
    /// Exact source match
    pub source: Option<String>,
    /// Only events at or after this Unix timestamp
    pub since: Option<u64>,
}

impl HistoryFilter {
    fn matches(&self, event: &Event) -> bool {
        if let Some(pattern) = &self.pattern {
            if !pattern.matches(event.kind.name()) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &event.source != source {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// In-process publish/subscribe bus
pub struct EventBus {
    subscribers: Arc<TokioMutex<HashMap<Uuid, SubscriberEntry>>>,
    history: Arc<TokioMutex<VecDeque<Event>>>,
    queue_capacity: usize,
    history_capacity: usize,
    closed: AtomicBool,
}

impl EventBus {
    /// Create a bus with the given per-subscriber queue and history capacity
    pub fn new(queue_capacity: usize, history_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(TokioMutex::new(HashMap::new())),
            history: Arc::new(TokioMutex::new(VecDeque::new())),
            queue_capacity: queue_capacity.max(1),
            history_capacity: history_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe with a pattern; events are pulled from the returned handle
    pub async fn subscribe(&self, pattern: &str) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let entry = SubscriberEntry {
            pattern: EventPattern::parse(pattern),
            sender,
        };
        self.subscribers.lock().await.insert(id, entry);
        debug!(subscription = %id, pattern, "subscriber added");
        Subscription { id, receiver }
    }

    /// Subscribe with a pattern and an async handler driven by its own worker
    pub async fn subscribe_handler<F, Fut>(&self, pattern: &str, mut handler: F) -> HandlerSubscription
    where
        F: FnMut(Event) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let mut subscription = self.subscribe(pattern).await;
        let id = subscription.id();
        let worker = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                handler(event).await;
            }
        });
        HandlerSubscription { id, worker }
    }

    /// Remove a subscriber; in-flight deliveries are not cancelled
    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.subscribers.lock().await.remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "subscriber removed");
        }
        removed
    }

    /// Publish an event to all currently-matching subscribers
    ///
    /// Delivery is at-least-once per subscriber and ordered per source as
    /// long as events from one source are published sequentially. Enqueue
    /// never waits on subscriber processing.
    pub async fn publish(&self, event: Event) -> Result<(), EventBusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventBusError::Closed);
        }

        // Overflow notices generated while delivering are themselves
        // published through the same path, without recursion.
        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            self.record_history(event.clone()).await;

            let mut overflowed = Vec::new();
            let mut dead = Vec::new();
            {
                let subscribers = self.subscribers.lock().await;
                for (id, entry) in subscribers.iter() {
                    if !entry.pattern.matches(event.kind.name()) {
                        continue;
                    }
                    let mut delivered = event.clone();
                    delivered.metadata.delivery_count += 1;
                    match entry.sender.try_send(delivered) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => overflowed.push(*id),
                        Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                    }
                }
            }

            if !dead.is_empty() {
                let mut subscribers = self.subscribers.lock().await;
                for id in dead {
                    subscribers.remove(&id);
                }
            }

            // An overflow of an overflow notice is only logged, otherwise a
            // single stuck subscriber could generate notices forever.
            if !matches!(event.kind, EventKind::SubscriberOverflow { .. }) {
                for id in overflowed {
                    warn!(subscription = %id, kind = event.kind.name(), "subscriber queue full, dropping event");
                    pending.push(Event::local(
                        REGISTRY_SOURCE,
                        EventKind::SubscriberOverflow {
                            subscription: id,
                            kind: event.kind.name().to_string(),
                        },
                    ));
                }
            } else if !overflowed.is_empty() {
                warn!("overflow notice dropped for saturated subscribers");
            }
        }

        Ok(())
    }

    /// Query the bounded event history (newest last)
    pub async fn get_history(&self, filter: &HistoryFilter) -> Vec<Event> {
        let history = self.history.lock().await;
        history.iter().filter(|e| filter.matches(e)).cloned().collect()
    }

    /// Stop accepting publishes; subscribers drain whatever is queued
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    async fn record_history(&self, event: Event) {
        let mut history = self.history.lock().await;
        history.push_back(event);
        while history.len() > self.history_capacity {
            history.pop_front();
        }
    }
}
