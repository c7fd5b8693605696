//! In-process change notification bus
//!
//! Decouples "who caused a change" from "who needs to react". Delivery is
//! synchronous, in registration order, and strictly best-effort: there is no
//! durability and no delivery to subscribers that register after a publish.
//! The bus is a latency optimization layered over a correctness baseline of
//! refetch-on-demand, never a correctness mechanism itself.

use clinic_queue_sync_core::schema::{ChangeEvent, ChangeReason};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::trace;

/// Handler invoked with each delivered event.
pub type EventHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    /// `None` subscribes to every category (wildcard).
    category: Option<String>,
    handler: EventHandler,
}

/// Fire-and-forget publish/subscribe hub.
///
/// Wrap in `Arc<ChangeBus>` to share between components.
pub struct ChangeBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish an event to all current subscribers of `category` plus
    /// wildcard subscribers, synchronously, in registration order.
    pub fn publish(&self, category: &str, reason: ChangeReason) {
        let event = ChangeEvent::now(category, reason);
        // Snapshot matching handlers so delivery happens outside the lock;
        // handlers may publish or subscribe re-entrantly.
        let handlers: Vec<EventHandler> = self
            .subscribers
            .lock()
            .expect("bus subscriber lock poisoned")
            .iter()
            .filter(|s| s.category.as_deref().is_none_or(|c| c == category))
            .map(|s| Arc::clone(&s.handler))
            .collect();
        trace!(
            "Publishing {}/{:?} to {} subscriber(s)",
            category,
            reason,
            handlers.len()
        );
        for handler in handlers {
            handler(&event);
        }
    }

    /// Subscribe to one category. The guard unsubscribes on drop.
    pub fn subscribe(&self, category: &str, handler: EventHandler) -> BusSubscription {
        self.register(Some(category.to_string()), handler)
    }

    /// Subscribe to every category.
    pub fn subscribe_any(&self, handler: EventHandler) -> BusSubscription {
        self.register(None, handler)
    }

    /// Subscribe with settle semantics: a burst of publishes for `category`
    /// inside `window` produces exactly one handler invocation, with the
    /// last event of the burst, after the window closes.
    ///
    /// Models the producer pattern of a multi-step server operation
    /// completing; resyncing per intermediate event would be wasteful and
    /// could race with the server not yet reflecting the final state.
    ///
    /// Must be called within a tokio runtime.
    pub fn subscribe_settled<F>(
        &self,
        category: &str,
        window: Duration,
        handler: F,
    ) -> SettledSubscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ChangeEvent>();
        let inner = self.subscribe(
            category,
            Arc::new(move |event: &ChangeEvent| {
                let _ = tx.send(event.clone());
            }),
        );

        let task = tokio::spawn(async move {
            while let Some(mut last) = rx.recv().await {
                // Keep absorbing events until the quiet period elapses.
                loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        Ok(Some(event)) => last = event,
                        Ok(None) => {
                            handler(&last);
                            return;
                        }
                        Err(_) => break,
                    }
                }
                handler(&last);
            }
        });

        SettledSubscription { _inner: inner, task }
    }

    fn register(&self, category: Option<String>, handler: EventHandler) -> BusSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("bus subscriber lock poisoned")
            .push(Subscriber {
                id,
                category,
                handler,
            });
        BusSubscription {
            subscribers: Arc::downgrade(&self.subscribers),
            id,
        }
    }
}

/// Unsubscribes its handler when dropped.
pub struct BusSubscription {
    subscribers: Weak<Mutex<Vec<Subscriber>>>,
    id: u64,
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut list) = subscribers.lock() {
                list.retain(|s| s.id != self.id);
            }
        }
    }
}

/// Handle for a settled (coalescing) subscription.
///
/// Dropping it unsubscribes and stops the drain task.
pub struct SettledSubscription {
    _inner: BusSubscription,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for SettledSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
