//! Event handler registry
//!
//! Handlers run one after another, in registration order, on the session's
//! delivery task. Each call is bounded by a timeout; overruns are abandoned
//! and logged, failures are never retried.

use super::GatewayEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives every applied dispatch event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: &GatewayEvent);
}

/// Handler built from a synchronous closure
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&GatewayEvent) + Send + Sync,
{
    async fn on_event(&self, event: &GatewayEvent) {
        (self.0)(event);
    }
}

/// Wrap a closure as an [`EventHandler`]
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&GatewayEvent) + Send + Sync,
{
    FnHandler(f)
}

/// Identifies a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered set of event handlers behind one lock
#[derive(Default)]
pub struct EventHandlers {
    handlers: RwLock<Vec<(HandlerId, Arc<dyn EventHandler>)>>,
    next_id: AtomicU64,
}

impl EventHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at the end of the dispatch order
    pub fn add(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    /// Unregister a handler; returns whether it was registered
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Swap a handler in place, keeping its position and id
    pub fn replace(&self, id: HandlerId, handler: Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.handlers.write();
        match handlers.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => {
                slot.1 = handler;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Deliver an event to every handler, each bounded by `limit`
    pub async fn dispatch(&self, event: &GatewayEvent, limit: Duration) {
        // Snapshot so handlers may add/remove handlers while running
        let handlers: Vec<_> = self.handlers.read().iter().map(|(_, h)| Arc::clone(h)).collect();

        for handler in handlers {
            if tokio::time::timeout(limit, handler.on_event(event)).await.is_err() {
                tracing::warn!(
                    event = %event.name,
                    sequence = event.sequence,
                    limit_ms = limit.as_millis() as u64,
                    "Event handler exceeded its time limit, dropped"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers").field("len", &self.len()).finish()
    }
}
