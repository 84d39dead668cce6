//! Event Bus - per-session pub/sub keyed by event kind
//!
//! Producers (invoker, tool loop) await `emit`, which runs every listener
//! registered for the event's kind in registration order. Awaiting the
//! listeners is what lets a slow SSE consumer backpressure the model stream.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use super::types::{Event, EventKind};

/// Something that reacts to events
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &Event) -> eyre::Result<()>;
}

/// Adapter turning a synchronous closure into a listener
pub struct FnListener<F>(pub F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&Event) -> eyre::Result<()> + Send + Sync,
{
    async fn on_event(&self, event: &Event) -> eyre::Result<()> {
        (self.0)(event)
    }
}

/// Handle returned by `on`, used to detach the listener again
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registry = HashMap<EventKind, Vec<(ListenerId, Arc<dyn EventListener>)>>;

/// Session-scoped event bus
///
/// No buffering or replay: a listener attached after an event was emitted never
/// sees it. Consumers that need history read the recorded log instead.
pub struct EventBus {
    listeners: Mutex<Registry>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        debug!("EventBus::new: creating event bus");
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a listener for one event kind
    pub fn on(&self, kind: EventKind, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%kind, ?id, "EventBus::on: attaching listener");
        self.registry().entry(kind).or_default().push((id, listener));
        id
    }

    /// Attach one listener to several kinds, returning one id per kind
    pub fn on_many(&self, kinds: &[EventKind], listener: Arc<dyn EventListener>) -> Vec<(EventKind, ListenerId)> {
        kinds
            .iter()
            .map(|kind| (*kind, self.on(*kind, listener.clone())))
            .collect()
    }

    /// Attach a synchronous closure
    pub fn on_fn<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.on(kind, Arc::new(FnListener(f)))
    }

    /// Detach a listener; returns false if it was not attached to `kind`
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let Some(list) = registry.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        debug!(%kind, ?id, removed, "EventBus::off");
        removed
    }

    /// Number of listeners attached to `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to every listener of its kind
    ///
    /// A listener that errors or panics is logged and skipped; the remaining
    /// listeners still run.
    pub async fn emit(&self, event: Event) {
        let kind = event.kind();
        let listeners: Vec<(ListenerId, Arc<dyn EventListener>)> =
            self.registry().get(&kind).cloned().unwrap_or_default();
        debug!(%kind, listener_count = listeners.len(), "EventBus::emit");

        for (id, listener) in listeners {
            match AssertUnwindSafe(listener.on_event(&event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(%kind, ?id, error = %e, "EventBus::emit: listener failed");
                }
                Err(_) => {
                    warn!(%kind, ?id, "EventBus::emit: listener panicked");
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}
