//! In-memory event recorder
//!
//! Keeps the ordered event log of one session so a client can reconstruct the
//! message while the stream is still open, or after it disconnected.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::bus::{EventBus, EventListener};
use super::reconstruct::reconstruct;
use super::types::{Event, EventKind};
use crate::llm::Message;

/// Append-only log of the events seen on one bus
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder listening to every event kind on `bus`
    pub fn attach(bus: &EventBus) -> Self {
        debug!("EventRecorder::attach: called");
        let recorder = Self::new();
        bus.on_many(&EventKind::ALL, Arc::new(recorder.clone()));
        recorder
    }

    /// Copy of the log recorded so far
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconstruct the message from the current prefix of the log
    pub fn message(&self) -> Message {
        reconstruct(&self.snapshot())
    }
}

#[async_trait]
impl EventListener for EventRecorder {
    async fn on_event(&self, event: &Event) -> eyre::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        Ok(())
    }
}
