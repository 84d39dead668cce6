//! Event system for one streaming session
//!
//! Every observable action of a session is an [`Event`]. Producers (the model
//! invoker and the tool loop) emit onto a session-scoped [`EventBus`]; any
//! number of consumers attach to it without the producers knowing.
//!
//! # Architecture
//!
//! ```text
//!   ModelInvoker              ToolExecutionLoop
//!   - llm_start/llm_end       - tool_call/tool_result
//!   - content/reasoning       - log/final_content
//!   - error
//!          \                    /
//!           v                  v
//!  ┌──────────────────────────────────────┐
//!  │        EVENT BUS (per session)        │
//!  │  listeners keyed by kind, awaited in  │
//!  │  registration order                   │
//!  └──────────────────────────────────────┘
//!      |            |            |            |
//!      v            v            v            v
//!  SseEncoder   EventRecorder  EventLogger  TraceMirror
//!  (wire)       (live replay)  (.jsonl)     (tracing)
//! ```
//!
//! The log is write-once; [`reconstruct`] folds any prefix of it back into a
//! single [`crate::llm::Message`].

mod bus;
mod logger;
mod reconstruct;
mod recorder;
mod trace;
mod types;

pub use bus::{EventBus, EventListener, FnListener, ListenerId, create_event_bus};
pub use logger::{EVENTS_FILE, EventLogger, read_session_events};
pub use reconstruct::{reconstruct, reconstruct_entries};
pub use recorder::EventRecorder;
pub use trace::{TRACED_KINDS, TraceMirror};
pub use types::{Event, EventKind, EventLogEntry};
