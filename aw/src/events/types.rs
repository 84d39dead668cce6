//! Event types for one streaming session
//!
//! Events are the write-once log of everything observable in a session:
//! - Model output (text and reasoning fragments)
//! - Tool activity (requested calls, their results)
//! - Request bracketing for observability (`llm_start` / `llm_end`)
//! - Diagnostics (`log`, `error`) and the terminal `final_content`

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{TokenUsage, ToolCall, ToolResult};

/// Core event enum - the vocabulary of a session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A text fragment from the model
    Content { text: String },
    /// A reasoning fragment from the model
    Reasoning { text: String },
    /// A tool invocation is about to run
    ToolCall(ToolCall),
    /// A tool invocation finished
    ToolResult(ToolResult),
    /// Free-form diagnostic line
    Log { message: String },
    /// A provider or transport failure
    Error { message: String },
    /// A provider request is about to be issued
    LlmStart {
        session_id: String,
        provider: String,
        model: String,
        message_count: usize,
        tool_count: usize,
        params: Value,
    },
    /// A provider request finished (successfully or not)
    LlmEnd {
        session_id: String,
        usage: TokenUsage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The loop settled; carries every text fragment of the session
    FinalContent { text: String },
}

/// The kind of an event, used as the bus subscription key and the SSE event name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Content,
    Reasoning,
    ToolCall,
    ToolResult,
    Log,
    Error,
    LlmStart,
    LlmEnd,
    FinalContent,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 9] = [
        EventKind::Content,
        EventKind::Reasoning,
        EventKind::ToolCall,
        EventKind::ToolResult,
        EventKind::Log,
        EventKind::Error,
        EventKind::LlmStart,
        EventKind::LlmEnd,
        EventKind::FinalContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Content => "content",
            EventKind::Reasoning => "reasoning",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::Log => "log",
            EventKind::Error => "error",
            EventKind::LlmStart => "llm_start",
            EventKind::LlmEnd => "llm_end",
            EventKind::FinalContent => "final_content",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Content { .. } => EventKind::Content,
            Event::Reasoning { .. } => EventKind::Reasoning,
            Event::ToolCall(_) => EventKind::ToolCall,
            Event::ToolResult(_) => EventKind::ToolResult,
            Event::Log { .. } => EventKind::Log,
            Event::Error { .. } => EventKind::Error,
            Event::LlmStart { .. } => EventKind::LlmStart,
            Event::LlmEnd { .. } => EventKind::LlmEnd,
            Event::FinalContent { .. } => EventKind::FinalContent,
        }
    }

    /// The payload carried on the wire (the event minus its tag)
    pub fn payload(&self) -> Value {
        match self {
            Event::Content { text } | Event::Reasoning { text } | Event::FinalContent { text } => {
                Value::String(text.clone())
            }
            Event::Log { message } | Event::Error { message } => Value::String(message.clone()),
            Event::ToolCall(call) => serde_json::to_value(call).unwrap_or(Value::Null),
            Event::ToolResult(result) => serde_json::to_value(result).unwrap_or(Value::Null),
            other => {
                let mut value = serde_json::to_value(other).unwrap_or(Value::Null);
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("type");
                }
                value
            }
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Event::Content { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Event::Reasoning { text: text.into() }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Event::Log {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    /// The event
    pub event: Event,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(session_id: impl Into<String>, event: Event) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            event,
        }
    }
}
