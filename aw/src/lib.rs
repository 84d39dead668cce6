//! agentwire - streaming, tool-orchestrating model invocation engine
//!
//! A session takes a conversation, streams the model's answer, runs the tools
//! the model asks for, feeds their results back and repeats until the model
//! answers without tools or a bound is hit. Everything that happens is
//! published as typed events, which an SSE response forwards to the client.
//!
//! # Modules
//!
//! - [`llm`] - Provider trait, OpenAI-compatible streaming client, ModelInvoker
//! - [`tools`] - Tool trait, registry and builtin tools
//! - [`r#loop`] - StreamSession and the tool execution loop
//! - [`events`] - Event bus, recorder, JSONL logger and reconstruction
//! - [`transport`] - SSE encoder and axum server
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod llm;
pub mod tools;
pub mod transport;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use events::{Event, EventBus, EventKind, EventRecorder, create_event_bus, reconstruct};
pub use llm::{LlmError, Message, ModelInvoker, ModelProvider, OpenAIProvider, ToolCall, ToolResult, create_provider};
pub use r#loop::{LoopConfig, LoopError, LoopResult, StopCondition, StreamSession, ToolExecutionLoop};
pub use tools::{Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
pub use transport::{SseEncoder, TransportError};
