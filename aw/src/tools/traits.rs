//! Tool trait definition

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::context::ToolContext;
use super::error::ToolError;

/// A capability the model may request mid-conversation
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the name the model calls)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Identifier recorded on every result this tool produces
    fn definition_id(&self) -> String {
        self.name().to_string()
    }

    /// Deadline for one invocation, shorter than the session's lifetime
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute the tool
    ///
    /// `ctx.cancel` fires when the session aborts or the deadline elapses.
    /// Tools may ignore it; a late result is discarded.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

/// What a tool produced
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// An ordinary result fed back to the model
    Result(Value),

    /// The final answer; the loop stops without another model call
    Final(String),
}

impl ToolOutput {
    pub fn result(value: Value) -> Self {
        debug!("ToolOutput::result: called");
        ToolOutput::Result(value)
    }

    pub fn final_answer(text: impl Into<String>) -> Self {
        debug!("ToolOutput::final_answer: called");
        ToolOutput::Final(text.into())
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ToolOutput::Final(_))
    }

    /// The value recorded as the call's `ToolResult::result`
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutput::Result(value) => value.clone(),
            ToolOutput::Final(text) => json!({"kind": "final", "value": text}),
        }
    }
}
