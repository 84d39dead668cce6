//! Tool error types

use serde_json::{Value, json};
use thiserror::Error;

/// Errors that can occur during tool execution
///
/// None of these end the loop: each becomes the structured error result of
/// the call that caused it.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool failed: {0}")]
    Execution(String),

    #[error("Tool timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Duplicate tool call id: {id}")]
    DuplicateCall { id: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ToolError {
    /// Stable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::InvalidArgument(_) => "invalid_argument",
            ToolError::Execution(_) => "execution",
            ToolError::Timeout { .. } => "timeout",
            ToolError::DuplicateCall { .. } => "duplicate_call",
            ToolError::Http(_) => "http",
        }
    }

    /// The error object recorded as the call's result
    pub fn to_result_value(&self) -> Value {
        json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }
}
