//! Model invocation for agentwire
//!
//! Provides the provider abstraction, the OpenAI-compatible streaming client
//! and the ModelInvoker that publishes provider output onto an EventBus.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod invoker;
mod openai;
mod types;

pub use client::ModelProvider;
pub use error::LlmError;
pub use invoker::{InvocationResult, ModelInvoker, RATE_LIMIT_TEXT};
pub use openai::OpenAIProvider;
pub use types::{
    CompletionRequest, CompletionResponse, Message, ModelParameters, Role, StreamChunk, TokenUsage, ToolCall,
    ToolResult, ToolSpec, ToolUse,
};

use crate::config::LlmConfig;

/// Create a model provider based on the provider named in config
///
/// The returned handle is shared by every session of the process.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ModelProvider>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_provider: called");
    match config.provider.as_str() {
        "openai" => {
            debug!("create_provider: creating OpenAI provider");
            Ok(Arc::new(OpenAIProvider::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_provider: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: openai",
                other
            )))
        }
    }
}
