//! ModelInvoker - bridges a ModelProvider onto a session's EventBus
//!
//! One `invoke` is one provider call: it brackets the call with `llm_start` /
//! `llm_end`, republishes text and reasoning chunks as they arrive, and folds
//! throttling into a degraded result so the tool loop always terminates.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CompletionRequest, LlmError, Message, ModelParameters, ModelProvider, StreamChunk, TokenUsage, ToolCall, ToolSpec};
use crate::events::{Event, EventBus};

/// Terminal text of a throttled invocation
pub const RATE_LIMIT_TEXT: &str = "Unable to continue: Rate limit exceeded.";

/// Terminal result of one invocation
#[derive(Debug, Clone, Default)]
pub struct InvocationResult {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    /// The provider throttled and `text` is the degraded answer
    pub rate_limited: bool,
}

impl InvocationResult {
    fn rate_limited() -> Self {
        Self {
            text: RATE_LIMIT_TEXT.to_string(),
            rate_limited: true,
            ..Self::default()
        }
    }
}

/// Adapter around a shared provider handle
#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn ModelProvider>,
    params: ModelParameters,
    chunk_buffer: usize,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn ModelProvider>, params: ModelParameters) -> Self {
        debug!(provider = %provider.name(), model = %params.model, "ModelInvoker::new: called");
        Self {
            provider,
            params,
            chunk_buffer: 32,
        }
    }

    /// Capacity of the chunk channel between provider and bus
    pub fn with_chunk_buffer(mut self, chunk_buffer: usize) -> Self {
        self.chunk_buffer = chunk_buffer.max(1);
        self
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one provider call and publish its output on `bus`
    ///
    /// Throttling resolves to a degraded result. Cancellation returns
    /// `LlmError::Cancelled` without an `error` event. Every other failure is
    /// published as an `error` event and returned.
    pub async fn invoke(
        &self,
        session_id: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        bus: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, LlmError> {
        debug!(%session_id, message_count = messages.len(), tool_count = tools.len(), "invoke: called");

        bus.emit(Event::LlmStart {
            session_id: session_id.to_string(),
            provider: self.provider.name().to_string(),
            model: self.params.model.clone(),
            message_count: messages.len(),
            tool_count: tools.len(),
            params: serde_json::to_value(&self.params).unwrap_or(Value::Null),
        })
        .await;

        let request = CompletionRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            params: self.params.clone(),
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel(self.chunk_buffer);
        let call = self.provider.stream(request, chunk_tx, cancel.clone());

        // The provider drops its sender when it returns, which ends this loop
        let forward = async {
            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    StreamChunk::TextDelta(text) => bus.emit(Event::content(text)).await,
                    StreamChunk::ReasoningDelta(text) => bus.emit(Event::reasoning(text)).await,
                    StreamChunk::ToolCallRequest(call) => {
                        debug!(tool_call_id = %call.id, tool = %call.name, "invoke: tool call requested");
                    }
                }
            }
        };

        let (outcome, ()) = tokio::join!(call, forward);

        match outcome {
            Ok(response) => {
                debug!(
                    text_len = response.text.len(),
                    tool_calls = response.tool_calls.len(),
                    "invoke: provider call complete"
                );
                bus.emit(Event::LlmEnd {
                    session_id: session_id.to_string(),
                    usage: response.usage,
                    error: None,
                })
                .await;
                Ok(InvocationResult {
                    text: response.text,
                    tool_calls: response.tool_calls,
                    usage: response.usage,
                    rate_limited: false,
                })
            }
            Err(e) if e.is_rate_limit() => {
                warn!(%session_id, error = %e, "invoke: provider throttled, resolving degraded result");
                let degraded = InvocationResult::rate_limited();
                bus.emit(Event::content(degraded.text.clone())).await;
                bus.emit(Event::LlmEnd {
                    session_id: session_id.to_string(),
                    usage: TokenUsage::default(),
                    error: Some(e.to_string()),
                })
                .await;
                Ok(degraded)
            }
            Err(e) if e.is_cancelled() => {
                debug!(%session_id, "invoke: cancelled");
                bus.emit(Event::LlmEnd {
                    session_id: session_id.to_string(),
                    usage: TokenUsage::default(),
                    error: Some(e.to_string()),
                })
                .await;
                Err(e)
            }
            Err(e) => {
                warn!(%session_id, error = %e, "invoke: provider failed");
                bus.emit(Event::error(e.to_string())).await;
                bus.emit(Event::LlmEnd {
                    session_id: session_id.to_string(),
                    usage: TokenUsage::default(),
                    error: Some(e.to_string()),
                })
                .await;
                Err(e)
            }
        }
    }
}
