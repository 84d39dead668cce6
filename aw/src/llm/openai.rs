//! OpenAI-compatible chat completions provider
//!
//! Streams `/v1/chat/completions` over SSE with `reqwest-eventsource`. Works
//! against any server speaking the same wire format (vLLM, Ollama, LiteLLM...).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::HeaderMap;
use reqwest_eventsource::{Error as EsError, Event as EsEvent, EventSource, retry};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CompletionRequest, CompletionResponse, LlmError, Message, ModelProvider, Role, StreamChunk, TokenUsage, ToolCall};
use crate::config::LlmConfig;

/// Fallback when a 429 carries no usable `retry-after`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// OpenAI API provider
pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAIProvider {
    /// Create a provider from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, model = %config.model, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self::with_client(http, api_key, &config.base_url))
    }

    /// Create a provider around an existing HTTP client
    pub fn with_client(http: Client, api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Build the streaming request body
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let params = &request.params;
        debug!(model = %params.model, max_tokens = %params.max_tokens, "build_request_body: called");

        // o-series and gpt-5 models only accept max_completion_tokens
        let uses_completion_tokens =
            params.model.starts_with("gpt-5") || params.model.starts_with("o1") || params.model.starts_with("o3");

        let mut body = json!({
            "model": params.model,
            "messages": convert_messages(&request.messages),
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = json!(params.max_tokens);
        } else {
            body["max_tokens"] = json!(params.max_tokens);
        }

        if let Some(temperature) = params.temperature {
            body["temperature"] = json!(temperature);
        }

        if !request.tools.is_empty() {
            debug!(tool_count = request.tools.len(), "build_request_body: adding tools");
            body["tools"] = json!(request.tools.iter().map(|t| t.to_openai_schema()).collect::<Vec<_>>());
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

/// Convert conversation messages to the chat completions format
///
/// OpenAI wants one message per tool result, so a tool-role message carrying a
/// whole round becomes several wire messages.
fn convert_messages(messages: &[Message]) -> Vec<Value> {
    debug!(message_count = %messages.len(), "convert_messages: called");
    let mut result = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => result.push(json!({"role": "system", "content": msg.content})),
            Role::User => result.push(json!({"role": "user", "content": msg.content})),
            Role::Assistant if msg.tool_uses.is_empty() => {
                result.push(json!({"role": "assistant", "content": msg.content}));
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .tool_uses
                    .iter()
                    .map(|u| {
                        json!({
                            "id": u.tool_call_id,
                            "type": "function",
                            "function": {
                                "name": u.name.clone().unwrap_or_default(),
                                "arguments": u.args.clone().unwrap_or_else(|| json!({})).to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    json!(msg.content)
                };
                result.push(json!({"role": "assistant", "content": content, "tool_calls": tool_calls}));
            }
            Role::Tool => {
                for tool_use in &msg.tool_uses {
                    let content = tool_use.result.as_ref().map(|r| match r {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                    result.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_use.tool_call_id,
                        "content": content.unwrap_or_default(),
                    }));
                }
            }
        }
    }

    result
}

/// Parse `retry-after` (delta seconds) from a throttled response
fn parse_retry_after(headers: &HeaderMap) -> Duration {
    let secs = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

/// Tool call fragments collected for one `index`
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    args: String,
}

impl PartialToolCall {
    fn finish(self, index: usize) -> ToolCall {
        let args = if self.args.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.args).unwrap_or_else(|e| {
                warn!(tool = %self.name, error = %e, "finish: tool arguments are not valid JSON");
                json!({})
            })
        };
        // Ids must stay unique across the session, not just within this turn
        let id = if self.id.is_empty() {
            format!("call_{}_{}", index, Uuid::new_v4().simple())
        } else {
            self.id
        };
        ToolCall::new(id, self.name, args)
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.params.model, "stream: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let http_request = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        // Reconnecting would replay the whole completion
        es.set_retry_policy(Box::new(retry::Never));

        let mut text = String::new();
        let mut partial_calls: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
        let mut usage = TokenUsage::default();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("stream: cancelled");
                    es.close();
                    return Err(LlmError::Cancelled);
                }
                next = es.next() => next,
            };

            let Some(event) = next else {
                debug!("stream: event source exhausted");
                break;
            };

            match event {
                Ok(EsEvent::Open) => {
                    debug!("stream: Event::Open");
                }
                Ok(EsEvent::Message(msg)) => {
                    if msg.data.trim() == "[DONE]" {
                        debug!("stream: [DONE]");
                        break;
                    }

                    let chunk: OpenAIStreamChunk = match serde_json::from_str(&msg.data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            es.close();
                            return Err(LlmError::Json(e));
                        }
                    };

                    if let Some(u) = chunk.usage {
                        usage.input_tokens = u.prompt_tokens;
                        usage.output_tokens = u.completion_tokens;
                    }

                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };

                    if let Some(reasoning) = choice.delta.reasoning_content
                        && !reasoning.is_empty()
                    {
                        let _ = chunk_tx.send(StreamChunk::ReasoningDelta(reasoning)).await;
                    }

                    if let Some(content) = choice.delta.content
                        && !content.is_empty()
                    {
                        text.push_str(&content);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(content)).await;
                    }

                    for tc in choice.delta.tool_calls.unwrap_or_default() {
                        let entry = partial_calls.entry(tc.index).or_default();
                        if let Some(id) = tc.id {
                            entry.id = id;
                        }
                        if let Some(func) = tc.function {
                            if let Some(name) = func.name {
                                entry.name.push_str(&name);
                            }
                            if let Some(args) = func.arguments {
                                entry.args.push_str(&args);
                            }
                        }
                    }

                    if let Some(reason) = choice.finish_reason {
                        debug!(%reason, "stream: finish_reason");
                    }
                }
                Err(EsError::StreamEnded) => {
                    debug!("stream: stream ended");
                    break;
                }
                Err(EsError::InvalidStatusCode(status, response)) => {
                    es.close();
                    let status = status.as_u16();
                    if status == 429 {
                        let retry_after = parse_retry_after(response.headers());
                        warn!(?retry_after, "stream: rate limited (429)");
                        return Err(LlmError::RateLimited { retry_after });
                    }
                    let message = response.text().await.unwrap_or_default();
                    debug!(%status, "stream: API error");
                    return Err(LlmError::ApiError { status, message });
                }
                Err(EsError::Transport(e)) => {
                    es.close();
                    return Err(LlmError::Network(e));
                }
                Err(e) => {
                    debug!(error = %e, "stream: event source error");
                    es.close();
                    return Err(LlmError::Stream(e.to_string()));
                }
            }
        }
        es.close();

        let tool_calls: Vec<ToolCall> = partial_calls
            .into_iter()
            .map(|(index, partial)| partial.finish(index))
            .collect();
        for call in &tool_calls {
            let _ = chunk_tx.send(StreamChunk::ToolCallRequest(call.clone())).await;
        }

        debug!(text_len = text.len(), tool_calls = tool_calls.len(), "stream: complete");
        Ok(CompletionResponse {
            text,
            tool_calls,
            usage,
        })
    }
}

// Streaming wire types

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpenAIStreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAIStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
