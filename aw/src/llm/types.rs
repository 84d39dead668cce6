//! Conversation and invocation types shared by providers, the tool loop and the event log
//!
//! Field names serialize in camelCase because these values travel over the SSE wire
//! to browser clients as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<ToolUse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ..Self::default()
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        debug!("Message::system: called");
        Self::with_role(Role::System, text)
    }

    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self::with_role(Role::User, text)
    }

    /// Create an assistant message with text content
    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self::with_role(Role::Assistant, text)
    }

    /// Assistant message carrying the tool calls requested in one model turn
    pub fn assistant_tool_calls(text: impl Into<String>, calls: &[ToolCall]) -> Self {
        debug!(call_count = calls.len(), "Message::assistant_tool_calls: called");
        Self {
            tool_uses: calls.iter().map(ToolUse::from_call).collect(),
            ..Self::with_role(Role::Assistant, text)
        }
    }

    /// Tool-role message carrying every result of one tool round
    pub fn tool_results(calls: &[ToolCall], results: &[ToolResult]) -> Self {
        debug!(result_count = results.len(), "Message::tool_results: called");
        let tool_uses = results
            .iter()
            .map(|result| {
                let call = calls.iter().find(|c| c.id == result.tool_call_id);
                ToolUse::pair(call, Some(result))
            })
            .collect();
        Self {
            tool_uses,
            ..Self::with_role(Role::Tool, "")
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Correlation key, unique within a session
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            timestamp: Utc::now(),
        }
    }
}

/// The outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// References the `ToolCall::id` this result answers
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
    #[serde(default)]
    pub tool_definition_id: Option<String>,
}

impl ToolResult {
    /// True when the result is a structured error object
    pub fn is_error(&self) -> bool {
        self.result.get("error").is_some()
    }
}

/// A tool call paired with its (possibly absent) result, keyed by tool call id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_definition_id: Option<String>,
}

impl ToolUse {
    fn from_call(call: &ToolCall) -> Self {
        Self::pair(Some(call), None)
    }

    /// Pair a call with its result; either side may be missing
    pub fn pair(call: Option<&ToolCall>, result: Option<&ToolResult>) -> Self {
        let tool_call_id = call
            .map(|c| c.id.clone())
            .or_else(|| result.map(|r| r.tool_call_id.clone()))
            .unwrap_or_default();
        Self {
            tool_call_id,
            name: call
                .map(|c| c.name.clone())
                .or_else(|| result.map(|r| r.tool_name.clone())),
            args: call.map(|c| c.args.clone()),
            timestamp: call.map(|c| c.timestamp),
            result: result.map(|r| r.result.clone()),
            tool_definition_id: result.and_then(|r| r.tool_definition_id.clone()),
        }
    }

    /// A call whose result has not arrived yet
    pub fn is_pending(&self) -> bool {
        self.result.is_none()
    }
}

/// Tool description advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    /// Convert to the OpenAI function-calling schema
    pub fn to_openai_schema(&self) -> Value {
        debug!(%self.name, "ToolSpec::to_openai_schema: called");
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// Model parameters passed through to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameters {
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

/// A request for one provider call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub params: ModelParameters,
}

/// Terminal result of one provider call
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Token usage for cost tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Incremental output of a provider call
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Text being generated
    TextDelta(String),

    /// Reasoning text being generated
    ReasoningDelta(String),

    /// A complete tool invocation request
    ToolCallRequest(ToolCall),
}
