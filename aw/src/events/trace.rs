//! Mirror request bracketing and tool activity into `tracing`
//!
//! Stands in for an external observability backend: it only subscribes to the
//! bus, so the engine never knows it exists.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::bus::{EventBus, EventListener};
use super::types::{Event, EventKind};

/// Kinds mirrored by [`TraceMirror`]
pub const TRACED_KINDS: [EventKind; 4] = [
    EventKind::LlmStart,
    EventKind::LlmEnd,
    EventKind::ToolCall,
    EventKind::ToolResult,
];

pub struct TraceMirror;

impl TraceMirror {
    pub fn attach(bus: &EventBus) {
        bus.on_many(&TRACED_KINDS, Arc::new(TraceMirror));
    }
}

#[async_trait]
impl EventListener for TraceMirror {
    async fn on_event(&self, event: &Event) -> eyre::Result<()> {
        match event {
            Event::LlmStart {
                session_id,
                provider,
                model,
                message_count,
                tool_count,
                ..
            } => {
                info!(%session_id, %provider, %model, message_count, tool_count, "llm_start");
            }
            Event::LlmEnd {
                session_id,
                usage,
                error: None,
            } => {
                info!(
                    %session_id,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "llm_end"
                );
            }
            Event::LlmEnd {
                session_id,
                error: Some(error),
                ..
            } => {
                warn!(%session_id, %error, "llm_end with error");
            }
            Event::ToolCall(call) => {
                info!(tool_call_id = %call.id, tool = %call.name, "tool_call");
            }
            Event::ToolResult(result) => {
                info!(
                    tool_call_id = %result.tool_call_id,
                    tool = %result.tool_name,
                    is_error = result.is_error(),
                    "tool_result"
                );
            }
            _ => {}
        }
        Ok(())
    }
}
