//! ToolRegistry - the fixed set of tools available to one loop

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::llm::{ToolCall, ToolSpec};

use super::builtin::{CurrentTimeTool, FetchTool, FinalAnswerTool};
use super::{Tool, ToolContext, ToolError, ToolOutput};

/// Typed map from tool name to implementation
///
/// Built once and never mutated while a session runs; `with_tool` consumes
/// and returns the registry so construction stays a single expression.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a registry from a list of tools; later duplicates replace earlier ones
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        debug!(count = tools.len(), "ToolRegistry::new: called");
        let tools = tools.into_iter().map(|t| (t.name().to_string(), t)).collect();
        Self { tools }
    }

    /// Registry with the builtin tools
    pub fn standard() -> Self {
        debug!("ToolRegistry::standard: called");
        Self::new(vec![
            Arc::new(CurrentTimeTool),
            Arc::new(FetchTool::new()),
            Arc::new(FinalAnswerTool),
        ])
    }

    /// Registry with no tools
    pub fn empty() -> Self {
        debug!("ToolRegistry::empty: called");
        Self::default()
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        debug!(tool_name = %tool.name(), "ToolRegistry::with_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool descriptions advertised to the model, sorted by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve and run one call
    ///
    /// Panics are caught and become `ToolError::Execution`. When the tool
    /// declares a deadline and it elapses, the call's token is cancelled and
    /// `ToolError::Timeout` is returned.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        debug!(tool_name = %call.name, tool_id = %call.id, "ToolRegistry::execute: called");
        let Some(tool) = self.get(&call.name) else {
            debug!("ToolRegistry::execute: unknown tool");
            return Err(ToolError::UnknownTool {
                name: call.name.clone(),
            });
        };

        let run = AssertUnwindSafe(tool.execute(call.args.clone(), ctx)).catch_unwind();
        let outcome = match tool.timeout() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(tool_name = %call.name, ?limit, "ToolRegistry::execute: deadline elapsed");
                    ctx.cancel.cancel();
                    return Err(ToolError::Timeout {
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => run.await,
        };

        outcome.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(tool_name = %call.name, %message, "ToolRegistry::execute: tool panicked");
            Err(ToolError::Execution(format!("tool panicked: {}", message)))
        })
    }
}
