//! final_answer tool - end the conversation with a given answer

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolError, ToolOutput};

pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        "final_answer"
    }

    fn description(&self) -> &str {
        "Give the final answer to the user. Ends the conversation; no further tools run."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The complete answer shown to the user"
                }
            },
            "required": ["answer"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        debug!(tool_call_id = %ctx.tool_call_id, "FinalAnswerTool::execute: called");
        let answer = args["answer"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgument("answer is required".to_string()))?;
        Ok(ToolOutput::Final(answer.to_string()))
    }
}
