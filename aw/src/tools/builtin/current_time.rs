//! current_time tool - report the wall clock

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::{Value, json};

use crate::tools::{Tool, ToolContext, ToolError, ToolOutput};

/// Current date and time, optionally shifted to a UTC offset
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally pass a UTC offset in hours."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Offset from UTC in hours, between -12 and 14"
                }
            }
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let now = Utc::now();
        let offset_hours = match args.get("utc_offset_hours") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_i64()
                .filter(|h| (-12..=14).contains(h))
                .ok_or_else(|| ToolError::InvalidArgument("utc_offset_hours must be an integer in -12..=14".into()))?,
        };

        let offset = FixedOffset::east_opt((offset_hours * 3600) as i32)
            .ok_or_else(|| ToolError::InvalidArgument(format!("invalid offset: {}", offset_hours)))?;
        let local = now.with_timezone(&offset);

        Ok(ToolOutput::Result(json!({
            "iso8601": local.to_rfc3339(),
            "unix": now.timestamp(),
            "utc_offset_hours": offset_hours,
        })))
    }
}
