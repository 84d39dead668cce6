//! fetch tool - GET a URL and return its (truncated) body

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolError, ToolOutput};

/// Deadline for one fetch
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum characters of body returned to the model
const MAX_BODY_CHARS: usize = 20_000;

/// Fetch content from a URL
pub struct FetchTool {
    http: Client,
}

impl FetchTool {
    pub fn new() -> Self {
        debug!("FetchTool::new: called");
        let http = Client::builder().timeout(FETCH_TIMEOUT).build().unwrap_or_default();
        Self { http }
    }
}

impl Default for FetchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut `body` to at most `max_chars` characters
fn truncate_chars(body: &str, max_chars: usize) -> (String, bool) {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => (body[..idx].to_string(), true),
        None => (body.to_string(), false),
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL with an HTTP GET. Long bodies are truncated."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch (http or https)"
                }
            },
            "required": ["url"]
        })
    }

    fn timeout(&self) -> Option<Duration> {
        Some(FETCH_TIMEOUT)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgument("url is required".to_string()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArgument(
                "URL must start with http:// or https://".to_string(),
            ));
        }
        debug!(%url, tool_call_id = %ctx.tool_call_id, "FetchTool::execute: fetching");

        let request = async {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let body = response.text().await?;
            Ok::<_, ToolError>((status, content_type, body))
        };

        let (status, content_type, body) = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(ToolError::Execution("fetch cancelled".to_string()));
            }
            outcome = request => outcome?,
        };

        if !status.is_success() {
            return Err(ToolError::Execution(format!("HTTP error: {}", status)));
        }

        let (body, truncated) = truncate_chars(&body, MAX_BODY_CHARS);
        Ok(ToolOutput::Result(json!({
            "url": url,
            "status": status.as_u16(),
            "contentType": content_type,
            "body": body,
            "truncated": truncated,
        })))
    }
}
