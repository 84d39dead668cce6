//! ModelProvider trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Opaque remote model backend
///
/// One call turns a set of messages into an ordered sequence of chunks sent on
/// `chunk_tx`, followed by the terminal response. Implementations hold only
/// process-wide client handles, so a single provider is shared by every
/// session concurrently.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logs and `llm_start` events
    fn name(&self) -> &str;

    /// Stream one completion
    ///
    /// Must return `LlmError::Cancelled` promptly once `cancel` fires.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::llm::{TokenUsage, ToolCall};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing::debug;

    /// One scripted provider turn
    #[derive(Debug, Clone)]
    pub enum MockStep {
        /// Stream the text chunks, then request the tool calls
        Reply {
            chunks: Vec<String>,
            reasoning: Vec<String>,
            tool_calls: Vec<ToolCall>,
        },
        /// Fail with a throttling error
        RateLimited,
        /// Fail with a fatal API error
        Fail(String),
        /// Never answer; only cancellation ends the call
        Hang,
    }

    impl MockStep {
        pub fn text(chunks: &[&str]) -> Self {
            MockStep::Reply {
                chunks: chunks.iter().map(|s| s.to_string()).collect(),
                reasoning: vec![],
                tool_calls: vec![],
            }
        }

        pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> Self {
            MockStep::Reply {
                chunks: vec![],
                reasoning: vec![],
                tool_calls: vec![ToolCall::new(id, name, args)],
            }
        }
    }

    /// Mock provider for unit tests
    pub struct MockProvider {
        steps: Vec<MockStep>,
        repeat_last: bool,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockProvider {
        pub fn new(steps: Vec<MockStep>) -> Self {
            debug!(step_count = %steps.len(), "MockProvider::new: called");
            Self {
                steps,
                repeat_last: false,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Answer every call with the same step; tool call ids get a per-call suffix
        pub fn repeating(step: MockStep) -> Self {
            Self {
                repeat_last: true,
                ..Self::new(vec![step])
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
            cancel: CancellationToken,
        ) -> Result<CompletionResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockProvider::stream: called");
            self.requests.lock().unwrap().push(request);

            let step = if self.repeat_last {
                self.steps.last().cloned()
            } else {
                self.steps.get(idx).cloned()
            };

            match step {
                None => Err(LlmError::InvalidResponse("No more mock responses".to_string())),
                Some(MockStep::RateLimited) => Err(LlmError::RateLimited {
                    retry_after: Duration::from_secs(1),
                }),
                Some(MockStep::Fail(message)) => Err(LlmError::ApiError { status: 500, message }),
                Some(MockStep::Hang) => {
                    cancel.cancelled().await;
                    Err(LlmError::Cancelled)
                }
                Some(MockStep::Reply {
                    chunks,
                    reasoning,
                    tool_calls,
                }) => {
                    for r in reasoning {
                        let _ = chunk_tx.send(StreamChunk::ReasoningDelta(r)).await;
                    }
                    let mut text = String::new();
                    for chunk in chunks {
                        text.push_str(&chunk);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(chunk)).await;
                    }
                    let tool_calls: Vec<ToolCall> = tool_calls
                        .into_iter()
                        .map(|mut call| {
                            if self.repeat_last {
                                call.id = format!("{}-{}", call.id, idx);
                            }
                            call
                        })
                        .collect();
                    for call in &tool_calls {
                        let _ = chunk_tx.send(StreamChunk::ToolCallRequest(call.clone())).await;
                    }
                    Ok(CompletionResponse {
                        text,
                        tool_calls,
                        usage: TokenUsage {
                            input_tokens: 10,
                            output_tokens: 5,
                        },
                    })
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::llm::ModelParameters;

        fn request() -> CompletionRequest {
            CompletionRequest {
                messages: vec![],
                tools: vec![],
                params: ModelParameters::default(),
            }
        }

        #[tokio::test]
        async fn test_mock_provider_streams_chunks() {
            let provider = MockProvider::new(vec![MockStep::text(&["Hello", " world"])]);
            let (tx, mut rx) = mpsc::channel(8);

            let resp = provider.stream(request(), tx, CancellationToken::new()).await.unwrap();
            assert_eq!(resp.text, "Hello world");

            let mut seen = Vec::new();
            while let Some(StreamChunk::TextDelta(t)) = rx.recv().await {
                seen.push(t);
            }
            assert_eq!(seen, vec!["Hello", " world"]);
            assert_eq!(provider.call_count(), 1);
        }

        #[tokio::test]
        async fn test_mock_provider_errors_when_exhausted() {
            let provider = MockProvider::new(vec![]);
            let (tx, _rx) = mpsc::channel(8);
            let result = provider.stream(request(), tx, CancellationToken::new()).await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_mock_provider_repeating_suffixes_ids() {
            let provider = MockProvider::repeating(MockStep::tool_call("t", "search", serde_json::json!({})));
            let (tx, _rx) = mpsc::channel(8);
            let first = provider.stream(request(), tx.clone(), CancellationToken::new()).await.unwrap();
            let second = provider.stream(request(), tx, CancellationToken::new()).await.unwrap();
            assert_eq!(first.tool_calls[0].id, "t-0");
            assert_eq!(second.tool_calls[0].id, "t-1");
        }
    }
}
