//! SseEncoder - writes session events onto one SSE response body
//!
//! The byte channel holds exactly one frame, so a slow client backpressures
//! the producer (and through the bus, the model stream) instead of queueing.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Event, EventBus, EventKind, EventListener};
use crate::llm::{ToolCall, ToolResult};

use super::TransportError;

/// Kinds bridged from the bus onto the wire
pub const FORWARDED_KINDS: [EventKind; 4] = [
    EventKind::Content,
    EventKind::ToolCall,
    EventKind::ToolResult,
    EventKind::Error,
];

/// Format one SSE frame: `event: <kind>\ndata:<payload>\n\n`
///
/// Numbers are written literally, everything else as JSON.
pub fn format_frame(kind: &str, payload: &Value) -> Bytes {
    let data = match payload {
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    };
    Bytes::from(format!("event: {}\ndata:{}\n\n", kind, data))
}

/// Stream transport encoder for one outstanding HTTP response
pub struct SseEncoder {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl SseEncoder {
    /// Create an encoder bound to the session's abort token
    pub fn new(cancel: CancellationToken) -> Self {
        debug!("SseEncoder::new: called");
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once closed explicitly or aborted
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    /// End the stream; later calls are no-ops
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("SseEncoder::close: already closed");
            return;
        }
        debug!("SseEncoder::close: closing stream");
        // Dropping the sender lets the body drain what is buffered and end
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    fn sender(&self) -> Option<mpsc::Sender<Bytes>> {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Write one frame; dropped with a diagnostic once the stream is closed
    pub async fn send_event(&self, kind: &str, payload: &Value) {
        if self.cancel.is_cancelled() {
            self.close();
        }
        if self.is_closed() {
            debug!(%kind, "send_event: stream closed, dropping frame");
            return;
        }
        let Some(tx) = self.sender() else {
            debug!(%kind, "send_event: no sender, dropping frame");
            return;
        };

        let frame = format_frame(kind, payload);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(%kind, "send_event: aborted while waiting for the client");
                self.close();
            }
            sent = tx.send(frame) => {
                if sent.is_err() {
                    debug!(%kind, "send_event: body dropped, closing");
                    self.close();
                }
            }
        }
    }

    pub async fn send_text(&self, text: &str) {
        self.send_event(EventKind::Content.as_str(), &Value::String(text.to_string()))
            .await;
    }

    pub async fn send_log(&self, message: &str) {
        self.send_event(EventKind::Log.as_str(), &Value::String(message.to_string()))
            .await;
    }

    pub async fn send_error(&self, message: &str) {
        self.send_event(EventKind::Error.as_str(), &Value::String(message.to_string()))
            .await;
    }

    pub async fn send_tool_call(&self, call: &ToolCall) {
        match serde_json::to_value(call) {
            Ok(value) => self.send_event(EventKind::ToolCall.as_str(), &value).await,
            Err(e) => warn!(error = %e, "send_tool_call: failed to serialize"),
        }
    }

    pub async fn send_tool_result(&self, result: &ToolResult) {
        match serde_json::to_value(result) {
            Ok(value) => self.send_event(EventKind::ToolResult.as_str(), &value).await,
            Err(e) => warn!(error = %e, "send_tool_result: failed to serialize"),
        }
    }

    /// Build the streaming response; may be taken once
    ///
    /// The body ends when the encoder closes or the token fires. Dropping the
    /// body (client disconnect) cancels the token.
    pub fn to_response(&self) -> Result<Response, TransportError> {
        debug!("SseEncoder::to_response: called");
        let mut rx = self
            .rx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or(TransportError::ResponseTaken)?;
        let cancel = self.cancel.clone();
        let disconnect_guard = self.cancel.clone().drop_guard();

        let stream = async_stream::stream! {
            let _disconnect_guard = disconnect_guard;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = rx.recv() => chunk,
                };
                match next {
                    Some(chunk) => yield Ok::<Bytes, Infallible>(chunk),
                    None => break,
                }
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        Ok((headers, Body::from_stream(stream)).into_response())
    }

    /// A bus whose `content`, `tool_call`, `tool_result` and `error` events
    /// are written to this encoder under the same kind
    pub fn create_event_emitter(self: &Arc<Self>) -> Arc<EventBus> {
        debug!("create_event_emitter: called");
        let bus = Arc::new(EventBus::new());
        bus.on_many(
            &FORWARDED_KINDS,
            Arc::new(SseForwarder {
                encoder: Arc::clone(self),
            }),
        );
        bus
    }
}

/// Bus listener writing events to an encoder
struct SseForwarder {
    encoder: Arc<SseEncoder>,
}

#[async_trait]
impl EventListener for SseForwarder {
    async fn on_event(&self, event: &Event) -> eyre::Result<()> {
        self.encoder.send_event(event.kind().as_str(), &event.payload()).await;
        Ok(())
    }
}
