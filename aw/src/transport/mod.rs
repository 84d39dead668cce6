//! HTTP transport for agentwire
//!
//! `sse` owns the wire encoding of one response stream; `server` exposes the
//! loop over axum routes.

pub mod server;
pub mod sse;

use thiserror::Error;

pub use server::{
    AppState, CHAT_PATH, HEALTH_PATH, SESSION_HEADER, SESSION_MESSAGE_PATH, TOOLS_PATH, router,
    serve,
};
pub use sse::{FORWARDED_KINDS, SseEncoder, format_frame};

/// Errors produced by the stream transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("response stream already taken")]
    ResponseTaken,

    #[error("transport closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
