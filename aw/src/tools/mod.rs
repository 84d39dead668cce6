//! Tool system for agentwire sessions
//!
//! Tools are capabilities the model may request mid-conversation. A session's
//! `ToolRegistry` is fixed when the loop is built; each call gets its own
//! `ToolContext` carrying a cancellation token derived from the session's.

mod context;
mod error;
mod registry;
mod traits;

pub mod builtin;

#[cfg(test)]
pub mod mock;

pub use context::ToolContext;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolOutput};
