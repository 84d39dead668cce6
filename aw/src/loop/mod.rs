//! Tool execution loop for agentwire
//!
//! One `ToolExecutionLoop::run` drives a `StreamSession` through repeated
//! model invocations and tool rounds until the model stops asking for tools,
//! a tool forces the final answer, the budget runs out, or the session aborts.

mod config;
mod engine;
mod session;

pub use config::LoopConfig;
pub use engine::{LoopError, LoopResult, LoopState, StopCondition, ToolExecutionLoop};
pub use session::StreamSession;
