//! ToolContext - execution context for one tool call

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Execution context handed to `Tool::execute`
///
/// Scoped to a single call. `cancel` is a child of the session token, so it
/// fires on session abort as well as on the call's own deadline.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session the call belongs to
    pub session_id: String,

    /// Id of the call being executed
    pub tool_call_id: String,

    /// Cancelled on session abort or deadline
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Create a context for `tool_call_id` whose token is a child of `session_cancel`
    pub fn new(session_id: impl Into<String>, tool_call_id: impl Into<String>, session_cancel: &CancellationToken) -> Self {
        let session_id = session_id.into();
        let tool_call_id = tool_call_id.into();
        debug!(%session_id, %tool_call_id, "ToolContext::new: called");
        Self {
            session_id,
            tool_call_id,
            cancel: session_cancel.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
