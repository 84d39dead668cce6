//! StreamSession - the bounded-lifetime state of one request

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::llm::Message;

/// State for one logical multi-turn request
///
/// Owned by exactly one `ToolExecutionLoop::run`; only that run mutates the
/// history and the loop count. The token is the single abort signal threaded
/// through the provider call, every tool call and the transport.
#[derive(Debug)]
pub struct StreamSession {
    pub id: String,
    pub conversation_history: Vec<Message>,
    pub loop_count: u32,
    pub loop_budget: u32,
    pub cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(history: Vec<Message>, loop_budget: u32) -> Self {
        Self::with_cancel(history, loop_budget, CancellationToken::new())
    }

    /// Create a session bound to an existing token (e.g. the transport's)
    pub fn with_cancel(history: Vec<Message>, loop_budget: u32, cancel: CancellationToken) -> Self {
        let id = Uuid::new_v4().to_string();
        debug!(%id, message_count = history.len(), loop_budget, "StreamSession::new: called");
        Self {
            id,
            conversation_history: history,
            loop_count: 0,
            loop_budget,
            cancel,
        }
    }

    /// Abort the session; safe to call any number of times
    pub fn abort(&self) {
        if !self.cancel.is_cancelled() {
            debug!(id = %self.id, "StreamSession::abort: cancelling");
        }
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn budget_remaining(&self) -> u32 {
        self.loop_budget.saturating_sub(self.loop_count)
    }
}
