//! ToolExecutionLoop - invoke the model, run requested tools, repeat
//!
//! ```text
//!            ┌────────────────────────────────────────┐
//!            v                                        │
//!       INVOKING ──> HAS_TOOL_CALLS ──> EXECUTING_TOOLS
//!                         │   (calls and count < budget)
//!                         v
//!                       DONE
//! ```
//!
//! The loop is iterative; `loop_count` and `loop_budget` on the session are the
//! only termination state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{Event, EventBus};
use crate::llm::{LlmError, Message, ModelInvoker, TokenUsage, ToolCall, ToolResult, ToolSpec, ToolUse};
use crate::tools::{ToolContext, ToolError, ToolOutput, ToolRegistry};

use super::StreamSession;

/// Fatal loop errors; everything recoverable is absorbed into the conversation
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),
}

/// State machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Invoking,
    HasToolCalls,
    ExecutingTools,
    Done,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Invoking => "INVOKING",
            LoopState::HasToolCalls => "HAS_TOOL_CALLS",
            LoopState::ExecutingTools => "EXECUTING_TOOLS",
            LoopState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Why the loop settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// The model answered without requesting tools
    Completed,
    /// Tools were still requested when the budget ran out
    BudgetExhausted,
    /// A tool returned `ToolOutput::Final`
    ForcedResponse,
    /// The provider throttled; the text is the degraded answer
    RateLimited,
    /// The session was aborted
    Aborted,
}

/// Terminal result of one loop run
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub session_id: String,
    pub text: String,
    /// Executed calls, accumulated across all rounds
    pub tool_calls: Vec<ToolCall>,
    /// Their results, in the same order
    pub tool_results: Vec<ToolResult>,
    pub loop_count: u32,
    pub usage: TokenUsage,
    pub stop: StopCondition,
}

impl LoopResult {
    /// Calls paired with their results
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.tool_calls
            .iter()
            .map(|call| {
                let result = self.tool_results.iter().find(|r| r.tool_call_id == call.id);
                ToolUse::pair(Some(call), result)
            })
            .collect()
    }
}

/// What one tool round produced
enum RoundOutcome {
    Executed {
        calls: Vec<ToolCall>,
        results: Vec<ToolResult>,
        forced: Option<String>,
    },
    Aborted,
}

/// Accumulators carried across rounds
#[derive(Default)]
struct RunState {
    text: String,
    last_text: String,
    pending: Vec<ToolCall>,
    tool_calls: Vec<ToolCall>,
    tool_results: Vec<ToolResult>,
    seen_ids: HashSet<String>,
    usage: TokenUsage,
}

/// Drives one session from the first invocation to DONE
pub struct ToolExecutionLoop {
    invoker: ModelInvoker,
    registry: ToolRegistry,
    bus: Arc<EventBus>,
}

impl ToolExecutionLoop {
    pub fn new(invoker: ModelInvoker, registry: ToolRegistry, bus: Arc<EventBus>) -> Self {
        debug!(tool_count = registry.len(), "ToolExecutionLoop::new: called");
        Self { invoker, registry, bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Run the session to completion
    ///
    /// Resolves for every recoverable outcome, including abort and budget
    /// exhaustion. Only a fatal provider error is returned as `Err`.
    pub async fn run(&self, session: &mut StreamSession) -> Result<LoopResult, LoopError> {
        debug!(session_id = %session.id, loop_budget = session.loop_budget, "run: called");
        info!(session_id = %session.id, "Session started");

        let specs = self.registry.specs();
        let mut run = RunState::default();
        let mut state = LoopState::Invoking;
        let mut stop = StopCondition::Completed;

        loop {
            if session.is_aborted() {
                debug!(session_id = %session.id, %state, "run: session aborted");
                return Ok(Self::settle(session, run, StopCondition::Aborted));
            }
            debug!(session_id = %session.id, %state, loop_count = session.loop_count, "run: state");

            state = match state {
                LoopState::Invoking => {
                    let result = match self
                        .invoker
                        .invoke(
                            &session.id,
                            &session.conversation_history,
                            &specs,
                            &self.bus,
                            &session.cancel,
                        )
                        .await
                    {
                        Ok(result) => result,
                        Err(e) if e.is_cancelled() => {
                            debug!(session_id = %session.id, "run: invocation cancelled");
                            return Ok(Self::settle(session, run, StopCondition::Aborted));
                        }
                        Err(e) => {
                            warn!(session_id = %session.id, error = %e, "run: fatal provider error");
                            return Err(LoopError::Provider(e));
                        }
                    };

                    run.usage.add(result.usage);
                    run.text.push_str(&result.text);
                    if result.rate_limited {
                        stop = StopCondition::RateLimited;
                        LoopState::Done
                    } else {
                        run.last_text = result.text;
                        run.pending = result.tool_calls;
                        LoopState::HasToolCalls
                    }
                }
                LoopState::HasToolCalls => {
                    if run.pending.is_empty() {
                        stop = StopCondition::Completed;
                        LoopState::Done
                    } else if session.loop_count < session.loop_budget {
                        LoopState::ExecutingTools
                    } else {
                        debug!(
                            session_id = %session.id,
                            pending = run.pending.len(),
                            "run: budget exhausted with pending tool calls"
                        );
                        stop = StopCondition::BudgetExhausted;
                        LoopState::Done
                    }
                }
                LoopState::ExecutingTools => {
                    let requested = std::mem::take(&mut run.pending);
                    let outcome = self.execute_round(session, requested, &mut run.seen_ids).await;
                    let RoundOutcome::Executed { calls, results, forced } = outcome else {
                        return Ok(Self::settle(session, run, StopCondition::Aborted));
                    };

                    // A round of rejected duplicates still counts against the budget
                    if !calls.is_empty() {
                        session
                            .conversation_history
                            .push(Message::assistant_tool_calls(run.last_text.clone(), &calls));
                        session.conversation_history.push(Message::tool_results(&calls, &results));
                    }
                    run.tool_calls.extend(calls);
                    run.tool_results.extend(results);
                    session.loop_count += 1;

                    if let Some(text) = forced {
                        debug!(session_id = %session.id, "run: forced response");
                        // Terminal text stays the concatenation of every content event
                        self.bus.emit(Event::content(text.clone())).await;
                        run.text.push_str(&text);
                        run.last_text = text;
                        stop = StopCondition::ForcedResponse;
                        LoopState::Done
                    } else if session.loop_count >= session.loop_budget {
                        debug!(session_id = %session.id, "run: budget spent by this round");
                        stop = StopCondition::BudgetExhausted;
                        LoopState::Done
                    } else {
                        LoopState::Invoking
                    }
                }
                LoopState::Done => break,
            };
        }

        if matches!(stop, StopCondition::Completed | StopCondition::ForcedResponse) && !run.last_text.is_empty() {
            session
                .conversation_history
                .push(Message::assistant(run.last_text.clone()));
        }

        self.bus.emit(Event::FinalContent { text: run.text.clone() }).await;
        info!(
            session_id = %session.id,
            ?stop,
            loop_count = session.loop_count,
            tool_calls = run.tool_calls.len(),
            "Session complete"
        );
        Ok(Self::settle(session, run, stop))
    }

    /// Execute one round of calls strictly in request order
    async fn execute_round(
        &self,
        session: &StreamSession,
        requested: Vec<ToolCall>,
        seen_ids: &mut HashSet<String>,
    ) -> RoundOutcome {
        debug!(session_id = %session.id, count = requested.len(), "execute_round: called");
        let mut calls = Vec::with_capacity(requested.len());
        let mut results = Vec::with_capacity(requested.len());

        let mut queue = requested.into_iter();
        while let Some(call) = queue.next() {
            if session.is_aborted() {
                return RoundOutcome::Aborted;
            }

            if !seen_ids.insert(call.id.clone()) {
                let err = ToolError::DuplicateCall { id: call.id.clone() };
                warn!(session_id = %session.id, tool = %call.name, error = %err, "execute_round: call rejected");
                self.bus
                    .emit(Event::log(format!("Rejected {} call: {}", call.name, err)))
                    .await;
                continue;
            }

            self.bus.emit(Event::ToolCall(call.clone())).await;

            let ctx = ToolContext::new(&session.id, &call.id, &session.cancel);
            let outcome = tokio::select! {
                biased;
                _ = session.cancel.cancelled() => None,
                outcome = self.registry.execute(&call, &ctx) => Some(outcome),
            };
            // A tool that ignored its token still loses its result once the session is gone
            let Some(outcome) = outcome.filter(|_| !session.is_aborted()) else {
                debug!(session_id = %session.id, tool_call_id = %call.id, "execute_round: aborted during tool");
                return RoundOutcome::Aborted;
            };

            let (value, forced) = match outcome {
                Ok(output) => {
                    let value = output.to_value();
                    match output {
                        ToolOutput::Final(text) => (value, Some(text)),
                        ToolOutput::Result(_) => (value, None),
                    }
                }
                Err(e) => {
                    warn!(session_id = %session.id, tool = %call.name, error = %e, "execute_round: tool failed");
                    (e.to_result_value(), None)
                }
            };

            let result = ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result: value,
                tool_definition_id: self.registry.get(&call.name).map(|t| t.definition_id()),
            };
            self.bus.emit(Event::ToolResult(result.clone())).await;
            calls.push(call);
            results.push(result);

            if forced.is_some() {
                let skipped: Vec<String> = queue.map(|c| c.id).collect();
                if !skipped.is_empty() {
                    self.bus
                        .emit(Event::log(format!(
                            "Skipped tool calls after final answer: {}",
                            skipped.join(", ")
                        )))
                        .await;
                }
                return RoundOutcome::Executed { calls, results, forced };
            }
        }

        RoundOutcome::Executed {
            calls,
            results,
            forced: None,
        }
    }

    fn settle(session: &StreamSession, run: RunState, stop: StopCondition) -> LoopResult {
        LoopResult {
            session_id: session.id.clone(),
            text: run.text,
            tool_calls: run.tool_calls,
            tool_results: run.tool_results,
            loop_count: session.loop_count,
            usage: run.usage,
            stop,
        }
    }

    /// Tool specs advertised on every invocation
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventRecorder, reconstruct};
    use crate::llm::client::mock::{MockProvider, MockStep};
    use crate::llm::{ModelParameters, RATE_LIMIT_TEXT, Role};
    use crate::tools::builtin::FinalAnswerTool;
    use crate::tools::mock::{FailingTool, PanickingTool, SlowTool, StaticTool};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        engine: ToolExecutionLoop,
        provider: Arc<MockProvider>,
        recorder: EventRecorder,
    }

    fn harness(provider: MockProvider, registry: ToolRegistry) -> Harness {
        let provider = Arc::new(provider);
        let bus = Arc::new(EventBus::new());
        let recorder = EventRecorder::attach(&bus);
        let invoker = ModelInvoker::new(provider.clone(), ModelParameters::default());
        Harness {
            engine: ToolExecutionLoop::new(invoker, registry, bus),
            provider,
            recorder,
        }
    }

    fn search_registry() -> (ToolRegistry, Arc<StaticTool>) {
        let search = Arc::new(StaticTool::new("search", json!({"hits": []})));
        (ToolRegistry::empty().with_tool(search.clone()), search)
    }

    fn reply(text: &str, calls: Vec<ToolCall>) -> MockStep {
        MockStep::Reply {
            chunks: if text.is_empty() { vec![] } else { vec![text.to_string()] },
            reasoning: vec![],
            tool_calls: calls,
        }
    }

    fn content_of(recorder: &EventRecorder) -> String {
        recorder
            .snapshot()
            .iter()
            .filter_map(|e| match e {
                Event::Content { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_simple_question_and_answer() {
        let h = harness(MockProvider::new(vec![MockStep::text(&["Hello", " world"])]), ToolRegistry::empty());
        let mut session = StreamSession::new(vec![Message::user("hi")], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.text, "Hello world");
        assert_eq!(result.stop, StopCondition::Completed);
        assert!(result.tool_uses().is_empty());
        assert_eq!(content_of(&h.recorder), result.text);

        let events = h.recorder.snapshot();
        assert_eq!(events.last(), Some(&Event::FinalContent { text: "Hello world".to_string() }));
        assert!(reconstruct(&events).tool_uses.is_empty());
    }

    #[tokio::test]
    async fn test_one_tool_round() {
        let (registry, search) = search_registry();
        let provider = MockProvider::new(vec![
            MockStep::tool_call("t1", "search", json!({"q": "x"})),
            MockStep::text(&["done"]),
        ]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![Message::user("find x")], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.text, "done");
        assert_eq!(result.loop_count, 1);
        let uses = result.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].tool_call_id, "t1");
        assert_eq!(uses[0].result, Some(json!({"hits": []})));
        assert_eq!(search.seen_args(), vec![json!({"q": "x"})]);

        // The second invocation saw the tool round in its history
        let requests = h.provider.requests();
        assert_eq!(requests.len(), 2);
        let history = &requests[1].messages;
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[2].role, Role::Tool);
        assert_eq!(history[2].tool_uses[0].result, Some(json!({"hits": []})));

        let msg = reconstruct(&h.recorder.snapshot());
        assert_eq!(msg.tool_uses.len(), 1);
        assert_eq!(msg.tool_uses[0].tool_definition_id.as_deref(), Some("search"));
    }

    #[tokio::test]
    async fn test_rate_limit_resolves() {
        let h = harness(MockProvider::new(vec![MockStep::RateLimited]), ToolRegistry::empty());
        let mut session = StreamSession::new(vec![Message::user("hi")], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.text, RATE_LIMIT_TEXT);
        assert_eq!(result.stop, StopCondition::RateLimited);
        assert!(h.recorder.snapshot().iter().all(|e| e.kind() != EventKind::Error));
    }

    #[tokio::test]
    async fn test_budget_bounds_invocations_and_executions() {
        for budget in [1u32, 3, 5] {
            let (registry, search) = search_registry();
            let provider = MockProvider::repeating(MockStep::tool_call("t", "search", json!({})));
            let h = harness(provider, registry);
            let mut session = StreamSession::new(vec![Message::user("loop")], budget);

            let result = h.engine.run(&mut session).await.unwrap();

            assert_eq!(h.provider.call_count(), budget as usize);
            assert_eq!(search.call_count(), budget as usize);
            assert_eq!(result.loop_count, budget);
            assert_eq!(result.stop, StopCondition::BudgetExhausted);
        }
    }

    #[tokio::test]
    async fn test_zero_budget_never_executes() {
        let (registry, search) = search_registry();
        let provider = MockProvider::repeating(MockStep::tool_call("t", "search", json!({})));
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 0);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(search.call_count(), 0);
        assert_eq!(result.stop, StopCondition::BudgetExhausted);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_keeps_accumulated_text() {
        let (registry, _) = search_registry();
        let provider = MockProvider::repeating(reply("thinking. ", vec![ToolCall::new("t", "search", json!({}))]));
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 2);

        let result = h.engine.run(&mut session).await.unwrap();
        assert_eq!(result.text, "thinking. thinking. ");
    }

    #[tokio::test]
    async fn test_calls_run_sequentially_in_request_order() {
        let (registry, _) = search_registry();
        let provider = MockProvider::new(vec![
            reply(
                "",
                vec![
                    ToolCall::new("a", "search", json!({"n": 1})),
                    ToolCall::new("b", "search", json!({"n": 2})),
                ],
            ),
            MockStep::text(&["ok"]),
        ]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 10);

        h.engine.run(&mut session).await.unwrap();

        let order: Vec<(EventKind, String)> = h
            .recorder
            .snapshot()
            .iter()
            .filter_map(|e| match e {
                Event::ToolCall(c) => Some((EventKind::ToolCall, c.id.clone())),
                Event::ToolResult(r) => Some((EventKind::ToolResult, r.tool_call_id.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            order,
            vec![
                (EventKind::ToolCall, "a".to_string()),
                (EventKind::ToolResult, "a".to_string()),
                (EventKind::ToolCall, "b".to_string()),
                (EventKind::ToolResult, "b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let provider = MockProvider::new(vec![
            MockStep::tool_call("t1", "teleport", json!({})),
            MockStep::text(&["sorry"]),
        ]);
        let h = harness(provider, ToolRegistry::empty());
        let mut session = StreamSession::new(vec![], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.text, "sorry");
        assert_eq!(result.tool_results[0].result["kind"], "unknown_tool");
        assert!(result.tool_results[0].tool_definition_id.is_none());
    }

    #[tokio::test]
    async fn test_tool_error_and_panic_are_absorbed() {
        let registry = ToolRegistry::empty()
            .with_tool(Arc::new(FailingTool::new("fail")))
            .with_tool(Arc::new(PanickingTool::new("explode")));
        let provider = MockProvider::new(vec![
            reply(
                "",
                vec![ToolCall::new("t1", "fail", json!({})), ToolCall::new("t2", "explode", json!({}))],
            ),
            MockStep::text(&["recovered"]),
        ]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.text, "recovered");
        assert!(result.tool_results.iter().all(|r| r.is_error()));
        assert_eq!(result.tool_results[1].result["kind"], "execution");
    }

    #[tokio::test]
    async fn test_tool_timeout_yields_result_and_continues() {
        let slow = SlowTool::new("slow", Duration::from_secs(5)).with_timeout(Duration::from_millis(20));
        let registry = ToolRegistry::empty().with_tool(Arc::new(slow));
        let provider = MockProvider::new(vec![
            MockStep::tool_call("t1", "slow", json!({})),
            MockStep::text(&["moving on"]),
        ]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.stop, StopCondition::Completed);
        assert_eq!(result.text, "moving on");
        assert_eq!(result.tool_results[0].result["kind"], "timeout");
        assert!(!session.is_aborted());
    }

    #[tokio::test]
    async fn test_forced_response_short_circuits() {
        let (registry, search) = search_registry();
        let registry = registry.with_tool(Arc::new(FinalAnswerTool));
        let provider = MockProvider::new(vec![
            reply(
                "",
                vec![
                    ToolCall::new("t1", "final_answer", json!({"answer": "42"})),
                    ToolCall::new("t2", "search", json!({})),
                ],
            ),
            MockStep::text(&["never"]),
        ]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.stop, StopCondition::ForcedResponse);
        assert_eq!(result.text, "42");
        assert_eq!(result.loop_count, 1);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(search.call_count(), 0);
        assert_eq!(result.tool_results[0].result, json!({"kind": "final", "value": "42"}));
    }

    #[tokio::test]
    async fn test_forced_response_keeps_streamed_preamble() {
        let registry = ToolRegistry::empty().with_tool(Arc::new(FinalAnswerTool));
        let provider = MockProvider::new(vec![reply(
            "Let me answer. ",
            vec![ToolCall::new("t1", "final_answer", json!({"answer": "42"}))],
        )]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![Message::user("q")], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        let events = h.recorder.snapshot();
        assert_eq!(result.stop, StopCondition::ForcedResponse);
        assert_eq!(result.text, "Let me answer. 42");
        assert_eq!(reconstruct(&events).content, result.text);
        assert_eq!(events.last(), Some(&Event::FinalContent { text: result.text.clone() }));

        // History: the tool round carries the preamble, the closing message the answer
        let history = &session.conversation_history;
        assert_eq!(history[1].content, "Let me answer. ");
        assert_eq!(history.last().map(|m| m.content.as_str()), Some("42"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let (registry, search) = search_registry();
        let provider = MockProvider::new(vec![
            reply(
                "",
                vec![ToolCall::new("t1", "search", json!({})), ToolCall::new("t1", "search", json!({}))],
            ),
            MockStep::tool_call("t1", "search", json!({})),
            MockStep::text(&["end"]),
        ]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 10);

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(search.call_count(), 1);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.text, "end");
        let rejections = h
            .recorder
            .snapshot()
            .iter()
            .filter(|e| matches!(e, Event::Log { message } if message.contains("Duplicate tool call id")))
            .count();
        assert_eq!(rejections, 2);
    }

    #[tokio::test]
    async fn test_abort_during_invocation_resolves_aborted() {
        let h = harness(MockProvider::new(vec![MockStep::Hang]), ToolRegistry::empty());
        let mut session = StreamSession::new(vec![], 10);
        let cancel = session.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.stop, StopCondition::Aborted);
        let kinds: Vec<EventKind> = h.recorder.snapshot().iter().map(|e| e.kind()).collect();
        assert!(!kinds.contains(&EventKind::FinalContent));
        assert!(!kinds.contains(&EventKind::Error));
    }

    #[tokio::test]
    async fn test_abort_during_tool_discards_result() {
        let slow = Arc::new(SlowTool::new("slow", Duration::from_secs(5)));
        let registry = ToolRegistry::empty().with_tool(slow.clone());
        let provider = MockProvider::new(vec![MockStep::tool_call("t1", "slow", json!({}))]);
        let h = harness(provider, registry);
        let mut session = StreamSession::new(vec![], 10);
        let cancel = session.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.stop, StopCondition::Aborted);
        assert!(result.tool_results.is_empty());
        assert_eq!(slow.completed(), 0);
        let kinds: Vec<EventKind> = h.recorder.snapshot().iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&EventKind::ToolCall));
        assert!(!kinds.contains(&EventKind::ToolResult));
    }

    #[tokio::test]
    async fn test_abort_before_start_emits_nothing() {
        let h = harness(MockProvider::new(vec![MockStep::text(&["x"])]), ToolRegistry::empty());
        let mut session = StreamSession::new(vec![], 10);
        session.abort();

        let result = h.engine.run(&mut session).await.unwrap();

        assert_eq!(result.stop, StopCondition::Aborted);
        assert!(h.recorder.is_empty());
        assert_eq!(h.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fatal_provider_error_rejects() {
        let h = harness(MockProvider::new(vec![MockStep::Fail("boom".to_string())]), ToolRegistry::empty());
        let mut session = StreamSession::new(vec![], 10);

        let err = h.engine.run(&mut session).await.unwrap_err();

        assert!(matches!(err, LoopError::Provider(LlmError::ApiError { .. })));
        let kinds: Vec<EventKind> = h.recorder.snapshot().iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&EventKind::Error));
        assert!(!kinds.contains(&EventKind::FinalContent));
    }

    #[tokio::test]
    async fn test_final_answer_appended_to_history() {
        let h = harness(MockProvider::new(vec![MockStep::text(&["hi there"])]), ToolRegistry::empty());
        let mut session = StreamSession::new(vec![Message::user("hi")], 10);

        h.engine.run(&mut session).await.unwrap();

        assert_eq!(session.conversation_history.len(), 2);
        assert_eq!(session.conversation_history[1], Message::assistant("hi there"));
    }
}
