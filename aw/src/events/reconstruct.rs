//! Fold an ordered event log into one logical assistant message
//!
//! Used to resume a disconnected client from a recorded (possibly still
//! growing) log, and to turn a finished turn into a history message.

use std::collections::HashMap;

use crate::llm::{Message, Role, ToolCall, ToolResult, ToolUse};

use super::types::{Event, EventLogEntry};

/// Rebuild the assistant message described by `events`
///
/// Deterministic and side-effect free. Safe to call on any prefix of a log:
/// a tool call whose result has not been recorded yet comes back as a pending
/// `ToolUse`, and ids that only appear later in the log are never invented.
pub fn reconstruct(events: &[Event]) -> Message {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut logs = Vec::new();
    let mut order: Vec<&str> = Vec::new();
    let mut calls: HashMap<&str, &ToolCall> = HashMap::new();
    let mut results: HashMap<&str, &ToolResult> = HashMap::new();

    for event in events {
        match event {
            Event::Content { text } => content.push_str(text),
            Event::Reasoning { text } => reasoning.push_str(text),
            Event::Log { message } => logs.push(message.clone()),
            Event::ToolCall(call) => {
                let id = call.id.as_str();
                if !calls.contains_key(id) && !results.contains_key(id) {
                    order.push(id);
                }
                calls.entry(id).or_insert(call);
            }
            Event::ToolResult(result) => {
                let id = result.tool_call_id.as_str();
                if !calls.contains_key(id) && !results.contains_key(id) {
                    order.push(id);
                }
                results.entry(id).or_insert(result);
            }
            _ => {}
        }
    }

    let tool_uses = order
        .into_iter()
        .map(|id| ToolUse::pair(calls.get(id).copied(), results.get(id).copied()))
        .collect();

    Message {
        role: Role::Assistant,
        content,
        tool_uses,
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
        logs,
    }
}

/// Same as [`reconstruct`], for entries read back from a JSONL log
pub fn reconstruct_entries(entries: &[EventLogEntry]) -> Message {
    let events: Vec<Event> = entries.iter().map(|e| e.event.clone()).collect();
    reconstruct(&events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn call(id: &str) -> Event {
        Event::ToolCall(ToolCall::new(id, "search", json!({"q": id})))
    }

    fn result(id: &str) -> Event {
        Event::ToolResult(ToolResult {
            tool_call_id: id.to_string(),
            tool_name: "search".to_string(),
            result: json!({"hits": [id]}),
            tool_definition_id: Some("search".to_string()),
        })
    }

    #[test]
    fn test_empty_log() {
        let msg = reconstruct(&[]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "");
        assert!(msg.reasoning.is_none());
        assert!(msg.tool_uses.is_empty());
    }

    #[test]
    fn test_concatenates_content_reasoning_and_logs() {
        let events = vec![
            Event::reasoning("think "),
            Event::content("Hello"),
            Event::log("step 1"),
            Event::reasoning("more"),
            Event::content(" world"),
            Event::error("ignored"),
            Event::log("step 2"),
        ];
        let msg = reconstruct(&events);
        assert_eq!(msg.content, "Hello world");
        assert_eq!(msg.reasoning.as_deref(), Some("think more"));
        assert_eq!(msg.logs, vec!["step 1", "step 2"]);
    }

    #[test]
    fn test_pairs_calls_and_results_in_first_seen_order() {
        let events = vec![call("b"), call("a"), result("a"), result("b")];
        let msg = reconstruct(&events);
        let ids: Vec<&str> = msg.tool_uses.iter().map(|u| u.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(msg.tool_uses.iter().all(|u| !u.is_pending()));
        assert_eq!(msg.tool_uses[1].result, Some(json!({"hits": ["a"]})));
        assert_eq!(msg.tool_uses[1].args, Some(json!({"q": "a"})));
    }

    #[test]
    fn test_either_side_may_be_missing() {
        let events = vec![call("pending"), result("orphan")];
        let msg = reconstruct(&events);
        assert_eq!(msg.tool_uses.len(), 2);

        let pending = &msg.tool_uses[0];
        assert!(pending.is_pending());
        assert_eq!(pending.name.as_deref(), Some("search"));

        let orphan = &msg.tool_uses[1];
        assert!(orphan.args.is_none());
        assert!(orphan.timestamp.is_none());
        assert_eq!(orphan.tool_definition_id.as_deref(), Some("search"));
    }

    #[test]
    fn test_is_deterministic() {
        let events = vec![Event::content("x"), call("1"), result("1")];
        assert_eq!(reconstruct(&events), reconstruct(&events));
    }

    fn arb_log() -> impl Strategy<Value = Vec<Event>> {
        // ids 0..6, each call appears at most once and its result at most once, after it
        prop::collection::vec((0u8..6, any::<bool>(), "[a-z]{0,3}"), 0..24).prop_map(|ops| {
            let mut events = Vec::new();
            let mut called = std::collections::HashSet::new();
            let mut answered = std::collections::HashSet::new();
            for (id, is_result, text) in ops {
                let id = id.to_string();
                if is_result {
                    if called.contains(&id) && answered.insert(id.clone()) {
                        events.push(result(&id));
                    }
                } else if called.insert(id.clone()) {
                    events.push(call(&id));
                } else {
                    events.push(Event::content(text));
                }
            }
            events
        })
    }

    proptest! {
        #[test]
        fn prop_one_tool_use_per_distinct_id(events in arb_log()) {
            let msg = reconstruct(&events);
            let mut ids: Vec<String> = events
                .iter()
                .filter_map(|e| match e {
                    Event::ToolCall(c) => Some(c.id.clone()),
                    Event::ToolResult(r) => Some(r.tool_call_id.clone()),
                    _ => None,
                })
                .collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(msg.tool_uses.len(), ids.len());
        }

        #[test]
        fn prop_prefix_never_invents_ids(events in arb_log(), cut in 0usize..24) {
            let cut = cut.min(events.len());
            let prefix = &events[..cut];
            let msg = reconstruct(prefix);
            for tool_use in &msg.tool_uses {
                let seen = prefix.iter().any(|e| match e {
                    Event::ToolCall(c) => c.id == tool_use.tool_call_id,
                    Event::ToolResult(r) => r.tool_call_id == tool_use.tool_call_id,
                    _ => false,
                });
                prop_assert!(seen);
            }
        }
    }
}
