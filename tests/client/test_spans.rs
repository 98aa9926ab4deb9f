//! Unit tests for the tool span tracker

use chrono::Utc;
use kodegen_codex_bridge::client::spans::{SpanEmit, SpanPhase, ToolSpanTracker, transition};
use kodegen_codex_bridge::normalize::{ToolKind, ToolObservation, ToolSignal};
use kodegen_codex_bridge::TurnEvent;
use serde_json::json;

fn observation(call_id: &str, signal: ToolSignal) -> ToolObservation {
    ToolObservation {
        kind: ToolKind::WebSearch,
        call_id: call_id.to_string(),
        signal,
        arguments: json!({ "query": "rust async" }),
        result: match signal {
            ToolSignal::Begin => None,
            ToolSignal::End => Some(json!({ "query": "rust async", "matches": 3 })),
        },
        is_error: false,
    }
}

#[test]
fn test_transition_table() {
    assert_eq!(
        transition(SpanPhase::Absent, ToolSignal::Begin),
        (SpanPhase::Started, &[SpanEmit::Start][..])
    );
    assert_eq!(
        transition(SpanPhase::Absent, ToolSignal::End),
        (SpanPhase::Completed, &[SpanEmit::Start, SpanEmit::Result][..])
    );
    assert_eq!(
        transition(SpanPhase::Started, ToolSignal::End),
        (SpanPhase::Completed, &[SpanEmit::Result][..])
    );
    assert!(transition(SpanPhase::Started, ToolSignal::Begin).1.is_empty());
    assert!(transition(SpanPhase::Completed, ToolSignal::Begin).1.is_empty());
    assert!(transition(SpanPhase::Completed, ToolSignal::End).1.is_empty());
}

#[test]
fn test_start_and_result_emitted_once() {
    let mut tracker = ToolSpanTracker::new();
    let now = Utc::now();

    let events = tracker.apply(observation("ws_1", ToolSignal::Begin), now);
    assert!(matches!(events.as_slice(), [TurnEvent::ToolCallStarted(_)]));
    assert!(tracker.apply(observation("ws_1", ToolSignal::Begin), now).is_empty());
    assert_eq!(tracker.phase("ws_1"), SpanPhase::Started);

    let events = tracker.apply(observation("ws_1", ToolSignal::End), now);
    match events.as_slice() {
        [TurnEvent::ToolCallCompleted(call)] => {
            assert_eq!(call.tool_name, "web_search");
            assert_eq!(call.result.as_ref().unwrap()["matches"], 3);
            assert!(call.completed_at.is_some());
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert!(tracker.apply(observation("ws_1", ToolSignal::End), now).is_empty());
    assert!(tracker.apply(observation("ws_1", ToolSignal::Begin), now).is_empty());
    assert_eq!(tracker.phase("ws_1"), SpanPhase::Completed);
}

#[test]
fn test_completion_without_start_synthesizes_start() {
    let mut tracker = ToolSpanTracker::new();
    let events = tracker.apply(observation("ws_2", ToolSignal::End), Utc::now());
    match events.as_slice() {
        [TurnEvent::ToolCallStarted(start), TurnEvent::ToolCallCompleted(end)] => {
            assert_eq!(start.call_id, "ws_2");
            assert!(start.result.is_none());
            assert_eq!(end.call_id, "ws_2");
            assert!(end.result.is_some());
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
fn test_clear_forgets_spans() {
    let mut tracker = ToolSpanTracker::new();
    tracker.apply(observation("a", ToolSignal::Begin), Utc::now());
    tracker.apply(observation("b", ToolSignal::End), Utc::now());
    assert_eq!(tracker.len(), 2);

    tracker.clear();
    assert!(tracker.is_empty());
    assert_eq!(tracker.phase("a"), SpanPhase::Absent);
}
