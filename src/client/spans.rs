//! Built-in tool span deduplication
//!
//! Each call id moves through `Absent -> Started -> Completed`. Every
//! (phase, signal) pair has one row in [`transition`], so a completion that
//! arrives without a start is the `Absent + End` row, not a special case.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::normalize::{ToolObservation, ToolSignal};
use crate::types::events::{ToolCall, TurnEvent};

/// Lifecycle phase of one call id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanPhase {
    /// Never seen
    Absent,
    /// Start emitted, result pending
    Started,
    /// Start and result emitted
    Completed,
}

/// Event the tracker emits on a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEmit {
    /// Emit `ToolCallStarted`
    Start,
    /// Emit `ToolCallCompleted`
    Result,
}

const EMIT_NONE: &[SpanEmit] = &[];
const EMIT_START: &[SpanEmit] = &[SpanEmit::Start];
const EMIT_RESULT: &[SpanEmit] = &[SpanEmit::Result];
const EMIT_START_AND_RESULT: &[SpanEmit] = &[SpanEmit::Start, SpanEmit::Result];

/// Next phase and emitted events for one signal
#[must_use]
pub const fn transition(phase: SpanPhase, signal: ToolSignal) -> (SpanPhase, &'static [SpanEmit]) {
    match (phase, signal) {
        (SpanPhase::Absent, ToolSignal::Begin) => (SpanPhase::Started, EMIT_START),
        (SpanPhase::Absent, ToolSignal::End) => (SpanPhase::Completed, EMIT_START_AND_RESULT),
        (SpanPhase::Started, ToolSignal::Begin) => (SpanPhase::Started, EMIT_NONE),
        (SpanPhase::Started, ToolSignal::End) => (SpanPhase::Completed, EMIT_RESULT),
        (SpanPhase::Completed, _) => (SpanPhase::Completed, EMIT_NONE),
    }
}

#[derive(Debug)]
struct ToolSpan {
    phase: SpanPhase,
    call: ToolCall,
}

/// Per-run table of built-in tool spans keyed by call id
#[derive(Debug, Default)]
pub struct ToolSpanTracker {
    spans: HashMap<String, ToolSpan>,
}

impl ToolSpanTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one observation and return the lifecycle events to emit
    pub fn apply(&mut self, observation: ToolObservation, now: DateTime<Utc>) -> Vec<TurnEvent> {
        let ToolObservation {
            kind,
            call_id,
            signal,
            arguments,
            result,
            is_error,
        } = observation;

        let span = self.spans.entry(call_id.clone()).or_insert_with(|| ToolSpan {
            phase: SpanPhase::Absent,
            call: ToolCall::started(call_id, kind.as_str(), kind, arguments, now),
        });

        let (next, emits) = transition(span.phase, signal);
        span.phase = next;

        let mut events = Vec::with_capacity(emits.len());
        for emit in emits {
            match emit {
                SpanEmit::Start => {
                    span.call.started_at = now;
                    events.push(TurnEvent::ToolCallStarted(span.call.clone()));
                }
                SpanEmit::Result => {
                    span.call = span.call.clone().completed(
                        result.clone().unwrap_or_default(),
                        is_error,
                        now,
                    );
                    events.push(TurnEvent::ToolCallCompleted(span.call.clone()));
                }
            }
        }
        events
    }

    /// Phase of a call id
    #[must_use]
    pub fn phase(&self, call_id: &str) -> SpanPhase {
        self.spans
            .get(call_id)
            .map_or(SpanPhase::Absent, |span| span.phase)
    }

    /// Forget every span
    pub fn clear(&mut self) {
        self.spans.clear();
    }

    /// Number of tracked call ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
