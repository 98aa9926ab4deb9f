//! Events delivered to the consumer of a turn stream

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::identifiers::RunId;
use crate::normalize::ToolKind;

/// One event of a running turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Agent notification for this turn, forwarded as received
    Notification {
        /// Method name as sent by the agent
        method: String,
        /// Notification parameters
        params: Value,
    },
    /// A tool call began (emitted at most once per call id)
    ToolCallStarted(ToolCall),
    /// A tool call finished (emitted at most once per call id)
    ToolCallCompleted(ToolCall),
    /// The turn finished successfully; always the last event
    TurnCompleted(TurnSummary),
}

/// Lifecycle record of one tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    /// Call id from the agent
    pub call_id: String,
    /// Tool name (built-in kind name or dynamic tool name)
    pub tool_name: String,
    /// Tool family
    pub kind: ToolKind,
    /// Normalized arguments
    pub arguments: Value,
    /// Normalized result, once completed
    pub result: Option<Value>,
    /// Whether the call failed
    pub is_error: bool,
    /// When the start was observed
    pub started_at: DateTime<Utc>,
    /// When the completion was observed
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    /// A call that has just started
    pub fn started(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: ToolKind,
        arguments: Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            kind,
            arguments,
            result: None,
            is_error: false,
            started_at: at,
            completed_at: None,
        }
    }

    /// The same call, completed with `result`
    #[must_use]
    pub fn completed(mut self, result: Value, is_error: bool, at: DateTime<Utc>) -> Self {
        self.result = Some(result);
        self.is_error = is_error;
        self.completed_at = Some(at);
        self
    }
}

/// Final record of a successful turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSummary {
    /// Client-side run id
    pub run_id: RunId,
    /// Thread the turn ran on
    pub thread_id: String,
    /// Agent turn id, if it was ever reported
    pub turn_id: Option<String>,
    /// Terminal status as reported
    pub status: String,
    /// Payload that carried the terminal status
    pub raw: Value,
}
