//! Notification method routing
//!
//! Methods arrive in slash form (`turn/completed`) or dot form
//! (`turn.completed`). Both normalize to slash form and resolve through one
//! table built on first use.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::tools::ToolKind;

/// What a notification means to the run coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationRoute {
    /// Agent assigned or switched the thread
    ThreadStarted,
    /// Agent started the turn (carries the turn id)
    TurnStarted,
    /// Turn status update; terminal statuses complete the run
    TurnUpdated,
    /// Turn finished; status decides success or failure
    TurnCompleted,
    /// Failure-flavored terminal notification
    TurnFailed,
    /// Item lifecycle start; tool items carry `item.type`
    ItemStarted,
    /// Item lifecycle completion
    ItemCompleted,
    /// Legacy begin event for a built-in tool
    ToolBegin(ToolKind),
    /// Legacy end event for a built-in tool
    ToolEnd(ToolKind),
}

static ROUTES: LazyLock<HashMap<&'static str, NotificationRoute>> = LazyLock::new(|| {
    use NotificationRoute::{
        ItemCompleted, ItemStarted, ThreadStarted, ToolBegin, ToolEnd, TurnCompleted,
        TurnFailed, TurnStarted, TurnUpdated,
    };

    HashMap::from([
        ("thread/started", ThreadStarted),
        ("turn/started", TurnStarted),
        ("turn/updated", TurnUpdated),
        ("turn/completed", TurnCompleted),
        ("turn/failed", TurnFailed),
        ("turn/interrupted", TurnFailed),
        ("turn/cancelled", TurnFailed),
        ("turn/canceled", TurnFailed),
        ("item/started", ItemStarted),
        ("item/completed", ItemCompleted),
        (
            "codex/event/exec_command_begin",
            ToolBegin(ToolKind::CommandExecution),
        ),
        (
            "codex/event/exec_command_end",
            ToolEnd(ToolKind::CommandExecution),
        ),
        ("codex/event/web_search_begin", ToolBegin(ToolKind::WebSearch)),
        ("codex/event/web_search_end", ToolEnd(ToolKind::WebSearch)),
        ("codex/event/patch_apply_begin", ToolBegin(ToolKind::FileChange)),
        ("codex/event/patch_apply_end", ToolEnd(ToolKind::FileChange)),
    ])
});

/// Convert a dot-delimited method name to slash form
///
/// # Examples
/// ```
/// use kodegen_codex_bridge::normalize::normalize_method;
///
/// assert_eq!(normalize_method("turn.completed"), "turn/completed");
/// assert_eq!(normalize_method("item/started"), "item/started");
/// ```
#[must_use]
pub fn normalize_method(method: &str) -> String {
    method.replace('.', "/")
}

/// Look up the route for a method in either spelling
#[must_use]
pub fn route(method: &str) -> Option<NotificationRoute> {
    ROUTES.get(normalize_method(method).as_str()).copied()
}

/// Status implied by a failure notification that carries none
#[must_use]
pub fn implied_failure_status(method: &str) -> &'static str {
    match normalize_method(method).as_str() {
        "turn/interrupted" => "interrupted",
        "turn/cancelled" | "turn/canceled" => "cancelled",
        _ => "failed",
    }
}
