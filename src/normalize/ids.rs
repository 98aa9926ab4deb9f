//! Thread/turn identifier and status extraction
//!
//! The protocol places the same field under several spellings (camelCase and
//! snake_case, flat and nested under `turn`/`thread`/`msg`). Each lookup tries
//! its candidate paths in order and returns `None` rather than failing.

use serde_json::Value;

use super::status::TurnStatus;

const THREAD_ID_PATHS: &[&[&str]] = &[
    &["threadId"],
    &["thread_id"],
    &["thread", "id"],
    &["conversationId"],
    &["conversation_id"],
    &["msg", "thread_id"],
    &["msg", "threadId"],
];

const TURN_ID_PATHS: &[&[&str]] = &[
    &["turnId"],
    &["turn_id"],
    &["turn", "id"],
    &["msg", "turnId"],
    &["msg", "turn_id"],
];

const STATUS_PATHS: &[&[&str]] = &[&["turn", "status"], &["status"], &["msg", "status"]];

const ERROR_PATHS: &[&[&str]] = &[
    &["turn", "error", "message"],
    &["error", "message"],
    &["turn", "error"],
    &["error"],
    &["msg", "message"],
];

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))?
        .as_str()
        .filter(|s| !s.is_empty())
}

fn first_str<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| str_at(value, path))
}

/// Thread id carried by a payload
#[must_use]
pub fn thread_id(params: &Value) -> Option<String> {
    first_str(params, THREAD_ID_PATHS).map(str::to_string)
}

/// Turn id carried by a payload
///
/// # Examples
/// ```
/// use kodegen_codex_bridge::normalize::turn_id;
/// use serde_json::json;
///
/// assert_eq!(turn_id(&json!({ "turn": { "id": "t1" } })).as_deref(), Some("t1"));
/// assert_eq!(turn_id(&json!({ "msg": { "turn_id": "t2" } })).as_deref(), Some("t2"));
/// assert_eq!(turn_id(&json!({ "item": { "id": "c1" } })), None);
/// ```
#[must_use]
pub fn turn_id(params: &Value) -> Option<String> {
    first_str(params, TURN_ID_PATHS).map(str::to_string)
}

/// Turn status carried by a payload
#[must_use]
pub fn turn_status(params: &Value) -> Option<TurnStatus> {
    first_str(params, STATUS_PATHS).map(TurnStatus::parse)
}

/// Error message attached to a failed turn
#[must_use]
pub fn turn_error(params: &Value) -> Option<String> {
    first_str(params, ERROR_PATHS).map(str::to_string)
}
