//! Built-in tool item classification and field projection

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::methods::NotificationRoute;
use super::status::TurnStatus;

/// Tool families surfaced as call lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Built-in web search
    WebSearch,
    /// Built-in shell command execution
    CommandExecution,
    /// Built-in patch / file edit
    FileChange,
    /// Built-in todo list update
    TodoList,
    /// Host-executed tool requested via `item/tool/call`
    Dynamic,
}

impl ToolKind {
    /// Stable snake_case name, used as the tool name of built-in calls
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::CommandExecution => "command_execution",
            Self::FileChange => "file_change",
            Self::TodoList => "todo_list",
            Self::Dynamic => "dynamic",
        }
    }

    /// Recognize a built-in item `type` tag in camelCase or snake_case
    ///
    /// Anything else (messages, reasoning, unknown tools) is rejected.
    #[must_use]
    pub fn from_item_type(tag: &str) -> Option<Self> {
        let key: String = tag
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "websearch" => Some(Self::WebSearch),
            "commandexecution" => Some(Self::CommandExecution),
            "filechange" => Some(Self::FileChange),
            "todolist" => Some(Self::TodoList),
            _ => None,
        }
    }

    fn argument_fields(self) -> &'static [Field] {
        match self {
            Self::CommandExecution => &[
                ("command", &["command"]),
                ("cwd", &["cwd", "workingDirectory", "working_directory"]),
            ],
            Self::WebSearch => &[("query", &["query"])],
            Self::FileChange => &[("changes", &["changes"])],
            Self::TodoList => &[("items", &["items"])],
            Self::Dynamic => &[],
        }
    }

    fn result_fields(self) -> &'static [Field] {
        match self {
            Self::CommandExecution => &[
                ("exitCode", &["exitCode", "exit_code"]),
                ("aggregatedOutput", &["aggregatedOutput", "aggregated_output"]),
                ("stdout", &["stdout"]),
                ("stderr", &["stderr"]),
                ("status", &["status"]),
                ("durationMs", &["durationMs", "duration_ms"]),
            ],
            Self::WebSearch => &[
                ("query", &["query"]),
                ("matches", &["matches", "results"]),
                ("action", &["action"]),
            ],
            Self::FileChange => &[
                ("changes", &["changes"]),
                ("status", &["status"]),
                ("success", &["success"]),
                ("stdout", &["stdout"]),
                ("stderr", &["stderr"]),
            ],
            Self::TodoList => &[("items", &["items"])],
            Self::Dynamic => &[],
        }
    }
}

/// Canonical key and the source keys it may be read from
type Field = (&'static str, &'static [&'static str]);

const CALL_ID_FIELDS: &[&str] = &["id", "callId", "call_id", "itemId", "item_id"];

/// Lifecycle edge reported by one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSignal {
    /// Item started / begin event
    Begin,
    /// Item completed / end event
    End,
}

/// One built-in tool notification, projected into canonical shape
#[derive(Debug, Clone, PartialEq)]
pub struct ToolObservation {
    /// Tool family
    pub kind: ToolKind,
    /// Stable call id
    pub call_id: String,
    /// Begin or end
    pub signal: ToolSignal,
    /// Whitelisted argument fields plus `raw` and `source`
    pub arguments: Value,
    /// Whitelisted result fields plus `raw` and `source` (end events only)
    pub result: Option<Value>,
    /// Failure status, non-zero exit code, or `success: false`
    pub is_error: bool,
}

/// Stable call id from any of the candidate fields
#[must_use]
pub fn call_id(payload: &Value) -> Option<String> {
    CALL_ID_FIELDS.iter().find_map(|key| match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Project a tool notification, or `None` if it is not a recognized tool item
///
/// Item events read `params.item`; legacy begin/end events read `params.msg`
/// (or `params` itself when there is no envelope).
#[must_use]
pub fn observe_tool(
    route: NotificationRoute,
    method: &str,
    params: &Value,
) -> Option<ToolObservation> {
    let (kind, signal, payload) = match route {
        NotificationRoute::ItemStarted | NotificationRoute::ItemCompleted => {
            let item = params.get("item")?;
            let kind = ToolKind::from_item_type(item.get("type")?.as_str()?)?;
            let signal = if route == NotificationRoute::ItemStarted {
                ToolSignal::Begin
            } else {
                ToolSignal::End
            };
            (kind, signal, item)
        }
        NotificationRoute::ToolBegin(kind) => {
            (kind, ToolSignal::Begin, params.get("msg").unwrap_or(params))
        }
        NotificationRoute::ToolEnd(kind) => {
            (kind, ToolSignal::End, params.get("msg").unwrap_or(params))
        }
        _ => return None,
    };

    let call_id = call_id(payload)?;
    let arguments = project(payload, kind.argument_fields(), method);
    let (result, is_error) = match signal {
        ToolSignal::Begin => (None, false),
        ToolSignal::End => (
            Some(project(payload, kind.result_fields(), method)),
            payload_is_error(payload),
        ),
    };

    Some(ToolObservation {
        kind,
        call_id,
        signal,
        arguments,
        result,
        is_error,
    })
}

/// Copy whitelisted fields that are present; never fills in missing ones
fn project(payload: &Value, fields: &[Field], source: &str) -> Value {
    let mut out = Map::new();
    for (canonical, candidates) in fields {
        if let Some(value) = candidates
            .iter()
            .filter_map(|key| payload.get(key))
            .find(|value| !value.is_null())
        {
            out.insert((*canonical).to_string(), value.clone());
        }
    }
    out.insert("raw".to_string(), payload.clone());
    out.insert("source".to_string(), Value::String(source.to_string()));
    Value::Object(out)
}

fn payload_is_error(payload: &Value) -> bool {
    let failed_status = payload
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| TurnStatus::parse(status).is_failure());
    let exit_code = payload
        .get("exitCode")
        .or_else(|| payload.get("exit_code"))
        .and_then(Value::as_i64)
        .is_some_and(|code| code != 0);
    let unsuccessful = payload.get("success").and_then(Value::as_bool) == Some(false);
    failed_status || exit_code || unsuccessful
}
