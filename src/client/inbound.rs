//! Agent-to-client requests
//!
//! Each method resolves through one route table. Approvals are answered from
//! the effective approval policy, user-input prompts get an empty answer set,
//! and `item/tool/call` goes to the host's dynamic tool executor.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use serde_json::{Value, json};

use super::run::ActiveRun;
use super::state::SessionCore;
use crate::error::{BridgeError, Result};
use crate::normalize::ToolKind;
use crate::types::dynamic_tools::{DynamicToolCall, DynamicToolResponse};
use crate::types::events::{ToolCall, TurnEvent};

/// Policy value that declines every approval
const POLICY_NEVER: &str = "never";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundRoute {
    /// `item/*/requestApproval`: `acceptForSession` / `decline`
    Approval,
    /// `execCommandApproval` / `applyPatchApproval`: `approved_for_session` / `denied`
    LegacyApproval,
    UserInput,
    AuthRefresh,
    DynamicTool,
}

static ROUTES: LazyLock<HashMap<&'static str, InboundRoute>> = LazyLock::new(|| {
    HashMap::from([
        ("item/commandExecution/requestApproval", InboundRoute::Approval),
        ("item/fileChange/requestApproval", InboundRoute::Approval),
        ("execCommandApproval", InboundRoute::LegacyApproval),
        ("applyPatchApproval", InboundRoute::LegacyApproval),
        ("item/tool/requestUserInput", InboundRoute::UserInput),
        ("account/chatgptAuthTokens/refresh", InboundRoute::AuthRefresh),
        ("item/tool/call", InboundRoute::DynamicTool),
    ])
});

/// Whether the policy forbids approvals
fn declines(policy: Option<&str>) -> bool {
    policy.is_some_and(|policy| policy.eq_ignore_ascii_case(POLICY_NEVER))
}

/// Answer one inbound request
///
/// # Errors
/// Returns [`BridgeError::MethodNotFound`] for unrecognized methods and a
/// decode error when `item/tool/call` parameters are malformed
pub(crate) async fn handle_request(
    core: &Arc<SessionCore>,
    epoch: u64,
    method: &str,
    params: Value,
) -> Result<Value> {
    let Some(route) = ROUTES.get(method).copied() else {
        log::debug!("rejecting unsupported agent request `{method}`");
        return Err(BridgeError::MethodNotFound(method.to_string()));
    };

    match route {
        InboundRoute::Approval => {
            let decision = if declines(core.approval_policy().as_deref()) {
                "decline"
            } else {
                "acceptForSession"
            };
            log::debug!("`{method}` -> {decision}");
            Ok(json!({ "decision": decision }))
        }
        InboundRoute::LegacyApproval => {
            let decision = if declines(core.approval_policy().as_deref()) {
                "denied"
            } else {
                "approved_for_session"
            };
            log::debug!("`{method}` -> {decision}");
            Ok(json!({ "decision": decision }))
        }
        InboundRoute::UserInput => Ok(json!({ "answers": {} })),
        InboundRoute::AuthRefresh => Ok(json!({})),
        InboundRoute::DynamicTool => {
            let call: DynamicToolCall = serde_json::from_value(params)?;
            let response = run_dynamic_tool(core, epoch, call).await;
            Ok(serde_json::to_value(response)?)
        }
    }
}

/// Run the executor and mirror the call onto the active run
async fn run_dynamic_tool(
    core: &Arc<SessionCore>,
    epoch: u64,
    call: DynamicToolCall,
) -> DynamicToolResponse {
    let run = core
        .current_run(epoch)
        .map(|(run, _)| run)
        .filter(|run| belongs_to(run, &call));

    let started = ToolCall::started(
        call.call_id.clone(),
        call.tool.clone(),
        ToolKind::Dynamic,
        call.arguments.clone(),
        chrono::Utc::now(),
    );
    if let Some(run) = &run {
        run.emit(TurnEvent::ToolCallStarted(started.clone()));
    }

    let tool = call.tool.clone();
    let response = match core.executor() {
        Some(executor) => match executor(call).await {
            Ok(response) => response,
            Err(e) => {
                let err = BridgeError::tool_execution(format!("dynamic tool `{tool}` failed: {e}"));
                log::warn!("{err}");
                DynamicToolResponse::failure(err.to_string())
            }
        },
        None => {
            log::warn!("agent called dynamic tool `{tool}` but no executor is configured");
            DynamicToolResponse::failure(format!(
                "dynamic tool `{tool}` cannot be executed: no dynamic tool executor is configured on this bridge"
            ))
        }
    };

    if let Some(run) = &run {
        let result = serde_json::to_value(&response.content_items).unwrap_or(Value::Null);
        let completed = started.completed(
            json!({ "contentItems": result }),
            !response.success,
            chrono::Utc::now(),
        );
        run.emit(TurnEvent::ToolCallCompleted(completed));
    }
    response
}

/// A call with no turn id belongs to whatever run is active
fn belongs_to(run: &ActiveRun, call: &DynamicToolCall) -> bool {
    match (&call.turn_id, run.turn_id()) {
        (Some(call_turn), Some(run_turn)) => *call_turn == run_turn,
        _ => true,
    }
}
