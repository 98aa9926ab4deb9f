//! Background tasks for `AppServerClient`
//!
//! The turn driver owns one run from `turn/start` to completion: it learns
//! the turn id, enforces the turn timeout and turns cancellation into a
//! best-effort `turn/interrupt`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::run::ActiveRun;
use super::state::SessionCore;
use crate::error::{BridgeError, Result};
use crate::normalize::{turn_id, turn_status};
use crate::transport::Transport;
use crate::types::input::TurnInput;

/// Send `turn/interrupt` and wait for the acknowledgement
pub(crate) async fn send_interrupt(
    transport: &Transport,
    thread_id: &str,
    turn_id: &str,
    timeout: Duration,
) -> Result<()> {
    log::debug!("interrupting turn {turn_id} on thread {thread_id}");
    transport
        .send_request(
            "turn/interrupt",
            json!({ "threadId": thread_id, "turnId": turn_id }),
            timeout,
        )
        .await
        .map(|_| ())
}

/// Fire-and-forget interrupt; failures are logged only
pub(crate) fn spawn_interrupt(
    transport: Arc<Transport>,
    thread_id: String,
    turn_id: String,
    timeout: Duration,
) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        log::warn!("no runtime available to interrupt turn {turn_id}");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = send_interrupt(&transport, &thread_id, &turn_id, timeout).await {
            log::warn!("interrupt of turn {turn_id} failed: {e}");
        }
    });
}

/// `turn/start` parameters
pub(crate) fn turn_start_params(thread_id: &str, input: &TurnInput) -> Result<Value> {
    Ok(json!({
        "threadId": thread_id,
        "input": serde_json::to_value(input)?,
    }))
}

/// Drive one run to completion
///
/// Every exit path leaves the run's completion slot filled.
pub(crate) async fn drive_turn(
    core: Arc<SessionCore>,
    transport: Arc<Transport>,
    run: Arc<ActiveRun>,
    params: Value,
    cancel: CancellationToken,
) {
    let request_timeout = core.options.request_timeout;
    let turn_timeout = core.options.turn_timeout;
    let grace = core.options.interrupt_grace;

    let start = transport.send_request("turn/start", params, request_timeout);
    tokio::pin!(start);

    let response = tokio::select! {
        biased;
        response = &mut start => response,
        () = run.settled() => return,
        () = cancel.cancelled() => {
            log::debug!("run {} cancelled before turn/start returned", run.id());
            let known = cancel_run(&run, &transport, request_timeout).await;
            if known {
                return;
            }
            // The interrupt goes out once the turn id is learned
            if let Ok(Ok(value)) = tokio::time::timeout(grace, &mut start).await
                && let Some(turn) = turn_id(&value)
                && run.adopt_turn_id(&turn)
                && let Err(e) = send_interrupt(&transport, run.thread_id(), &turn, request_timeout).await
            {
                log::warn!("interrupt of turn {turn} failed: {e}");
            }
            return;
        }
    };

    let value = match response {
        Ok(value) => value,
        Err(e) => {
            log::warn!("turn/start failed: {e}");
            run.complete(Err(e));
            return;
        }
    };

    if let Some(turn) = turn_id(&value) {
        log::debug!("run {} is turn {turn}", run.id());
        if run.confirm_turn_id(&turn) {
            spawn_interrupt(
                transport.clone(),
                run.thread_id().to_string(),
                turn,
                request_timeout,
            );
        }
    }
    if let Some(status) = turn_status(&value)
        && status.is_terminal()
    {
        run.complete(run.outcome_for(&status, &value));
        return;
    }

    tokio::select! {
        biased;
        () = run.settled() => return,
        () = cancel.cancelled() => {
            cancel_run(&run, &transport, request_timeout).await;
            return;
        }
        () = tokio::time::sleep(turn_timeout) => {}
    }

    log::warn!(
        "run {} did not finish within {turn_timeout:?}; interrupting",
        run.id()
    );
    if let Some(turn) = run.request_interrupt() {
        spawn_interrupt(
            transport.clone(),
            run.thread_id().to_string(),
            turn,
            request_timeout,
        );
    }

    tokio::select! {
        biased;
        () = run.settled() => {}
        () = cancel.cancelled() => {
            run.complete(Err(BridgeError::Cancelled));
        }
        () = tokio::time::sleep(grace) => {
            run.complete(Err(BridgeError::timeout(format!(
                "turn did not finish within {turn_timeout:?}"
            ))));
        }
    }
}

/// Fail the run as cancelled and interrupt it if the turn id is known
///
/// Returns whether the turn id was known.
async fn cancel_run(run: &ActiveRun, transport: &Transport, timeout: Duration) -> bool {
    let pending = run.request_interrupt();
    run.complete(Err(BridgeError::Cancelled));
    match pending {
        Some(turn) => {
            if let Err(e) = send_interrupt(transport, run.thread_id(), &turn, timeout).await {
                log::warn!("interrupt of turn {turn} failed: {e}");
            }
            true
        }
        None => false,
    }
}
