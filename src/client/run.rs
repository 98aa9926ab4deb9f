//! The Active Run: client-side tracking of one in-flight turn
//!
//! Identity (run id, thread id) is fixed at construction. The turn id,
//! interrupt bookkeeping and finished flag sit behind one lock and are only
//! reachable through the methods below.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{BridgeError, Result};
use crate::normalize::{TurnStatus, turn_error, turn_id};
use crate::types::events::{TurnEvent, TurnSummary};
use crate::types::identifiers::RunId;

/// What the driver and dispatch paths write to the caller's stream
#[derive(Debug)]
pub(crate) enum RunMessage {
    Event(TurnEvent),
    Finished(Result<TurnSummary>),
}

#[derive(Debug, Default)]
struct RunFields {
    turn_id: Option<String>,
    interrupt_requested: bool,
    interrupt_sent: bool,
    finished: bool,
}

pub(crate) struct ActiveRun {
    id: RunId,
    thread_id: String,
    events: mpsc::UnboundedSender<RunMessage>,
    settled: CancellationToken,
    fields: Mutex<RunFields>,
}

impl ActiveRun {
    pub(crate) fn new(thread_id: String) -> (Arc<Self>, mpsc::UnboundedReceiver<RunMessage>) {
        let (events, rx) = mpsc::unbounded_channel();
        let run = Arc::new(Self {
            id: RunId::new(),
            thread_id,
            events,
            settled: CancellationToken::new(),
            fields: Mutex::new(RunFields::default()),
        });
        (run, rx)
    }

    pub(crate) fn id(&self) -> RunId {
        self.id
    }

    pub(crate) fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub(crate) fn turn_id(&self) -> Option<String> {
        self.fields.lock().turn_id.clone()
    }

    /// Record the turn id if it is not yet known
    ///
    /// Returns `true` when an interrupt was requested before the id was known
    /// and must be sent now (at most once).
    pub(crate) fn adopt_turn_id(&self, turn_id: &str) -> bool {
        let mut fields = self.fields.lock();
        if fields.turn_id.is_some() {
            return false;
        }
        fields.turn_id = Some(turn_id.to_string());
        Self::take_pending_interrupt(&mut fields)
    }

    /// Record the turn id reported by the `turn/start` response
    ///
    /// Replaces an id adopted earlier from a notification. Returns `true` when
    /// a pending interrupt must be sent now (at most once per run).
    pub(crate) fn confirm_turn_id(&self, turn_id: &str) -> bool {
        let mut fields = self.fields.lock();
        match fields.turn_id.as_deref() {
            Some(current) if current == turn_id => {}
            Some(current) => {
                log::warn!(
                    "run {} adopted turn {current} from a notification; turn/start reports {turn_id}",
                    self.id
                );
                fields.turn_id = Some(turn_id.to_string());
            }
            None => fields.turn_id = Some(turn_id.to_string()),
        }
        Self::take_pending_interrupt(&mut fields)
    }

    fn take_pending_interrupt(fields: &mut RunFields) -> bool {
        if fields.interrupt_requested && !fields.interrupt_sent {
            fields.interrupt_sent = true;
            return true;
        }
        false
    }

    /// Mark the run for interruption
    ///
    /// Returns the turn id to interrupt now, or `None` if the id is not known
    /// yet; the interrupt then fires once the id is adopted or confirmed.
    pub(crate) fn request_interrupt(&self) -> Option<String> {
        let mut fields = self.fields.lock();
        fields.interrupt_requested = true;
        let turn_id = fields.turn_id.clone()?;
        fields.interrupt_sent = true;
        Some(turn_id)
    }

    /// Queue an event for the caller; no-op once the run is finished
    pub(crate) fn emit(&self, event: TurnEvent) -> bool {
        let fields = self.fields.lock();
        if fields.finished {
            return false;
        }
        self.events.send(RunMessage::Event(event)).is_ok()
    }

    /// Fill the completion slot; only the first call has any effect
    pub(crate) fn complete(&self, outcome: Result<TurnSummary>) -> bool {
        {
            let mut fields = self.fields.lock();
            if fields.finished {
                return false;
            }
            fields.finished = true;
            match &outcome {
                Ok(summary) => log::debug!("run {} completed with {}", self.id, summary.status),
                Err(err) => log::debug!("run {} failed: {err}", self.id),
            }
            // The caller may already have dropped the stream
            let _ = self.events.send(RunMessage::Finished(outcome));
        }
        self.settled.cancel();
        true
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.fields.lock().finished
    }

    /// Resolves once the completion slot is filled
    pub(crate) fn settled(&self) -> WaitForCancellationFuture<'_> {
        self.settled.cancelled()
    }

    /// Outcome for a terminal status reported in `raw`
    pub(crate) fn outcome_for(&self, status: &TurnStatus, raw: &Value) -> Result<TurnSummary> {
        if status.is_failure() {
            return Err(BridgeError::TurnFailed {
                status: status.as_str().to_string(),
                message: turn_error(raw),
            });
        }
        Ok(TurnSummary {
            run_id: self.id,
            thread_id: self.thread_id.clone(),
            turn_id: self.turn_id().or_else(|| turn_id(raw)),
            status: status.as_str().to_string(),
            raw: raw.clone(),
        })
    }
}
