//! Connection-wide session state
//!
//! One lock guards the phase, transport handle, thread id, Active-Run slot and
//! tool spans. It is never held across an `.await`.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::run::{ActiveRun, RunMessage};
use super::spans::ToolSpanTracker;
use crate::error::{BridgeError, Result};
use crate::normalize::ToolObservation;
use crate::transport::Transport;
use crate::types::dynamic_tools::DynamicToolExecutor;
use crate::types::events::TurnEvent;
use crate::types::options::ClientOptions;

/// Connection state machine
///
/// `Disconnected -> Starting -> Handshaking -> ThreadReady <-> TurnActive`,
/// back to `Disconnected` on shutdown or failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No agent process
    #[default]
    Disconnected,
    /// Version gate and process launch
    Starting,
    /// `initialize` and thread request in flight
    Handshaking,
    /// Thread established, no run active
    ThreadReady,
    /// A run is active
    TurnActive,
}

#[derive(Default)]
struct SessionState {
    phase: ConnectionPhase,
    /// Bumped whenever a connection is created or torn down; callbacks from
    /// an older transport compare against it and bail out
    epoch: u64,
    transport: Option<Arc<Transport>>,
    thread_id: Option<String>,
    approval_policy: Option<String>,
    active_run: Option<Arc<ActiveRun>>,
    spans: ToolSpanTracker,
    shutting_down: bool,
    fault: Option<String>,
}

impl SessionState {
    fn reset(&mut self) -> Option<Arc<ActiveRun>> {
        self.phase = ConnectionPhase::Disconnected;
        self.epoch += 1;
        self.transport = None;
        self.thread_id = None;
        self.approval_policy = None;
        self.spans.clear();
        self.shutting_down = false;
        self.active_run.take()
    }
}

/// Outcome of a closed signal
pub(crate) enum ClosedKind {
    /// From a superseded transport
    Stale,
    /// During shutdown
    Expected,
    /// The agent went away on its own
    Fault {
        run: Option<Arc<ActiveRun>>,
        transport: Option<Arc<Transport>>,
    },
}

pub(crate) struct SessionCore {
    pub(crate) options: ClientOptions,
    state: Mutex<SessionState>,
    executor: RwLock<Option<DynamicToolExecutor>>,
}

impl SessionCore {
    pub(crate) fn new(options: ClientOptions) -> Self {
        Self {
            options,
            state: Mutex::new(SessionState::default()),
            executor: RwLock::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub(crate) fn phase(&self) -> ConnectionPhase {
        self.state.lock().phase
    }

    pub(crate) fn thread_id(&self) -> Option<String> {
        self.state.lock().thread_id.clone()
    }

    pub(crate) fn turn_id(&self) -> Option<String> {
        let run = self.state.lock().active_run.clone();
        run.and_then(|run| run.turn_id())
    }

    pub(crate) fn fault(&self) -> Option<String> {
        self.state.lock().fault.clone()
    }

    pub(crate) fn approval_policy(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .approval_policy
            .clone()
            .or_else(|| self.options.approval_policy.clone())
    }

    pub(crate) fn executor(&self) -> Option<DynamicToolExecutor> {
        self.executor.read().clone()
    }

    pub(crate) fn set_executor(&self, executor: Option<DynamicToolExecutor>) {
        *self.executor.write() = executor;
    }

    /// Active run and transport, if `epoch` is still current
    pub(crate) fn current_run(&self, epoch: u64) -> Option<(Arc<ActiveRun>, Option<Arc<Transport>>)> {
        let state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        let run = state.active_run.clone()?;
        Some((run, state.transport.clone()))
    }

    /// Active run and transport of the live connection
    pub(crate) fn live_run(&self) -> (Option<Arc<ActiveRun>>, Option<Arc<Transport>>) {
        let state = self.state.lock();
        (state.active_run.clone(), state.transport.clone())
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Thread id if the connection is already up
    pub(crate) fn ready_thread_id(&self) -> Option<String> {
        let state = self.state.lock();
        match state.phase {
            ConnectionPhase::ThreadReady | ConnectionPhase::TurnActive
                if state.transport.is_some() =>
            {
                state.thread_id.clone()
            }
            _ => None,
        }
    }

    /// Enter `Starting` and return the epoch of the new connection
    pub(crate) fn begin_connection(&self) -> u64 {
        let mut state = self.state.lock();
        state.reset();
        state.fault = None;
        state.phase = ConnectionPhase::Starting;
        state.epoch
    }

    /// Record the started transport and enter `Handshaking`
    pub(crate) fn attach_transport(&self, epoch: u64, transport: Arc<Transport>) -> Result<()> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Err(BridgeError::ConnectionClosed(state.fault.clone()));
        }
        state.transport = Some(transport);
        state.phase = ConnectionPhase::Handshaking;
        Ok(())
    }

    /// Record the established thread and enter `ThreadReady`
    pub(crate) fn thread_ready(
        &self,
        epoch: u64,
        thread_id: String,
        approval_policy: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.epoch != epoch || state.transport.is_none() {
            return Err(BridgeError::ConnectionClosed(state.fault.clone()));
        }
        state.thread_id = Some(thread_id);
        state.approval_policy = approval_policy;
        state.phase = ConnectionPhase::ThreadReady;
        Ok(())
    }

    /// Drop a connection whose startup failed
    pub(crate) fn abandon_connection(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch == epoch {
            state.reset();
        }
    }

    /// Mark shutdown in progress; returns what must be torn down
    pub(crate) fn begin_shutdown(&self) -> (Option<Arc<Transport>>, Option<Arc<ActiveRun>>) {
        let mut state = self.state.lock();
        state.shutting_down = true;
        (state.transport.clone(), state.active_run.clone())
    }

    /// Clear all connection state after shutdown
    pub(crate) fn finish_shutdown(&self) -> Option<Arc<ActiveRun>> {
        let mut state = self.state.lock();
        state.fault = None;
        state.reset()
    }

    /// Classify a closed signal and, for faults, tear the connection down
    pub(crate) fn on_transport_closed(&self, epoch: u64, cause: Option<&str>) -> ClosedKind {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return ClosedKind::Stale;
        }
        if state.shutting_down {
            return ClosedKind::Expected;
        }
        state.fault = Some(cause.unwrap_or("agent process closed the connection").to_string());
        let transport = state.transport.take();
        let run = state.reset();
        ClosedKind::Fault { run, transport }
    }

    /// Update the thread id from a notification
    pub(crate) fn set_thread_id(&self, epoch: u64, thread_id: String) {
        let mut state = self.state.lock();
        if state.epoch == epoch {
            state.thread_id = Some(thread_id);
        }
    }

    // ------------------------------------------------------------------
    // Active-Run slot
    // ------------------------------------------------------------------

    /// Claim the single run slot
    ///
    /// # Errors
    /// Returns `NotConnected`, `NoThread` or `TurnInProgress`
    pub(crate) fn admit_run(
        &self,
    ) -> Result<(Arc<ActiveRun>, Arc<Transport>, mpsc::UnboundedReceiver<RunMessage>)> {
        let mut state = self.state.lock();
        let Some(transport) = state.transport.clone() else {
            return Err(BridgeError::not_connected(state.fault.clone().unwrap_or_else(
                || "no agent connection; call start_or_resume_thread first".to_string(),
            )));
        };
        if !matches!(
            state.phase,
            ConnectionPhase::ThreadReady | ConnectionPhase::TurnActive
        ) {
            return Err(BridgeError::not_connected("agent handshake has not finished"));
        }
        let Some(thread_id) = state.thread_id.clone() else {
            return Err(BridgeError::NoThread);
        };
        if state.active_run.is_some() {
            return Err(BridgeError::TurnInProgress);
        }

        let (run, rx) = ActiveRun::new(thread_id);
        state.active_run = Some(run.clone());
        state.spans.clear();
        state.phase = ConnectionPhase::TurnActive;
        Ok((run, transport, rx))
    }

    /// Free the slot if it still holds `run`, and clear its spans
    pub(crate) fn release_run(&self, run: &Arc<ActiveRun>) {
        let mut state = self.state.lock();
        if state
            .active_run
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, run))
        {
            state.active_run = None;
            state.spans.clear();
            if state.phase == ConnectionPhase::TurnActive {
                state.phase = ConnectionPhase::ThreadReady;
            }
        }
    }

    /// Feed a built-in tool observation to the span tracker
    pub(crate) fn track_tool(&self, observation: ToolObservation) -> Vec<TurnEvent> {
        self.state.lock().spans.apply(observation, chrono::Utc::now())
    }
}
