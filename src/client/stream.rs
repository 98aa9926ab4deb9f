//! Caller-facing event stream of one run

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::run::{ActiveRun, RunMessage};
use super::state::SessionCore;
use crate::error::{BridgeError, Result};
use crate::types::events::TurnEvent;

/// Events of one turn, ending with `TurnCompleted` or a final error
///
/// Dropping the stream cancels the turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

/// Frees the run slot and stops the driver when the stream goes away
struct RunGuard {
    core: Arc<SessionCore>,
    run: Arc<ActiveRun>,
    driver: CancellationToken,
}

impl RunGuard {
    /// Free the slot so a new run can be admitted before the stream is dropped
    fn release(&self) {
        self.core.release_run(&self.run);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.run.is_finished() {
            log::debug!("turn stream for run {} dropped early", self.run.id());
        }
        self.driver.cancel();
        self.release();
    }
}

pub(crate) fn turn_stream(
    core: Arc<SessionCore>,
    run: Arc<ActiveRun>,
    mut rx: mpsc::UnboundedReceiver<RunMessage>,
    driver: CancellationToken,
) -> TurnStream {
    let guard = RunGuard { core, run, driver };
    Box::pin(async_stream::stream! {
        let guard = guard;
        loop {
            match rx.recv().await {
                Some(RunMessage::Event(event)) => yield Ok(event),
                Some(RunMessage::Finished(outcome)) => {
                    guard.release();
                    yield outcome.map(TurnEvent::TurnCompleted);
                    break;
                }
                None => {
                    guard.release();
                    yield Err(BridgeError::ConnectionClosed(None));
                    break;
                }
            }
        }
    })
}
