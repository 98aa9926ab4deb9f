//! Lifecycle management for the agent process (spawn, terminate)

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{BridgeError, Result};
use crate::transport::AgentIo;

/// Log target for lines the agent writes to stderr
pub const STDERR_LOG_TARGET: &str = "kodegen_codex_bridge::agent_stderr";

/// A spawned agent process
pub struct AgentProcess {
    child: Child,
    stderr_task: Option<JoinHandle<()>>,
}

impl AgentProcess {
    /// Spawn `cmd` and split it into channel streams plus the process handle
    ///
    /// # Errors
    /// Returns error if process spawning fails or stdio handles cannot be obtained
    pub fn spawn(mut cmd: Command) -> Result<AgentIo> {
        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::launch(format!("failed to start agent process: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::connection("Failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::connection("Failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::connection("Failed to get stderr handle"))?;

        // Drain stderr so the child never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!(target: STDERR_LOG_TARGET, "{line}");
            }
        });

        log::debug!("agent process started (pid {:?})", child.id());

        Ok(AgentIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: Some(Self {
                child,
                stderr_task: Some(stderr_task),
            }),
        })
    }

    /// OS process id, while the process has not been reaped
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for exit until `deadline`, then kill the process tree
    ///
    /// # Errors
    /// Returns error if waiting on the child fails
    pub async fn terminate(&mut self, deadline: Instant) -> Result<()> {
        let outcome = match tokio::time::timeout_at(deadline, self.child.wait()).await {
            Ok(Ok(status)) => {
                log::debug!("agent process exited with {status}");
                Ok(())
            }
            Ok(Err(e)) => {
                self.kill_tree();
                Err(BridgeError::Io(e))
            }
            Err(_) => {
                log::warn!("agent process did not exit in time; killing its process group");
                self.kill_tree();
                self.child.wait().await.map(|_| ()).map_err(BridgeError::Io)
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        outcome
    }

    /// Kill the process group (unix) and the child itself
    fn kill_tree(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id()
            && let Ok(pgid) = libc::pid_t::try_from(pid)
        {
            // SAFETY: kill(2) with a negative pid signals the process group the
            // child leads; it has no memory-safety preconditions.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }

        if let Err(e) = self.child.start_kill() {
            log::debug!("agent process kill failed: {e}");
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        if matches!(self.child.try_wait(), Ok(None)) {
            self.kill_tree();
        }
    }
}
