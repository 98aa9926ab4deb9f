//! Default launcher: version gate plus a real agent process

use std::path::PathBuf;

use crate::error::Result;
use crate::transport::{AgentIo, LaunchSpec, Launcher};
use crate::version::check_cli_version;

use super::command::CommandBuilder;
use super::config::find_cli;
use super::lifecycle::AgentProcess;

/// Launches the agent CLI as a child process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    fn program(spec: &LaunchSpec) -> Result<PathBuf> {
        match &spec.program {
            Some(path) => Ok(path.clone()),
            None => find_cli(),
        }
    }
}

impl Launcher for ProcessLauncher {
    async fn preflight(&self, spec: &LaunchSpec) -> Result<()> {
        let Some(minimum) = spec.min_version else {
            return Ok(());
        };
        let program = Self::program(spec)?;
        let found = check_cli_version(&program, minimum, spec.version_timeout).await?;
        log::info!("using {} {found} (minimum {minimum})", program.display());
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<AgentIo> {
        let program = Self::program(spec)?;
        let cmd = CommandBuilder::new(&program, spec).build();
        AgentProcess::spawn(cmd)
    }
}
