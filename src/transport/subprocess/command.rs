//! Command building for the agent process

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::transport::LaunchSpec;

use super::config::DANGEROUS_ENV_VARS;

/// Command builder for the agent CLI
pub struct CommandBuilder<'a> {
    program: &'a Path,
    spec: &'a LaunchSpec,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(program: &'a Path, spec: &'a LaunchSpec) -> Self {
        Self { program, spec }
    }

    /// Build the app-server command with piped stdio
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(self.program);
        cmd.args(&self.spec.args);

        if let Some(ref cwd) = self.spec.cwd {
            cmd.current_dir(cwd);
        }

        // Only user-provided env vars that are not in the dangerous list
        for (key, value) in &self.spec.env {
            if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
                log::warn!("not passing {key} to the agent process");
            } else {
                cmd.env(key, value);
            }
        }

        // Pipe stderr instead of inheriting so the child cannot touch the terminal
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so stop can kill descendants too
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}
