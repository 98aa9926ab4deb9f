//! Subprocess launcher for the agent CLI
//!
//! This module spawns the agent CLI in app-server mode with piped stdio, in
//! its own process group, and drains its stderr into the log.

mod command;
mod config;
mod launcher;
mod lifecycle;

// Re-export public types
pub use config::{CLI_NAME, DANGEROUS_ENV_VARS, find_cli};
pub use launcher::ProcessLauncher;
pub use lifecycle::{AgentProcess, STDERR_LOG_TARGET};
