//! Configuration constants and binary discovery for the agent process

use std::env;
use std::path::PathBuf;

use crate::error::{BridgeError, Result};

/// Name of the agent CLI binary
pub const CLI_NAME: &str = "codex";

/// Dangerous environment variables that should not be passed to subprocess
///
/// These variables can affect how the subprocess loads and executes code,
/// potentially creating security vulnerabilities.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// Find the agent CLI binary
///
/// # Errors
/// Returns error if the CLI cannot be found in PATH or common locations
pub fn find_cli() -> Result<PathBuf> {
    // Try using 'which' crate first
    if let Ok(path) = which::which(CLI_NAME) {
        return Ok(path);
    }

    // Manual search in common locations
    let home = env::var("HOME").unwrap_or_else(|_| String::from("/root"));
    let home = PathBuf::from(home);
    let locations = [
        home.join(".npm-global/bin").join(CLI_NAME),
        PathBuf::from("/usr/local/bin").join(CLI_NAME),
        PathBuf::from("/opt/homebrew/bin").join(CLI_NAME),
        home.join(".local/bin").join(CLI_NAME),
        home.join(".cargo/bin").join(CLI_NAME),
        home.join("node_modules/.bin").join(CLI_NAME),
    ];

    locations
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(BridgeError::cli_not_found)
}
