//! Client options and configuration
//!
//! This module contains the connection-wide options for the bridge, a builder
//! for them, the `CODEX_BRIDGE_*` environment overlay, and the per-thread
//! overrides passed to `start_or_resume_thread`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::dynamic_tools::DynamicToolSpec;
use crate::error::{BridgeError, Result};
use crate::version::SemVer;

/// Minimum agent CLI version accepted by default
pub const DEFAULT_MIN_CLI_VERSION: SemVer = SemVer::new(0, 104, 0);

/// Default maximum frame size accepted from the agent (8 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Prefix of the environment variables read by [`ClientOptions::apply_env_overrides`]
pub const ENV_PREFIX: &str = "CODEX_BRIDGE_";

// ============================================================================
// Client Options
// ============================================================================

/// Connection-wide options for [`AppServerClient`](crate::AppServerClient)
#[derive(Clone)]
pub struct ClientOptions {
    /// Agent CLI path (searched on `PATH` when unset)
    pub cli_path: Option<PathBuf>,
    /// Arguments that put the CLI in app-server mode
    pub launch_args: Vec<String>,
    /// Default working directory for the agent process and threads
    pub cwd: Option<PathBuf>,
    /// API key exported to the agent as `OPENAI_API_KEY`
    pub api_key: Option<String>,
    /// Base URL exported to the agent as `OPENAI_BASE_URL`
    pub base_url: Option<String>,
    /// Extra environment for the agent process
    pub env: HashMap<String, String>,
    /// Minimum accepted CLI version; `None` skips the version probe
    pub min_cli_version: Option<SemVer>,
    /// Upper bound on the `--version` probe
    pub version_timeout: Duration,
    /// Upper bound on the whole connect: preflight, launch, handshake and thread open
    pub startup_timeout: Duration,
    /// Timeout for each JSON-RPC request, including the handshake requests
    pub request_timeout: Duration,
    /// How long a turn may run before it is interrupted
    pub turn_timeout: Duration,
    /// How long to wait for completion after an interrupt
    pub interrupt_grace: Duration,
    /// How long `shutdown` waits for the process to exit before killing it
    pub shutdown_timeout: Duration,
    /// Default model for new threads
    pub model: Option<String>,
    /// Default approval policy; `"never"` declines approval requests
    pub approval_policy: Option<String>,
    /// Default sandbox mode
    pub sandbox_mode: Option<String>,
    /// Report built-in tool activity as tool call events
    pub surface_builtin_tools: bool,
    /// `clientInfo.name` sent with `initialize`
    pub client_name: String,
    /// `clientInfo.version` sent with `initialize`
    pub client_version: String,
    /// Host tools advertised on `thread/start`
    pub dynamic_tools: Vec<DynamicToolSpec>,
    /// Longest frame accepted from the agent; longer frames are dropped
    pub max_line_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cli_path: None,
            launch_args: vec!["app-server".to_string()],
            cwd: None,
            api_key: None,
            base_url: None,
            env: HashMap::new(),
            min_cli_version: Some(DEFAULT_MIN_CLI_VERSION),
            version_timeout: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            turn_timeout: Duration::from_secs(600),
            interrupt_grace: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            model: None,
            approval_policy: None,
            sandbox_mode: None,
            surface_builtin_tools: false,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: crate::VERSION.to_string(),
            dynamic_tools: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl ClientOptions {
    /// Create a new builder for `ClientOptions`
    #[must_use]
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Overlay `CODEX_BRIDGE_*` variables from the process environment
    ///
    /// # Errors
    /// Returns error if a variable holds an unparseable value
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_env_overrides_with(|key| std::env::var(key).ok())
    }

    /// Overlay `CODEX_BRIDGE_*` variables read through `lookup`
    ///
    /// Recognized suffixes: `CLI_PATH`, `MIN_CLI_VERSION` (empty disables the
    /// probe), `MODEL`, `APPROVAL_POLICY`, `SANDBOX_MODE`, `TURN_TIMEOUT_SECS`,
    /// `SURFACE_BUILTIN_TOOLS`.
    ///
    /// # Errors
    /// Returns error if a variable holds an unparseable value
    pub fn apply_env_overrides_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(path) = get("CLI_PATH").filter(|p| !p.is_empty()) {
            self.cli_path = Some(PathBuf::from(path));
        }
        if let Some(version) = get("MIN_CLI_VERSION") {
            self.min_cli_version = if version.trim().is_empty() {
                None
            } else {
                Some(version.parse()?)
            };
        }
        if let Some(model) = get("MODEL") {
            self.model = Some(model);
        }
        if let Some(policy) = get("APPROVAL_POLICY") {
            self.approval_policy = Some(policy);
        }
        if let Some(mode) = get("SANDBOX_MODE") {
            self.sandbox_mode = Some(mode);
        }
        if let Some(secs) = get("TURN_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                BridgeError::invalid_config(format!(
                    "{ENV_PREFIX}TURN_TIMEOUT_SECS must be a whole number of seconds, got {secs:?}"
                ))
            })?;
            self.turn_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = get("SURFACE_BUILTIN_TOOLS") {
            self.surface_builtin_tools = parse_flag(&flag).ok_or_else(|| {
                BridgeError::invalid_config(format!(
                    "{ENV_PREFIX}SURFACE_BUILTIN_TOOLS must be true or false, got {flag:?}"
                ))
            })?;
        }
        Ok(self)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("cli_path", &self.cli_path)
            .field("launch_args", &self.launch_args)
            .field("cwd", &self.cwd)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("min_cli_version", &self.min_cli_version)
            .field("version_timeout", &self.version_timeout)
            .field("startup_timeout", &self.startup_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("turn_timeout", &self.turn_timeout)
            .field("interrupt_grace", &self.interrupt_grace)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("model", &self.model)
            .field("approval_policy", &self.approval_policy)
            .field("sandbox_mode", &self.sandbox_mode)
            .field("surface_builtin_tools", &self.surface_builtin_tools)
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field(
                "dynamic_tools",
                &self.dynamic_tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
            )
            .field("max_line_bytes", &self.max_line_bytes)
            .finish()
    }
}

// ============================================================================
// Builder for ClientOptions
// ============================================================================

/// Builder for `ClientOptions`
#[derive(Debug, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Set the agent CLI path
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = Some(path.into());
        self
    }

    /// Replace the app-server launch arguments
    #[must_use]
    pub fn launch_args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.options.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    /// Set the API key exported to the agent
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.options.api_key = Some(key.into());
        self
    }

    /// Set the base URL exported to the agent
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.base_url = Some(url.into());
        self
    }

    /// Add one environment variable for the agent process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Set the minimum CLI version (`None` disables the probe)
    #[must_use]
    pub fn min_cli_version(mut self, version: Option<SemVer>) -> Self {
        self.options.min_cli_version = version;
        self
    }

    /// Set the version probe timeout
    #[must_use]
    pub fn version_timeout(mut self, timeout: Duration) -> Self {
        self.options.version_timeout = timeout;
        self
    }

    /// Set the timeout for the whole connect
    #[must_use]
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.options.startup_timeout = timeout;
        self
    }

    /// Set the per-request timeout for turn requests
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Set the turn-completion timeout
    #[must_use]
    pub fn turn_timeout(mut self, timeout: Duration) -> Self {
        self.options.turn_timeout = timeout;
        self
    }

    /// Set the post-interrupt grace period
    #[must_use]
    pub fn interrupt_grace(mut self, grace: Duration) -> Self {
        self.options.interrupt_grace = grace;
        self
    }

    /// Set the shutdown timeout
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.options.shutdown_timeout = timeout;
        self
    }

    /// Set the default model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Set the default approval policy
    #[must_use]
    pub fn approval_policy(mut self, policy: impl Into<String>) -> Self {
        self.options.approval_policy = Some(policy.into());
        self
    }

    /// Set the default sandbox mode
    #[must_use]
    pub fn sandbox_mode(mut self, mode: impl Into<String>) -> Self {
        self.options.sandbox_mode = Some(mode.into());
        self
    }

    /// Report built-in tool activity as tool call events
    #[must_use]
    pub fn surface_builtin_tools(mut self, surface: bool) -> Self {
        self.options.surface_builtin_tools = surface;
        self
    }

    /// Set the client name and version sent with `initialize`
    #[must_use]
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.options.client_name = name.into();
        self.options.client_version = version.into();
        self
    }

    /// Advertise a host tool on `thread/start`
    #[must_use]
    pub fn add_dynamic_tool(mut self, spec: DynamicToolSpec) -> Self {
        self.options.dynamic_tools.push(spec);
        self
    }

    /// Set the maximum accepted frame size
    #[must_use]
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.options.max_line_bytes = bytes;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> ClientOptions {
        self.options
    }
}

// ============================================================================
// Per-thread overrides
// ============================================================================

/// Per-call overrides for `start_or_resume_thread`
///
/// Unset fields fall back to the connection's [`ClientOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadOptions {
    /// Resume this thread instead of starting a new one
    pub thread_id: Option<String>,
    /// Model override
    pub model: Option<String>,
    /// Working directory override
    pub cwd: Option<PathBuf>,
    /// Approval policy override
    pub approval_policy: Option<String>,
    /// Sandbox mode override
    pub sandbox_mode: Option<String>,
}

impl ThreadOptions {
    /// Options that resume `thread_id`
    pub fn resume(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Set the model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the working directory override
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the approval policy override
    #[must_use]
    pub fn with_approval_policy(mut self, policy: impl Into<String>) -> Self {
        self.approval_policy = Some(policy.into());
        self
    }

    /// Set the sandbox mode override
    #[must_use]
    pub fn with_sandbox_mode(mut self, mode: impl Into<String>) -> Self {
        self.sandbox_mode = Some(mode.into());
        self
    }

    /// Overlay these overrides onto the connection defaults
    #[must_use]
    pub fn resolve(&self, defaults: &ClientOptions) -> ThreadOptions {
        ThreadOptions {
            thread_id: self.thread_id.clone(),
            model: self.model.clone().or_else(|| defaults.model.clone()),
            cwd: self.cwd.clone().or_else(|| defaults.cwd.clone()),
            approval_policy: self
                .approval_policy
                .clone()
                .or_else(|| defaults.approval_policy.clone()),
            sandbox_mode: self
                .sandbox_mode
                .clone()
                .or_else(|| defaults.sandbox_mode.clone()),
        }
    }
}
