//! Transport layer for communicating with the agent process
//!
//! [`Transport`] owns one line-framed JSON control channel: it writes
//! requests and notifications, correlates responses with their callers,
//! dispatches inbound notifications and requests, and reports closure exactly
//! once. A [`Launcher`] produces the byte streams it runs over; the default
//! [`ProcessLauncher`] spawns the agent CLI, while tests can hand in
//! in-memory pipes.

mod connection;
mod reader;
pub mod subprocess;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::types::options::ClientOptions;
use crate::version::SemVer;

pub use connection::Transport;
pub use subprocess::{AgentProcess, ProcessLauncher};

/// Agent-to-client notification callback; runs on the read loop and must not block
pub type NotificationHandler = Arc<dyn Fn(String, Value) + Send + Sync>;

/// Agent-to-client request callback; each call runs on its own task
pub type InboundRequestHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Fired once when the channel closes, with the failure cause if any
pub type ClosedHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Callbacks a [`Transport`] dispatches to
#[derive(Clone)]
pub struct TransportHandlers {
    /// Notification callback
    pub on_notification: NotificationHandler,
    /// Inbound request callback
    pub on_inbound_request: InboundRequestHandler,
    /// Closed callback
    pub on_closed: ClosedHandler,
}

impl TransportHandlers {
    /// Handlers that ignore notifications, reject requests and ignore closure
    #[must_use]
    pub fn noop() -> Self {
        Self {
            on_notification: Arc::new(|_, _| {}),
            on_inbound_request: Arc::new(|method, _| {
                Box::pin(async move { Err(crate::error::BridgeError::MethodNotFound(method)) })
            }),
            on_closed: Arc::new(|_| {}),
        }
    }
}

/// Byte streams to the agent plus the process behind them, if any
pub struct AgentIo {
    /// Agent stdout
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Agent stdin
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Child process, terminated by [`Transport::stop`]
    pub process: Option<AgentProcess>,
}

impl AgentIo {
    /// Wrap a pair of streams with no process behind them
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: None,
        }
    }
}

/// Everything needed to probe and start one agent process
#[derive(Clone)]
pub struct LaunchSpec {
    /// Explicit binary; discovered on `PATH` when unset
    pub program: Option<PathBuf>,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Environment overlay
    pub env: HashMap<String, String>,
    /// Minimum version; `None` skips the probe
    pub min_version: Option<SemVer>,
    /// Version probe timeout
    pub version_timeout: Duration,
}

impl LaunchSpec {
    /// Build a launch spec from connection options and an effective cwd
    #[must_use]
    pub fn from_options(options: &ClientOptions, cwd: Option<PathBuf>) -> Self {
        let mut env = options.env.clone();
        if let Some(key) = &options.api_key {
            env.insert("OPENAI_API_KEY".to_string(), key.clone());
        }
        if let Some(url) = &options.base_url {
            env.insert("OPENAI_BASE_URL".to_string(), url.clone());
        }
        Self {
            program: options.cli_path.clone(),
            args: options.launch_args.clone(),
            cwd,
            env,
            min_version: options.min_cli_version,
            version_timeout: options.version_timeout,
        }
    }
}

impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("min_version", &self.min_version)
            .field("version_timeout", &self.version_timeout)
            .finish()
    }
}

/// Produces the byte streams a connection runs over
///
/// This trait is the seam between connection logic and process management.
pub trait Launcher: Send + Sync + 'static {
    /// Checks run before launching (the version gate for real processes)
    ///
    /// # Errors
    /// Returns a launch error if the agent must not be started
    fn preflight(&self, spec: &LaunchSpec) -> impl Future<Output = Result<()>> + Send;

    /// Start the agent and return its streams
    ///
    /// # Errors
    /// Returns error if the agent cannot be started
    fn launch(&self, spec: &LaunchSpec) -> impl Future<Output = Result<AgentIo>> + Send;
}
