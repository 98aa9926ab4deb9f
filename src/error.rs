//! Error types for the app-server bridge

use thiserror::Error;

use crate::version::SemVer;

/// JSON-RPC code for a method the receiver does not implement
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC code for malformed request parameters
pub const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC code for a handler failure
pub const INTERNAL_ERROR: i64 = -32603;

/// Main error type for the app-server bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Agent CLI binary not found or not installed
    #[error("Agent CLI not found: {0}")]
    CliNotFound(String),

    /// The agent process could not be started
    #[error("Failed to launch agent process: {0}")]
    Launch(String),

    /// Process execution error with exit code and stderr
    #[error("Process error: {message}")]
    Process {
        /// Error message
        message: String,
        /// Process exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Standard error output
        stderr: Option<String>,
    },

    /// Agent CLI reported a version below the configured minimum
    #[error("Agent CLI version {found} is older than the required minimum {required}")]
    VersionTooOld {
        /// Version reported by the binary
        found: SemVer,
        /// Configured minimum
        required: SemVer,
    },

    /// No `major.minor.patch` token in the version output
    #[error("Could not find a version number in agent CLI output: {0:?}")]
    VersionUnparseable(String),

    /// Connection error when communicating with the agent process
    #[error("Connection error: {0}")]
    Connection(String),

    /// The control channel closed while an operation was waiting on it
    #[error("Connection closed{}", .0.as_deref().map(|cause| format!(": {cause}")).unwrap_or_default())]
    ConnectionClosed(Option<String>),

    /// JSON decode error
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// Malformed or unexpected protocol traffic
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The agent answered a request with an error response
    #[error("Agent returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
        /// Optional structured error data
        data: Option<serde_json::Value>,
    },

    /// Inbound request for a method this client does not handle
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation requires a live connection
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Operation requires an established thread
    #[error("No thread has been started or resumed")]
    NoThread,

    /// A run is already active on this connection
    #[error("A turn is already in progress on this connection")]
    TurnInProgress,

    /// The agent reported a failure-flavored terminal status for the turn
    #[error("Turn ended with status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    TurnFailed {
        /// Raw terminal status
        status: String,
        /// Error message reported with the status
        message: Option<String>,
    },

    /// The caller cancelled the run
    #[error("Turn was cancelled")]
    Cancelled,

    /// The client shut down before the run completed
    #[error("Client shut down before the turn completed")]
    ShutDown,

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A host-side dynamic tool failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create a CLI not found error
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::CliNotFound(
            "codex not found. Install with:\n\
             npm install -g @openai/codex\n\
             \n\
             Or set CODEX_BRIDGE_CLI_PATH / ClientOptions::cli_path"
                .to_string(),
        )
    }

    /// Create a launch error
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    /// Create a process error
    pub fn process(msg: impl Into<String>, exit_code: Option<i32>, stderr: Option<String>) -> Self {
        Self::Process {
            message: msg.into(),
            exit_code,
            stderr,
        }
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a not connected error
    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::NotConnected(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a tool execution error
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// JSON-RPC error code used when this error answers an inbound request
    #[must_use]
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::JsonDecode(_) | Self::InvalidConfig(_) => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        }
    }
}
