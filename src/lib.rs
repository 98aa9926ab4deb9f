//! # Codex App-Server Bridge for Rust
//!
//! A client for the codex CLI's `app-server` mode. It launches the agent as a
//! child process, speaks line-delimited JSON-RPC over its stdio, and turns the
//! agent's notifications into a typed stream of turn events.
//!
//! ## Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use kodegen_codex_bridge::{AppServerClient, ClientOptions, ThreadOptions, TurnEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions::builder()
//!         .approval_policy("never")
//!         .surface_builtin_tools(true)
//!         .build();
//!     let client = AppServerClient::new(options);
//!     client.start_or_resume_thread(ThreadOptions::default()).await?;
//!
//!     let mut events = client.run_streaming("What is 2 + 2?")?;
//!     while let Some(event) = events.next().await {
//!         if let TurnEvent::ToolCallStarted(call) = event? {
//!             log::info!("tool {} started", call.tool_name);
//!         }
//!     }
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! - [`version`] - Agent CLI version probe and minimum-version gate
//! - [`transport`] - Process launch and the framed request/response channel
//! - [`normalize`] - Stateless extraction of ids, statuses and tool calls
//! - [`client`] - Connection lifecycle, run admission and event streaming
//!
//! ## One turn at a time
//!
//! A client holds one thread and at most one active run. A second
//! [`AppServerClient::run_streaming`] while a turn is running fails with
//! [`BridgeError::TurnInProgress`]; the slot is freed when the stream ends or
//! is dropped.
//!
//! ## Host tools
//!
//! Tools advertised with [`ClientOptionsBuilder::add_dynamic_tool`] are run
//! by the executor installed with [`AppServerClient::set_dynamic_tool_executor`]:
//!
//! ```no_run
//! # use kodegen_codex_bridge::{AppServerClient, ClientOptions, DynamicToolResponse, dynamic_tool_executor};
//! # fn example(client: &AppServerClient) {
//! client.set_dynamic_tool_executor(dynamic_tool_executor(|call| async move {
//!     Ok(DynamicToolResponse::text(format!("{} says hi", call.tool)))
//! }));
//! # }
//! ```

pub mod client;
pub mod control;
pub mod error;
pub mod normalize;
pub mod transport;
pub mod types;
pub mod version;

// Re-export commonly used types for external API
pub use client::{AppServerClient, ConnectionPhase, ToolSpanTracker, TurnStream};
pub use error::{BridgeError, Result};
pub use normalize::ToolKind;
pub use transport::{AgentIo, LaunchSpec, Launcher, ProcessLauncher, Transport, TransportHandlers};
pub use version::SemVer;

// Re-export type submodules for flat public API
pub use types::dynamic_tools::{
    ContentItem, DynamicToolCall, DynamicToolExecutor, DynamicToolResponse, DynamicToolSpec,
    dynamic_tool_executor,
};
pub use types::events::{ToolCall, TurnEvent, TurnSummary};
pub use types::identifiers::{RequestId, RunId};
pub use types::input::{InputItem, TurnInput};
pub use types::options::{ClientOptions, ClientOptionsBuilder, ThreadOptions};

/// Version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
