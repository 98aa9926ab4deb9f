//! `AppServerClient`: one agent connection, one thread, one turn at a time
//!
//! The client owns at most one agent process. Startup and shutdown are
//! serialized by an async lifecycle lock; everything else (run admission,
//! notification dispatch, tool spans) goes through a single short-lived
//! session lock that is never held across an `.await`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     AppServerClient                       │
//! │                                                           │
//! │  run_streaming ──► admit ──► Active Run ◄── dispatch      │
//! │        │                        │  ▲           ▲          │
//! │        ▼                        ▼  │           │          │
//! │  ┌─────────────┐         ┌──────────────┐      │          │
//! │  │ Turn Driver │────────►│  TurnStream  │      │          │
//! │  │ (one task)  │         │ (caller side)│      │          │
//! │  └──────┬──────┘         └──────────────┘      │          │
//! │         │                                      │          │
//! │         ▼                                      │          │
//! │  ┌────────────────────────────────────────────────────┐   │
//! │  │ Transport: writer task · reader task · pending map │   │
//! │  └────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use kodegen_codex_bridge::{AppServerClient, ClientOptions, ThreadOptions, TurnEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AppServerClient::new(ClientOptions::default());
//! let thread_id = client.start_or_resume_thread(ThreadOptions::default()).await?;
//! log::info!("thread {thread_id}");
//!
//! let mut events = client.run_streaming("Summarize the README")?;
//! while let Some(event) = events.next().await {
//!     match event? {
//!         TurnEvent::TurnCompleted(summary) => log::info!("done: {}", summary.status),
//!         other => log::debug!("{other:?}"),
//!     }
//! }
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Scoped session
//!
//! ```no_run
//! use kodegen_codex_bridge::{AppServerClient, ClientOptions, ThreadOptions};
//!
//! # async fn example() -> kodegen_codex_bridge::Result<()> {
//! let thread = AppServerClient::scoped(
//!     ClientOptions::default(),
//!     ThreadOptions::default(),
//!     |client| async move { Ok(client.thread_id()) },
//! )
//! .await?;
//! # drop(thread);
//! # Ok(())
//! # }
//! ```

mod client_impl;
mod dispatch;
mod inbound;
mod run;
pub mod spans;
mod state;
mod stream;
mod tasks;

use std::sync::Arc;

use crate::transport::{Launcher, ProcessLauncher};

pub use spans::{SpanEmit, SpanPhase, ToolSpanTracker};
pub use state::ConnectionPhase;
pub use stream::TurnStream;

use state::SessionCore;

/// Client for one codex app-server connection
///
/// Cheap to clone; clones share the connection.
///
/// # Examples
///
/// ```no_run
/// use kodegen_codex_bridge::{AppServerClient, ClientOptions, ThreadOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let options = ClientOptions::builder().model("gpt-5-codex").build();
///     let client = AppServerClient::new(options);
///
///     client.start_or_resume_thread(ThreadOptions::default()).await?;
///     client.interrupt_turn().await?;
///     client.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct AppServerClient<L: Launcher = ProcessLauncher> {
    /// Process launcher
    launcher: Arc<L>,
    /// Serializes startup and shutdown
    lifecycle: Arc<tokio::sync::Mutex<()>>,
    /// State shared with transport callbacks and turn drivers
    core: Arc<SessionCore>,
}

impl<L: Launcher> Clone for AppServerClient<L> {
    fn clone(&self) -> Self {
        Self {
            launcher: self.launcher.clone(),
            lifecycle: self.lifecycle.clone(),
            core: self.core.clone(),
        }
    }
}
