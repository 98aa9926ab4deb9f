//! `AppServerClient` implementation

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::AppServerClient;
use super::state::{ConnectionPhase, SessionCore};
use super::stream::{TurnStream, turn_stream};
use super::tasks::{drive_turn, send_interrupt, turn_start_params};
use crate::control::ClientCapabilities;
use crate::error::{BridgeError, Result};
use crate::normalize::thread_id;
use crate::transport::{LaunchSpec, Launcher, ProcessLauncher, Transport};
use crate::types::dynamic_tools::DynamicToolExecutor;
use crate::types::input::TurnInput;
use crate::types::options::{ClientOptions, ThreadOptions};

impl AppServerClient<ProcessLauncher> {
    /// Create a client that launches the agent CLI as a child process
    ///
    /// Nothing is started until [`AppServerClient::start_or_resume_thread`].
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self::with_launcher(options, ProcessLauncher)
    }

    /// Connect, run `f`, and shut down on every exit path
    ///
    /// # Errors
    /// Returns the startup error, the error of `f`, or the shutdown error
    pub async fn scoped<F, Fut, T>(options: ClientOptions, thread: ThreadOptions, f: F) -> Result<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        Self::new(options).scope(thread, f).await
    }
}

impl<L: Launcher> AppServerClient<L> {
    /// Create a client over a custom launcher
    #[must_use]
    pub fn with_launcher(options: ClientOptions, launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            core: Arc::new(SessionCore::new(options)),
        }
    }

    /// Connection options
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.core.options
    }

    /// Start the agent if needed and establish a thread
    ///
    /// Resumes `thread.thread_id` when set, otherwise starts a new thread.
    /// When a connection is already up, its thread id is returned unchanged.
    ///
    /// # Errors
    /// Returns launch, version-gate, handshake or timeout errors; the
    /// connection is torn down before returning
    pub async fn start_or_resume_thread(&self, thread: ThreadOptions) -> Result<String> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(current) = self.core.ready_thread_id() {
            if let Some(requested) = thread.thread_id.as_deref()
                && requested != current
            {
                log::warn!("already connected on thread {current}; ignoring resume of {requested}");
            }
            return Ok(current);
        }

        let resolved = thread.resolve(&self.core.options);
        let epoch = self.core.begin_connection();
        let mut started: Option<Arc<Transport>> = None;

        let outcome = match tokio::time::timeout(
            self.core.options.startup_timeout,
            self.connect(epoch, &resolved, &mut started),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::timeout(format!(
                "agent startup did not finish within {:?}",
                self.core.options.startup_timeout
            ))),
        };

        match outcome {
            Ok(id) => Ok(id),
            Err(e) => {
                log::warn!("agent startup failed: {e}");
                self.core.abandon_connection(epoch);
                if let Some(transport) = started
                    && let Err(stop_err) = transport.stop(self.core.options.shutdown_timeout).await
                {
                    log::debug!("stopping half-started agent failed: {stop_err}");
                }
                Err(e)
            }
        }
    }

    async fn connect(
        &self,
        epoch: u64,
        thread: &ThreadOptions,
        started: &mut Option<Arc<Transport>>,
    ) -> Result<String> {
        let options = &self.core.options;
        let spec = LaunchSpec::from_options(options, thread.cwd.clone());
        log::debug!("launching agent: {spec:?}");

        self.launcher.preflight(&spec).await?;
        let io = self.launcher.launch(&spec).await?;
        let transport = Transport::start(io, self.core.transport_handlers(epoch), options.max_line_bytes);
        *started = Some(transport.clone());
        self.core.attach_transport(epoch, transport.clone())?;

        let capabilities = ClientCapabilities::for_dynamic_tools(!options.dynamic_tools.is_empty());
        transport
            .send_request(
                "initialize",
                json!({
                    "clientInfo": {
                        "name": options.client_name,
                        "title": options.client_name,
                        "version": options.client_version,
                    },
                    "capabilities": capabilities,
                }),
                options.request_timeout,
            )
            .await?;
        transport.send_notification("initialized", None)?;

        let (method, params) = thread_request(thread, options);
        let response = transport
            .send_request(method, params, options.request_timeout)
            .await?;
        let id = thread_id(&response)
            .or_else(|| thread.thread_id.clone())
            .ok_or_else(|| BridgeError::protocol(format!("`{method}` response carried no thread id")))?;

        self.core
            .thread_ready(epoch, id.clone(), thread.approval_policy.clone())?;
        log::info!("agent ready on thread {id}");
        Ok(id)
    }

    /// Submit a turn and stream its events
    ///
    /// Dropping the stream cancels the turn.
    ///
    /// # Errors
    /// Fails fast with [`BridgeError::NotConnected`], [`BridgeError::NoThread`]
    /// or [`BridgeError::TurnInProgress`]
    pub fn run_streaming(&self, input: impl Into<TurnInput>) -> Result<TurnStream> {
        self.run_streaming_with_cancel(input, CancellationToken::new())
    }

    /// Submit a turn that is also cancelled when `cancel` fires
    ///
    /// # Errors
    /// Same as [`AppServerClient::run_streaming`]
    pub fn run_streaming_with_cancel(
        &self,
        input: impl Into<TurnInput>,
        cancel: CancellationToken,
    ) -> Result<TurnStream> {
        let input = input.into();
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::connection(format!("no tokio runtime: {e}")))?;

        let (run, transport, rx) = self.core.admit_run()?;
        let params = match turn_start_params(run.thread_id(), &input) {
            Ok(params) => params,
            Err(e) => {
                self.core.release_run(&run);
                return Err(e);
            }
        };
        log::debug!("run {} admitted on thread {}", run.id(), run.thread_id());

        let driver = cancel.child_token();
        handle.spawn(drive_turn(
            self.core.clone(),
            transport,
            run.clone(),
            params,
            driver.clone(),
        ));
        Ok(turn_stream(self.core.clone(), run, rx, driver))
    }

    /// Interrupt the active turn
    ///
    /// No-op without an active run. If the turn id is not known yet, the
    /// interrupt is sent as soon as it is.
    ///
    /// # Errors
    /// Returns error if the agent rejects the interrupt
    pub async fn interrupt_turn(&self) -> Result<()> {
        let (run, transport) = self.core.live_run();
        let Some(run) = run else {
            return Ok(());
        };
        let Some(turn) = run.request_interrupt() else {
            log::debug!("interrupt of run {} deferred until the turn id is known", run.id());
            return Ok(());
        };
        let Some(transport) = transport else {
            return Ok(());
        };
        send_interrupt(
            &transport,
            run.thread_id(),
            &turn,
            self.core.options.request_timeout,
        )
        .await
    }

    /// Install the executor for `item/tool/call` requests
    pub fn set_dynamic_tool_executor(&self, executor: DynamicToolExecutor) {
        self.core.set_executor(Some(executor));
    }

    /// Remove the dynamic tool executor
    pub fn clear_dynamic_tool_executor(&self) {
        self.core.set_executor(None);
    }

    /// Current thread id
    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        self.core.thread_id()
    }

    /// Turn id of the active run, once known
    #[must_use]
    pub fn turn_id(&self) -> Option<String> {
        self.core.turn_id()
    }

    /// Connection state
    #[must_use]
    pub fn connection_phase(&self) -> ConnectionPhase {
        self.core.phase()
    }

    /// Whether a thread is established on a live connection
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            self.connection_phase(),
            ConnectionPhase::ThreadReady | ConnectionPhase::TurnActive
        )
    }

    /// Why the last connection failed, if it did
    #[must_use]
    pub fn last_fault(&self) -> Option<String> {
        self.core.fault()
    }

    /// Shut down with the configured shutdown timeout
    ///
    /// # Errors
    /// Returns error if stopping the agent process fails
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(self.core.options.shutdown_timeout)
            .await
    }

    /// Interrupt any active turn, stop the agent and clear all state
    ///
    /// The active run fails with [`BridgeError::ShutDown`]. State is cleared
    /// even if stopping the process fails.
    ///
    /// # Errors
    /// Returns error if stopping the agent process fails
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let deadline = Instant::now() + timeout;

        let (transport, run) = self.core.begin_shutdown();
        let Some(transport) = transport else {
            self.core.finish_shutdown();
            return Ok(());
        };
        log::debug!("shutting down agent connection");

        if let Some(run) = &run {
            let interrupt = run.request_interrupt();
            run.complete(Err(BridgeError::ShutDown));
            if let Some(turn) = interrupt {
                let budget = timeout.min(self.core.options.request_timeout);
                if let Err(e) = send_interrupt(&transport, run.thread_id(), &turn, budget).await {
                    log::debug!("interrupt during shutdown failed: {e}");
                }
            }
        }

        let result = transport
            .stop(deadline.saturating_duration_since(Instant::now()))
            .await;
        if let Some(run) = self.core.finish_shutdown() {
            run.complete(Err(BridgeError::ShutDown));
        }
        result
    }

    /// Establish a thread, run `f`, then shut down on every exit path
    ///
    /// If the future is dropped before finishing, shutdown is spawned onto
    /// the current runtime.
    ///
    /// # Errors
    /// Returns the startup error, the error of `f`, or the shutdown error
    pub async fn scope<F, Fut, T>(&self, thread: ThreadOptions, f: F) -> Result<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = ShutdownGuard {
            client: Some(self.clone()),
        };
        self.start_or_resume_thread(thread).await?;
        let result = f(self.clone()).await;

        guard.client = None;
        let stopped = self.shutdown().await;
        match (result, stopped) {
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

/// `thread/start` or `thread/resume` request
fn thread_request(thread: &ThreadOptions, options: &ClientOptions) -> (&'static str, Value) {
    let resume = thread.thread_id.is_some();
    let mut params = Map::new();
    {
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                params.insert(key.to_string(), value);
            }
        };

        put("threadId", thread.thread_id.clone().map(Value::String));
        put("model", thread.model.clone().map(Value::String));
        put(
            "cwd",
            thread
                .cwd
                .as_ref()
                .map(|cwd| Value::String(cwd.display().to_string())),
        );
        put("approvalPolicy", thread.approval_policy.clone().map(Value::String));
        put("sandbox", thread.sandbox_mode.clone().map(Value::String));
        if !resume && !options.dynamic_tools.is_empty() {
            put("dynamicTools", serde_json::to_value(&options.dynamic_tools).ok());
        }
    }

    let method = if resume { "thread/resume" } else { "thread/start" };
    (method, Value::Object(params))
}

/// Spawns shutdown if a scope is abandoned mid-flight
struct ShutdownGuard<L: Launcher> {
    client: Option<AppServerClient<L>>,
}

impl<L: Launcher> Drop for ShutdownGuard<L> {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.shutdown().await {
                        log::warn!("scoped shutdown failed: {e}");
                    }
                });
            }
            Err(_) => log::warn!("scope dropped outside a runtime; agent left to kill-on-drop"),
        }
    }
}
