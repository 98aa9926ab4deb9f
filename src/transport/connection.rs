//! Framed control channel over a pair of byte streams

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::control::{OutgoingMessage, PendingRequests};
use crate::error::{BridgeError, Result};

use super::reader::ReaderContext;
use super::{AgentIo, AgentProcess, ClosedHandler, TransportHandlers};

/// Exactly-once closed signal
pub(super) struct CloseSignal {
    fired: AtomicBool,
    cause: Mutex<Option<String>>,
    pending: Arc<PendingRequests>,
    handler: ClosedHandler,
}

impl CloseSignal {
    fn new(pending: Arc<PendingRequests>, handler: ClosedHandler) -> Self {
        Self {
            fired: AtomicBool::new(false),
            cause: Mutex::new(None),
            pending,
            handler,
        }
    }

    /// Fail pending waiters and notify the handler; later calls are no-ops
    pub(super) fn fire(&self, cause: Option<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cause.lock().clone_from(&cause);
        self.pending.fail_all(cause.clone());
        (self.handler)(cause);
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn cause(&self) -> Option<String> {
        self.cause.lock().clone()
    }
}

#[derive(Default)]
struct TransportTasks {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// One live control channel to the agent
///
/// Created with [`Transport::start`], torn down with [`Transport::stop`].
pub struct Transport {
    pending: Arc<PendingRequests>,
    outbound: mpsc::UnboundedSender<String>,
    writer_shutdown: CancellationToken,
    closed: Arc<CloseSignal>,
    tasks: Mutex<TransportTasks>,
    process: Mutex<Option<AgentProcess>>,
}

impl Transport {
    /// Start the reader and writer tasks over `io`
    ///
    /// Returns immediately; no handshake is performed here.
    ///
    /// # Arguments
    /// * `io` - Streams (and optional process) to run over
    /// * `handlers` - Callbacks for notifications, inbound requests and closure
    /// * `max_line_bytes` - Longest accepted inbound frame
    #[must_use]
    pub fn start(io: AgentIo, handlers: TransportHandlers, max_line_bytes: usize) -> Arc<Self> {
        let AgentIo {
            reader,
            writer,
            process,
        } = io;

        let pending = Arc::new(PendingRequests::new());
        let closed = Arc::new(CloseSignal::new(pending.clone(), handlers.on_closed));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer_shutdown = CancellationToken::new();

        let writer_task = tokio::spawn(write_loop(
            FramedWrite::new(writer, LinesCodec::new()),
            outbound_rx,
            writer_shutdown.clone(),
        ));

        let context = ReaderContext {
            pending: pending.clone(),
            outbound: outbound.clone(),
            on_notification: handlers.on_notification,
            on_inbound_request: handlers.on_inbound_request,
            closed: closed.clone(),
            max_line_bytes,
        };
        let reader_task = tokio::spawn(context.run(BufReader::new(reader)));

        Arc::new(Self {
            pending,
            outbound,
            writer_shutdown,
            closed,
            tasks: Mutex::new(TransportTasks {
                reader: Some(reader_task),
                writer: Some(writer_task),
            }),
            process: Mutex::new(process),
        })
    }

    /// Send a request and wait for its response
    ///
    /// # Arguments
    /// * `method` - Method name
    /// * `params` - Parameters
    /// * `timeout` - How long to wait for the response
    ///
    /// # Errors
    /// Returns the agent's error response, [`BridgeError::Timeout`] if no
    /// response arrives in time, or [`BridgeError::ConnectionClosed`]
    pub async fn send_request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let (number, id, response) = self.pending.register()?;
        let frame = OutgoingMessage::Request {
            id: number,
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.enqueue(&frame) {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::ConnectionClosed(self.closed.cause())),
            Err(_) => {
                self.pending.remove(&id);
                Err(BridgeError::timeout(format!(
                    "`{method}` got no response within {timeout:?}"
                )))
            }
        }
    }

    /// Send a notification
    ///
    /// # Errors
    /// Returns [`BridgeError::ConnectionClosed`] if the channel is closed
    pub fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.enqueue(&OutgoingMessage::Notification {
            method: method.to_string(),
            params,
        })
    }

    fn enqueue(&self, frame: &OutgoingMessage) -> Result<()> {
        if self.closed.is_fired() || self.writer_shutdown.is_cancelled() {
            return Err(BridgeError::ConnectionClosed(self.closed.cause()));
        }
        let line = frame.to_line()?;
        log::trace!("-> {line}");
        self.outbound
            .send(line)
            .map_err(|_| BridgeError::ConnectionClosed(self.closed.cause()))
    }

    /// Whether the closed signal has fired
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }

    /// Number of requests awaiting a response
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Close the channel and terminate the process
    ///
    /// Queued frames are flushed and the write side is closed (stdin EOF is
    /// the graceful shutdown signal). The process gets until `timeout` to exit
    /// before its process group is killed. Idempotent.
    ///
    /// # Errors
    /// Returns error if waiting on the process fails
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.writer_shutdown.cancel();

        let writer = self.tasks.lock().writer.take();
        if let Some(mut writer) = writer
            && tokio::time::timeout_at(deadline, &mut writer).await.is_err()
        {
            log::warn!("agent writer did not drain before the stop deadline");
            writer.abort();
        }

        let process = self.process.lock().take();
        let result = match process {
            Some(mut process) => process.terminate(deadline).await,
            None => Ok(()),
        };

        let reader = self.tasks.lock().reader.take();
        if let Some(mut reader) = reader
            && tokio::time::timeout_at(deadline, &mut reader).await.is_err()
        {
            log::debug!("agent read loop still running at the stop deadline; aborting");
            reader.abort();
        }

        self.closed.fire(None);
        result
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.writer_shutdown.cancel();
        let tasks = self.tasks.get_mut();
        if let Some(task) = tasks.reader.take() {
            task.abort();
        }
        if let Some(task) = tasks.writer.take() {
            task.abort();
        }
    }
}

async fn write_loop(
    mut sink: FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LinesCodec>,
    mut frames: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            frame = frames.recv() => match frame {
                Some(line) => {
                    if let Err(e) = sink.send(line).await {
                        log::warn!("write to agent failed: {e}");
                        break;
                    }
                }
                None => break,
            },
            () = shutdown.cancelled() => {
                while let Ok(line) = frames.try_recv() {
                    if sink.send(line).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    if let Err(e) = SinkExt::<String>::close(&mut sink).await {
        log::debug!("closing agent stdin failed: {e}");
    }
}
