//! Read loop: bounded line framing and frame dispatch

use std::io;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::control::{IncomingMessage, OutgoingMessage, PendingRequests, RpcErrorBody};
use crate::error::BridgeError;

use super::connection::CloseSignal;
use super::{InboundRequestHandler, NotificationHandler};

/// One unit read from the agent
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Line {
    /// A complete frame (without the newline)
    Frame(String),
    /// A frame longer than the limit; its bytes were discarded
    Oversized(usize),
    /// End of stream
    Eof,
}

/// Read one newline-terminated frame, discarding frames over `max` bytes
///
/// A final frame without a trailing newline is still returned.
pub(super) async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut discarded: Option<usize> = None;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match discarded {
                Some(len) => Line::Oversized(len),
                None if buf.is_empty() => Line::Eof,
                None => Line::Frame(decode(buf)),
            });
        }

        let newline = available.iter().position(|b| *b == b'\n');
        let chunk = &available[..newline.unwrap_or(available.len())];
        match discarded.as_mut() {
            Some(len) => *len += chunk.len(),
            None if buf.len() + chunk.len() > max => {
                discarded = Some(buf.len() + chunk.len());
                buf.clear();
            }
            None => buf.extend_from_slice(chunk),
        }
        let consumed = newline.map_or(available.len(), |i| i + 1);
        reader.consume(consumed);

        if newline.is_some() {
            return Ok(match discarded {
                Some(len) => Line::Oversized(len),
                None => Line::Frame(decode(buf)),
            });
        }
    }
}

fn decode(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    let text: &str = &text;
    text.strip_suffix('\r').unwrap_or(text).to_string()
}

/// State the read loop dispatches into
pub(super) struct ReaderContext {
    pub(super) pending: Arc<PendingRequests>,
    pub(super) outbound: mpsc::UnboundedSender<String>,
    pub(super) on_notification: NotificationHandler,
    pub(super) on_inbound_request: InboundRequestHandler,
    pub(super) closed: Arc<CloseSignal>,
    pub(super) max_line_bytes: usize,
}

impl ReaderContext {
    /// Read frames until the stream ends, then fire the closed signal
    pub(super) async fn run<R>(self, mut reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let cause = loop {
            match next_line(&mut reader, &mut buf, self.max_line_bytes).await {
                Ok(Line::Frame(line)) => self.handle_line(&line),
                Ok(Line::Oversized(len)) => log::warn!(
                    "dropping {len}-byte frame from agent (limit {} bytes)",
                    self.max_line_bytes
                ),
                Ok(Line::Eof) => break None,
                Err(e) => break Some(format!("read from agent failed: {e}")),
            }
        };
        log::debug!("agent read loop ended ({cause:?})");
        self.closed.fire(cause);
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        log::trace!("<- {line}");

        let frame: Value = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("dropping malformed frame from agent: {e}");
                return;
            }
        };

        match IncomingMessage::classify(frame) {
            Ok(IncomingMessage::Response { id, outcome }) => {
                let outcome = outcome.map_err(BridgeError::from);
                if !self.pending.complete(&id, outcome) {
                    log::debug!("dropping response for unknown request id {id}");
                }
            }
            Ok(IncomingMessage::Notification { method, params }) => {
                (self.on_notification)(method, params);
            }
            Ok(IncomingMessage::Request { id, method, params }) => {
                self.dispatch_inbound(id, method, params);
            }
            Err(e) => log::warn!("dropping frame from agent: {e}"),
        }
    }

    fn dispatch_inbound(&self, id: Value, method: String, params: Value) {
        let handler = self.on_inbound_request.clone();
        let outbound = self.outbound.clone();

        tokio::spawn(async move {
            let frame = match handler(method.clone(), params).await {
                Ok(result) => OutgoingMessage::Response { id, result },
                Err(err) => {
                    log::warn!("inbound request `{method}` failed: {err}");
                    OutgoingMessage::Error {
                        id,
                        error: RpcErrorBody::from_error(&err),
                    }
                }
            };
            match frame.to_line() {
                Ok(line) => {
                    if outbound.send(line).is_err() {
                        log::debug!("connection closed before answering `{method}`");
                    }
                }
                Err(e) => log::error!("failed to encode answer to `{method}`: {e}"),
            }
        });
    }
}
