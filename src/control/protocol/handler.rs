//! Pending-request table for request/response correlation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{BridgeError, Result};
use crate::types::identifiers::RequestId;

/// Waiter handed back by [`PendingRequests::register`]
pub type ResponseReceiver = oneshot::Receiver<Result<Value>>;

struct PendingInner {
    waiters: HashMap<RequestId, oneshot::Sender<Result<Value>>>,
    /// Set once the connection is gone; later registrations fail fast
    closed: Option<Option<String>>,
}

/// Outstanding requests keyed by correlation id
///
/// Completion is a non-blocking oneshot handoff, so the read loop never waits
/// on a slow caller.
pub struct PendingRequests {
    next_request_id: AtomicU64,
    inner: Mutex<PendingInner>,
}

impl PendingRequests {
    /// Create an empty table; ids start at 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_request_id: AtomicU64::new(1),
            inner: Mutex::new(PendingInner {
                waiters: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Allocate a fresh id and register a waiter for it
    ///
    /// # Errors
    /// Returns [`BridgeError::ConnectionClosed`] if the table was already failed
    pub fn register(&self) -> Result<(u64, RequestId, ResponseReceiver)> {
        let number = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let id = RequestId::from(number);
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        if let Some(cause) = &inner.closed {
            return Err(BridgeError::ConnectionClosed(cause.clone()));
        }
        inner.waiters.insert(id.clone(), tx);
        Ok((number, id, rx))
    }

    /// Hand an outcome to the matching waiter
    ///
    /// Returns `false` if no waiter is registered under `id`.
    pub fn complete(&self, id: &RequestId, outcome: Result<Value>) -> bool {
        let waiter = self.inner.lock().waiters.remove(id);
        match waiter {
            Some(tx) => {
                // The caller may have timed out and dropped its receiver
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Forget a waiter (after a timeout or failed write)
    pub fn remove(&self, id: &RequestId) {
        self.inner.lock().waiters.remove(id);
    }

    /// Fail every waiter with `ConnectionClosed` and refuse new registrations
    pub fn fail_all(&self, cause: Option<String>) {
        let waiters: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.closed = Some(cause.clone());
            inner.waiters.drain().map(|(_, tx)| tx).collect()
        };
        for tx in waiters {
            let _ = tx.send(Err(BridgeError::ConnectionClosed(cause.clone())));
        }
    }

    /// Number of requests still awaiting a response
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Whether no requests are outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
