//! Request correlation: id allocation, pending replies and timeouts

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::mcp::error::{McpError, McpResult};
use crate::mcp::protocol::JsonRpcMessage;

/// Default time to wait for a correlated reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type ReplySender = oneshot::Sender<McpResult<JsonRpcMessage>>;

struct PendingEntry {
    issued_at: Instant,
    sender: ReplySender,
}

/// Matches replies to the requests that caused them.
///
/// Removal from the pending map is what settles an entry, so whichever of
/// `resolve`, `expire` or `reject_all` removes it first wins and the others
/// find nothing to do.
#[derive(Clone)]
pub struct RequestCorrelator {
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<u64, PendingEntry>>>,
    timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Allocate the next request id. Ids start at 1 and are never reused.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Track a request and hand back the handle its caller awaits
    pub fn register(&self, id: u64) -> PendingResponse {
        let (sender, receiver) = oneshot::channel();
        let previous = self.entries().insert(
            id,
            PendingEntry {
                issued_at: Instant::now(),
                sender,
            },
        );
        if previous.is_some() {
            warn!("Request id {} registered twice; earlier waiter dropped", id);
        }

        PendingResponse {
            id,
            receiver,
            timeout: self.timeout,
            correlator: self.clone(),
        }
    }

    /// Deliver a reply. Returns false when nothing was waiting for `id`.
    pub fn resolve(&self, id: u64, message: JsonRpcMessage) -> bool {
        let Some(entry) = self.entries().remove(&id) else {
            debug!("Dropping reply for unknown request id {}", id);
            return false;
        };
        debug!(
            "Request {} answered after {:?}",
            id,
            entry.issued_at.elapsed()
        );
        let _ = entry.sender.send(Ok(message));
        true
    }

    /// Fail a request that ran out of time. Returns false if it had already settled.
    pub fn expire(&self, id: u64) -> bool {
        let Some(entry) = self.entries().remove(&id) else {
            return false;
        };
        warn!(
            "Request {} timed out after {:?}",
            id,
            entry.issued_at.elapsed()
        );
        let _ = entry.sender.send(Err(McpError::RequestTimeout));
        true
    }

    /// Fail every outstanding request; `reason` builds the error for each one
    pub fn reject_all(&self, reason: impl Fn() -> McpError) -> usize {
        let drained: Vec<(u64, PendingEntry)> = self.entries().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            debug!("Rejecting pending request {}", id);
            let _ = entry.sender.send(Err(reason()));
        }
        count
    }

    /// Drop an entry without settling it, for requests that never left
    pub fn forget(&self, id: u64) {
        self.entries().remove(&id);
    }

    /// Number of requests still waiting
    pub fn pending_count(&self) -> usize {
        self.entries().len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, PendingEntry>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// Handle for one outstanding request
pub struct PendingResponse {
    id: u64,
    receiver: oneshot::Receiver<McpResult<JsonRpcMessage>>,
    timeout: Duration,
    correlator: RequestCorrelator,
}

impl PendingResponse {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply, the timeout, or teardown, whichever settles first
    pub async fn wait(self) -> McpResult<JsonRpcMessage> {
        self.deliver(std::future::ready(Ok(()))).await
    }

    /// Drive `send` and then the reply under one deadline.
    ///
    /// A send still in flight is dropped once the deadline passes or the
    /// entry is settled from elsewhere.
    pub async fn deliver<F>(mut self, send: F) -> McpResult<JsonRpcMessage>
    where
        F: Future<Output = McpResult<()>>,
    {
        let deadline = sleep_until(Instant::now() + self.timeout);
        tokio::pin!(send, deadline);
        let mut sending = true;

        loop {
            tokio::select! {
                outcome = &mut self.receiver => {
                    return outcome.unwrap_or(Err(McpError::SessionClosed));
                }
                sent = &mut send, if sending => {
                    sending = false;
                    if let Err(e) = sent {
                        self.correlator.forget(self.id);
                        return Err(e);
                    }
                }
                _ = &mut deadline => {
                    // A reply may have raced the timer; the map decides who settled it
                    self.correlator.expire(self.id);
                    return self
                        .receiver
                        .await
                        .unwrap_or(Err(McpError::SessionClosed));
                }
            }
        }
    }
}
