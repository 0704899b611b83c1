//! Bounded fixed-delay reconnection

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::mcp::error::{McpError, McpResult};
use crate::mcp::events::{EventBus, SessionEvent};

/// Retry policy shared by both transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait between a failure and the next attempt
    pub delay: Duration,
    /// Consecutive failed establishments before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: 10,
        }
    }
}

/// What to do after a failed establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Counts consecutive failures and owns the background retry task
pub struct ReconnectController {
    policy: ReconnectPolicy,
    failures: AtomicU32,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: AtomicU32::new(0),
            task: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Consecutive failures since the last success
    pub fn attempts(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts() >= self.policy.max_attempts
    }

    /// Count one failed establishment and decide whether to try again
    pub fn record_failure(&self) -> RetryDecision {
        let attempts = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= self.policy.max_attempts {
            RetryDecision::Exhausted { attempts }
        } else {
            RetryDecision::Retry {
                attempt: attempts,
                delay: self.policy.delay,
            }
        }
    }

    /// A connection was established
    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// Install an already spawned retry task, aborting any earlier one
    pub fn set_task(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.slot().replace(handle) {
            previous.abort();
        }
    }

    /// Stop a scheduled retry loop, if any
    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }

    /// Drive retries until one succeeds, the budget runs out, or the
    /// session goes away (`establish` yields `SessionClosed`).
    ///
    /// The failure that engaged the controller is counted here, so callers
    /// must not record it themselves.
    pub async fn run<F, Fut>(&self, events: &EventBus, mut establish: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = McpResult<()>>,
    {
        loop {
            match self.record_failure() {
                RetryDecision::Exhausted { attempts } => {
                    warn!("Giving up after {} failed connection attempts", attempts);
                    events.emit(&SessionEvent::ReconnectExhausted { attempts });
                    return;
                }
                RetryDecision::Retry { attempt, delay } => {
                    info!(
                        "Reconnecting in {:?} (attempt {}/{})",
                        delay, attempt, self.policy.max_attempts
                    );
                    events.emit(&SessionEvent::Reconnecting {
                        attempt,
                        max_attempts: self.policy.max_attempts,
                    });
                    tokio::time::sleep(delay).await;

                    match establish().await {
                        Ok(()) => {
                            info!("Reconnected after {} failed attempts", attempt);
                            self.reset();
                            return;
                        }
                        Err(McpError::SessionClosed) => return,
                        Err(e) => warn!("Reconnect attempt failed: {}", e),
                    }
                }
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ReconnectController {
    fn drop(&mut self) {
        self.cancel();
    }
}
