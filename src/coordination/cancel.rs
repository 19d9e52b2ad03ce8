//! Cooperative cancellation
//!
//! A cloneable token shared by a caller and the orchestration/backtest runs it
//! starts. Runs poll `is_cancelled()` between units of work and stop
//! scheduling new ones; work already completed is still reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Why a run was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Caller asked for cancellation (Ctrl-C, API)
    Requested,
    /// Deadline elapsed
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "requested"),
            CancelReason::DeadlineExceeded => write!(f, "deadline_exceeded"),
        }
    }
}

struct Inner {
    cancelled: AtomicBool,
    reason_tx: watch::Sender<Option<CancelReason>>,
    deadline: Option<Instant>,
}

/// Token for requesting and observing cancellation
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Token that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (reason_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason_tx,
                deadline,
            }),
        }
    }

    /// Request cancellation. Repeated requests are ignored.
    pub fn cancel(&self) {
        self.trigger(CancelReason::Requested);
    }

    fn trigger(&self, reason: CancelReason) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason = %reason, "cancellation triggered");
        self.inner.reason_tx.send_replace(Some(reason));
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.trigger(CancelReason::DeadlineExceeded);
                true
            }
            _ => false,
        }
    }

    pub fn reason(&self) -> Option<CancelReason> {
        if !self.is_cancelled() {
            return None;
        }
        *self.inner.reason_tx.borrow()
    }

    /// Resolve once the token is cancelled or its deadline passes
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let mut rx = self.inner.reason_tx.subscribe();
        let wait_for_request = async {
            loop {
                let triggered = rx.borrow_and_update().is_some();
                if triggered {
                    break;
                }
                if rx.changed().await.is_err() {
                    // Sender lives in `inner`, which we hold
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = wait_for_request => {}
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                        self.trigger(CancelReason::DeadlineExceeded);
                    }
                }
            }
            None => wait_for_request.await,
        }
    }
}

/// Cancel `token` on Ctrl-C
pub fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, finishing in-flight work");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl+C handler"),
        }
    });
}
