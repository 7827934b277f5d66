//! Cooperative cancellation for the ingestion pipeline.
//!
//! One token is threaded through every pipeline stage and checked at each
//! suspension point. A cancelled pipeline settles into the `Cancelled` state
//! without partial persistence: the only write that matters (bill + line
//! items) is transactional and happens after the last check.

use tokio::sync::watch;

use billtrace_core::{Error, Result};

/// Caller-held handle that requests cancellation.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Pipeline-held token observing a cancellation request.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a handle/token pair.
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that can never be cancelled, for callers without a
    /// cancellation path.
    pub fn never() -> CancelToken {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive forever so the channel never closes.
        std::mem::forget(tx);
        CancelToken { rx }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with [`Error::Cancelled`] if cancellation has been requested.
    /// Called at every stage boundary.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(format!("pipeline cancelled at {}", stage)))
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is requested; pends forever otherwise.
    /// Intended for `tokio::select!` around slow external calls.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        loop {
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling; never resolves.
                std::future::pending::<()>().await;
            }
            if *rx.borrow() {
                return;
            }
        }
    }
}
