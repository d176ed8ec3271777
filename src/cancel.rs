//! Cancellation Signal
//!
//! A single cancellation signal governs every rate-limiter wait and every HTTP
//! call of a run. The [`CancelHandle`] fires it, any number of cloned
//! [`CancelToken`]s observe it.
//!
//! # Example
//!
//! ```ignore
//! let (handle, token) = registry_usage::cancel::channel();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.cancel();
//! });
//! aggregator.run(&token, &mut reporter).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Create a connected handle/token pair
pub fn channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

/// Fires the cancellation signal
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel every token created from this handle
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Fire the signal once `deadline` has elapsed
    ///
    /// The returned task owns this handle until the deadline.
    pub fn cancel_after(self, deadline: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!("Run deadline of {:?} reached, canceling", deadline);
            self.cancel();
        })
    }
}

/// Observes the cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never canceled
    pub fn never() -> Self {
        let (_, token) = channel();
        token
    }

    /// Whether the signal has already fired
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires
    ///
    /// If every handle was dropped without firing, this never resolves.
    pub async fn canceled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
