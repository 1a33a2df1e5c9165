//! Latest-wins ordering for requests of one kind.
//!
//! Starting a request through a [`Sequencer`] cancels the request it
//! supersedes, so a slow earlier response can never overwrite the result of a
//! later one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::Error;

#[derive(Debug, Default)]
struct Inner {
    latest: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

/// Issues [`Ticket`]s; only the most recent ticket may complete.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

/// Handle for one in-flight request.
#[derive(Debug)]
pub struct Ticket {
    seq: u64,
    cancel: CancellationToken,
    inner: Arc<Inner>,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, cancelling the previous one.
    pub fn begin(&self) -> Ticket {
        let seq = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let previous = self
            .inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        Ticket {
            seq,
            cancel,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Cancel whatever request is in flight without starting a new one.
    pub fn cancel_all(&self) {
        self.inner.latest.fetch_add(1, Ordering::SeqCst);
        if let Some(current) = self
            .inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            current.cancel();
        }
    }
}

impl Ticket {
    #[must_use]
    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.inner.latest.load(Ordering::SeqCst) == self.seq
    }

    /// Drive `fut` unless a newer ticket supersedes this one first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Superseded`] if cancelled before or after `fut`
    /// completes, otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Error::Superseded),
            result = fut => result,
        };
        if !self.is_current() {
            tracing::debug!(seq = self.seq, "Dropping superseded response");
            return Err(Error::Superseded);
        }
        result
    }
}
