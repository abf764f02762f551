//! Cooperative cancellation
//!
//! A [`CancellationToken`] is created by the caller and shared (by cloning)
//! with every operation that should stop together. The flag only ever goes
//! from `false` to `true`; each registered callback fires at most once.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Shared cancellation signal
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    callbacks: Mutex<Vec<Callback>>,
    notify: Notify,
}

impl CancellationToken {
    /// Create an uncancelled token
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation
    ///
    /// The first call flips the flag, wakes every [`cancelled`](Self::cancelled)
    /// waiter and runs the registered callbacks. Later calls do nothing.
    pub fn cancel(&self) {
        let callbacks = {
            let mut guard = self.inner.callbacks.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *guard)
        };

        tracing::debug!(callbacks = callbacks.len(), "cancellation requested");
        self.inner.notify.notify_waiters();

        // Callbacks run outside the lock so they may touch the token.
        for callback in callbacks {
            callback();
        }
    }

    /// Register a callback for cancellation
    ///
    /// If the token is already cancelled the callback runs immediately on
    /// the calling thread.
    pub fn on_cancelled<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut guard = self.inner.callbacks.lock();
            if !self.inner.cancelled.load(Ordering::Acquire) {
                guard.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Wait until the token is cancelled
    ///
    /// Resolves immediately for an already-cancelled token. Cancel safe.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag, otherwise a cancel
        // landing in between would be missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
