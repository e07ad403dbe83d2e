// src/sync/mutex.rs

//! FIFO exclusive section for async code.
//!
//! This orders interleavings of async continuations; it is not about
//! protecting memory. Waiters are granted strictly in the order they called
//! [`AsyncMutex::acquire`], which tokio's mutex guarantees.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Debug)]
pub struct AsyncMutex {
    name: String,
    hold_delay: Duration,
    lock: Arc<Mutex<()>>,
}

/// Capability returned by [`AsyncMutex::acquire`]. Dropping it releases the
/// section and grants the next waiter.
#[derive(Debug)]
pub struct ReleaseHandle {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl ReleaseHandle {
    pub fn release(self) {}
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        trace!(mutex = %self.name, "released");
    }
}

impl AsyncMutex {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_hold_delay(name, Duration::ZERO)
    }

    /// A mutex that, once acquired by `run_exclusive`, waits `hold_delay`
    /// before running the callback. Used to throttle bursts.
    pub fn with_hold_delay(name: impl Into<String>, hold_delay: Duration) -> Self {
        Self {
            name: name.into(),
            hold_delay,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub async fn acquire(&self) -> ReleaseHandle {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        trace!(mutex = %self.name, "locked");
        ReleaseHandle {
            name: self.name.clone(),
            _guard: guard,
        }
    }

    /// Run `f` while holding the section. The section is released on every
    /// exit path, including when the returned future is dropped midway.
    pub async fn run_exclusive<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let release = self.acquire().await;
        if !self.hold_delay.is_zero() {
            tokio::time::sleep(self.hold_delay).await;
        }
        let out = f().await;
        release.release();
        out
    }
}
