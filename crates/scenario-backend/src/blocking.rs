//! Bounded pool for blocking work
//!
//! File-backed stores do synchronous IO. Each job takes a semaphore permit
//! and runs on tokio's blocking threads, so a slow disk never stalls the
//! async executor and at most `permits` jobs run at once.

use crate::error::{BackendError, BackendResult};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default number of concurrent blocking jobs
pub const DEFAULT_BLOCKING_PERMITS: usize = 8;

/// Semaphore-bounded `spawn_blocking`
#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    /// Create pool allowing `size` concurrent jobs (at least one)
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Configured concurrency
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a permit is free
    ///
    /// # Errors
    /// Returns the job's own error, or [`BackendError::Internal`] if the
    /// job panicked or the pool was shut down.
    pub async fn run<F, T>(&self, job: F) -> BackendResult<T>
    where
        F: FnOnce() -> BackendResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| BackendError::Internal(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| BackendError::Internal(format!("blocking job failed: {e}")))?
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKING_PERMITS)
    }
}
