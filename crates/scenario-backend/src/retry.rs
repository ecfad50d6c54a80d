//! Retry with exponential backoff
//!
//! A failed attempt is classified by the backend. Retryable failures wait
//! `base_delay * 2^attempt` (capped at `max_delay`) before the next try;
//! fatal ones surface at once. When the attempt budget runs out the last
//! error is wrapped in [`BackendError::RetriesExhausted`]. There is no
//! wait after the final attempt.

use crate::error::{BackendError, BackendResult, Retryability};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait after the first failure; doubles for each later one
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    /// Upper bound on a single wait
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that tries exactly once
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set attempt budget
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set delay cap
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait after failed attempt number `attempt` (0-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `call` under `policy`
///
/// `call` receives the 0-based attempt number.
///
/// # Errors
/// Returns the first fatal error, or [`BackendError::RetriesExhausted`]
/// wrapping the last retryable one.
pub async fn with_retry<T, C, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    classify: C,
    call: F,
) -> BackendResult<T>
where
    C: Fn(&BackendError) -> Retryability,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    with_retry_cancellable(policy, operation, &CancellationToken::new(), classify, call).await
}

/// Run `call` under `policy`, stopping early when `cancel` fires
///
/// Cancellation is checked before each attempt and interrupts a pending
/// backoff wait.
///
/// # Errors
/// As [`with_retry`], plus [`BackendError::Cancelled`].
pub async fn with_retry_cancellable<T, C, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    classify: C,
    mut call: F,
) -> BackendResult<T>
where
    C: Fn(&BackendError) -> Retryability,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let error = match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if classify(&error) == Retryability::Fatal {
            tracing::debug!(operation, attempt, error = %error, "fatal backend error");
            return Err(error);
        }

        attempt += 1;
        if attempt >= max_attempts {
            tracing::warn!(operation, attempts = attempt, error = %error, "retries exhausted");
            return Err(BackendError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(error),
            });
        }

        let delay = policy.delay_for(attempt - 1);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "retryable backend error, backing off"
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(BackendError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
