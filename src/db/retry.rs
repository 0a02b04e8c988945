//! Retry of transient driver failures with exponential backoff.
//!
//! Only errors classified retryable by [`crate::error::Error::is_retryable`]
//! are retried; compile-time and logic errors propagate immediately. The
//! engine never retries DDL automatically; callers opt in per operation.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff policy for [`with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails non-transiently, or the retry
/// budget is spent.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(%error, attempt, delay_ms = delay.as_millis() as u64, "retrying transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
