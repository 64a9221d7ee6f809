//! Retry logic with exponential backoff for status server calls.
//!
//! Retries only on transient errors (connection failures, timeouts, 5xx).
//! Non-retryable errors (4xx responses, malformed documents) are returned
//! immediately without retry.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ProtocolError;

/// Backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial request.
    pub max_retries: u32,
    /// Delay ceiling of the first retry, doubled on each attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Send each request once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Upper bound of the delay before retry number `attempt` (0-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt`, drawn uniformly in
    /// `[0, ceiling(attempt)]` (full jitter).
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or the
/// retries are exhausted. Exhaustion returns the last error.
pub(crate) async fn retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut f: F,
) -> Result<T, ProtocolError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProtocolError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    operation,
                    "status server request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
