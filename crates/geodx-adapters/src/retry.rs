//! Retry with exponential back-off and jitter for adapter calls.
//!
//! Every external call site depends on [`RetryPolicy`] rather than
//! reimplementing back-off math. Transient platform errors (network,
//! rate limit, 5xx) and malformed structured output are retried; auth,
//! quota, and model errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::AdapterError;

/// Decides whether and when to retry a failed adapter call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. `3` means 1 try + 2 retries.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Returns `true` when `attempt` (1-based) may be followed by another try.
    ///
    /// **Retryable:** network failures (timeout, connect), rate limits, 5xx
    /// statuses, and parse failures of the platform's structured output —
    /// flaky AI endpoints routinely emit one bad reply and recover.
    ///
    /// **Not retryable:** auth failures, quota exhaustion, unknown models,
    /// content filtering; another attempt returns the same answer.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, err: &AdapterError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match err {
            AdapterError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AdapterError::RateLimited { .. }
            | AdapterError::Deserialize { .. }
            | AdapterError::MalformedReply { .. }
            | AdapterError::Timeout { .. } => true,
            AdapterError::UnexpectedStatus { status, .. } => *status >= 500,
            AdapterError::Auth { .. }
            | AdapterError::QuotaExceeded { .. }
            | AdapterError::ModelNotFound { .. }
            | AdapterError::ContentFiltered { .. } => false,
        }
    }

    /// Back-off before attempt `attempt + 1`:
    /// `min(base * 2^(attempt-1), max) * rand(0.5, 1.0)` with jitter on.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let computed = self.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = computed.min(self.max_delay_ms);
        let delay_ms = if self.jitter {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.5)) as u64;
            jittered
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }
}

/// Runs `operation` under `policy`, sleeping between attempts.
///
/// Returns the first success, or the last error once the policy declines
/// another attempt.
///
/// # Errors
///
/// Propagates the final [`AdapterError`] after retries are exhausted or on
/// the first non-retryable error.
pub async fn retry_send<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.should_retry(attempt, &err) {
                    return Err(err);
                }
                let delay = policy.next_delay(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient adapter error — retrying after back-off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
