//! Timeout and bounded retry around a single external call.

use std::{future::Future, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::base::config::Config;

use super::issues::{ApiError, ApiResult};

/// How often and how patiently to retry an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Timeout for each attempt.
    pub timeout: Duration,
    /// Delay before the second attempt; doubles after that.
    pub base_delay: Duration,
    /// Upper bound on any single delay, including server-provided ones.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            timeout: Duration::from_secs(config.request_timeout_secs),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            ..Default::default()
        }
    }

    /// Delay before the attempt after `attempt` (1-based) failed with `err`.
    pub fn delay_for(&self, attempt: u32, err: &ApiError) -> Duration {
        let backoff = self.base_delay.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));

        let delay = match err {
            ApiError::RateLimited { retry_after: Some(after) } => *after,
            _ => backoff,
        };

        delay.min(self.max_delay)
    }

    /// Whether the server asked for a longer wait than this policy is willing to sleep.
    pub fn outlasts(&self, err: &ApiError) -> bool {
        matches!(err, ApiError::RateLimited { retry_after: Some(after) } if *after > self.max_delay)
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or runs out of attempts.
///
/// Each attempt is bounded by the policy timeout; an attempt that times out counts as a
/// transient failure. A rate limit that resets later than `max_delay` is returned at once.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempt = 1;

    loop {
        let err = match timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("{operation} succeeded after {attempt} attempts");
                }
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(_) => ApiError::Transient(format!("timed out after {:?}", policy.timeout)),
        };

        if !err.is_retryable() || attempt >= policy.max_attempts || policy.outlasts(&err) {
            return Err(err);
        }

        let delay = policy.delay_for(attempt, &err);
        warn!("{operation} failed, retrying {attempt}/{} in {delay:?}: {err}", policy.max_attempts - 1);
        sleep(delay).await;

        attempt += 1;
    }
}
