//! Retry Backoff Policy
//!
//! Exponential backoff with jitter for retryable store failures.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::utils::error::{BotError, BotResult};

/// Configuration for retry behavior on `RateLimited`/`ServiceUnavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 3)
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay (default: 250)
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay before retrying after a given failed attempt.
    ///
    /// Formula: `min(2^attempt * base_delay_ms, max_delay_ms) + jitter`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped = exp.min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Drive `op` to completion under the policy, sleeping between retryable
/// failures. Returns the successful value together with the backoff delays
/// that were actually taken; exhaustion collapses into `StoreUnavailable`.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> BotResult<(T, Vec<Duration>)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BotResult<T>>,
{
    let mut delays = Vec::new();
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok((value, delays)),
            Err(err) if err.is_retryable() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    tracing::warn!(call = what, attempts = attempt, error = %err, "store retries exhausted");
                    return Err(BotError::store_unavailable(format!(
                        "{} failed after {} attempts: {}",
                        what, attempt, err
                    )));
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                tracing::debug!(call = what, attempt, delay_ms = delay.as_millis() as u64, "retrying store call");
                tokio::time::sleep(delay).await;
                delays.push(delay);
            }
            Err(err) => return Err(err),
        }
    }
}
