use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;

use crate::{rate_limit::RateLimiter, PayPalApiError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250), max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    /// Exponential back-off with up to 50% random jitter added.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let jitter_ms = (capped.as_millis() as u64) / 2;
        let jitter = if jitter_ms > 0 { rand::thread_rng().gen_range(0..=jitter_ms) } else { 0 };
        capped + Duration::from_millis(jitter)
    }
}

/// Runs `op` through the rate limiter, retrying `TRANSIENT` and `RATE_LIMITED` failures according to `policy`. Every
/// other error is returned straight away.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    label: &str,
    mut op: F,
) -> Result<T, PayPalApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PayPalApiError>>,
{
    let mut attempt = 1;
    loop {
        limiter.acquire().await;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = match &e {
                    PayPalApiError::RateLimited { retry_after: Some(after) } => {
                        limiter.back_off(*after);
                        *after
                    },
                    PayPalApiError::RateLimited { retry_after: None } => {
                        let delay = policy.delay_for(attempt);
                        limiter.back_off(delay);
                        delay
                    },
                    _ => policy.delay_for(attempt),
                };
                info!(
                    "💳️ {label} failed on attempt {attempt}/{}. {e}. Retrying in {}ms",
                    policy.max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => {
                debug!("💳️ {label} failed on attempt {attempt}. {e}");
                return Err(e);
            },
        }
    }
}
