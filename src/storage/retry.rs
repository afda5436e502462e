//! Bounded retry with exponential backoff.
//!
//! The delay law is a pure function of the attempt number so it can be tested
//! without sleeping; the driver takes the sleep as an injected [`Sleeper`].

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::errors::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (1-indexed): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Last error of a retry loop that gave up.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub error: TransportError,
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. Attempts run strictly one after another.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        info!("Attempt {}/{} to {}", attempt, max_attempts, label);

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        warn!("Attempt {} failed: {}", attempt, err);

        if !err.retryable {
            error!("Not retrying {}: error is not transient", label);
            return Err(RetryExhausted { attempts: attempt, error: err });
        }
        if attempt >= max_attempts {
            error!("All {} attempts failed", max_attempts);
            return Err(RetryExhausted { attempts: attempt, error: err });
        }

        let delay = policy.delay_for(attempt);
        info!("Retrying in {}ms...", delay.as_millis());
        sleeper.sleep(delay).await;
    }
}
