//! Retry wrapper for mutating calls that hit transient server errors

use crate::clock::Clock;
use crate::error::{ErrorClass, Result};
use std::future::Future;
use std::time::Duration;

/// Retry configuration for mutating calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        // NaN and negative factors collapse to no delay
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or
/// `timeout` is spent. The last error is returned when the budget runs out.
pub async fn retry_transient<T, F, Fut>(
    clock: &dyn Clock,
    timeout: Duration,
    config: &RetryConfig,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = clock.now();
    let mut attempt: u32 = 0;

    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if err.classify() != ErrorClass::Retryable {
            return Err(err);
        }

        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= timeout {
            tracing::warn!("Giving up after {} attempt(s): {}", attempt + 1, err);
            return Err(err);
        }

        let pause = config.delay_for_attempt(attempt).min(timeout - elapsed);
        tracing::debug!("Retryable error ({}), retrying in {:?}", err, pause);
        clock.sleep(pause).await;
        attempt += 1;
    }
}
