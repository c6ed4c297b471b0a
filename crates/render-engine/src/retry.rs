//! Bounded retry with linear backoff for whole-strategy operations.

use std::future::Future;
use std::time::Duration;

use glidecast_common::config::RetryConfig;
use glidecast_common::error::{GlidecastError, GlidecastResult};

use crate::session::CancelSignal;

/// How many times to try, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): `base * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` attempts fail.
///
/// The last error is returned as is. `Cancelled` errors and a raised
/// `cancel` signal end the loop immediately.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancelSignal,
    label: &str,
    mut operation: F,
) -> GlidecastResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = GlidecastResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        cancel.check()?;

        let err = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if err.is_cancelled() || attempt >= max_attempts {
            if !err.is_cancelled() {
                tracing::error!(operation = label, attempts = attempt, error = %err, "Giving up");
            }
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            operation = label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(GlidecastError::Cancelled),
        }
        attempt += 1;
    }
}
