//! Bounded retry with exponential backoff for backend calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::backend_client::BackendError;
use crate::screening::EngineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy shared by generation, feedback, reorder and delete.
    pub fn standard(settings: &EngineSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.retry_base_delay,
        }
    }

    /// One attempt, no backoff. Used for adds, where a retried duplicate costs more than a manual retry.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2×base, 4×base, ...
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay * (1u32 << failed_attempt.saturating_sub(1).min(16))
    }
}

/// Runs `call` until it succeeds, fails with a non-transient error, or attempts run out.
///
/// `on_retry` is invoked with the number of the upcoming attempt before the backoff sleep.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut on_retry: impl FnMut(u32),
    mut call: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && e.is_transient() => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} attempt {}/{} failed: {}; retrying after {}ms",
                    operation,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                attempt += 1;
                on_retry(attempt);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    "{} failed on attempt {}/{}: {}",
                    operation, attempt, policy.max_attempts, e
                );
                return Err(e);
            }
        }
    }
}
