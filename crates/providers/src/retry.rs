//! Bounded retry with exponential backoff and per-attempt timeouts.
//!
//! Wraps the model-call boundary. Each attempt is bounded by a timeout and
//! transient failures are retried after a doubling delay until the attempts
//! run out. The tool registry reuses the same schedule for read-only tools.

use std::future::Future;
use std::time::Duration;

use supportdesk_config::AppConfig;
use supportdesk_core::error::ProviderError;
use tracing::{debug, warn};

/// Attempt count and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(4000),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.agent.model_attempts.max(1),
            initial_backoff: Duration::from_millis(config.agent.backoff_initial_ms),
            max_backoff: Duration::from_millis(config.agent.backoff_max_ms),
            attempt_timeout: Duration::from_secs(config.provider.timeout_secs),
        }
    }

    /// A single attempt, no waiting. Useful in tests and offline tools.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            attempt_timeout,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. `on_failure` observes every
    /// failed attempt (for logging or events) before any backoff sleep.
    pub async fn run<T, F, Fut, N>(
        &self,
        label: &str,
        mut op: F,
        mut on_failure: N,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        N: FnMut(u32, &ProviderError),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(label, attempt, max_attempts = attempts, "Calling model boundary");

            let error = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "{label} timed out after {}s",
                    self.attempt_timeout.as_secs_f32()
                )),
            };

            on_failure(attempt, &error);

            if !error.is_transient() || attempt >= attempts {
                warn!(label, attempt, error = %error, "Giving up");
                return Err(error);
            }

            let mut delay = self.backoff(attempt);
            if let ProviderError::RateLimited { retry_after_secs } = &error {
                delay = delay.max(Duration::from_secs(*retry_after_secs)).min(self.max_backoff);
            }
            warn!(
                label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
