use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use super::UpstreamError;
use crate::config::Config;

const MAX_DELAY: Duration = Duration::from_secs(10);

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.upstream_max_attempts.max(1),
            base_delay: Duration::from_millis(config.upstream_retry_base_ms),
            multiplier: config.upstream_retry_multiplier,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (starting at 0), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        if !secs.is_finite() || secs >= MAX_DELAY.as_secs_f64() {
            return MAX_DELAY;
        }
        Duration::from_secs_f64(secs)
    }

    /// Backoff plus up to 25% jitter, never above `MAX_DELAY`.
    fn jittered(&self, retry: u32) -> Duration {
        self.backoff(retry)
            .mul_f64(1.0 + fastrand::f64() * 0.25)
            .min(MAX_DELAY)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut retry = 0;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry + 1 < self.max_attempts => {
                    let delay = self.jittered(retry);
                    tracing::warn!(
                        "{} failed ({}), retrying in {}ms (attempt {}/{})",
                        operation,
                        e,
                        delay.as_millis(),
                        retry + 2,
                        self.max_attempts
                    );
                    sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
