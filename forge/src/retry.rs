//! Bounded retry with exponential backoff for upstream calls.
//!
//! Only [`CoreError::UpstreamUnavailable`] is retried; every other kind
//! surfaces immediately. Delays grow exponentially from `initial_delay` to
//! `max_delay`, with optional jitter in `[0.5, 1.5)` of the computed delay.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

/// Backoff parameters, normally read from `[retry]` config.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(s: &env_config::RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            initial_delay: Duration::from_millis(s.initial_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            jitter: s.jitter,
        }
    }

    /// Delay before retrying after `attempt` (0-indexed) failures.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt as i32);
        let base = self.initial_delay.as_secs_f64() * exp;
        let capped = base.min(self.max_delay.as_secs_f64());
        let secs = if self.jitter {
            capped * (0.5 + rand::thread_rng().gen::<f64>())
        } else {
            capped
        };
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping between attempts.
/// Non-retriable errors and the final failure propagate unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying upstream call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
