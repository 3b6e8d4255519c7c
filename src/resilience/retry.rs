use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
    /// Upper bound of the random extra delay, as a fraction of the base delay
    pub jitter_max_percentage: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 200,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            jitter_max_percentage: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Backoff without delay, for tests
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            jitter_enabled: false,
            jitter_max_percentage: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.initial_backoff_ms)
            .mul_f64(self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32));

        let delay = if self.jitter_enabled && self.jitter_max_percentage > 0.0 {
            base.mul_f64(1.0 + fastrand::f64() * self.jitter_max_percentage)
        } else {
            base
        };

        delay.min(Duration::from_millis(self.max_backoff_ms))
    }
}

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Abort,
}

/// Run `operation` up to `max_attempts` times, sleeping between attempts
///
/// `classify` decides whether an error is worth another attempt. The last
/// error is returned once attempts run out or `classify` aborts.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    config: &BackoffConfig,
    max_attempts: u32,
    operation_name: &str,
    mut operation: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDecision,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= max_attempts || classify(&error) == RetryDecision::Abort {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %error,
                        "Operation failed, giving up"
                    );
                    return Err(error);
                }

                let delay = config.delay_for_attempt(attempt);
                debug!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
