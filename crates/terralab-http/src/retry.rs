//! Retry with exponential backoff for transient errors
//!
//! The backoff stage of the request pipeline, factored out so its
//! schedule can be tested in isolation under virtual time. The default
//! policy is the product contract: 1 s before the first retry, doubling
//! per attempt, at most 2 retries.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use terralab_core::config::RetryConfig;

use crate::HttpError;

/// Backoff schedule for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied to the delay per attempt
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// Creates a policy from explicit parameters
    pub fn new(max_retries: u32, initial_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier,
        }
    }

    /// Creates a policy from the client configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Delay before retrying after the given zero-based attempt
    ///
    /// Attempt 0 waits `initial_delay`, attempt 1 waits
    /// `initial_delay * multiplier`, and so on.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay * self.multiplier.pow(attempt)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

/// Runs `operation` with retries per `policy`
///
/// Only [retryable](HttpError::is_retryable) errors are retried. The
/// `give_up` gate is consulted before each retry; returning `true`
/// surfaces the error immediately without consuming the remaining
/// budget (the client uses it to bail out of backoff once the host
/// reports itself offline).
pub async fn run_with_backoff<T, F, Fut, G>(
    policy: &BackoffPolicy,
    mut operation: F,
    mut give_up: G,
) -> Result<T, HttpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HttpError>>,
    G: FnMut(&HttpError) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() => {
                if give_up(&err) {
                    debug!(attempt, error = %err, "Abandoning retries early");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempts = attempt + 1,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
