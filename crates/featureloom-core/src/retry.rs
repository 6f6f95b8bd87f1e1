//! Retry logic with exponential backoff
//!
//! Used for transient failures such as:
//! - Registry CAS conflicts (a concurrent writer bumped the version first)
//! - Online store connection hiccups
//! - Bounded waits that expired
//!
//! Only errors for which [`Error::is_retryable`](crate::Error::is_retryable)
//! holds are retried by [`retry_async`]; everything else is returned on the
//! first attempt.
//!
//! # Example
//!
//! ```rust,ignore
//! use featureloom_core::retry::{RetryPolicy, retry_async};
//!
//! let policy = RetryPolicy::default();
//! let version = retry_async(&policy, || async {
//!     store.put_entity(&entity, expected).await
//! }).await?;
//! ```

use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay applied as +/- random jitter, in `0.0..=1.0`
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Calculate backoff delay for a given attempt
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        // Random value between (1 - jitter) and (1 + jitter)
        let jitter = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * self.jitter_factor;
        let final_delay = (capped_delay * jitter) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Retry error - wraps the last error with retry metadata
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: usize,
    pub total_delay: Duration,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts (total delay: {:?}): {}",
            self.attempts, self.total_delay, self.error
        )
    }
}

impl<E: std::error::Error> std::error::Error for RetryError<E> {}

/// Retry an async operation returning [`crate::Error`], retrying only
/// retryable failures
pub async fn retry_async<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<crate::Error>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    retry_async_if(policy, crate::Error::is_retryable, operation).await
}

/// Retry an async operation with exponential backoff while `should_retry`
/// accepts the error
///
/// Returns `Err(RetryError)` either on the first non-retryable error or after
/// `max_retries + 1` attempts.
pub async fn retry_async_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut total_delay = Duration::from_secs(0);

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(attempts, ?total_delay, "Retried operation succeeded");
                }
                return Ok(result);
            }
            Err(error) if !should_retry(&error) => {
                return Err(RetryError {
                    error,
                    attempts,
                    total_delay,
                });
            }
            Err(error) => {
                if attempts > policy.max_retries {
                    warn!(attempts, ?total_delay, error = %error, "Retries exhausted");
                    return Err(RetryError {
                        error,
                        attempts,
                        total_delay,
                    });
                }

                let delay = policy.backoff_delay(attempts - 1);
                total_delay += delay;

                debug!(
                    attempt = attempts,
                    max_attempts = policy.max_retries + 1,
                    ?delay,
                    error = %error,
                    "Retrying after transient failure"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
