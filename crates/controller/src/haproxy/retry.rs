//! Linear backoff retry for remote calls.

use std::future::Future;
use std::time::Duration;

use derive_more::Display;
use error_stack::Context;
use error_stack::Report;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; zero behaves like one.
    pub attempts: u32,
    /// Base delay, multiplied by the number of failed attempts so far.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Wait before 1-indexed `attempt`: `(attempt - 1) * delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.delay * attempt.saturating_sub(1)
    }

    fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[derive(Debug, Display)]
pub enum RetryError {
    #[display("{operation} failed after {attempts} attempt(s)")]
    Exhausted { operation: String, attempts: u32 },
    #[display("{operation} cancelled before attempt {attempt}")]
    Cancelled { operation: String, attempt: u32 },
}

impl core::error::Error for RetryError {}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// Cancellation is observed before every wait and every attempt, never while a
/// call is in flight.
///
/// # Errors
///
/// - [`RetryError::Exhausted`] wrapping the last failure
/// - [`RetryError::Cancelled`] wrapping the last failure, if any
pub async fn retry<T, C, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: &str,
    mut call: F,
) -> Result<T, Report<RetryError>>
where
    C: Context,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Report<C>>>,
{
    let max_attempts = policy.max_attempts();
    let mut last_error: Option<Report<C>> = None;
    let mut attempt = 1;

    loop {
        let delay = policy.delay_before(attempt);
        let cancelled = if delay.is_zero() {
            token.is_cancelled()
        } else {
            tokio::select! {
                _ = token.cancelled() => true,
                _ = tokio::time::sleep(delay) => token.is_cancelled(),
            }
        };
        if cancelled {
            let context = RetryError::Cancelled {
                operation: operation.to_string(),
                attempt,
            };
            return Err(match last_error {
                Some(report) => report.change_context(context),
                None => Report::new(context),
            });
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(report) if attempt >= max_attempts => {
                return Err(report.change_context(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                }));
            }
            Err(report) => {
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    next_delay = ?policy.delay_before(attempt + 1),
                    "Remote call failed, retrying: {report}"
                );
                last_error = Some(report);
                attempt += 1;
            }
        }
    }
}
