//! Generic retry executor with exponential backoff
//!
//! Wraps transient network operations: attempts up to a configured maximum,
//! doubling the delay between attempts from a base value, capped at a
//! maximum, with +/-30% jitter applied to every sleep. Retryability is
//! decided by substring matchers against the error message; an empty matcher
//! list means every error is retryable.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::errors::VolumeBotError;

/// Retry behavior for one class of operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Initial backoff delay
    pub base_delay: Duration,

    /// Backoff ceiling
    pub max_delay: Duration,

    /// Lowercase substrings identifying retryable errors; empty = all
    /// errors are retryable
    pub retryable: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            retryable: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom attempt count and default backoff
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Restrict retries to errors whose message contains one of the given
    /// substrings (case-insensitive)
    pub fn retry_only_on(mut self, matchers: &[&str]) -> Self {
        self.retryable = matchers.iter().map(|m| m.to_lowercase()).collect();
        self
    }

    fn matches(&self, error_message: &str) -> bool {
        if self.retryable.is_empty() {
            return true;
        }
        let lowered = error_message.to_lowercase();
        self.retryable.iter().any(|m| lowered.contains(m))
    }
}

/// Apply +/-30% jitter to a base duration
pub fn with_jitter(base: Duration) -> Duration {
    let factor = 0.7 + 0.6 * fastrand::f64();
    base.mul_f64(factor)
}

/// Sleep that can be interrupted by a cancellation signal.
///
/// Returns `true` if the sleep was cut short by cancellation.
pub async fn cancellable_sleep(
    duration: Duration,
    cancel: Option<&mut watch::Receiver<bool>>,
) -> bool {
    let Some(rx) = cancel else {
        tokio::time::sleep(duration).await;
        return false;
    };
    if *rx.borrow() {
        return true;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = rx.changed() => match changed {
                Ok(()) if *rx.borrow() => return true,
                Ok(()) => continue,
                // Sender gone: nothing can cancel us anymore
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

/// Executes operations under a retry policy, optionally honoring a
/// cancellation signal during backoff sleeps
#[derive(Clone, Default)]
pub struct RetryExecutor {
    cancel: Option<watch::Receiver<bool>>,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose backoff sleeps abort when the signal flips to true
    pub fn with_cancel(cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(cancel),
        }
    }

    /// Run `op` under `policy`, returning the first success.
    ///
    /// Non-retryable failures are returned immediately. After exhausting
    /// attempts the last error is returned wrapped in
    /// [`VolumeBotError::RetryExhausted`] with the attempt count.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut op: F,
    ) -> Result<T, VolumeBotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VolumeBotError>>,
    {
        let mut current_delay = policy.base_delay;
        let mut last_error: Option<VolumeBotError> = None;
        let mut attempts_made = 0;
        let started = Instant::now();

        for attempt in 1..=policy.max_attempts {
            attempts_made = attempt;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation,
                            attempt,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "✅ Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !policy.matches(&err.to_string()) {
                        error!(operation, %err, "Non-retryable error, giving up");
                        return Err(err);
                    }

                    warn!(
                        operation,
                        attempt,
                        max_attempts = policy.max_attempts,
                        %err,
                        "Attempt failed"
                    );
                    last_error = Some(err);

                    if attempt < policy.max_attempts {
                        let delay = with_jitter(current_delay).min(policy.max_delay);
                        let mut cancel = self.cancel.clone();
                        if cancellable_sleep(delay, cancel.as_mut()).await {
                            warn!(operation, attempt, "Backoff interrupted by cancellation");
                            break;
                        }
                        current_delay = (current_delay * 2).min(policy.max_delay);
                    }
                }
            }
        }

        let source = last_error.unwrap_or_else(|| {
            VolumeBotError::Configuration(format!(
                "retry policy for {} allows zero attempts",
                operation
            ))
        });
        Err(VolumeBotError::RetryExhausted {
            operation: operation.to_string(),
            attempts: attempts_made,
            source: Box::new(source),
        })
    }
}
