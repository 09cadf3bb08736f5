//! Capped exponential backoff for transient network failures.

use crate::config::RetryConfig;
use crate::constants::retry::MULTIPLIER;
use crate::error::{Error, Result};
use crate::utils::clock::Clock;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry limits for a single remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = MULTIPLIER.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Non-transient errors are returned immediately. Backoff waits go through
/// `clock` and abort with [`Error::Cancelled`] when `cancel` fires.
pub async fn with_retry<C, F, Fut, T>(
    policy: &RetryPolicy,
    clock: &C,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if attempt > 1 {
            debug!(operation = operation_name, attempt, "Retrying operation");
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Transient failure, will retry after backoff: {err}"
                );

                tokio::select! {
                    () = clock.sleep(delay) => {}
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::http::{REFUSED_URL, refused_connection};
    use crate::utils::clock::ManualClock;
    use std::cell::Cell;

    fn transient() -> Error {
        Error::HttpStatus {
            status: 503,
            url: "https://example.invalid".to_string(),
            body: "unavailable".to_string(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
        assert_eq!(policy.delay_after(30), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt_without_sleeping() {
        let clock = ManualClock::new();
        let result = with_retry(
            &policy(),
            &clock,
            &CancellationToken::new(),
            "test",
            || async { Ok::<_, Error>(42) },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);

        let result = with_retry(&policy(), &clock, &CancellationToken::new(), "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err(transient()) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);

        let result: Result<()> =
            with_retry(&policy(), &clock, &CancellationToken::new(), "test", || {
                calls.set(calls.get() + 1);
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(Error::HttpStatus { status: 503, .. })));
        assert_eq!(calls.get(), 4);
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[tokio::test]
    async fn test_refused_download_is_retried() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);
        let result: Result<()> =
            with_retry(&policy(), &clock, &CancellationToken::new(), "download", || {
                calls.set(calls.get() + 1);
                async {
                    Err(Error::DownloadFailed {
                        url: REFUSED_URL.to_string(),
                        source: Box::new(refused_connection().await),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(Error::DownloadFailed { .. })));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);

        let result: Result<()> =
            with_retry(&policy(), &clock, &CancellationToken::new(), "test", || {
                calls.set(calls.get() + 1);
                async {
                    Err(Error::ArtifactNotFound {
                        pattern: "current_image".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(Error::ArtifactNotFound { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = with_retry(&policy(), &clock, &cancel, "test", || async {
            Ok::<_, Error>(())
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
