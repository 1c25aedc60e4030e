//! Exponential backoff retry policy for whole-run operations.
//!
//! The query client never retries on its own; the orchestrator injects a
//! policy and wraps the calls it considers safe to repeat.  Only transient
//! errors (network failures, 5xx) are retried; an expired session always
//! surfaces immediately.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{VaultError, VaultResult};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: u64,
    /// Maximum delay cap in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1,
            max_delay_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the given max retries and base delay.
    /// The maximum delay cap defaults to 60 seconds.
    #[must_use]
    pub fn new(max_retries: u32, base_delay_secs: u64) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            max_delay_secs: 60,
        }
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &VaultError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Delay for the given attempt: `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_secs
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_secs(exponential.min(self.max_delay_secs))
    }

    /// Execute an async operation with retry.
    ///
    /// The closure is called repeatedly until it succeeds, a non-transient
    /// error is encountered, or the maximum number of retries is exhausted.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> VaultResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = VaultResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if attempt > 0 {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %error,
                                "giving up after retries"
                            );
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> VaultError {
        VaultError::Api {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_secs, 1);
        assert_eq!(policy.max_delay_secs, 60);
    }

    #[test]
    fn retries_transient_within_budget() {
        let policy = RetryPolicy::new(3, 1);
        assert!(policy.should_retry(0, &transient()));
        assert!(policy.should_retry(2, &transient()));
        assert!(!policy.should_retry(3, &transient())); // at max
    }

    #[test]
    fn never_retries_expired_session() {
        let policy = RetryPolicy::new(3, 1);
        assert!(!policy.should_retry(0, &VaultError::SessionExpired));
    }

    #[test]
    fn delay_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_secs: 1,
            max_delay_secs: 10,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10)); // 32 capped
    }

    #[tokio::test]
    async fn execute_succeeds_after_retries() {
        let policy = RetryPolicy::new(3, 0);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute("test_op", move || {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(transient())
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn execute_fails_immediately_on_auth_error() {
        let policy = RetryPolicy::new(3, 0);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: VaultResult<()> = policy
            .execute("test_op", move || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VaultError::SessionExpired)
                }
            })
            .await;

        assert!(matches!(result, Err(VaultError::SessionExpired)));
        assert_eq!(counter.load(Ordering::SeqCst), 1); // only one attempt
    }

    #[tokio::test]
    async fn execute_exhausts_retries() {
        let policy = RetryPolicy::new(2, 0);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: VaultResult<()> = policy
            .execute("test_op", move || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
