//! Bounded retry with exponential backoff for fallible external calls.
//!
//! The invoker never inspects partial results: only a full `Ok` terminates
//! retrying. Errors rejected by the retryable predicate return immediately as
//! [`RetryError::Fatal`]; running out of attempts returns
//! [`RetryError::Exhausted`] so callers can tell a saturated budget apart
//! from a permanent failure.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Attempt budget and backoff curve for a single operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        }
    }

    /// Delay inserted after the given 1-based failed attempt:
    /// `initial_delay * backoff_multiplier^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1);
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.backoff_multiplier.powi(exponent as i32);
        self.initial_delay.mul_f64(factor.max(0.0))
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt in the budget failed with a retryable error.
    #[error("operation exhausted {attempts} attempt(s); last error: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
    /// The operation failed with an error the policy does not retry.
    #[error(transparent)]
    Fatal(E),
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Fatal(source) => source,
        }
    }
}

/// Run `operation` under `policy`, sleeping between retryable failures.
pub async fn invoke<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    debug_assert!(policy.max_attempts >= 1);
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(RetryError::Fatal(err)),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error, PartialEq)]
    enum FakeError {
        #[error("rate limited")]
        RateLimited,
        #[error("bad request")]
        BadRequest,
    }

    fn retryable(err: &FakeError) -> bool {
        matches!(err, FakeError::RateLimited)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_rate_limits() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1500), 2.0);
        let calls = AtomicU32::new(0);

        let result = invoke(
            &policy,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(FakeError::RateLimited)
                    } else {
                        Ok(n)
                    }
                }
            },
            retryable,
        )
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "exactly three invocations");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_with_typed_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1500), 2.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = invoke(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::RateLimited) }
            },
            retryable,
        )
        .await;

        match result.expect_err("budget must exhaust") {
            RetryError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, FakeError::RateLimited);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_short_circuits() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1500), 2.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = invoke(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::BadRequest) }
            },
            retryable,
        )
        .await;

        assert!(matches!(
            result.expect_err("fatal error surfaces"),
            RetryError::Fatal(FakeError::BadRequest)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry on fatal errors");
    }

    #[test]
    fn backoff_curve_is_exponential() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000), 2.0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }
}
