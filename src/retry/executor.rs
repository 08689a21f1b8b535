//! The retry loop.
//!
//! Attempts run strictly one after another. A failure is classified; only a
//! transient failure with budget remaining is retried, after a backoff sleep.
//! Anything else stops the loop immediately.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use crate::classify::Classify;
use crate::failure::RawFailure;
use crate::retry::{Attempted, ClassifiedError, RetryPolicy};

/// Information about a failed attempt that is about to be retried.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The classified failure of that attempt.
    pub error: &'a ClassifiedError,
    /// Delay before the next attempt.
    pub next_delay: Duration,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

/// Run `operation` under `policy`, retrying transient failures.
///
/// A panic inside an attempt is captured as [`RawFailure::Panic`] and
/// classified like any other failure.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use terminus::{retry, Classifier, ErrorClass, RawFailure, RetryPolicy};
///
/// # tokio_test::block_on(async {
/// let calls = AtomicU32::new(0);
/// let counter = &calls;
/// let result = retry::run(
///     || async move {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Err::<(), _>(RawFailure::coded("40001"))
///     },
///     &RetryPolicy::immediate(3),
///     &Classifier::default(),
/// )
/// .await;
///
/// let failure = result.unwrap_err();
/// assert_eq!(failure.class, ErrorClass::Transient);
/// assert_eq!(failure.attempts, 4);
/// assert_eq!(calls.load(Ordering::SeqCst), 4);
/// # });
/// ```
pub async fn run<T, E, F, Fut, C>(
    operation: F,
    policy: &RetryPolicy,
    classifier: &C,
) -> Result<Attempted<T>, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawFailure>,
    C: Classify + ?Sized,
{
    run_with_hook(operation, policy, classifier, |_| {}).await
}

/// Like [`run`], but calls `on_retry` before each backoff sleep.
///
/// The hook is synchronous and should not block.
pub async fn run_with_hook<T, E, F, Fut, C, H>(
    mut operation: F,
    policy: &RetryPolicy,
    classifier: &C,
    mut on_retry: H,
) -> Result<Attempted<T>, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawFailure>,
    C: Classify + ?Sized,
    H: FnMut(&RetryEvent<'_>),
{
    let start = Instant::now();
    let mut attempt = 0u32;
    let mut prev_delay: Option<Duration> = None;

    loop {
        attempt += 1;

        let result = AssertUnwindSafe(async {
            operation().await.map_err(Into::<RawFailure>::into)
        })
        .catch_unwind()
        .await;

        let raw: RawFailure = match result {
            Ok(Ok(value)) => return Ok(Attempted::new(value, attempt, start.elapsed())),
            Ok(Err(raw)) => raw,
            Err(payload) => RawFailure::from_panic(payload),
        };

        let class = classifier.classify(&raw);
        let failure = ClassifiedError::new(class, raw, attempt, start.elapsed());

        if !class.is_retryable() {
            tracing::debug!(attempt, %class, error = %failure.message, "attempt failed, not retryable");
            return Err(failure);
        }

        let Some(delay) = policy.next_delay(attempt - 1, prev_delay) else {
            tracing::debug!(attempt, error = %failure.message, "retry budget exhausted");
            return Err(failure);
        };

        tracing::warn!(
            attempt,
            next_delay = ?delay,
            code = failure.code.as_deref().unwrap_or("-"),
            error = %failure.message,
            "transient failure, retrying"
        );
        on_retry(&RetryEvent {
            attempt,
            error: &failure,
            next_delay: delay,
            elapsed: start.elapsed(),
        });

        tokio::time::sleep(delay).await;
        prev_delay = Some(delay);
    }
}
