//! The terminal-outcome boundary.
//!
//! [`TerminalOutcome::run`] turns "run this operation for this record" into
//! exactly one [`RecordOutcome`]. It never panics and never returns an error:
//! every failure mode, including defects in the retry and classification
//! machinery itself, comes back as a quarantined outcome.
//!
//! # Examples
//!
//! ```rust
//! use terminus::{with_terminal_outcome, Action, OutcomeStatus, PartialOutcome, RawFailure, RecordInput};
//!
//! # tokio_test::block_on(async {
//! let input = RecordInput::new("customer", "C-1001");
//!
//! let outcome = with_terminal_outcome(&input, || async {
//!     Ok::<_, RawFailure>(PartialOutcome::loaded(Action::Create, "A1"))
//! })
//! .await;
//! assert_eq!(outcome.status(), OutcomeStatus::Loaded);
//! assert_eq!(outcome.target_id(), Some("A1"));
//!
//! let outcome = with_terminal_outcome(&input, || async {
//!     Err::<PartialOutcome, _>(RawFailure::error("duplicate key").with_code("23505"))
//! })
//! .await;
//! assert_eq!(outcome.status(), OutcomeStatus::Quarantined);
//! assert_eq!(outcome.attempts(), 1);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tracing::Instrument;

use crate::classify::{Classifier, Classify};
use crate::failure::RawFailure;
use crate::lifecycle::Lifecycle;
use crate::outcome::{PartialOutcome, RecordInput, RecordOutcome};
use crate::retry::{self, RetryEvent, RetryPolicy};

type RetryHook = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Everything the pipeline needs besides the record and its operation.
///
/// # Examples
///
/// ```rust
/// use terminus::{Classifier, OutcomeConfig, RetryPolicy};
///
/// let config = OutcomeConfig::default()
///     .with_policy(RetryPolicy::immediate(1))
///     .with_classifier(Classifier::new().with_transient_code("55P03"))
///     .with_retry_hook(|event| eprintln!("retrying after attempt {}", event.attempt));
///
/// assert_eq!(config.policy().max_retries(), 1);
/// ```
#[derive(Clone)]
pub struct OutcomeConfig {
    policy: RetryPolicy,
    classifier: Arc<dyn Classify + Send + Sync>,
    on_retry: Option<RetryHook>,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            classifier: Arc::new(Classifier::default()),
            on_retry: None,
        }
    }
}

impl fmt::Debug for OutcomeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeConfig")
            .field("policy", &self.policy)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl OutcomeConfig {
    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the classifier.
    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: Classify + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Observe every retry. The hook must not block.
    pub fn with_retry_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// The retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The classifier.
    pub fn classifier(&self) -> &(dyn Classify + Send + Sync) {
        self.classifier.as_ref()
    }
}

/// What the attempts of one record have done so far.
///
/// Lives outside the panic boundary so the catch-all can still report it.
#[derive(Debug, Default)]
struct AttemptTrace {
    attempts: AtomicU32,
    last_failure: Mutex<Option<RawFailure>>,
}

impl AttemptTrace {
    fn begin_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self, failure: &RawFailure) {
        let mut last = self.last_failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Some(failure.clone());
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn last_failure(&self) -> Option<RawFailure> {
        self.last_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Runs record operations to a guaranteed terminal outcome.
///
/// Cheap to clone; holds no per-record state, so one instance can serve any
/// number of concurrent records.
#[derive(Debug, Clone, Default)]
pub struct TerminalOutcome {
    config: OutcomeConfig,
}

impl TerminalOutcome {
    /// Create a runner with the given configuration.
    pub fn new(config: OutcomeConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &OutcomeConfig {
        &self.config
    }

    /// Run `operation` for `input` and return its terminal outcome.
    ///
    /// On success the operation's status is adopted verbatim. When the final
    /// attempt fails the record is always quarantined, carrying the error
    /// class, code, stage and message of that failure.
    pub async fn run<F, Fut, E>(&self, input: &RecordInput, operation: F) -> RecordOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PartialOutcome, E>>,
        E: Into<RawFailure>,
    {
        let span = tracing::debug_span!(
            "record",
            entity_type = %input.entity_type(),
            legacy_id = %input.legacy_id(),
        );

        let trace = AttemptTrace::default();
        let guarded = AssertUnwindSafe(self.run_attempts(input, &trace, operation))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        match guarded {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = match RawFailure::from_panic(payload) {
                    RawFailure::Panic(message) => message,
                    other => other.to_string(),
                };
                span.in_scope(|| {
                    tracing::error!(panic = %message, "outcome machinery failed, quarantining")
                });
                let outcome = RecordOutcome::internal_failure(
                    input,
                    trace.attempts(),
                    format!("internal pipeline failure: {}", message),
                );
                match trace.last_failure() {
                    Some(failure) => outcome.with_failure_details(&failure),
                    None => outcome,
                }
            }
        }
    }

    async fn run_attempts<F, Fut, E>(
        &self,
        input: &RecordInput,
        trace: &AttemptTrace,
        mut operation: F,
    ) -> RecordOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PartialOutcome, E>>,
        E: Into<RawFailure>,
    {
        let mut lifecycle = Lifecycle::new();

        let result = retry::run_with_hook(
            || {
                lifecycle.begin_attempt();
                trace.begin_attempt();
                let attempt = operation();
                async move {
                    let result = attempt.await.map_err(Into::<RawFailure>::into);
                    if let Err(failure) = &result {
                        trace.record_failure(failure);
                    }
                    result
                }
            },
            &self.config.policy,
            self.config.classifier.as_ref(),
            |event| {
                if let Some(hook) = &self.config.on_retry {
                    hook(event);
                }
            },
        )
        .await;

        let outcome = match result {
            Ok(attempted) => {
                RecordOutcome::from_partial(input, attempted.value, attempted.attempts)
            }
            Err(failure) => {
                tracing::warn!(
                    class = %failure.class,
                    code = ?failure.code,
                    stage = ?failure.stage,
                    attempts = failure.attempts,
                    error = %failure.message,
                    "record quarantined"
                );
                RecordOutcome::quarantined(input, &failure)
            }
        };

        match lifecycle.finish(outcome.status()) {
            Ok(_) => {
                tracing::debug!(
                    status = %outcome.status(),
                    attempts = outcome.attempts(),
                    "record finished"
                );
                outcome
            }
            Err(violation) => RecordOutcome::internal_failure(
                input,
                lifecycle.attempts(),
                format!("internal pipeline failure: {}", violation),
            ),
        }
    }
}

/// Run `operation` for `input` with the default policy and classifier.
///
/// Default policy: 3 retries (4 attempts), exponential backoff from 100ms
/// capped at 2s.
pub async fn with_terminal_outcome<F, Fut, E>(input: &RecordInput, operation: F) -> RecordOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PartialOutcome, E>>,
    E: Into<RawFailure>,
{
    TerminalOutcome::default().run(input, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorClass;
    use crate::outcome::{Action, FailureStage, OutcomeStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> TerminalOutcome {
        TerminalOutcome::new(OutcomeConfig::default().with_policy(RetryPolicy::immediate(3)))
    }

    fn input() -> RecordInput {
        RecordInput::new("vendor", "V-42")
    }

    #[tokio::test]
    async fn test_adopts_manual_review_from_operation() {
        let outcome = fast()
            .run(&input(), || async {
                Ok::<_, RawFailure>(PartialOutcome::manual_review("two candidate owners"))
            })
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::ManualReview);
        assert_eq!(outcome.message(), Some("two candidate owners"));
        assert_eq!(outcome.error_class(), None);
        assert_eq!(outcome.attempts(), 1);
    }

    #[tokio::test]
    async fn test_transient_then_loaded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let outcome = fast()
            .run(&input(), || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RawFailure::coded("40001"))
                } else {
                    Ok(PartialOutcome::loaded(Action::Update, "T-9"))
                }
            })
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::Loaded);
        assert_eq!(outcome.action(), Some(Action::Update));
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_transient_is_quarantined_with_stage() {
        let outcome = fast()
            .run(&input(), || async {
                Err::<PartialOutcome, _>(
                    RawFailure::error("deadlock detected")
                        .with_code("40P01")
                        .with_stage(FailureStage::Mutate),
                )
            })
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::Quarantined);
        assert_eq!(outcome.error_class(), Some(ErrorClass::Transient));
        assert_eq!(outcome.error_code(), Some("40P01"));
        assert_eq!(outcome.failure_stage(), Some(FailureStage::Mutate));
        assert_eq!(outcome.attempts(), 4);
    }

    #[tokio::test]
    async fn test_panicking_classifier_still_quarantines() {
        let runner = TerminalOutcome::new(
            OutcomeConfig::default()
                .with_policy(RetryPolicy::immediate(3))
                .with_classifier(|_: &RawFailure| -> ErrorClass { panic!("classifier bug") }),
        );

        let calls = AtomicU32::new(0);
        let counter = &calls;

        let outcome = runner
            .run(&input(), || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<PartialOutcome, _>(
                    RawFailure::coded("40001").with_stage(FailureStage::Mutate),
                )
            })
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::Quarantined);
        assert_eq!(outcome.error_class(), Some(ErrorClass::Permanent));
        assert_eq!(outcome.entity_type(), "vendor");
        assert_eq!(outcome.legacy_id(), "V-42");
        assert!(outcome.message().unwrap().contains("classifier bug"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.error_code(), Some("40001"));
        assert_eq!(outcome.failure_stage(), Some(FailureStage::Mutate));
    }

    #[tokio::test]
    async fn test_panicking_hook_still_quarantines() {
        let runner = TerminalOutcome::new(
            OutcomeConfig::default()
                .with_policy(RetryPolicy::immediate(3))
                .with_retry_hook(|_| panic!("hook bug")),
        );

        let outcome = runner
            .run(&input(), || async {
                Err::<PartialOutcome, _>(RawFailure::coded("08006"))
            })
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::Quarantined);
        assert_eq!(outcome.error_class(), Some(ErrorClass::Permanent));
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.error_code(), Some("08006"));
    }

    #[tokio::test]
    async fn test_machinery_failure_reports_latest_attempt() {
        let classified = Arc::new(AtomicU32::new(0));
        let runner = TerminalOutcome::new(
            OutcomeConfig::default()
                .with_policy(RetryPolicy::immediate(3))
                .with_classifier({
                    let classified = classified.clone();
                    move |_: &RawFailure| -> ErrorClass {
                        if classified.fetch_add(1, Ordering::SeqCst) == 2 {
                            panic!("classifier bug");
                        }
                        ErrorClass::Transient
                    }
                }),
        );
        let op = crate::testing::ScriptedOperation::new(vec![
            Err(RawFailure::coded("40001").with_stage(FailureStage::Load)),
            Err(RawFailure::coded("40P01").with_stage(FailureStage::Transform)),
            Err(RawFailure::coded("57014").with_stage(FailureStage::Mutate)),
        ]);

        let outcome = runner.run(&input(), op.operation()).await;

        assert_eq!(op.invocations(), 3);
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.error_code(), Some("57014"));
        assert_eq!(outcome.failure_stage(), Some(FailureStage::Mutate));
        assert_eq!(outcome.error_class(), Some(ErrorClass::Permanent));
    }

    #[tokio::test]
    async fn test_retry_hook_sees_each_retry() {
        let seen = Arc::new(AtomicU32::new(0));
        let runner = TerminalOutcome::new(
            OutcomeConfig::default()
                .with_policy(RetryPolicy::immediate(2))
                .with_retry_hook({
                    let seen = seen.clone();
                    move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }
                }),
        );

        let outcome = runner
            .run(&input(), || async {
                Err::<PartialOutcome, _>(RawFailure::error("socket hang up"))
            })
            .await;

        assert_eq!(outcome.attempts(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_retries_and_quarantine_are_logged() {
        let outcome = fast()
            .run(&input(), || async {
                Err::<PartialOutcome, _>(RawFailure::coded("57014").with_stage(FailureStage::Load))
            })
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::Quarantined);
        assert!(logs_contain("transient failure, retrying"));
        assert!(logs_contain("record quarantined"));
        assert!(logs_contain("V-42"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_internal_failures_are_logged_as_errors() {
        let runner = TerminalOutcome::new(
            OutcomeConfig::default()
                .with_classifier(|_: &RawFailure| -> ErrorClass { panic!("classifier bug") }),
        );

        let _ = runner
            .run(&input(), || async {
                Err::<PartialOutcome, _>(RawFailure::null())
            })
            .await;

        assert!(logs_contain("outcome machinery failed"));
    }

    #[test]
    fn test_config_debug_hides_closures() {
        let debug = format!("{:?}", OutcomeConfig::default());
        assert!(debug.contains("OutcomeConfig"));
        assert!(debug.contains("policy"));
    }

    #[test]
    fn test_runner_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let runner = TerminalOutcome::default();
        let input = input();
        let fut = runner.run(&input, || async {
            Ok::<_, RawFailure>(PartialOutcome::skipped("dormant account"))
        });
        assert_send(&fut);
    }
}
