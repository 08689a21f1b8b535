//! Testing utilities for code built on terminus.
//!
//! Fault injection and assertion helpers for exercising record operations
//! without a database.
//!
//! # Examples
//!
//! ## ScriptedOperation
//!
//! ```rust
//! use terminus::testing::ScriptedOperation;
//! use terminus::{Action, OutcomeConfig, PartialOutcome, RawFailure, RecordInput, RetryPolicy, TerminalOutcome};
//!
//! # tokio_test::block_on(async {
//! let op = ScriptedOperation::new(vec![
//!     Err(RawFailure::coded("40001")),
//!     Ok(PartialOutcome::loaded(Action::Create, "A1")),
//! ]);
//!
//! let runner = TerminalOutcome::new(OutcomeConfig::default().with_policy(RetryPolicy::immediate(3)));
//! let outcome = runner.run(&RecordInput::new("customer", "C-1"), op.operation()).await;
//!
//! assert_eq!(outcome.target_id(), Some("A1"));
//! assert_eq!(op.invocations(), 2);
//! # });
//! ```
//!
//! ## Assertion Macros
//!
//! ```rust
//! use terminus::{assert_quarantined, assert_status};
//! use terminus::testing::ScriptedOperation;
//! use terminus::{ErrorClass, OutcomeStatus, RawFailure, RecordInput, with_terminal_outcome};
//!
//! # tokio_test::block_on(async {
//! let op = ScriptedOperation::failing(RawFailure::coded("23505"));
//! let outcome = with_terminal_outcome(&RecordInput::new("customer", "C-2"), op.operation()).await;
//!
//! assert_status!(outcome, OutcomeStatus::Quarantined);
//! assert_quarantined!(outcome, ErrorClass::Permanent);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{ready, Ready};

use crate::failure::RawFailure;
use crate::outcome::PartialOutcome;

/// One scripted attempt result.
pub type Step = Result<PartialOutcome, RawFailure>;

/// An operation that replays a fixed script of results.
///
/// Each invocation pops the next step; once one step remains it is repeated
/// forever. Clones share the script and the invocation counter.
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    steps: Arc<Mutex<VecDeque<Step>>>,
    invocations: Arc<AtomicU32>,
}

impl ScriptedOperation {
    /// Replay `steps` in order, repeating the last one.
    ///
    /// An empty script behaves like a null failure on every attempt.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail every attempt with `failure`.
    pub fn failing(failure: RawFailure) -> Self {
        Self::new(vec![Err(failure)])
    }

    /// Succeed on every attempt with `outcome`.
    pub fn succeeding(outcome: PartialOutcome) -> Self {
        Self::new(vec![Ok(outcome)])
    }

    /// Fail `times` times with `failure`, then succeed with `outcome`.
    pub fn flaky(failure: RawFailure, times: usize, outcome: PartialOutcome) -> Self {
        let mut steps: Vec<Step> = std::iter::repeat_n(Err(failure), times).collect();
        steps.push(Ok(outcome));
        Self::new(steps)
    }

    /// How many times the operation has been invoked.
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Produce the next step.
    pub fn next_step(&self) -> Step {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match steps.len() {
            0 => Err(RawFailure::Null),
            1 => steps[0].clone(),
            _ => steps.pop_front().unwrap_or(Err(RawFailure::Null)),
        }
    }

    /// A closure suitable for [`TerminalOutcome::run`](crate::TerminalOutcome::run).
    pub fn operation(&self) -> impl FnMut() -> Ready<Step> + Send + 'static {
        let this = self.clone();
        move || ready(this.next_step())
    }
}

/// Assert that an outcome has the given status.
///
/// # Example
///
/// ```rust,ignore
/// assert_status!(outcome, OutcomeStatus::Loaded);
/// ```
#[macro_export]
macro_rules! assert_status {
    ($outcome:expr, $status:expr) => {{
        let outcome = &$outcome;
        if outcome.status() != $status {
            panic!(
                "Expected status {}, got {}: {:?}",
                $status,
                outcome.status(),
                outcome
            );
        }
    }};
}

/// Assert that an outcome was quarantined with the given error class.
///
/// # Example
///
/// ```rust,ignore
/// assert_quarantined!(outcome, ErrorClass::Transient);
/// ```
#[macro_export]
macro_rules! assert_quarantined {
    ($outcome:expr, $class:expr) => {{
        let outcome = &$outcome;
        match (outcome.status(), outcome.error_class()) {
            ($crate::OutcomeStatus::Quarantined, Some(class)) if class == $class => {}
            (status, class) => panic!(
                "Expected quarantined with {}, got {} with {:?}: {:?}",
                $class, status, class, outcome
            ),
        }
    }};
}

#[cfg(feature = "proptest")]
pub use strategies::{any_partial_outcome, any_raw_failure};

/// Proptest strategies for failures and successful results.
#[cfg(feature = "proptest")]
pub mod strategies {
    use proptest::prelude::*;

    use crate::failure::RawFailure;
    use crate::outcome::{Action, FailureStage, PartialOutcome};

    fn any_stage() -> impl Strategy<Value = Option<FailureStage>> {
        prop::option::of(prop_oneof![
            Just(FailureStage::Load),
            Just(FailureStage::Transform),
            Just(FailureStage::Mutate),
        ])
    }

    fn any_code() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(crate::classify::TRANSIENT_CODES).prop_map(str::to_string),
            prop::sample::select(crate::classify::PERMANENT_CODES).prop_map(str::to_string),
            "[0-9A-Z]{5}",
        ]
    }

    /// Any raw failure shape, with realistic codes and messages.
    pub fn any_raw_failure() -> impl Strategy<Value = RawFailure> {
        prop_oneof![
            (".*", prop::option::of(any_code()), any_stage()).prop_map(
                |(message, code, stage)| {
                    let failure = RawFailure::error(message);
                    let failure = match code {
                        Some(code) => failure.with_code(code),
                        None => failure,
                    };
                    match stage {
                        Some(stage) => failure.with_stage(stage),
                        None => failure,
                    }
                }
            ),
            (prop::option::of(any_code()), any_stage())
                .prop_map(|(code, stage)| RawFailure::Coded { code, stage }),
            ".*".prop_map(RawFailure::Text),
            Just(RawFailure::Null),
            ".*".prop_map(RawFailure::Panic),
        ]
    }

    /// Any successful operation result.
    pub fn any_partial_outcome() -> impl Strategy<Value = PartialOutcome> {
        prop_oneof![
            (
                prop_oneof![
                    Just(Action::Create),
                    Just(Action::Update),
                    Just(Action::Upsert),
                    Just(Action::Delete),
                ],
                "[A-Z][0-9]{1,4}",
            )
                .prop_map(|(action, target)| PartialOutcome::loaded(action, target)),
            prop::option::of(".*").prop_map(|reason| PartialOutcome::ManualReview { reason }),
            prop::option::of(".*").prop_map(|reason| PartialOutcome::Skipped { reason }),
        ]
    }
}
