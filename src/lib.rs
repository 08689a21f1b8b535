//! # Terminus
//!
//! > *Every record reaches the end of the line.*
//!
//! Terminus drives a single legacy-record migration attempt to a guaranteed
//! terminal result. It classifies failures, retries the recoverable ones, and
//! quarantines the rest. The wrapped operation is opaque: terminus only owns
//! the execution envelope around it.
//!
//! ## Guarantees
//!
//! - One input, exactly one [`RecordOutcome`], with a status from the closed
//!   set `loaded | quarantined | manual_review | skipped`.
//! - [`TerminalOutcome::run`] never panics and never returns an error. Failure
//!   leaves only as data on the outcome.
//! - Only transient failures are retried, sequentially, with non-decreasing
//!   backoff. Permanent and unrecognized failures stop immediately.
//!
//! ## Quick Example
//!
//! ```rust
//! use terminus::{
//!     with_terminal_outcome, Action, ErrorClass, FailureStage, OutcomeStatus, PartialOutcome,
//!     RawFailure, RecordInput,
//! };
//!
//! # tokio_test::block_on(async {
//! let input = RecordInput::new("invoice", "INV-2291");
//!
//! let outcome = with_terminal_outcome(&input, || async {
//!     // Look up, transform and write the target record here.
//!     Ok::<_, RawFailure>(PartialOutcome::loaded(Action::Create, "A1"))
//! })
//! .await;
//! assert_eq!(outcome.status(), OutcomeStatus::Loaded);
//!
//! let outcome = with_terminal_outcome(&input, || async {
//!     Err::<PartialOutcome, _>(
//!         RawFailure::error("new row violates check constraint")
//!             .with_code("23514")
//!             .with_stage(FailureStage::Mutate),
//!     )
//! })
//! .await;
//! assert_eq!(outcome.status(), OutcomeStatus::Quarantined);
//! assert_eq!(outcome.error_class(), Some(ErrorClass::Permanent));
//! assert_eq!(outcome.failure_stage(), Some(FailureStage::Mutate));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod batch;
pub mod classify;
pub mod failure;
pub mod lifecycle;
pub mod outcome;
pub mod retry;
pub mod summary;
pub mod terminal;
pub mod testing;

// Re-exports
pub use batch::{run_batch, BatchReport};
pub use classify::{classify, Classifier, Classify, ErrorClass};
pub use failure::{ErrorDetails, RawFailure};
pub use lifecycle::{InvalidTransition, RecordState};
pub use outcome::{
    Action, FailureStage, OutcomeStatus, PartialOutcome, RecordInput, RecordOutcome,
};
pub use retry::{Attempted, ClassifiedError, RetryEvent, RetryPolicy};
pub use summary::OutcomeSummary;
pub use terminal::{with_terminal_outcome, OutcomeConfig, TerminalOutcome};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classify::{Classify, ErrorClass};
    pub use crate::failure::RawFailure;
    pub use crate::outcome::{
        Action, FailureStage, OutcomeStatus, PartialOutcome, RecordInput, RecordOutcome,
    };
    pub use crate::retry::RetryPolicy;
    pub use crate::terminal::{with_terminal_outcome, OutcomeConfig, TerminalOutcome};
}
