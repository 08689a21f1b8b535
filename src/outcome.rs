//! Record identity and terminal outcome types.
//!
//! A [`RecordInput`] names one unit of migration work. Running it through
//! [`TerminalOutcome`](crate::TerminalOutcome) always produces exactly one
//! [`RecordOutcome`], whose [`OutcomeStatus`] is drawn from a closed set of
//! terminal states.
//!
//! # Examples
//!
//! ```
//! use terminus::{Action, PartialOutcome, RecordInput};
//!
//! let input = RecordInput::new("customer", "C-1001");
//! assert_eq!(input.entity_type(), "customer");
//!
//! let partial = PartialOutcome::loaded(Action::Create, "A1");
//! assert_eq!(partial.status(), terminus::OutcomeStatus::Loaded);
//! ```

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::classify::ErrorClass;
use crate::failure::RawFailure;
use crate::retry::ClassifiedError;

/// Identity of one unit of migration work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordInput {
    entity_type: String,
    legacy_id: String,
}

impl RecordInput {
    /// Create a record identity from the logical kind and the source-system id.
    pub fn new(entity_type: impl Into<String>, legacy_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            legacy_id: legacy_id.into(),
        }
    }

    /// The logical record kind being migrated.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The source-system identifier.
    pub fn legacy_id(&self) -> &str {
        &self.legacy_id
    }
}

impl fmt::Display for RecordInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.legacy_id)
    }
}

/// Terminal status of a record. No status leaves this set once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum OutcomeStatus {
    /// The operation wrote the target record.
    Loaded,
    /// Every attempt failed; the record needs offline remediation.
    Quarantined,
    /// The operation succeeded but flagged the record for human judgment.
    ManualReview,
    /// The operation decided, by business rule, not to migrate the record.
    Skipped,
}

impl OutcomeStatus {
    /// All terminal statuses.
    pub const ALL: [OutcomeStatus; 4] = [
        OutcomeStatus::Loaded,
        OutcomeStatus::Quarantined,
        OutcomeStatus::ManualReview,
        OutcomeStatus::Skipped,
    ];

    /// Snake-case name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Loaded => "loaded",
            OutcomeStatus::Quarantined => "quarantined",
            OutcomeStatus::ManualReview => "manual_review",
            OutcomeStatus::Skipped => "skipped",
        }
    }

    /// Returns true only for [`OutcomeStatus::Quarantined`].
    pub fn is_failure(&self) -> bool {
        matches!(self, OutcomeStatus::Quarantined)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful load did to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Action {
    /// A new target record was created.
    Create,
    /// An existing target record was updated.
    Update,
    /// The target was created or updated by a single upsert.
    Upsert,
    /// The target record was removed.
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Upsert => "upsert",
            Action::Delete => "delete",
        })
    }
}

/// The phase of a multi-step operation in which a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FailureStage {
    /// Reading the legacy record.
    Load,
    /// Mapping legacy fields to the target shape.
    Transform,
    /// Writing the target record.
    Mutate,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Load => "load",
            FailureStage::Transform => "transform",
            FailureStage::Mutate => "mutate",
        })
    }
}

/// Error returned when parsing an unrecognized stage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown failure stage: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl FromStr for FailureStage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load" => Ok(FailureStage::Load),
            "transform" => Ok(FailureStage::Transform),
            "mutate" => Ok(FailureStage::Mutate),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// The successful result of a wrapped operation.
///
/// Quarantine is deliberately absent: only the pipeline assigns it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "status", rename_all = "snake_case")
)]
pub enum PartialOutcome {
    /// The target record was written.
    Loaded {
        /// What was done to the target.
        action: Action,
        /// Identifier of the created or updated target record.
        target_id: String,
    },
    /// The record needs a human decision.
    ManualReview {
        /// Optional explanation for the reviewer.
        reason: Option<String>,
    },
    /// The record was intentionally not migrated.
    Skipped {
        /// Optional explanation for the report.
        reason: Option<String>,
    },
}

impl PartialOutcome {
    /// A loaded outcome.
    pub fn loaded(action: Action, target_id: impl Into<String>) -> Self {
        PartialOutcome::Loaded {
            action,
            target_id: target_id.into(),
        }
    }

    /// A manual-review outcome with a reason.
    pub fn manual_review(reason: impl Into<String>) -> Self {
        PartialOutcome::ManualReview {
            reason: Some(reason.into()),
        }
    }

    /// A skipped outcome with a reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        PartialOutcome::Skipped {
            reason: Some(reason.into()),
        }
    }

    /// The terminal status this partial outcome maps to.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            PartialOutcome::Loaded { .. } => OutcomeStatus::Loaded,
            PartialOutcome::ManualReview { .. } => OutcomeStatus::ManualReview,
            PartialOutcome::Skipped { .. } => OutcomeStatus::Skipped,
        }
    }
}

/// The terminal result for one [`RecordInput`].
///
/// Built once by the pipeline and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordOutcome {
    entity_type: String,
    legacy_id: String,
    status: OutcomeStatus,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    action: Option<Action>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    target_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    error_class: Option<ErrorClass>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    error_code: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    failure_stage: Option<FailureStage>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    message: Option<String>,
    attempts: u32,
}

impl RecordOutcome {
    fn identity(input: &RecordInput, status: OutcomeStatus, attempts: u32) -> Self {
        Self {
            entity_type: input.entity_type.clone(),
            legacy_id: input.legacy_id.clone(),
            status,
            action: None,
            target_id: None,
            error_class: None,
            error_code: None,
            failure_stage: None,
            message: None,
            attempts,
        }
    }

    /// Adopt the status chosen by a successful operation.
    pub(crate) fn from_partial(input: &RecordInput, partial: PartialOutcome, attempts: u32) -> Self {
        let mut outcome = Self::identity(input, partial.status(), attempts);
        match partial {
            PartialOutcome::Loaded { action, target_id } => {
                outcome.action = Some(action);
                outcome.target_id = Some(target_id);
            }
            PartialOutcome::ManualReview { reason } | PartialOutcome::Skipped { reason } => {
                outcome.message = reason;
            }
        }
        outcome
    }

    /// Quarantine a record whose final attempt failed.
    pub(crate) fn quarantined(input: &RecordInput, failure: &ClassifiedError) -> Self {
        let mut outcome = Self::identity(input, OutcomeStatus::Quarantined, failure.attempts);
        outcome.error_class = Some(failure.class);
        outcome.error_code = failure.code.clone();
        outcome.failure_stage = failure.stage;
        outcome.message = Some(failure.message.clone());
        outcome
    }

    /// Quarantine a record because the pipeline's own machinery failed.
    pub(crate) fn internal_failure(
        input: &RecordInput,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::identity(input, OutcomeStatus::Quarantined, attempts);
        outcome.error_class = Some(ErrorClass::Permanent);
        outcome.message = Some(message.into());
        outcome
    }

    /// Attach the code and stage of the last failure seen before quarantine.
    pub(crate) fn with_failure_details(mut self, failure: &RawFailure) -> Self {
        self.error_code = failure.code().map(str::to_string);
        self.failure_stage = failure.stage();
        self
    }

    /// The logical record kind, copied from the input.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The source-system identifier, copied from the input.
    pub fn legacy_id(&self) -> &str {
        &self.legacy_id
    }

    /// The terminal status.
    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    /// What the operation did, for loaded records.
    pub fn action(&self) -> Option<Action> {
        self.action
    }

    /// The target record id, for loaded records.
    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// Classification of the final failure, for quarantined records.
    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error_class
    }

    /// Structured error code of the final failure, if one was attached.
    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    /// The phase in which the final failure originated, if the operation said.
    pub fn failure_stage(&self) -> Option<FailureStage> {
        self.failure_stage
    }

    /// Error message for quarantined records, or the business reason for
    /// skipped and manual-review records.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// How many times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns true if the record was quarantined.
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.entity_type, self.legacy_id, self.status)?;
        if let Some(class) = self.error_class {
            write!(f, " ({}", class)?;
            if let Some(code) = &self.error_code {
                write!(f, ", code {}", code)?;
            }
            if let Some(stage) = self.failure_stage {
                write!(f, ", stage {}", stage)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
