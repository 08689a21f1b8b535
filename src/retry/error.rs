//! Results of a retried operation.

use std::fmt;
use std::time::Duration;

use crate::classify::ErrorClass;
use crate::failure::RawFailure;
use crate::outcome::FailureStage;

/// A successful value along with how long it took to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// The value produced by the successful attempt.
    pub value: T,
    /// Total number of attempts made, including the successful one.
    pub attempts: u32,
    /// Time from the first attempt until success.
    pub total_duration: Duration,
}

impl<T> Attempted<T> {
    /// Create a new success record.
    pub fn new(value: T, attempts: u32, total_duration: Duration) -> Self {
        Self {
            value,
            attempts,
            total_duration,
        }
    }

    /// Extract the value, discarding metadata.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// The final failure of a retried operation, normalized and classified.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use terminus::{ClassifiedError, ErrorClass, FailureStage, RawFailure};
///
/// let err = ClassifiedError::new(
///     ErrorClass::Permanent,
///     RawFailure::error("duplicate key").with_code("23505").with_stage(FailureStage::Mutate),
///     1,
///     Duration::from_millis(3),
/// );
///
/// assert_eq!(err.code.as_deref(), Some("23505"));
/// assert_eq!(err.stage, Some(FailureStage::Mutate));
/// assert!(err.to_string().contains("permanent"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    /// How the final failure was classified.
    pub class: ErrorClass,
    /// Structured code of the final failure.
    pub code: Option<String>,
    /// Stage the operation attached to the final failure.
    pub stage: Option<FailureStage>,
    /// Readable description of the final failure.
    pub message: String,
    /// Total number of attempts made.
    pub attempts: u32,
    /// Time from the first attempt until giving up.
    pub total_duration: Duration,
    /// The failure exactly as captured.
    pub raw: RawFailure,
}

impl ClassifiedError {
    /// Normalize a raw failure.
    pub fn new(class: ErrorClass, raw: RawFailure, attempts: u32, total_duration: Duration) -> Self {
        Self {
            class,
            code: raw.code().map(str::to_string),
            stage: raw.stage(),
            message: raw.to_string(),
            attempts,
            total_duration,
            raw,
        }
    }

    /// Returns true if the failure was transient, i.e. the budget ran out.
    pub fn is_exhausted(&self) -> bool {
        self.class.is_retryable()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure after {} attempts ({:?})",
            self.class, self.attempts, self.total_duration
        )?;
        if let Some(code) = &self.code {
            write!(f, " [code {}]", code)?;
        }
        if let Some(stage) = self.stage {
            write!(f, " [stage {}]", stage)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ClassifiedError {}
