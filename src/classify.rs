//! Failure classification.
//!
//! [`classify`] maps a [`RawFailure`] to an [`ErrorClass`]. It is pure, total
//! and deterministic. Rules apply in priority order:
//!
//! 1. A recognized structured code is looked up in the transient and permanent
//!    code tables.
//! 2. An error-like failure is matched against known transient message
//!    fragments (case-insensitive).
//! 3. Everything else (strings, nulls, panics, unrecognized codes, unmatched
//!    messages) is permanent. Unknown failures are never assumed safe to retry.
//!
//! # Examples
//!
//! ```
//! use terminus::{classify, ErrorClass, RawFailure};
//!
//! assert_eq!(classify(&RawFailure::coded("40P01")), ErrorClass::Transient);
//! assert_eq!(classify(&RawFailure::coded("23505")), ErrorClass::Permanent);
//! assert_eq!(
//!     classify(&RawFailure::error("connect ECONNREFUSED 10.0.0.5:5432")),
//!     ErrorClass::Transient
//! );
//! assert_eq!(classify(&RawFailure::null()), ErrorClass::Permanent);
//! ```

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::failure::RawFailure;

/// Codes that indicate an infrastructure hiccup worth retrying.
pub const TRANSIENT_CODES: &[&str] = &[
    // serialization_failure
    "40001",
    // deadlock_detected
    "40P01",
    // connection_exception family
    "08000",
    "08001",
    "08003",
    "08004",
    "08006",
    // query_canceled (statement timeout)
    "57014",
    "ECONNREFUSED",
    "ECONNRESET",
    "ECONNABORTED",
    "ENOTCONN",
    "ETIMEDOUT",
    "EPIPE",
    "EAI_AGAIN",
];

/// Codes that indicate bad data; retrying will not help.
pub const PERMANENT_CODES: &[&str] = &[
    // not_null_violation
    "23502",
    // foreign_key_violation
    "23503",
    // unique_violation
    "23505",
    // check_violation
    "23514",
];

/// Message fragments that indicate a transient failure.
pub const TRANSIENT_MESSAGES: &[&str] = &[
    "socket hang up",
    "econnrefused",
    "econnreset",
    "etimedout",
    "timeout",
    "timed out",
    "could not serialize access",
    "deadlock detected",
    "connection terminated unexpectedly",
];

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ErrorClass {
    /// Expected to succeed if the same operation is retried unchanged.
    Transient,
    /// Will not succeed on retry.
    Permanent,
    /// Unrecognized; handled exactly like [`ErrorClass::Permanent`].
    Unknown,
}

impl ErrorClass {
    /// Returns true only for [`ErrorClass::Transient`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    /// Snake-case name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can classify a raw failure.
///
/// Implemented by [`Classifier`] and by any `Fn(&RawFailure) -> ErrorClass`,
/// so tests and callers can swap in their own rules.
pub trait Classify {
    /// Classify one failure. Must not panic.
    fn classify(&self, failure: &RawFailure) -> ErrorClass;
}

impl<F> Classify for F
where
    F: Fn(&RawFailure) -> ErrorClass,
{
    fn classify(&self, failure: &RawFailure) -> ErrorClass {
        self(failure)
    }
}

/// Classify with the default tables.
pub fn classify(failure: &RawFailure) -> ErrorClass {
    Classifier::default().classify(failure)
}

/// The table-driven classifier.
///
/// The built-in tables are always consulted; extra codes and message
/// fragments extend them. Extra permanent codes win over built-in transient
/// ones, so a caller can pin a code as non-retryable.
///
/// # Examples
///
/// ```
/// use terminus::{Classifier, Classify, ErrorClass, RawFailure};
///
/// let classifier = Classifier::new()
///     .with_transient_code("55P03")
///     .with_transient_message("too many clients");
///
/// assert_eq!(classifier.classify(&RawFailure::coded("55P03")), ErrorClass::Transient);
/// assert_eq!(
///     classifier.classify(&RawFailure::error("FATAL: too many clients already")),
///     ErrorClass::Transient
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classifier {
    transient_codes: Vec<String>,
    permanent_codes: Vec<String>,
    transient_messages: Vec<String>,
}

impl Classifier {
    /// A classifier with only the built-in tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat an additional code as transient.
    pub fn with_transient_code(mut self, code: impl Into<String>) -> Self {
        self.transient_codes.push(code.into());
        self
    }

    /// Treat an additional code as permanent.
    pub fn with_permanent_code(mut self, code: impl Into<String>) -> Self {
        self.permanent_codes.push(code.into());
        self
    }

    /// Treat error messages containing `fragment` as transient.
    pub fn with_transient_message(mut self, fragment: impl Into<String>) -> Self {
        self.transient_messages
            .push(fragment.into().to_ascii_lowercase());
        self
    }

    fn code_class(&self, code: &str) -> Option<ErrorClass> {
        let matches = |known: &str| known.eq_ignore_ascii_case(code);

        if self.permanent_codes.iter().any(|c| matches(c)) {
            Some(ErrorClass::Permanent)
        } else if TRANSIENT_CODES.iter().any(|c| matches(c))
            || self.transient_codes.iter().any(|c| matches(c))
        {
            Some(ErrorClass::Transient)
        } else if PERMANENT_CODES.iter().any(|c| matches(c)) {
            Some(ErrorClass::Permanent)
        } else {
            None
        }
    }

    fn is_transient_message(&self, message: &str) -> bool {
        let message = message.to_ascii_lowercase();
        TRANSIENT_MESSAGES
            .iter()
            .any(|fragment| message.contains(fragment))
            || self
                .transient_messages
                .iter()
                .any(|fragment| message.contains(fragment.as_str()))
    }
}

impl Classify for Classifier {
    fn classify(&self, failure: &RawFailure) -> ErrorClass {
        if let Some(class) = failure.code().and_then(|code| self.code_class(code)) {
            return class;
        }

        match failure {
            RawFailure::Error(details) if self.is_transient_message(&details.message) => {
                ErrorClass::Transient
            }
            RawFailure::Error(_) => ErrorClass::Permanent,
            RawFailure::Coded { .. }
            | RawFailure::Text(_)
            | RawFailure::Null
            | RawFailure::Panic(_) => ErrorClass::Permanent,
        }
    }
}
