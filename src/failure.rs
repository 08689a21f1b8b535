//! Raw failures captured at the operation boundary.
//!
//! Migration operations fail in many shapes: database errors with SQLSTATE
//! codes, network errors, plain strings, "nothing at all", or a panic. A
//! [`RawFailure`] captures each shape as-is so the classifier can inspect it
//! without guessing.
//!
//! Only error-like and coded values carry fields. Attaching a code or stage to
//! a thrown string, null, or panic payload leaves it unchanged.
//!
//! # Examples
//!
//! ```
//! use terminus::{FailureStage, RawFailure};
//!
//! let failure = RawFailure::error("could not serialize access")
//!     .with_code("40001")
//!     .with_stage(FailureStage::Mutate);
//!
//! assert_eq!(failure.code(), Some("40001"));
//! assert_eq!(failure.stage(), Some(FailureStage::Mutate));
//!
//! let null = RawFailure::null().with_stage(FailureStage::Load);
//! assert_eq!(null.stage(), None);
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use crate::outcome::FailureStage;

/// An error-like failure: a message plus optional structured fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    /// Human-readable message.
    pub message: String,
    /// Structured code, e.g. a SQLSTATE (`40001`) or errno name (`ECONNREFUSED`).
    pub code: Option<String>,
    /// Phase of the operation in which the error occurred.
    pub stage: Option<FailureStage>,
}

/// Any value an operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// An error value with a message.
    Error(ErrorDetails),
    /// A non-error value that carries fields but no message.
    Coded {
        /// Structured code, if present.
        code: Option<String>,
        /// Failure stage, if present.
        stage: Option<FailureStage>,
    },
    /// A bare string was raised instead of an error.
    Text(String),
    /// Nothing was raised: a null or unit failure.
    Null,
    /// The operation panicked; holds the panic message when it was a string.
    Panic(String),
}

impl RawFailure {
    /// An error-like failure with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        RawFailure::Error(ErrorDetails {
            message: message.into(),
            code: None,
            stage: None,
        })
    }

    /// A message-less failure carrying only a structured code.
    pub fn coded(code: impl Into<String>) -> Self {
        RawFailure::Coded {
            code: Some(code.into()),
            stage: None,
        }
    }

    /// A bare string failure.
    pub fn text(text: impl Into<String>) -> Self {
        RawFailure::Text(text.into())
    }

    /// A null failure.
    pub fn null() -> Self {
        RawFailure::Null
    }

    /// Capture a panic payload as returned by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        RawFailure::Panic(panic_message(payload.as_ref()))
    }

    /// Attach a structured code. No effect on strings, nulls, or panics.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        match &mut self {
            RawFailure::Error(details) => details.code = Some(code.into()),
            RawFailure::Coded { code: slot, .. } => *slot = Some(code.into()),
            RawFailure::Text(_) | RawFailure::Null | RawFailure::Panic(_) => {}
        }
        self
    }

    /// Attach the failing stage. No effect on strings, nulls, or panics.
    pub fn with_stage(mut self, stage: FailureStage) -> Self {
        match &mut self {
            RawFailure::Error(details) => details.stage = Some(stage),
            RawFailure::Coded { stage: slot, .. } => *slot = Some(stage),
            RawFailure::Text(_) | RawFailure::Null | RawFailure::Panic(_) => {}
        }
        self
    }

    /// The structured code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            RawFailure::Error(details) => details.code.as_deref(),
            RawFailure::Coded { code, .. } => code.as_deref(),
            RawFailure::Text(_) | RawFailure::Null | RawFailure::Panic(_) => None,
        }
    }

    /// The failing stage, if any.
    pub fn stage(&self) -> Option<FailureStage> {
        match self {
            RawFailure::Error(details) => details.stage,
            RawFailure::Coded { stage, .. } => *stage,
            RawFailure::Text(_) | RawFailure::Null | RawFailure::Panic(_) => None,
        }
    }

    /// The error message, for error-like failures only.
    pub fn message(&self) -> Option<&str> {
        match self {
            RawFailure::Error(details) => Some(&details.message),
            _ => None,
        }
    }

    /// Returns true if this is an error value rather than an arbitrary throw.
    pub fn is_error_like(&self) -> bool {
        matches!(self, RawFailure::Error(_))
    }

    /// Capture any standard error by its display message.
    pub fn from_std_error(err: &(dyn std::error::Error + 'static)) -> Self {
        RawFailure::error(err.to_string())
    }
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawFailure::Error(details) => f.write_str(&details.message),
            RawFailure::Coded { code: Some(code), .. } => write!(f, "failure with code {}", code),
            RawFailure::Coded { code: None, .. } => f.write_str("failure without message"),
            RawFailure::Text(text) => write!(f, "non-error value raised: {:?}", text),
            RawFailure::Null => f.write_str("null raised"),
            RawFailure::Panic(message) => write!(f, "operation panicked: {}", message),
        }
    }
}

impl From<ErrorDetails> for RawFailure {
    fn from(details: ErrorDetails) -> Self {
        RawFailure::Error(details)
    }
}

impl From<io::Error> for RawFailure {
    fn from(err: io::Error) -> Self {
        let failure = RawFailure::error(err.to_string());
        match errno_name(err.kind()) {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}

impl From<tokio::time::error::Elapsed> for RawFailure {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RawFailure::error(format!("operation timed out: {}", err)).with_code("ETIMEDOUT")
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for RawFailure {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        RawFailure::error(err.to_string())
    }
}

impl From<String> for RawFailure {
    fn from(text: String) -> Self {
        RawFailure::Text(text)
    }
}

impl From<&str> for RawFailure {
    fn from(text: &str) -> Self {
        RawFailure::Text(text.to_string())
    }
}

impl From<()> for RawFailure {
    fn from(_: ()) -> Self {
        RawFailure::Null
    }
}

/// Bound a future by a per-attempt timeout.
///
/// An elapsed timeout becomes an `ETIMEDOUT` error, which classifies as
/// transient; inner failures pass through unchanged.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use terminus::{failure, RawFailure};
///
/// # tokio_test::block_on(async {
/// let result = failure::timeout(Duration::from_millis(10), async {
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     Ok::<_, RawFailure>(1)
/// })
/// .await;
///
/// assert_eq!(result.unwrap_err().code(), Some("ETIMEDOUT"));
/// # });
/// ```
pub async fn timeout<T, E, F>(duration: Duration, fut: F) -> Result<T, RawFailure>
where
    F: Future<Output = Result<T, E>>,
    E: Into<RawFailure>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(elapsed) => Err(elapsed.into()),
    }
}

fn errno_name(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
        io::ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        io::ErrorKind::NotConnected => Some("ENOTCONN"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::BrokenPipe => Some("EPIPE"),
        _ => None,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_code_and_stage() {
        let failure = RawFailure::error("duplicate key value")
            .with_code("23505")
            .with_stage(FailureStage::Mutate);

        assert!(failure.is_error_like());
        assert_eq!(failure.message(), Some("duplicate key value"));
        assert_eq!(failure.code(), Some("23505"));
        assert_eq!(failure.stage(), Some(FailureStage::Mutate));
    }

    #[test]
    fn test_coded_value_has_no_message() {
        let failure = RawFailure::coded("40P01").with_stage(FailureStage::Load);

        assert!(!failure.is_error_like());
        assert_eq!(failure.message(), None);
        assert_eq!(failure.code(), Some("40P01"));
        assert_eq!(failure.stage(), Some(FailureStage::Load));
    }

    #[test]
    fn test_primitives_ignore_attached_fields() {
        for failure in [RawFailure::null(), RawFailure::text("boom"), RawFailure::Panic("p".into())] {
            let attached = failure.clone().with_code("40001").with_stage(FailureStage::Mutate);
            assert_eq!(attached, failure);
            assert_eq!(attached.code(), None);
        }
    }

    #[test]
    fn test_io_errors_map_to_errno_codes() {
        let refused = RawFailure::from(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connect ECONNREFUSED 127.0.0.1:5432",
        ));
        assert_eq!(refused.code(), Some("ECONNREFUSED"));

        let aborted = RawFailure::from(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "software caused connection abort",
        ));
        assert_eq!(aborted.code(), Some("ECONNABORTED"));

        let detached = RawFailure::from(io::Error::new(
            io::ErrorKind::NotConnected,
            "socket is not connected",
        ));
        assert_eq!(detached.code(), Some("ENOTCONN"));

        let other = RawFailure::from(io::Error::other("disk quota"));
        assert_eq!(other.code(), None);
        assert_eq!(other.message(), Some("disk quota"));
    }

    #[test]
    fn test_panic_payloads_keep_their_message() {
        let from_str = RawFailure::from_panic(Box::new("index out of bounds"));
        assert_eq!(from_str, RawFailure::Panic("index out of bounds".into()));

        let from_string = RawFailure::from_panic(Box::new(String::from("bad state")));
        assert_eq!(from_string, RawFailure::Panic("bad state".into()));

        let opaque = RawFailure::from_panic(Box::new(42u8));
        assert_eq!(opaque, RawFailure::Panic("non-string panic payload".into()));
    }

    #[test]
    fn test_strings_and_unit_are_not_errors() {
        assert_eq!(RawFailure::from("oops"), RawFailure::Text("oops".into()));
        assert_eq!(RawFailure::from(()), RawFailure::Null);
    }

    #[tokio::test]
    async fn test_timeout_passes_inner_failure_through() {
        let result = timeout(Duration::from_secs(1), async {
            Err::<(), _>(RawFailure::coded("23514"))
        })
        .await;

        assert_eq!(result, Err(RawFailure::coded("23514")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapses_to_etimedout() {
        let result = timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, RawFailure>(())
        })
        .await;

        let failure = result.unwrap_err();
        assert!(failure.is_error_like());
        assert_eq!(failure.code(), Some("ETIMEDOUT"));
    }
}
