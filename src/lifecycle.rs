//! Per-record processing states.
//!
//! ```text
//! Pending -> Running -> { Loaded, Skipped, ManualReview }
//!                    \-> Quarantined
//!                    \-> Retrying(2) -> Retrying(3) -> ... -> { any terminal state }
//! ```
//!
//! The four right-hand states are terminal: no transition leaves them.

use std::fmt;

use crate::outcome::OutcomeStatus;

/// Where a record is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Not started.
    Pending,
    /// First attempt in progress.
    Running,
    /// A retry attempt in progress (attempt number, 2-indexed onward).
    Retrying(u32),
    /// Terminal: target written.
    Loaded,
    /// Terminal: intentionally not migrated.
    Skipped,
    /// Terminal: flagged for human review.
    ManualReview,
    /// Terminal: failed and set aside.
    Quarantined,
}

impl RecordState {
    /// Returns true for the four terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Loaded
                | RecordState::Skipped
                | RecordState::ManualReview
                | RecordState::Quarantined
        )
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: RecordState) -> bool {
        use RecordState::*;
        match (*self, next) {
            (Pending, Running) => true,
            (Running, Retrying(n)) => n == 2,
            (Retrying(current), Retrying(n)) => n == current + 1,
            (Running | Retrying(_), terminal) => terminal.is_terminal(),
            _ => false,
        }
    }

    /// Move to `next`, or report the illegal transition.
    pub fn transition(self, next: RecordState) -> Result<RecordState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl From<OutcomeStatus> for RecordState {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Loaded => RecordState::Loaded,
            OutcomeStatus::Quarantined => RecordState::Quarantined,
            OutcomeStatus::ManualReview => RecordState::ManualReview,
            OutcomeStatus::Skipped => RecordState::Skipped,
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Pending => f.write_str("pending"),
            RecordState::Running => f.write_str("running"),
            RecordState::Retrying(attempt) => write!(f, "retrying (attempt {})", attempt),
            RecordState::Loaded => f.write_str("loaded"),
            RecordState::Skipped => f.write_str("skipped"),
            RecordState::ManualReview => f.write_str("manual_review"),
            RecordState::Quarantined => f.write_str("quarantined"),
        }
    }
}

/// An illegal state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    /// State before the attempted transition.
    pub from: RecordState,
    /// Requested state.
    pub to: RecordState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal record transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Tracks one record's state across attempts.
///
/// Illegal transitions are remembered instead of panicking so the caller can
/// turn them into a quarantined outcome.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: RecordState,
    attempts: u32,
    violation: Option<InvalidTransition>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: RecordState::Pending,
            attempts: 0,
            violation: None,
        }
    }

    /// Called right before each invocation of the operation.
    pub(crate) fn begin_attempt(&mut self) {
        self.attempts += 1;
        let next = if self.attempts == 1 {
            RecordState::Running
        } else {
            RecordState::Retrying(self.attempts)
        };
        self.advance(next);
    }

    /// Move into the terminal state for `status`.
    pub(crate) fn finish(&mut self, status: OutcomeStatus) -> Result<RecordState, InvalidTransition> {
        self.advance(status.into());
        match self.violation {
            Some(violation) => Err(violation),
            None => Ok(self.state),
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    fn advance(&mut self, next: RecordState) {
        match self.state.transition(next) {
            Ok(state) => {
                tracing::trace!(from = %self.state, to = %state, "record state");
                self.state = state;
            }
            Err(violation) => {
                tracing::error!(%violation, "record lifecycle violated");
                self.violation.get_or_insert(violation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path() {
        let state = RecordState::Pending
            .transition(RecordState::Running)
            .and_then(|s| s.transition(RecordState::Loaded));
        assert_eq!(state, Ok(RecordState::Loaded));
    }

    #[test]
    fn test_retry_path_ends_in_quarantine() {
        let state = RecordState::Pending
            .transition(RecordState::Running)
            .and_then(|s| s.transition(RecordState::Retrying(2)))
            .and_then(|s| s.transition(RecordState::Retrying(3)))
            .and_then(|s| s.transition(RecordState::Quarantined));
        assert_eq!(state, Ok(RecordState::Quarantined));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let terminals = [
            RecordState::Loaded,
            RecordState::Skipped,
            RecordState::ManualReview,
            RecordState::Quarantined,
        ];
        let all = [
            RecordState::Pending,
            RecordState::Running,
            RecordState::Retrying(2),
            RecordState::Loaded,
            RecordState::Skipped,
            RecordState::ManualReview,
            RecordState::Quarantined,
        ];

        for from in terminals {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_pending_cannot_jump_to_terminal() {
        let err = RecordState::Pending
            .transition(RecordState::Loaded)
            .unwrap_err();
        assert_eq!(err.from, RecordState::Pending);
        assert!(err.to_string().contains("pending -> loaded"));
    }

    #[test]
    fn test_retry_numbers_must_be_consecutive() {
        assert!(!RecordState::Running.can_transition_to(RecordState::Retrying(3)));
        assert!(!RecordState::Retrying(2).can_transition_to(RecordState::Retrying(2)));
    }

    #[test]
    fn test_lifecycle_tracks_attempts() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin_attempt();
        lifecycle.begin_attempt();
        lifecycle.begin_attempt();

        assert_eq!(lifecycle.attempts(), 3);
        assert_eq!(
            lifecycle.finish(OutcomeStatus::Quarantined),
            Ok(RecordState::Quarantined)
        );
    }

    #[test]
    fn test_lifecycle_reports_finish_without_attempt() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.finish(OutcomeStatus::Loaded).unwrap_err();
        assert_eq!(err.from, RecordState::Pending);
    }
}
