//! Per-status counts over a set of outcomes.
//!
//! Summaries combine associatively and commutatively, with
//! [`OutcomeSummary::default`] as the identity, so records can be tallied in
//! any order, in parallel, and merged afterwards.
//!
//! # Examples
//!
//! ```
//! use terminus::{OutcomeStatus, OutcomeSummary};
//!
//! let a = OutcomeSummary::from_counts(18, 2, 0, 0);
//! let b = OutcomeSummary::from_counts(1, 0, 1, 3);
//! let total = a.combine(b);
//!
//! assert_eq!(total.count(OutcomeStatus::Loaded), 19);
//! assert_eq!(total.total(), 25);
//! assert_eq!(a.to_string(), "18 loaded, 2 quarantined, 0 manual_review, 0 skipped");
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::classify::ErrorClass;
use crate::outcome::{OutcomeStatus, RecordOutcome};

/// Counts of outcomes by status, plus quarantines by error class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutcomeSummary {
    /// Loaded records.
    pub loaded: u64,
    /// Quarantined records.
    pub quarantined: u64,
    /// Records flagged for manual review.
    pub manual_review: u64,
    /// Skipped records.
    pub skipped: u64,
    /// Quarantines caused by exhausted transient failures.
    pub transient_failures: u64,
    /// Quarantines caused by permanent or unknown failures.
    pub permanent_failures: u64,
}

impl OutcomeSummary {
    /// A summary with the given per-status counts and no class breakdown.
    pub fn from_counts(loaded: u64, quarantined: u64, manual_review: u64, skipped: u64) -> Self {
        Self {
            loaded,
            quarantined,
            manual_review,
            skipped,
            ..Self::default()
        }
    }

    /// Tally one outcome.
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome.status() {
            OutcomeStatus::Loaded => self.loaded += 1,
            OutcomeStatus::ManualReview => self.manual_review += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Quarantined => {
                self.quarantined += 1;
                match outcome.error_class() {
                    Some(ErrorClass::Transient) => self.transient_failures += 1,
                    Some(ErrorClass::Permanent | ErrorClass::Unknown) | None => {
                        self.permanent_failures += 1
                    }
                }
            }
        }
    }

    /// Merge two summaries.
    pub fn combine(self, other: Self) -> Self {
        Self {
            loaded: self.loaded + other.loaded,
            quarantined: self.quarantined + other.quarantined,
            manual_review: self.manual_review + other.manual_review,
            skipped: self.skipped + other.skipped,
            transient_failures: self.transient_failures + other.transient_failures,
            permanent_failures: self.permanent_failures + other.permanent_failures,
        }
    }

    /// Count for one status.
    pub fn count(&self, status: OutcomeStatus) -> u64 {
        match status {
            OutcomeStatus::Loaded => self.loaded,
            OutcomeStatus::Quarantined => self.quarantined,
            OutcomeStatus::ManualReview => self.manual_review,
            OutcomeStatus::Skipped => self.skipped,
        }
    }

    /// Total number of outcomes tallied.
    pub fn total(&self) -> u64 {
        OutcomeStatus::ALL.iter().map(|status| self.count(*status)).sum()
    }

    /// Returns true if nothing was quarantined.
    pub fn is_clean(&self) -> bool {
        self.quarantined == 0
    }
}

impl Add for OutcomeSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.combine(other)
    }
}

impl Sum for OutcomeSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Self::combine)
    }
}

impl<'a> Extend<&'a RecordOutcome> for OutcomeSummary {
    fn extend<I: IntoIterator<Item = &'a RecordOutcome>>(&mut self, iter: I) {
        for outcome in iter {
            self.record(outcome);
        }
    }
}

impl<'a> FromIterator<&'a RecordOutcome> for OutcomeSummary {
    fn from_iter<I: IntoIterator<Item = &'a RecordOutcome>>(iter: I) -> Self {
        let mut summary = Self::default();
        summary.extend(iter);
        summary
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = OutcomeStatus::ALL
            .iter()
            .map(|status| format!("{} {}", self.count(*status), status))
            .collect();
        f.write_str(&parts.join(", "))
    }
}
