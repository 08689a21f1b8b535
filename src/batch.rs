//! Running many records with bounded concurrency.
//!
//! Records are independent: one record's failure never blocks or aborts
//! another. A batch of N inputs always yields N outcomes, returned in input
//! order.

use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::failure::RawFailure;
use crate::outcome::{PartialOutcome, RecordInput, RecordOutcome};
use crate::summary::OutcomeSummary;
use crate::terminal::TerminalOutcome;

/// Outcomes of a batch, one per input, plus their tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// One outcome per input, in input order.
    pub outcomes: Vec<RecordOutcome>,
    /// Per-status counts over `outcomes`.
    pub summary: OutcomeSummary,
}

impl BatchReport {
    /// Outcomes that ended in quarantine.
    pub fn quarantined(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_failure())
    }
}

/// Run every input through `runner`, at most `fanout` at a time.
///
/// `make_operation` builds the operation for each input. A `fanout` of zero is
/// treated as one.
///
/// # Examples
///
/// ```rust
/// use terminus::{batch, Action, PartialOutcome, RawFailure, RecordInput, TerminalOutcome};
///
/// # tokio_test::block_on(async {
/// let inputs: Vec<_> = (1..=3)
///     .map(|n| RecordInput::new("account", format!("ACC-{}", n)))
///     .collect();
///
/// let report = batch::run_batch(&TerminalOutcome::default(), &inputs, 2, |input| {
///     let target = format!("T-{}", input.legacy_id());
///     move || {
///         let target = target.clone();
///         async move { Ok::<_, RawFailure>(PartialOutcome::loaded(Action::Create, target)) }
///     }
/// })
/// .await;
///
/// assert_eq!(report.outcomes.len(), 3);
/// assert_eq!(report.summary.loaded, 3);
/// assert_eq!(report.outcomes[0].target_id(), Some("T-ACC-1"));
/// # });
/// ```
pub async fn run_batch<M, F, Fut, E>(
    runner: &TerminalOutcome,
    inputs: &[RecordInput],
    fanout: usize,
    make_operation: M,
) -> BatchReport
where
    M: Fn(&RecordInput) -> F,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PartialOutcome, E>>,
    E: Into<RawFailure>,
{
    let fanout = fanout.max(1);
    tracing::debug!(records = inputs.len(), fanout, "starting batch");

    let mut indexed: Vec<(usize, RecordOutcome)> = stream::iter(inputs.iter().enumerate())
        .map(|(index, input)| {
            let operation = make_operation(input);
            async move { (index, runner.run(input, operation).await) }
        })
        .buffer_unordered(fanout)
        .collect()
        .await;

    indexed.sort_unstable_by_key(|(index, _)| *index);
    let outcomes: Vec<RecordOutcome> = indexed.into_iter().map(|(_, outcome)| outcome).collect();
    let summary: OutcomeSummary = outcomes.iter().collect();

    tracing::info!(%summary, "batch finished");
    BatchReport { outcomes, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{Action, OutcomeStatus};
    use crate::retry::RetryPolicy;
    use crate::terminal::OutcomeConfig;

    #[tokio::test]
    async fn test_empty_batch_yields_empty_report() {
        let report = run_batch(&TerminalOutcome::default(), &[], 4, |_| {
            || async { Ok::<_, RawFailure>(PartialOutcome::skipped("unused")) }
        })
        .await;

        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary.total(), 0);
    }

    #[tokio::test]
    async fn test_zero_fanout_still_processes_everything() {
        let inputs = vec![RecordInput::new("gl_entry", "1"), RecordInput::new("gl_entry", "2")];
        let runner =
            TerminalOutcome::new(OutcomeConfig::default().with_policy(RetryPolicy::immediate(0)));

        let report = run_batch(&runner, &inputs, 0, |input| {
            let fail = input.legacy_id() == "2";
            move || async move {
                if fail {
                    Err(RawFailure::coded("23505"))
                } else {
                    Ok(PartialOutcome::loaded(Action::Upsert, "G1"))
                }
            }
        })
        .await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].status(), OutcomeStatus::Loaded);
        assert_eq!(report.outcomes[1].status(), OutcomeStatus::Quarantined);
        assert_eq!(report.quarantined().count(), 1);
    }
}
