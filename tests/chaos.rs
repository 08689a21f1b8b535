//! Fault injection across a batch: every record still terminates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use terminus::{
    batch, Action, ErrorClass, OutcomeConfig, OutcomeStatus, PartialOutcome, RawFailure,
    RecordInput, RetryPolicy, TerminalOutcome,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn inputs(n: usize) -> Vec<RecordInput> {
    (1..=n)
        .map(|i| RecordInput::new("ledger_entry", i.to_string()))
        .collect()
}

/// Every 5th record times out, every 7th fails validation, every 11th raises
/// null. The first matching rule wins.
fn chaos_step(index: usize) -> Result<PartialOutcome, RawFailure> {
    if index % 5 == 0 {
        Err(RawFailure::error("canceling statement due to statement timeout").with_code("57014"))
    } else if index % 7 == 0 {
        Err(RawFailure::error("validation failed: debit and credit both empty"))
    } else if index % 11 == 0 {
        Err(RawFailure::null())
    } else {
        Ok(PartialOutcome::loaded(Action::Create, format!("T{}", index)))
    }
}

#[tokio::test]
async fn test_twenty_records_under_chaos_yield_twenty_outcomes() {
    init_tracing();

    let runner =
        TerminalOutcome::new(OutcomeConfig::default().with_policy(RetryPolicy::immediate(3)));
    let inputs = inputs(20);

    let report = batch::run_batch(&runner, &inputs, 4, |input| {
        let index: usize = input.legacy_id().parse().unwrap_or(0);
        move || futures::future::ready(chaos_step(index))
    })
    .await;

    assert_eq!(report.outcomes.len(), 20);
    assert_eq!(report.summary.total(), 20);
    for outcome in &report.outcomes {
        assert!(OutcomeStatus::ALL.contains(&outcome.status()));
    }

    // 5, 10, 15, 20 time out; 7, 14 fail validation; 11 raises null.
    assert_eq!(report.summary.quarantined, 7);
    assert_eq!(report.summary.transient_failures, 4);
    assert_eq!(report.summary.permanent_failures, 3);
    assert_eq!(report.summary.loaded, 13);

    for (input, outcome) in inputs.iter().zip(&report.outcomes) {
        assert_eq!(input.legacy_id(), outcome.legacy_id());
    }

    let timeout = &report.outcomes[4];
    assert_eq!(timeout.error_class(), Some(ErrorClass::Transient));
    assert_eq!(timeout.attempts(), 4);

    let validation = &report.outcomes[6];
    assert_eq!(validation.error_class(), Some(ErrorClass::Permanent));
    assert_eq!(validation.attempts(), 1);
}

#[tokio::test]
async fn test_permanent_failure_does_not_block_other_records() {
    let runner =
        TerminalOutcome::new(OutcomeConfig::default().with_policy(RetryPolicy::immediate(0)));
    let inputs = inputs(6);

    let report = batch::run_batch(&runner, &inputs, 1, |input| {
        let poison = input.legacy_id() == "1";
        move || async move {
            if poison {
                Err(RawFailure::coded("23505"))
            } else {
                Ok(PartialOutcome::loaded(Action::Upsert, "X"))
            }
        }
    })
    .await;

    assert_eq!(report.summary.quarantined, 1);
    assert_eq!(report.summary.loaded, 5);
    assert_eq!(report.outcomes[0].status(), OutcomeStatus::Quarantined);
}

#[tokio::test(start_paused = true)]
async fn test_fanout_bounds_concurrency() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let inputs = inputs(12);

    let report = batch::run_batch(&TerminalOutcome::default(), &inputs, 3, |_| {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        move || {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, RawFailure>(PartialOutcome::skipped("dormant"))
            }
        }
    })
    .await;

    assert_eq!(report.summary.skipped, 12);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
}
