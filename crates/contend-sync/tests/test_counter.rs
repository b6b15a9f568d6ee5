//! Lost-Update Counter Tests
//!
//! This test suite covers:
//! - Exact totals for the guarded counter
//! - Lost updates in the unguarded counter over repeated trials
//! - Counter invariants under arbitrary workloads

use contend_sync::counter::*;
use contend_sync::trial::{run_trials, Invariant};
use contend_sync::window::RaceWindow;
use proptest::prelude::*;

// ==============================================================================
// Guarded Counter Tests
// ==============================================================================

#[test]
fn test_guarded_two_workers_default_workload() {
    let counter = GuardedCounter::new(RaceWindow::None);
    let workload = CounterWorkload::default();

    let report = run_increments(&counter, &workload).unwrap();
    assert_eq!(report.expected, 200_000);
    assert_eq!(report.observed, 200_000);
    assert_eq!(report.lost_updates, 0);
    assert!(report.holds());
}

#[test]
fn test_guarded_window_inside_critical_section() {
    let counter = GuardedCounter::new(RaceWindow::Yield);
    let workload = CounterWorkload {
        workers: 8,
        increments_per_worker: 1_000,
        amount: 2,
    };

    let report = run_increments(&counter, &workload).unwrap();
    assert_eq!(report.observed, 16_000);
    assert!(report.holds(), "{}", report.describe());
}

#[test]
fn test_guarded_never_violates_over_trials() {
    let workload = CounterWorkload {
        workers: 4,
        increments_per_worker: 2_000,
        amount: 1,
    };

    let summary = run_trials(10, |_| {
        run_increments(&GuardedCounter::new(RaceWindow::Yield), &workload)
    })
    .unwrap();
    assert!(summary.always_held(), "{}", summary.describe());
}

// ==============================================================================
// Unguarded Counter Tests
// ==============================================================================

#[test]
fn test_unguarded_loses_updates_over_trials() {
    let workload = CounterWorkload {
        workers: 4,
        increments_per_worker: 2_000,
        amount: 1,
    };

    let summary = run_trials(20, |_| {
        run_increments(&UnguardedCounter::new(RaceWindow::Yield), &workload)
    })
    .unwrap();

    assert!(summary.violated(), "no lost update in {} trials", summary.trials);
    assert!(summary.first_violation.is_some());
}

#[test]
fn test_unguarded_never_overcounts() {
    let workload = CounterWorkload {
        workers: 4,
        increments_per_worker: 1_000,
        amount: 1,
    };

    let report = run_increments(&UnguardedCounter::new(RaceWindow::Yield), &workload).unwrap();
    assert!(report.observed <= report.expected);
    assert!(report.lost_updates >= 0);
}

// ==============================================================================
// Property Tests
// ==============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_guarded_total_is_exact(
        workers in 1usize..5,
        increments in 0u64..300,
        amount in prop_oneof![-5i64..0, 1i64..6],
    ) {
        let counter = GuardedCounter::default();
        let workload = CounterWorkload { workers, increments_per_worker: increments, amount };

        let report = run_increments(&counter, &workload).unwrap();
        prop_assert_eq!(report.observed, workers as i64 * increments as i64 * amount);
        prop_assert!(report.holds());
    }
}
