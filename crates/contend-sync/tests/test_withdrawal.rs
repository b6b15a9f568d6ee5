//! Guarded Withdrawal Tests
//!
//! This test suite covers:
//! - The two-shopper example (100, 2 x 3 x 30)
//! - Overdrafts in the unguarded account over repeated trials
//! - Completion counts under arbitrary workloads

use contend_sync::account::*;
use contend_sync::trial::{run_trials, Invariant};
use contend_sync::window::RaceWindow;
use proptest::prelude::*;
use std::time::Duration;

fn shoppers() -> WithdrawalWorkload {
    WithdrawalWorkload {
        workers: 2,
        attempts_per_worker: 3,
        amount: 30,
    }
}

// ==============================================================================
// Guarded Account Tests
// ==============================================================================

#[test]
fn test_two_shoppers_never_overdraw() {
    let account = GuardedAccount::new(100, RaceWindow::Sleep(Duration::from_millis(2)));

    let report = run_withdrawals(&account, &shoppers()).unwrap();
    assert!(report.holds(), "{}", report.describe());
    assert!([10, 40, 70, 100].contains(&report.final_balance));
    assert!(report.completed <= 3);
    assert_eq!(report.attempts, 6);
    assert_eq!(account.withdraw_count(), 6);
    assert!(report.lowest_balance >= 0);
}

#[test]
fn test_guarded_declines_are_values() {
    let account = GuardedAccount::new(20, RaceWindow::None);

    let outcome = account.withdraw(30).unwrap();
    assert_eq!(
        outcome,
        Withdrawal::Declined {
            balance: 20,
            requested: 30
        }
    );
    assert_eq!(account.balance(), 20);
    assert_eq!(account.completed(), 0);
    assert_eq!(account.withdraw_count(), 1);
}

#[test]
fn test_non_positive_amount_rejected() {
    let account = GuardedAccount::new(100, RaceWindow::None);
    assert!(account.withdraw(0).is_err());
    assert!(account.withdraw(-5).is_err());

    let unguarded = UnguardedAccount::new(100, RaceWindow::None);
    assert!(unguarded.withdraw(0).is_err());
}

#[test]
fn test_guarded_never_violates_over_trials() {
    let workload = WithdrawalWorkload {
        workers: 4,
        attempts_per_worker: 3,
        amount: 30,
    };

    let summary = run_trials(10, |_| {
        let account = GuardedAccount::new(100, RaceWindow::Sleep(Duration::from_micros(500)));
        run_withdrawals(&account, &workload)
    })
    .unwrap();
    assert!(summary.always_held(), "{}", summary.describe());
}

// ==============================================================================
// Unguarded Account Tests
// ==============================================================================

#[test]
fn test_unguarded_overdraws_over_trials() {
    let workload = WithdrawalWorkload {
        workers: 4,
        attempts_per_worker: 3,
        amount: 30,
    };

    let summary = run_trials(20, |_| {
        let account = UnguardedAccount::new(100, RaceWindow::Sleep(Duration::from_millis(2)));
        run_withdrawals(&account, &workload)
    })
    .unwrap();

    assert!(summary.violated(), "no overdraft in {} trials", summary.trials);
}

#[test]
fn test_unguarded_lowest_balance_tracks_overdraft() {
    let account = UnguardedAccount::new(100, RaceWindow::Sleep(Duration::from_millis(5)));
    let workload = WithdrawalWorkload {
        workers: 4,
        attempts_per_worker: 3,
        amount: 30,
    };

    let report = run_withdrawals(&account, &workload).unwrap();
    assert!(report.lowest_balance <= report.final_balance);
    assert_eq!(report.final_balance, 100 - report.withdrawn());
}

// ==============================================================================
// Property Tests
// ==============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_guarded_completions_match_funds(
        initial in 0i64..500,
        workers in 1usize..5,
        attempts in 1u32..6,
        amount in 1i64..100,
    ) {
        let account = GuardedAccount::new(initial, RaceWindow::None);
        let workload = WithdrawalWorkload { workers, attempts_per_worker: attempts, amount };

        let report = run_withdrawals(&account, &workload).unwrap();
        let total_attempts = workers as u64 * attempts as u64;
        let affordable = (initial / amount) as u64;

        prop_assert!(report.holds());
        prop_assert_eq!(report.completed, total_attempts.min(affordable));
        prop_assert_eq!(report.final_balance, initial - report.withdrawn());
    }
}
