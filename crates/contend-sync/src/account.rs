//! Guarded withdrawal on a shared balance.
//!
//! `withdraw` is a check-then-act sequence: "is there enough money?" followed by "take
//! it". [`UnguardedAccount`] runs the two steps separately, so two shoppers can both pass
//! the check against the same balance and overdraw it. [`GuardedAccount`] evaluates the
//! check against the latest committed balance inside the same critical section as the
//! debit.

use crate::trial::Invariant;
use crate::window::RaceWindow;
use crate::worker::run_workers;
use contend_core::{ContendError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a withdrawal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Withdrawal {
    /// Money was taken
    Completed { amount: i64, remaining: i64 },
    /// Insufficient funds at the time of the check
    Declined { balance: i64, requested: i64 },
}

impl Withdrawal {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A shared balance that workers withdraw from.
pub trait Account: Send + Sync {
    /// Take `amount` if the balance covers it, otherwise decline.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive amount.
    fn withdraw(&self, amount: i64) -> Result<Withdrawal>;

    fn balance(&self) -> i64;

    /// Withdrawal attempts that reached the account, completed or not
    fn withdraw_count(&self) -> u64;

    /// Withdrawals that took money
    fn completed(&self) -> u64;

    /// Lowest balance ever written
    fn lowest_balance(&self) -> i64;

    /// Short label used in reports
    fn label(&self) -> &'static str;
}

fn check_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(ContendError::invalid_input(format!(
            "withdrawal amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Account whose funds check and debit are separate steps.
#[derive(Debug)]
pub struct UnguardedAccount {
    balance: AtomicI64,
    withdraw_count: AtomicU64,
    completed: AtomicU64,
    lowest: AtomicI64,
    window: RaceWindow,
}

impl UnguardedAccount {
    pub fn new(initial_balance: i64, window: RaceWindow) -> Self {
        Self {
            balance: AtomicI64::new(initial_balance),
            withdraw_count: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            lowest: AtomicI64::new(initial_balance),
            window,
        }
    }
}

impl Account for UnguardedAccount {
    fn withdraw(&self, amount: i64) -> Result<Withdrawal> {
        check_amount(amount)?;
        let count = self.withdraw_count.fetch_add(1, Ordering::SeqCst) + 1;

        let seen = self.balance.load(Ordering::SeqCst);
        if seen < amount {
            debug!("Withdrawal {}: only {} left, declining {}", count, seen, amount);
            return Ok(Withdrawal::Declined {
                balance: seen,
                requested: amount,
            });
        }

        debug!("Withdrawal {}: {} looks sufficient for {}", count, seen, amount);
        self.window.pause();

        let remaining = self.balance.fetch_sub(amount, Ordering::SeqCst) - amount;
        self.lowest.fetch_min(remaining, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if remaining < 0 {
            warn!("Withdrawal {} overdrew the account: balance {}", count, remaining);
        } else {
            debug!("Withdrawal {} completed, {} left", count, remaining);
        }

        Ok(Withdrawal::Completed { amount, remaining })
    }

    fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    fn withdraw_count(&self) -> u64 {
        self.withdraw_count.load(Ordering::SeqCst)
    }

    fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn lowest_balance(&self) -> i64 {
        self.lowest.load(Ordering::SeqCst)
    }

    fn label(&self) -> &'static str {
        "unguarded"
    }
}

#[derive(Debug, Clone, Copy)]
struct AccountState {
    balance: i64,
    withdraw_count: u64,
    completed: u64,
    lowest: i64,
}

/// Account whose check and debit share one critical section.
#[derive(Debug)]
pub struct GuardedAccount {
    state: Mutex<AccountState>,
    window: RaceWindow,
}

impl GuardedAccount {
    pub fn new(initial_balance: i64, window: RaceWindow) -> Self {
        Self {
            state: Mutex::new(AccountState {
                balance: initial_balance,
                withdraw_count: 0,
                completed: 0,
                lowest: initial_balance,
            }),
            window,
        }
    }
}

impl Account for GuardedAccount {
    fn withdraw(&self, amount: i64) -> Result<Withdrawal> {
        check_amount(amount)?;

        let mut state = self.state.lock();
        state.withdraw_count += 1;
        let count = state.withdraw_count;

        if state.balance < amount {
            debug!(
                "Withdrawal {}: only {} left, declining {}",
                count, state.balance, amount
            );
            return Ok(Withdrawal::Declined {
                balance: state.balance,
                requested: amount,
            });
        }

        debug!("Withdrawal {}: {} covers {}", count, state.balance, amount);
        self.window.pause();

        state.balance -= amount;
        state.completed += 1;
        state.lowest = state.lowest.min(state.balance);
        debug!("Withdrawal {} completed, {} left", count, state.balance);

        Ok(Withdrawal::Completed {
            amount,
            remaining: state.balance,
        })
    }

    fn balance(&self) -> i64 {
        self.state.lock().balance
    }

    fn withdraw_count(&self) -> u64 {
        self.state.lock().withdraw_count
    }

    fn completed(&self) -> u64 {
        self.state.lock().completed
    }

    fn lowest_balance(&self) -> i64 {
        self.state.lock().lowest
    }

    fn label(&self) -> &'static str {
        "guarded"
    }
}

/// Shape of a withdrawal run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalWorkload {
    pub workers: usize,
    pub attempts_per_worker: u32,
    pub amount: i64,
}

impl Default for WithdrawalWorkload {
    fn default() -> Self {
        Self {
            workers: 2,
            attempts_per_worker: 3,
            amount: 30,
        }
    }
}

/// Result of one withdrawal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalReport {
    pub account: String,
    pub workload: WithdrawalWorkload,
    pub initial: i64,
    pub final_balance: i64,
    pub attempts: u64,
    pub completed: u64,
    pub declined: u64,
    pub lowest_balance: i64,
    /// A worker saw a negative balance after one of its withdrawals
    pub overdrawn: bool,
    pub elapsed_ms: f64,
}

impl WithdrawalReport {
    /// Total money handed out
    pub fn withdrawn(&self) -> i64 {
        self.completed as i64 * self.workload.amount
    }
}

impl Invariant for WithdrawalReport {
    fn holds(&self) -> bool {
        !self.overdrawn
            && self.final_balance >= 0
            && self.lowest_balance >= 0
            && self.withdrawn() <= self.initial
            && self.final_balance == self.initial - self.withdrawn()
    }

    fn describe(&self) -> String {
        format!(
            "{} account: {} -> {} ({} completed, {} declined, lowest {})",
            self.account,
            self.initial,
            self.final_balance,
            self.completed,
            self.declined,
            self.lowest_balance
        )
    }
}

#[derive(Debug, Default)]
struct ShopperTally {
    completed: u64,
    declined: u64,
    saw_overdraft: bool,
}

/// Run `workload.workers` threads named `shopper-<n>`, each attempting
/// `attempts_per_worker` withdrawals of `amount`.
pub fn run_withdrawals<A>(account: &A, workload: &WithdrawalWorkload) -> Result<WithdrawalReport>
where
    A: Account + ?Sized,
{
    check_amount(workload.amount)?;

    let initial = account.balance();
    let started = Instant::now();

    let tallies = run_workers("shopper", workload.workers, |_| -> Result<ShopperTally> {
        let mut tally = ShopperTally::default();
        for _ in 0..workload.attempts_per_worker {
            match account.withdraw(workload.amount)? {
                Withdrawal::Completed { .. } => tally.completed += 1,
                Withdrawal::Declined { .. } => tally.declined += 1,
            }
            if account.balance() < 0 {
                warn!("Overdrawn!");
                tally.saw_overdraft = true;
            }
        }
        Ok(tally)
    })?;

    let elapsed = started.elapsed();
    let mut completed = 0;
    let mut declined = 0;
    let mut overdrawn = false;
    for tally in tallies {
        let tally = tally?;
        completed += tally.completed;
        declined += tally.declined;
        overdrawn |= tally.saw_overdraft;
    }

    let lowest_balance = account.lowest_balance();
    let report = WithdrawalReport {
        account: account.label().to_string(),
        workload: *workload,
        initial,
        final_balance: account.balance(),
        attempts: completed + declined,
        completed,
        declined,
        lowest_balance,
        overdrawn: overdrawn || lowest_balance < 0,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
    };

    if report.holds() {
        info!("{}", report.describe());
    } else {
        warn!("{}", report.describe());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_declines_insufficient_funds() {
        let account = GuardedAccount::new(50, RaceWindow::None);
        assert_eq!(
            account.withdraw(30).unwrap(),
            Withdrawal::Completed {
                amount: 30,
                remaining: 20
            }
        );
        assert_eq!(
            account.withdraw(30).unwrap(),
            Withdrawal::Declined {
                balance: 20,
                requested: 30
            }
        );
        assert_eq!(account.withdraw_count(), 2);
        assert_eq!(account.completed(), 1);
        assert_eq!(account.balance(), 20);
    }

    #[test]
    fn test_exact_balance_can_be_withdrawn() {
        let account = GuardedAccount::new(30, RaceWindow::None);
        assert!(account.withdraw(30).unwrap().is_completed());
        assert_eq!(account.balance(), 0);
        assert_eq!(account.lowest_balance(), 0);
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let guarded = GuardedAccount::new(100, RaceWindow::None);
        let unguarded = UnguardedAccount::new(100, RaceWindow::None);
        assert!(guarded.withdraw(0).is_err());
        assert!(unguarded.withdraw(-5).is_err());
        assert_eq!(guarded.withdraw_count(), 0);
        assert_eq!(unguarded.withdraw_count(), 0);
    }

    #[test]
    fn test_unguarded_is_correct_single_threaded() {
        let account = UnguardedAccount::new(100, RaceWindow::None);
        for _ in 0..4 {
            account.withdraw(30).unwrap();
        }
        assert_eq!(account.balance(), 10);
        assert_eq!(account.completed(), 3);
        assert_eq!(account.withdraw_count(), 4);
        assert_eq!(account.lowest_balance(), 10);
    }

    #[test]
    fn test_guarded_run_matches_source_example() {
        let account = GuardedAccount::new(100, RaceWindow::None);
        let report = run_withdrawals(&account, &WithdrawalWorkload::default()).unwrap();

        assert!(report.holds(), "{}", report.describe());
        assert_eq!(report.completed, 3);
        assert_eq!(report.declined, 3);
        assert_eq!(report.final_balance, 10);
        assert_eq!(report.attempts, 6);
    }

    #[test]
    fn test_report_flags_negative_balance() {
        let report = WithdrawalReport {
            account: "unguarded".to_string(),
            workload: WithdrawalWorkload::default(),
            initial: 100,
            final_balance: -20,
            attempts: 4,
            completed: 4,
            declined: 0,
            lowest_balance: -20,
            overdrawn: true,
            elapsed_ms: 0.0,
        };
        assert!(!report.holds());
        assert_eq!(report.withdrawn(), 120);
    }
}
