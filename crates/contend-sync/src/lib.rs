//! Shared-state concurrency scenarios.
//!
//! Each scenario ships a racy baseline and a corrected implementation behind one trait:
//! - [`counter`]: lost update on a read-modify-write counter
//! - [`account`]: check-then-act race on a guarded withdrawal
//! - [`ordering`]: circular wait between two locks and the protocols that avoid it
//! - [`locks`]: holder-level lock table that detects circular wait instead
//!
//! [`trial`] repeats a run and counts invariant violations; [`scenario`] wires the
//! scenarios to configuration.

pub mod account;
pub mod counter;
pub mod locks;
pub mod ordering;
pub mod scenario;
pub mod trial;
pub mod window;
pub mod worker;

pub use account::{
    run_withdrawals, Account, GuardedAccount, UnguardedAccount, Withdrawal, WithdrawalReport,
    WithdrawalWorkload,
};
pub use counter::{
    run_increments, Counter, CounterReport, CounterWorkload, GuardedCounter, UnguardedCounter,
};
pub use locks::{
    Acquisition, DeadlockDetector, HeldLock, HolderId, LockId, LockMode, LockRequest,
    LockStatistics, LockTable, WaitForGraph,
};
pub use ordering::{
    lock_in_order, lock_with_backoff, run_lock_pair, try_lock_in_order_for, AcquisitionStrategy,
    BackoffPolicy, LockPairReport, LockPairWorkload, PairGuard, RankedLock, TaskProbe, TaskState,
};
pub use scenario::{
    run_detection_demo, run_scenario, run_scenario_trials, DetectionReport, DetectionWorkload,
    Scenario, ScenarioReport, ScenarioSettings, Variant,
};
pub use trial::{run_trials, Invariant, TrialSummary};
pub use window::RaceWindow;
pub use worker::{run_workers, StartGate};
