//! Scenario catalogue: one entry point per scenario and variant, built from configuration.

use crate::account::{
    run_withdrawals, GuardedAccount, UnguardedAccount, WithdrawalReport, WithdrawalWorkload,
};
use crate::counter::{
    run_increments, CounterReport, CounterWorkload, GuardedCounter, UnguardedCounter,
};
use crate::locks::{HolderId, LockRequest, LockStatistics, LockTable};
use crate::ordering::{run_lock_pair, AcquisitionStrategy, LockPairReport, LockPairWorkload};
use crate::trial::{run_trials, Invariant, TrialSummary};
use crate::window::RaceWindow;
use contend_core::{ContendConfig, ContendError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    LostUpdate,
    Withdrawal,
    LockPair,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LostUpdate => "lost-update",
            Self::Withdrawal => "withdrawal",
            Self::LockPair => "lock-pair",
        }
    }
}

impl FromStr for Scenario {
    type Err = ContendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lost-update" | "counter" => Ok(Self::LostUpdate),
            "withdrawal" | "withdraw" | "account" => Ok(Self::Withdrawal),
            "lock-pair" | "deadlock" => Ok(Self::LockPair),
            other => Err(ContendError::invalid_input(format!(
                "Unknown scenario '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which implementation of a scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// The corrected implementation
    #[default]
    Guarded,
    /// The racy baseline, kept for demonstration
    Unguarded,
}

impl Variant {
    pub fn from_unguarded_flag(unguarded: bool) -> Self {
        if unguarded {
            Self::Unguarded
        } else {
            Self::Guarded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guarded => "guarded",
            Self::Unguarded => "unguarded",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workloads for every scenario, resolved from [`ContendConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSettings {
    pub counter: CounterWorkload,
    pub counter_window: RaceWindow,
    pub initial_balance: i64,
    pub withdrawal: WithdrawalWorkload,
    /// Pause between the funds check and the debit
    pub think_time: RaceWindow,
    pub lock_pair: LockPairWorkload,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            counter: CounterWorkload::default(),
            counter_window: RaceWindow::None,
            initial_balance: 100,
            withdrawal: WithdrawalWorkload::default(),
            think_time: RaceWindow::Sleep(Duration::from_millis(5)),
            lock_pair: LockPairWorkload::default(),
        }
    }
}

impl ScenarioSettings {
    pub fn from_config(config: &ContendConfig) -> Result<Self> {
        Ok(Self {
            counter: CounterWorkload {
                workers: config.counter.workers,
                increments_per_worker: config.counter.increments_per_worker,
                amount: config.counter.amount,
            },
            counter_window: RaceWindow::from_config(
                &config.counter.window,
                config.counter.window_duration(),
            )?,
            initial_balance: config.account.initial_balance,
            withdrawal: WithdrawalWorkload {
                workers: config.account.workers,
                attempts_per_worker: config.account.attempts_per_worker,
                amount: config.account.amount,
            },
            think_time: RaceWindow::sleep_or_none(config.account.think_time()),
            lock_pair: LockPairWorkload::from_config(&config.lock_pair)?,
        })
    }

    /// Reject settings no run can honour, such as a negative starting balance.
    ///
    /// The configuration file is checked on load; this covers values set afterwards.
    pub fn validate(&self) -> Result<()> {
        if self.counter.workers == 0 {
            return Err(ContendError::invalid_input("counter workers must be greater than 0"));
        }
        if self.withdrawal.workers == 0 {
            return Err(ContendError::invalid_input("withdrawal workers must be greater than 0"));
        }
        if self.withdrawal.amount <= 0 {
            return Err(ContendError::invalid_input(format!(
                "withdrawal amount must be greater than 0, got {}",
                self.withdrawal.amount
            )));
        }
        if self.initial_balance < 0 {
            return Err(ContendError::invalid_input(format!(
                "initial balance cannot be negative, got {}",
                self.initial_balance
            )));
        }
        if self.lock_pair.tasks == 0 {
            return Err(ContendError::invalid_input("lock-pair tasks must be greater than 0"));
        }
        if self.lock_pair.lock_timeout.is_zero() {
            return Err(ContendError::invalid_input("lock-pair timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Lock-pair workload for `variant`. The unguarded variant always takes the locks naively.
    pub fn lock_pair_for(&self, variant: Variant) -> LockPairWorkload {
        match variant {
            Variant::Guarded => self.lock_pair,
            Variant::Unguarded => LockPairWorkload {
                strategy: AcquisitionStrategy::Naive,
                ..self.lock_pair
            },
        }
    }
}

/// Report of any scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "kebab-case")]
pub enum ScenarioReport {
    LostUpdate(CounterReport),
    Withdrawal(WithdrawalReport),
    LockPair(LockPairReport),
}

impl ScenarioReport {
    pub fn scenario(&self) -> Scenario {
        match self {
            Self::LostUpdate(_) => Scenario::LostUpdate,
            Self::Withdrawal(_) => Scenario::Withdrawal,
            Self::LockPair(_) => Scenario::LockPair,
        }
    }
}

impl Invariant for ScenarioReport {
    fn holds(&self) -> bool {
        match self {
            Self::LostUpdate(report) => report.holds(),
            Self::Withdrawal(report) => report.holds(),
            Self::LockPair(report) => report.holds(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::LostUpdate(report) => report.describe(),
            Self::Withdrawal(report) => report.describe(),
            Self::LockPair(report) => report.describe(),
        }
    }
}

/// Run one scenario once.
pub fn run_scenario(
    settings: &ScenarioSettings,
    scenario: Scenario,
    variant: Variant,
) -> Result<ScenarioReport> {
    debug!("Running {} ({})", scenario, variant);

    match scenario {
        Scenario::LostUpdate => {
            let window = settings.counter_window;
            let report = match variant {
                Variant::Guarded => {
                    run_increments(&GuardedCounter::new(window), &settings.counter)?
                }
                Variant::Unguarded => {
                    run_increments(&UnguardedCounter::new(window), &settings.counter)?
                }
            };
            Ok(ScenarioReport::LostUpdate(report))
        }
        Scenario::Withdrawal => {
            let (initial, window) = (settings.initial_balance, settings.think_time);
            let report = match variant {
                Variant::Guarded => run_withdrawals(
                    &GuardedAccount::new(initial, window),
                    &settings.withdrawal,
                )?,
                Variant::Unguarded => run_withdrawals(
                    &UnguardedAccount::new(initial, window),
                    &settings.withdrawal,
                )?,
            };
            Ok(ScenarioReport::Withdrawal(report))
        }
        Scenario::LockPair => Ok(ScenarioReport::LockPair(run_lock_pair(
            &settings.lock_pair_for(variant),
        )?)),
    }
}

/// Run one scenario `count` times with fresh shared state each time.
pub fn run_scenario_trials(
    settings: &ScenarioSettings,
    scenario: Scenario,
    variant: Variant,
    count: usize,
) -> Result<TrialSummary> {
    info!("Running {} trial(s) of {} ({})", count, scenario, variant);
    run_trials(count, |_| run_scenario(settings, scenario, variant))
}

// ==============================================================================
// Lock table deadlock detection demo
// ==============================================================================

/// Shape of a detection demo: `holders` holders in a ring, each holding its own
/// resource and then asking for its neighbour's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionWorkload {
    pub holders: usize,
    /// Bound on each second-lock wait
    pub wait: Duration,
    /// Time spent holding both resources
    pub hold: Duration,
}

impl Default for DetectionWorkload {
    fn default() -> Self {
        Self {
            holders: 2,
            wait: Duration::from_secs(2),
            hold: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub holders: usize,
    /// Holders that got both resources
    pub acquired: usize,
    /// Holders whose request was refused because it would close a cycle
    pub victims: Vec<HolderId>,
    pub timeouts: usize,
    pub locks_left: usize,
    pub statistics: LockStatistics,
    pub elapsed_ms: f64,
}

impl Invariant for DetectionReport {
    /// Every request was resolved by the table: nobody hung until the timeout
    fn holds(&self) -> bool {
        self.acquired + self.victims.len() == self.holders
            && !self.victims.is_empty()
            && self.timeouts == 0
            && self.locks_left == 0
    }

    fn describe(&self) -> String {
        format!(
            "lock table: {} of {} holder(s) finished, {} refused as deadlock victim(s) {:?}, {} timeout(s)",
            self.acquired,
            self.holders,
            self.victims.len(),
            self.victims,
            self.timeouts
        )
    }
}

enum RingOutcome {
    Acquired,
    Victim(HolderId),
    TimedOut,
}

fn resource_name(index: usize) -> String {
    format!("resource-{}", index)
}

/// Build a circular wait on a [`LockTable`] and let the table break it.
pub async fn run_detection_demo(workload: &DetectionWorkload) -> Result<DetectionReport> {
    if workload.holders < 2 {
        return Err(ContendError::invalid_input(
            "a circular wait needs at least 2 holders",
        ));
    }

    let table = Arc::new(LockTable::new(Duration::from_secs(60), Duration::from_millis(100)));
    let started = Instant::now();

    // Every holder takes its own resource before anyone asks for a neighbour's
    for index in 0..workload.holders {
        let holder = format!("holder-{}", index);
        table
            .acquire(&holder, &LockRequest::exclusive(resource_name(index), workload.wait))
            .await?;
    }

    let mut handles = Vec::with_capacity(workload.holders);
    for index in 0..workload.holders {
        let table = Arc::clone(&table);
        let holder = format!("holder-{}", index);
        let neighbour = resource_name((index + 1) % workload.holders);
        let request = LockRequest::exclusive(neighbour, workload.wait);
        let hold = workload.hold;

        handles.push(tokio::spawn(async move {
            let outcome = match table.acquire(&holder, &request).await {
                Ok(lock) => {
                    debug!("{} holds {} and its own resource", holder, lock.resource_id);
                    tokio::time::sleep(hold).await;
                    RingOutcome::Acquired
                }
                Err(e) if e.is_deadlock() => {
                    warn!("{} refused: {}", holder, e);
                    RingOutcome::Victim(holder.clone())
                }
                Err(e) if e.is_timeout() => RingOutcome::TimedOut,
                Err(e) => return Err(e),
            };
            table.release_holder(&holder);
            Ok(outcome)
        }));
    }

    let mut report = DetectionReport {
        holders: workload.holders,
        acquired: 0,
        victims: Vec::new(),
        timeouts: 0,
        locks_left: 0,
        statistics: LockStatistics::default(),
        elapsed_ms: 0.0,
    };

    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| ContendError::worker_panicked(e.to_string()))??;
        match outcome {
            RingOutcome::Acquired => report.acquired += 1,
            RingOutcome::Victim(holder) => report.victims.push(holder),
            RingOutcome::TimedOut => report.timeouts += 1,
        }
    }

    report.locks_left = table.list().len();
    report.statistics = table.statistics();
    report.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    if report.holds() {
        info!("{}", report.describe());
    } else {
        warn!("{}", report.describe());
    }

    Ok(report)
}
