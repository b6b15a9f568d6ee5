//! Deadlock avoidance for tasks that need two locks.
//!
//! Circular wait needs two tasks holding one resource each while asking for the other's.
//! This module offers three ways to make that impossible or temporary:
//! - a total order: every [`RankedLock`] carries a unique rank and pairs are always taken
//!   lowest rank first ([`lock_in_order`], [`try_lock_in_order_for`])
//! - bounded waits with release-and-retry ([`lock_with_backoff`])
//! - a single outer lock serializing all pair acquisitions (`Combined` strategy)
//!
//! [`run_lock_pair`] drives tasks that ask for the pair in opposite orders under each
//! strategy, including the naive one that only terminates thanks to its bounded wait.

use crate::trial::Invariant;
use crate::worker::run_workers;
use contend_core::config::{BackoffConfig, LockPairConfig};
use contend_core::{ContendError, Result};
use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ==============================================================================
// Ranked Locks
// ==============================================================================

/// A mutex with a position in the global acquisition order.
#[derive(Debug)]
pub struct RankedLock<T> {
    rank: u32,
    name: String,
    inner: Mutex<T>,
}

impl<T> RankedLock<T> {
    pub fn new(rank: u32, name: impl Into<String>, value: T) -> Self {
        Self {
            rank,
            name: name.into(),
            inner: Mutex::new(value),
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the lock is held
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Wait at most `timeout` for the lock
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock_for(timeout)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Guards for both locks of a pair, in the order the caller named them.
#[derive(Debug)]
pub struct PairGuard<'a, A, B> {
    pub first: MutexGuard<'a, A>,
    pub second: MutexGuard<'a, B>,
    /// Acquisition attempts it took (1 unless backing off)
    pub attempts: u32,
}

impl<'a, A, B> PairGuard<'a, A, B> {
    fn swap(self) -> PairGuard<'a, B, A> {
        PairGuard {
            first: self.second,
            second: self.first,
            attempts: self.attempts,
        }
    }
}

// ==============================================================================
// Task State
// ==============================================================================

/// Where a two-lock task currently is.
///
/// Two tasks both stuck in `HoldingFirst`, each waiting on the other's resource, is a
/// deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskState {
    NotStarted = 0,
    HoldingFirst = 1,
    HoldingBoth = 2,
    Released = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::HoldingFirst,
            2 => Self::HoldingBoth,
            3 => Self::Released,
            _ => Self::NotStarted,
        }
    }
}

/// A task's state, observable from other threads.
#[derive(Debug)]
pub struct TaskProbe {
    state: AtomicU8,
}

impl Default for TaskProbe {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(TaskState::NotStarted as u8),
        }
    }
}

impl TaskProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

fn mark(probe: Option<&TaskProbe>, state: TaskState) {
    if let Some(probe) = probe {
        probe.set(state);
    }
}

// ==============================================================================
// Acquisition
// ==============================================================================

/// A bounded wait that ran out.
#[derive(Debug, Clone)]
struct Contention {
    resource: String,
    waited: Duration,
    /// The first lock was held while waiting on `resource`
    held_first: bool,
}

impl From<Contention> for ContendError {
    fn from(c: Contention) -> Self {
        ContendError::lock_timeout(c.resource, c.waited, 1)
    }
}

fn acquire_one<'a, T>(
    lock: &'a RankedLock<T>,
    wait: Option<Duration>,
) -> Option<MutexGuard<'a, T>> {
    match wait {
        None => Some(lock.lock()),
        Some(timeout) => lock.try_lock_for(timeout),
    }
}

/// Take `first`, optionally sit on it for `hold`, then take `second`.
///
/// On a timeout nothing stays held.
fn acquire_sequence<'a, A, B>(
    first: &'a RankedLock<A>,
    second: &'a RankedLock<B>,
    wait: Option<Duration>,
    hold: Duration,
    probe: Option<&TaskProbe>,
) -> std::result::Result<PairGuard<'a, A, B>, Contention> {
    let started = Instant::now();

    let first_guard = acquire_one(first, wait).ok_or_else(|| Contention {
        resource: first.name().to_string(),
        waited: started.elapsed(),
        held_first: false,
    })?;
    mark(probe, TaskState::HoldingFirst);
    debug!("Holding {}, about to ask for {}", first.name(), second.name());

    if !hold.is_zero() {
        std::thread::sleep(hold);
    }

    let second_started = Instant::now();
    match acquire_one(second, wait) {
        Some(second_guard) => {
            mark(probe, TaskState::HoldingBoth);
            Ok(PairGuard {
                first: first_guard,
                second: second_guard,
                attempts: 1,
            })
        }
        None => {
            drop(first_guard);
            mark(probe, TaskState::Released);
            Err(Contention {
                resource: second.name().to_string(),
                waited: second_started.elapsed(),
                held_first: true,
            })
        }
    }
}

fn check_distinct<A, B>(a: &RankedLock<A>, b: &RankedLock<B>) -> Result<()> {
    if a.rank() == b.rank() {
        return Err(ContendError::invalid_input(format!(
            "{} and {} share rank {}; ranks must be unique",
            a.name(),
            b.name(),
            a.rank()
        )));
    }
    Ok(())
}

fn acquire_ordered<'a, A, B>(
    a: &'a RankedLock<A>,
    b: &'a RankedLock<B>,
    wait: Option<Duration>,
    hold: Duration,
    probe: Option<&TaskProbe>,
) -> Result<PairGuard<'a, A, B>> {
    check_distinct(a, b)?;
    let guards = if a.rank() < b.rank() {
        acquire_sequence(a, b, wait, hold, probe)?
    } else {
        acquire_sequence(b, a, wait, hold, probe)?.swap()
    };
    Ok(guards)
}

/// Lock both, lowest rank first, whichever order the caller names them in.
///
/// Blocks without bound; the total order makes circular wait impossible among callers
/// that all go through this function.
pub fn lock_in_order<'a, A, B>(
    a: &'a RankedLock<A>,
    b: &'a RankedLock<B>,
) -> Result<PairGuard<'a, A, B>> {
    acquire_ordered(a, b, None, Duration::ZERO, None)
}

/// Like [`lock_in_order`] but each single wait is bounded by `timeout`.
///
/// # Errors
///
/// `LockTimeout` (retryable) when either wait runs out. Nothing is held afterwards.
pub fn try_lock_in_order_for<'a, A, B>(
    a: &'a RankedLock<A>,
    b: &'a RankedLock<B>,
    timeout: Duration,
) -> Result<PairGuard<'a, A, B>> {
    acquire_ordered(a, b, Some(timeout), Duration::ZERO, None)
}

// ==============================================================================
// Backoff
// ==============================================================================

/// Exponential release-and-retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    /// Add up to half the delay again at random, so retrying tasks drift apart
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            max: Duration::from_millis(config.max_ms),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay after failed attempt number `attempt` (1-based), without jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    fn sleep_after(&self, attempt: u32) {
        let mut delay = self.delay_for(attempt);
        if self.jitter {
            let spread = (delay.as_micros() / 2) as u64;
            if spread > 0 {
                delay += Duration::from_micros(rand::rng().random_range(0..=spread));
            }
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

fn acquire_with_backoff<'a, A, B>(
    first: &'a RankedLock<A>,
    second: &'a RankedLock<B>,
    per_attempt: Duration,
    hold: Duration,
    policy: &BackoffPolicy,
    probe: Option<&TaskProbe>,
) -> Result<PairGuard<'a, A, B>> {
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match acquire_sequence(first, second, Some(per_attempt), hold, probe) {
            Ok(mut guards) => {
                guards.attempts = attempt;
                return Ok(guards);
            }
            Err(contention) if attempt == max_attempts => {
                warn!(
                    "Giving up on {} after {} attempt(s)",
                    contention.resource, attempt
                );
                return Err(ContendError::lock_timeout(
                    contention.resource,
                    started.elapsed(),
                    attempt,
                ));
            }
            Err(contention) => {
                debug!(
                    "Attempt {} found {} busy, releasing and backing off",
                    attempt, contention.resource
                );
                policy.sleep_after(attempt);
            }
        }
    }

    Err(ContendError::internal("backoff loop ended without a result"))
}

/// Acquire `first` then `second` in the given order with bounded waits; on contention
/// release everything, back off and retry.
///
/// # Errors
///
/// `LockTimeout` carrying the attempt count once `policy.max_attempts` is exhausted.
pub fn lock_with_backoff<'a, A, B>(
    first: &'a RankedLock<A>,
    second: &'a RankedLock<B>,
    per_attempt: Duration,
    policy: &BackoffPolicy,
) -> Result<PairGuard<'a, A, B>> {
    acquire_with_backoff(first, second, per_attempt, Duration::ZERO, policy, None)
}

// ==============================================================================
// Lock Pair Scenario
// ==============================================================================

/// How tasks acquire the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionStrategy {
    /// Even tasks take A then B, odd tasks B then A; waits are bounded only so the run ends
    Naive,
    /// Always lowest rank first
    Ordered,
    /// Opposite orders with release-and-retry
    Backoff,
    /// One outer lock around every pair acquisition
    Combined,
}

impl AcquisitionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Ordered => "ordered",
            Self::Backoff => "backoff",
            Self::Combined => "combined",
        }
    }

    /// Whether the strategy rules out permanent circular wait
    pub fn is_safe(&self) -> bool {
        !matches!(self, Self::Naive)
    }
}

impl FromStr for AcquisitionStrategy {
    type Err = ContendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "ordered" => Ok(Self::Ordered),
            "backoff" => Ok(Self::Backoff),
            "combined" => Ok(Self::Combined),
            other => Err(ContendError::invalid_input(format!(
                "Unknown strategy '{}'. Must be one of: naive, ordered, backoff, combined",
                other
            ))),
        }
    }
}

impl fmt::Display for AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a lock-pair run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockPairWorkload {
    pub tasks: usize,
    pub rounds: u32,
    /// Time spent on the first lock before asking for the second
    pub hold: Duration,
    /// Bound on a single lock wait (naive and backoff strategies)
    pub lock_timeout: Duration,
    pub strategy: AcquisitionStrategy,
    pub backoff: BackoffPolicy,
}

impl Default for LockPairWorkload {
    fn default() -> Self {
        Self {
            tasks: 2,
            rounds: 50,
            hold: Duration::from_millis(1),
            lock_timeout: Duration::from_millis(200),
            strategy: AcquisitionStrategy::Ordered,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl LockPairWorkload {
    pub fn from_config(config: &LockPairConfig) -> Result<Self> {
        Ok(Self {
            tasks: config.tasks,
            rounds: config.rounds,
            hold: config.hold(),
            lock_timeout: config.lock_timeout(),
            strategy: config.strategy.parse()?,
            backoff: BackoffPolicy::from(&config.backoff),
        })
    }
}

/// Result of one lock-pair run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockPairReport {
    pub strategy: AcquisitionStrategy,
    pub tasks: usize,
    pub rounds_per_task: u32,
    pub completed_rounds: u64,
    /// Rounds where a task held one lock and timed out waiting for the other
    pub suspected_deadlocks: u64,
    /// Rounds given up without holding anything: backoff exhausted, or the first
    /// lock never came
    pub abandoned_rounds: u64,
    /// Extra attempts spent backing off
    pub retries: u64,
    pub resource_a_updates: u64,
    pub resource_b_updates: u64,
    /// Both resources free and every task `Released` after the run
    pub all_released: bool,
    pub elapsed_ms: f64,
}

impl LockPairReport {
    pub fn expected_rounds(&self) -> u64 {
        self.tasks as u64 * self.rounds_per_task as u64
    }
}

impl Invariant for LockPairReport {
    fn holds(&self) -> bool {
        self.completed_rounds == self.expected_rounds()
            && self.suspected_deadlocks == 0
            && self.abandoned_rounds == 0
            && self.resource_a_updates == self.completed_rounds
            && self.resource_b_updates == self.completed_rounds
            && self.all_released
    }

    fn describe(&self) -> String {
        format!(
            "{} strategy: {}/{} rounds, {} suspected deadlock(s), {} abandoned, {} retries",
            self.strategy,
            self.completed_rounds,
            self.expected_rounds(),
            self.suspected_deadlocks,
            self.abandoned_rounds,
            self.retries
        )
    }
}

#[derive(Debug, Default)]
struct TaskTally {
    completed: u64,
    suspected: u64,
    abandoned: u64,
    retries: u64,
}

/// Two shared resources plus the outer lock used by the `Combined` strategy.
struct SharedPair {
    a: RankedLock<u64>,
    b: RankedLock<u64>,
    combined: Mutex<()>,
}

fn run_task(
    pair: &SharedPair,
    index: usize,
    workload: &LockPairWorkload,
    probe: &TaskProbe,
) -> Result<TaskTally> {
    let mut tally = TaskTally::default();
    let (first, second) = if index % 2 == 0 {
        (&pair.a, &pair.b)
    } else {
        (&pair.b, &pair.a)
    };

    for round in 0..workload.rounds {
        let outer = match workload.strategy {
            AcquisitionStrategy::Combined => Some(pair.combined.lock()),
            _ => None,
        };

        let acquired = match workload.strategy {
            AcquisitionStrategy::Naive => match acquire_sequence(
                first,
                second,
                Some(workload.lock_timeout),
                workload.hold,
                Some(probe),
            ) {
                Ok(guards) => Ok(guards),
                // Hold-and-wait ran out: the shape of a circular wait
                Err(contention) if contention.held_first => {
                    warn!(
                        "Round {}: held {} and waited {:?} for {}, suspected deadlock",
                        round + 1,
                        first.name(),
                        contention.waited,
                        contention.resource
                    );
                    tally.suspected += 1;
                    continue;
                }
                Err(contention) => Err(ContendError::from(contention)),
            },
            AcquisitionStrategy::Ordered => {
                acquire_ordered(first, second, None, workload.hold, Some(probe))
            }
            AcquisitionStrategy::Backoff => acquire_with_backoff(
                first,
                second,
                workload.lock_timeout,
                workload.hold,
                &workload.backoff,
                Some(probe),
            ),
            // The outer lock already serializes pair acquisition, so order is irrelevant
            AcquisitionStrategy::Combined => {
                acquire_sequence(first, second, None, workload.hold, Some(probe))
                    .map_err(ContendError::from)
            }
        };

        match acquired {
            Ok(mut guards) => {
                *guards.first += 1;
                *guards.second += 1;
                tally.retries += u64::from(guards.attempts - 1);
                drop(guards);
                mark(Some(probe), TaskState::Released);
                tally.completed += 1;
            }
            Err(e) if e.is_timeout() => {
                warn!("Round {}: abandoned ({})", round + 1, e);
                tally.abandoned += 1;
            }
            Err(e) => return Err(e),
        }

        drop(outer);
    }

    mark(Some(probe), TaskState::Released);
    Ok(tally)
}

/// Run `workload.tasks` threads named `task-<n>` that each take resources A and B
/// `workload.rounds` times, asking for them in alternating orders.
pub fn run_lock_pair(workload: &LockPairWorkload) -> Result<LockPairReport> {
    let pair = SharedPair {
        a: RankedLock::new(1, "resource-a", 0),
        b: RankedLock::new(2, "resource-b", 0),
        combined: Mutex::new(()),
    };
    let probes: Vec<TaskProbe> = (0..workload.tasks).map(|_| TaskProbe::new()).collect();

    info!(
        "Running {} task(s) x {} round(s) with the {} strategy",
        workload.tasks, workload.rounds, workload.strategy
    );

    let started = Instant::now();
    let tallies = run_workers("task", workload.tasks, |index| {
        run_task(&pair, index, workload, &probes[index])
    })?;
    let elapsed = started.elapsed();

    let mut report = LockPairReport {
        strategy: workload.strategy,
        tasks: workload.tasks,
        rounds_per_task: workload.rounds,
        completed_rounds: 0,
        suspected_deadlocks: 0,
        abandoned_rounds: 0,
        retries: 0,
        resource_a_updates: 0,
        resource_b_updates: 0,
        all_released: false,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
    };

    for tally in tallies {
        let tally = tally?;
        report.completed_rounds += tally.completed;
        report.suspected_deadlocks += tally.suspected;
        report.abandoned_rounds += tally.abandoned;
        report.retries += tally.retries;
    }

    report.all_released = !pair.a.is_locked()
        && !pair.b.is_locked()
        && probes.iter().all(|p| p.state() == TaskState::Released);
    report.resource_a_updates = pair.a.into_inner();
    report.resource_b_updates = pair.b.into_inner();

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
    fn test_guards_follow_caller_order() {
        let low = RankedLock::new(1, "low", "l");
        let high = RankedLock::new(2, "high", "h");

        let guards = lock_in_order(&high, &low).unwrap();
        assert_eq!(*guards.first, "h");
        assert_eq!(*guards.second, "l");
        assert!(low.is_locked());
        assert!(high.is_locked());
        drop(guards);
        assert!(!low.is_locked());
        assert!(!high.is_locked());
    }

    #[test]
    fn test_equal_ranks_rejected() {
        let a = RankedLock::new(3, "a", ());
        let b = RankedLock::new(3, "b", ());
        let err = lock_in_order(&a, &b).err().unwrap();
        assert!(matches!(err, ContendError::InvalidInput(_)));
    }

    #[test]
    fn test_timeout_releases_everything() {
        let a = RankedLock::new(1, "a", ());
        let b = RankedLock::new(2, "b", ());
        let held_b = b.lock();

        let err = try_lock_in_order_for(&a, &b, Duration::from_millis(20))
            .err()
            .unwrap();
        assert!(err.is_retryable());
        assert!(matches!(err, ContendError::LockTimeout { ref resource, .. } if resource == "b"));
        assert!(!a.is_locked());
        drop(held_b);
    }

    #[test]
    fn test_backoff_gives_up_with_attempt_count() {
        let a = RankedLock::new(1, "a", ());
        let b = RankedLock::new(2, "b", ());
        let _held = b.lock();
        let policy = BackoffPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            multiplier: 2.0,
            max_attempts: 3,
            jitter: false,
        };

        let err = lock_with_backoff(&a, &b, Duration::from_millis(5), &policy)
            .err()
            .unwrap();
        assert!(matches!(err, ContendError::LockTimeout { attempts: 3, .. }));
        assert!(!a.is_locked());
    }

    #[test]
    fn test_backoff_delay_growth_is_capped() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(2),
            max: Duration::from_millis(10),
            multiplier: 2.0,
            max_attempts: 10,
            jitter: false,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(2));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(10));
    }

    #[test]
    fn test_backoff_delay_never_negative() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(2),
            max: Duration::from_millis(10),
            multiplier: -2.0,
            max_attempts: 10,
            jitter: true,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(2));
        assert_eq!(policy.delay_for(2), Duration::ZERO);
        assert_eq!(policy.delay_for(3), Duration::from_millis(8));
        policy.sleep_after(2);

        let nan = BackoffPolicy {
            multiplier: f64::NAN,
            ..policy
        };
        assert_eq!(nan.delay_for(2), Duration::ZERO);
    }

    #[test]
    fn test_probe_tracks_states() {
        let a = RankedLock::new(1, "a", ());
        let b = RankedLock::new(2, "b", ());
        let probe = TaskProbe::new();
        assert_eq!(probe.state(), TaskState::NotStarted);

        let guards = acquire_sequence(&a, &b, None, Duration::ZERO, Some(&probe)).unwrap();
        assert_eq!(probe.state(), TaskState::HoldingBoth);
        drop(guards);

        let _held = b.lock();
        let wait = Some(Duration::from_millis(5));
        assert!(acquire_sequence(&a, &b, wait, Duration::ZERO, Some(&probe)).is_err());
        assert_eq!(probe.state(), TaskState::Released);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "Ordered".parse::<AcquisitionStrategy>().unwrap(),
            AcquisitionStrategy::Ordered
        );
        assert!("hope".parse::<AcquisitionStrategy>().is_err());
        assert!(!AcquisitionStrategy::Naive.is_safe());
        assert!(AcquisitionStrategy::Combined.is_safe());
    }

    #[test]
    fn test_ordered_run_completes() {
        let workload = LockPairWorkload {
            tasks: 4,
            rounds: 20,
            hold: Duration::ZERO,
            ..LockPairWorkload::default()
        };
        let report = run_lock_pair(&workload).unwrap();
        assert!(report.holds(), "{}", report.describe());
        assert_eq!(report.completed_rounds, 80);
        assert_eq!(report.resource_a_updates, 80);
    }

    #[test]
    fn test_naive_first_lock_timeout_is_not_a_suspected_deadlock() {
        let pair = SharedPair {
            a: RankedLock::new(1, "resource-a", 0),
            b: RankedLock::new(2, "resource-b", 0),
            combined: Mutex::new(()),
        };
        let workload = LockPairWorkload {
            rounds: 1,
            lock_timeout: Duration::from_millis(20),
            strategy: AcquisitionStrategy::Naive,
            ..LockPairWorkload::default()
        };

        // Task 0 asks for A first and never gets it, so it holds nothing
        let held = pair.a.lock();
        let tally = run_task(&pair, 0, &workload, &TaskProbe::new()).unwrap();
        drop(held);

        assert_eq!(tally.suspected, 0);
        assert_eq!(tally.abandoned, 1);
        assert_eq!(tally.completed, 0);
    }

    #[test]
    fn test_naive_second_lock_timeout_is_a_suspected_deadlock() {
        let pair = SharedPair {
            a: RankedLock::new(1, "resource-a", 0),
            b: RankedLock::new(2, "resource-b", 0),
            combined: Mutex::new(()),
        };
        let workload = LockPairWorkload {
            rounds: 1,
            hold: Duration::ZERO,
            lock_timeout: Duration::from_millis(20),
            strategy: AcquisitionStrategy::Naive,
            ..LockPairWorkload::default()
        };

        let held = pair.b.lock();
        let tally = run_task(&pair, 0, &workload, &TaskProbe::new()).unwrap();
        drop(held);

        assert_eq!(tally.suspected, 1);
        assert_eq!(tally.abandoned, 0);
        assert!(!pair.a.is_locked());
    }
}
