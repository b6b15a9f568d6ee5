//! Lost-update counter.
//!
//! Two implementations of the same read-modify-write `increment`:
//! - [`UnguardedCounter`] reads and writes with two separate atomic operations, so two
//!   workers can read the same value and one increment disappears
//! - [`GuardedCounter`] runs read, compute and write inside one critical section

use crate::trial::Invariant;
use crate::window::RaceWindow;
use crate::worker::run_workers;
use contend_core::{ContendError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;
use tracing::{info, trace, warn};

/// A shared integer updated by read-modify-write.
pub trait Counter: Send + Sync {
    /// Read the current value, add `amount`, write it back. Returns the value written.
    fn increment(&self, amount: i64) -> i64;

    fn value(&self) -> i64;

    /// Short label used in reports
    fn label(&self) -> &'static str;
}

/// Counter whose read and write are not covered by a single guard.
#[derive(Debug, Default)]
pub struct UnguardedCounter {
    value: AtomicI64,
    window: RaceWindow,
}

impl UnguardedCounter {
    pub fn new(window: RaceWindow) -> Self {
        Self {
            value: AtomicI64::new(0),
            window,
        }
    }
}

impl Counter for UnguardedCounter {
    fn increment(&self, amount: i64) -> i64 {
        let current = self.value.load(Ordering::Relaxed);
        trace!("Read {}", current);
        self.window.pause();
        let updated = current + amount;
        self.value.store(updated, Ordering::Relaxed);
        trace!("Wrote {}", updated);
        updated
    }

    fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    fn label(&self) -> &'static str {
        "unguarded"
    }
}

/// Counter whose whole read-modify-write runs under one mutex.
#[derive(Debug, Default)]
pub struct GuardedCounter {
    value: Mutex<i64>,
    window: RaceWindow,
}

impl GuardedCounter {
    pub fn new(window: RaceWindow) -> Self {
        Self {
            value: Mutex::new(0),
            window,
        }
    }
}

impl Counter for GuardedCounter {
    fn increment(&self, amount: i64) -> i64 {
        let mut value = self.value.lock();
        let current = *value;
        trace!("Read {}", current);
        self.window.pause();
        *value = current + amount;
        trace!("Wrote {}", *value);
        *value
    }

    fn value(&self) -> i64 {
        *self.value.lock()
    }

    fn label(&self) -> &'static str {
        "guarded"
    }
}

/// Shape of a counter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterWorkload {
    pub workers: usize,
    pub increments_per_worker: u64,
    pub amount: i64,
}

impl Default for CounterWorkload {
    fn default() -> Self {
        Self {
            workers: 2,
            increments_per_worker: 100_000,
            amount: 1,
        }
    }
}

/// Result of one counter run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterReport {
    pub counter: String,
    pub workload: CounterWorkload,
    pub expected: i64,
    pub observed: i64,
    /// Increments whose effect was lost (`(expected - observed) / amount`)
    pub lost_updates: i64,
    pub elapsed_ms: f64,
}

impl Invariant for CounterReport {
    fn holds(&self) -> bool {
        self.observed == self.expected
    }

    fn describe(&self) -> String {
        format!(
            "{} counter: expected {}, observed {} ({} lost update(s))",
            self.counter, self.expected, self.observed, self.lost_updates
        )
    }
}

/// Run `workload.workers` threads named `updater-<n>`, each incrementing `counter`
/// `increments_per_worker` times.
pub fn run_increments<C>(counter: &C, workload: &CounterWorkload) -> Result<CounterReport>
where
    C: Counter + ?Sized,
{
    if workload.amount == 0 {
        return Err(ContendError::invalid_input("increment amount must not be 0"));
    }

    let total_increments = (workload.workers as i64)
        .checked_mul(i64::try_from(workload.increments_per_worker).unwrap_or(i64::MAX))
        .ok_or_else(|| ContendError::invalid_input("workload is too large"))?;
    let start_value = counter.value();
    let expected = total_increments
        .checked_mul(workload.amount)
        .and_then(|delta| delta.checked_add(start_value))
        .ok_or_else(|| ContendError::invalid_input("expected total overflows i64"))?;

    let started = Instant::now();
    run_workers("updater", workload.workers, |_| {
        for _ in 0..workload.increments_per_worker {
            counter.increment(workload.amount);
        }
    })?;
    let elapsed = started.elapsed();

    let observed = counter.value();
    let report = CounterReport {
        counter: counter.label().to_string(),
        workload: *workload,
        expected,
        observed,
        lost_updates: (expected - observed) / workload.amount,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
    };

    if report.holds() {
        info!("{}", report.describe());
    } else {
        warn!("{}", report.describe());
    }

    Ok(report)
}
