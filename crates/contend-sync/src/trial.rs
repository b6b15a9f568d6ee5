//! Repeated runs and invariant bookkeeping.

use contend_core::{ContendError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A post-run check on a scenario report.
pub trait Invariant {
    /// Whether the scenario's correctness property held for this run
    fn holds(&self) -> bool;

    /// One-line description of what was observed
    fn describe(&self) -> String;
}

/// Outcome of running a scenario several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub trials: usize,
    pub violations: usize,
    /// Description of the first violating run, if any
    pub first_violation: Option<String>,
}

impl TrialSummary {
    pub fn always_held(&self) -> bool {
        self.violations == 0
    }

    pub fn violated(&self) -> bool {
        self.violations > 0
    }

    /// Fraction of trials that violated the invariant
    pub fn violation_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.violations as f64 / self.trials as f64
        }
    }
}

impl Invariant for TrialSummary {
    fn holds(&self) -> bool {
        self.always_held()
    }

    fn describe(&self) -> String {
        format!("{} of {} trial(s) violated the invariant", self.violations, self.trials)
    }
}

/// Run `f` `trials` times and count the runs whose report does not hold.
///
/// Errors from `f` abort the whole run.
pub fn run_trials<R, F>(trials: usize, mut f: F) -> Result<TrialSummary>
where
    R: Invariant,
    F: FnMut(usize) -> Result<R>,
{
    if trials == 0 {
        return Err(ContendError::invalid_input("trial count must be greater than 0"));
    }

    let mut summary = TrialSummary {
        trials,
        violations: 0,
        first_violation: None,
    };

    for trial in 0..trials {
        let report = f(trial)?;
        if report.holds() {
            debug!("Trial {} held: {}", trial + 1, report.describe());
        } else {
            let description = report.describe();
            warn!("Trial {} violated the invariant: {}", trial + 1, description);
            summary.violations += 1;
            summary.first_violation.get_or_insert(description);
        }
    }

    info!("{}", summary.describe());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flag(bool);

    impl Invariant for Flag {
        fn holds(&self) -> bool {
            self.0
        }

        fn describe(&self) -> String {
            format!("flag={}", self.0)
        }
    }

    #[test]
    fn test_counts_violations() {
        let summary = run_trials(6, |trial| Ok(Flag(trial % 3 != 0))).unwrap();
        assert_eq!(summary.trials, 6);
        assert_eq!(summary.violations, 2);
        assert_eq!(summary.first_violation.as_deref(), Some("flag=false"));
        assert!(summary.violated());
        assert!((summary.violation_rate() - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_aborts() {
        let mut calls = 0;
        let result = run_trials(5, |trial| {
            calls += 1;
            if trial == 2 {
                Err(ContendError::internal("boom"))
            } else {
                Ok(Flag(true))
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_zero_trials_rejected() {
        assert!(run_trials(0, |_| Ok(Flag(true))).is_err());
    }
}
