//! Command implementations for the contend CLI.
//!
//! Every scenario command returns `Ok(true)` when the run behaved as expected, so the
//! binary can map the result onto its exit code.

use crate::output::{self, OutputFormat, TrialsView};
use anyhow::{Context, Result};
use contend_core::ContendConfig;
use contend_sync::{
    run_detection_demo, run_scenario, run_scenario_trials, AcquisitionStrategy,
    DetectionWorkload, RaceWindow, Scenario, ScenarioReport, ScenarioSettings, Variant,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// Configuration Loading
// ============================================================================

/// `--config` if given, otherwise `CONTEND_CONFIG_PATH` or `~/.contend/config.toml`
pub fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(ContendConfig::config_path()?),
    }
}

/// Load the configuration, falling back to defaults when the file does not exist
pub async fn load_config(path: Option<&Path>) -> Result<ContendConfig> {
    let path = resolve_config_path(path)?;
    ContendConfig::load_from_path_or_default(&path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

// ============================================================================
// Scenario Commands
// ============================================================================

/// Command-line overrides for the counter scenario
#[derive(Debug, Clone, Default)]
pub struct CounterOverrides {
    pub workers: Option<usize>,
    pub increments: Option<u64>,
    pub amount: Option<i64>,
    pub window: Option<RaceWindow>,
}

/// Command-line overrides for the withdrawal scenario
#[derive(Debug, Clone, Default)]
pub struct WithdrawOverrides {
    pub balance: Option<i64>,
    pub workers: Option<usize>,
    pub attempts: Option<u32>,
    pub amount: Option<i64>,
    pub think_ms: Option<u64>,
}

/// Command-line overrides for the lock-pair scenario
#[derive(Debug, Clone, Default)]
pub struct LockPairOverrides {
    pub strategy: Option<AcquisitionStrategy>,
    pub tasks: Option<usize>,
    pub rounds: Option<u32>,
    pub hold_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl CounterOverrides {
    fn apply(&self, settings: &mut ScenarioSettings) {
        if let Some(workers) = self.workers {
            settings.counter.workers = workers;
        }
        if let Some(increments) = self.increments {
            settings.counter.increments_per_worker = increments;
        }
        if let Some(amount) = self.amount {
            settings.counter.amount = amount;
        }
        if let Some(window) = self.window {
            settings.counter_window = window;
        }
    }
}

impl WithdrawOverrides {
    fn apply(&self, settings: &mut ScenarioSettings) {
        if let Some(balance) = self.balance {
            settings.initial_balance = balance;
        }
        if let Some(workers) = self.workers {
            settings.withdrawal.workers = workers;
        }
        if let Some(attempts) = self.attempts {
            settings.withdrawal.attempts_per_worker = attempts;
        }
        if let Some(amount) = self.amount {
            settings.withdrawal.amount = amount;
        }
        if let Some(think_ms) = self.think_ms {
            settings.think_time = RaceWindow::sleep_or_none(Duration::from_millis(think_ms));
        }
    }
}

impl LockPairOverrides {
    fn apply(&self, settings: &mut ScenarioSettings) {
        let workload = &mut settings.lock_pair;
        if let Some(strategy) = self.strategy {
            workload.strategy = strategy;
        }
        if let Some(tasks) = self.tasks {
            workload.tasks = tasks;
        }
        if let Some(rounds) = self.rounds {
            workload.rounds = rounds;
        }
        if let Some(hold_ms) = self.hold_ms {
            workload.hold = Duration::from_millis(hold_ms);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            workload.lock_timeout = Duration::from_millis(timeout_ms);
        }
    }
}

async fn run_blocking(
    settings: ScenarioSettings,
    scenario: Scenario,
    variant: Variant,
) -> Result<ScenarioReport> {
    debug!("Dispatching {} ({}) to a blocking thread", scenario, variant);
    let report = tokio::task::spawn_blocking(move || run_scenario(&settings, scenario, variant))
        .await
        .context("Scenario thread failed")??;
    Ok(report)
}

/// Run the lost-update counter once
pub async fn counter(
    config: &ContendConfig,
    overrides: &CounterOverrides,
    variant: Variant,
    format: OutputFormat,
) -> Result<bool> {
    let mut settings = ScenarioSettings::from_config(config)?;
    overrides.apply(&mut settings);
    settings.validate()?;

    let report = run_blocking(settings, Scenario::LostUpdate, variant).await?;
    output::print_scenario_report(&report, format)
}

/// Run the guarded withdrawal once
pub async fn withdraw(
    config: &ContendConfig,
    overrides: &WithdrawOverrides,
    variant: Variant,
    format: OutputFormat,
) -> Result<bool> {
    let mut settings = ScenarioSettings::from_config(config)?;
    overrides.apply(&mut settings);
    settings.validate()?;

    let report = run_blocking(settings, Scenario::Withdrawal, variant).await?;
    output::print_scenario_report(&report, format)
}

/// Run the two-lock scenario once
///
/// `--strategy naive` runs the unsafe acquisition order; the others are safe.
pub async fn lock_pair(
    config: &ContendConfig,
    overrides: &LockPairOverrides,
    format: OutputFormat,
) -> Result<bool> {
    let mut settings = ScenarioSettings::from_config(config)?;
    overrides.apply(&mut settings);
    settings.validate()?;

    let report = run_blocking(settings, Scenario::LockPair, Variant::Guarded).await?;
    output::print_scenario_report(&report, format)
}

/// Repeat a scenario and count invariant violations
///
/// Succeeds when a guarded run never violated its invariant, or an unguarded run
/// violated it at least once.
pub async fn trials(
    config: &ContendConfig,
    scenario: Scenario,
    count: Option<usize>,
    variant: Variant,
    format: OutputFormat,
) -> Result<bool> {
    let settings = ScenarioSettings::from_config(config)?;
    let count = count.unwrap_or(config.trials.count);

    let summary = tokio::task::spawn_blocking(move || {
        run_scenario_trials(&settings, scenario, variant, count)
    })
    .await
    .context("Trial thread failed")??;

    let view = TrialsView {
        scenario: scenario.to_string(),
        variant: variant.to_string(),
        expect_violation: variant == Variant::Unguarded,
        summary: &summary,
    };
    output::print_trials(&view, format)
}

/// Build a circular wait on the lock table and let it break the cycle
pub async fn detect(workload: DetectionWorkload, format: OutputFormat) -> Result<bool> {
    let report = run_detection_demo(&workload).await?;
    output::print_detection(&report, format)
}

// ============================================================================
// Configuration Commands
// ============================================================================

/// Print the effective configuration
pub async fn config_show(config: &ContendConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", config.export_json()?),
        OutputFormat::Human => {
            output::header("Configuration");
            println!("{}", config.export_toml()?);
        }
    }
    Ok(())
}

/// Write the default configuration to `path`
pub async fn config_init(path: &Path, force: bool) -> Result<()> {
    if tokio::fs::try_exists(path).await? && !force {
        output::warning(format!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        ));
        return Ok(());
    }

    ContendConfig::default().save_to_path(path).await?;
    info!("Wrote default configuration to {}", path.display());
    output::success(format!("Configuration written to {}", path.display()));
    Ok(())
}

/// Load and validate the configuration at `path`
pub async fn config_validate(path: &Path) -> Result<()> {
    let config = ContendConfig::load_from_path(path)
        .await
        .with_context(|| format!("Invalid configuration at {}", path.display()))?;

    // Catches values the TOML schema accepts but the scenarios cannot run with
    ScenarioSettings::from_config(&config)?;

    output::success(format!("{} is valid", path.display()));
    Ok(())
}

pub fn config_path(path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => output::output(&serde_json::json!({ "path": path }), format)?,
        OutputFormat::Human => println!("{}", path.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_overrides_apply() {
        let mut settings = ScenarioSettings::default();
        let overrides = CounterOverrides {
            workers: Some(8),
            window: Some(RaceWindow::Yield),
            ..CounterOverrides::default()
        };
        overrides.apply(&mut settings);

        assert_eq!(settings.counter.workers, 8);
        assert_eq!(settings.counter.increments_per_worker, 100_000);
        assert_eq!(settings.counter_window, RaceWindow::Yield);
    }

    #[test]
    fn test_zero_think_time_disables_window() {
        let mut settings = ScenarioSettings::default();
        let overrides = WithdrawOverrides {
            think_ms: Some(0),
            ..WithdrawOverrides::default()
        };
        overrides.apply(&mut settings);
        assert_eq!(settings.think_time, RaceWindow::None);
    }

    #[tokio::test]
    async fn test_withdraw_rejects_negative_balance() {
        let overrides = WithdrawOverrides {
            balance: Some(-50),
            ..WithdrawOverrides::default()
        };
        let err = withdraw(
            &ContendConfig::default(),
            &overrides,
            Variant::Guarded,
            OutputFormat::Json,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("initial balance cannot be negative"));
    }

    #[tokio::test]
    async fn test_lock_pair_rejects_zero_tasks() {
        let overrides = LockPairOverrides {
            tasks: Some(0),
            ..LockPairOverrides::default()
        };
        let err = lock_pair(&ContendConfig::default(), &overrides, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tasks"));
    }

    #[test]
    fn test_lock_pair_overrides_apply() {
        let mut settings = ScenarioSettings::default();
        let overrides = LockPairOverrides {
            strategy: Some(AcquisitionStrategy::Backoff),
            timeout_ms: Some(25),
            ..LockPairOverrides::default()
        };
        overrides.apply(&mut settings);

        assert_eq!(settings.lock_pair.strategy, AcquisitionStrategy::Backoff);
        assert_eq!(settings.lock_pair.lock_timeout, Duration::from_millis(25));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/contend.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/contend.toml"));
    }
}
