//! CLI Command Tests
//!
//! This test suite covers:
//! - Config init / validate round trip
//! - Scenario commands and their success flags

use contend_cli::commands::{self, CounterOverrides, LockPairOverrides, WithdrawOverrides};
use contend_cli::OutputFormat;
use contend_core::ContendConfig;
use contend_sync::{AcquisitionStrategy, DetectionWorkload, Scenario, Variant};
use tempfile::TempDir;

// ==============================================================================
// Config Command Tests
// ==============================================================================

#[tokio::test]
async fn test_config_init_then_validate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    commands::config_init(&path, false).await.unwrap();
    assert!(path.exists());
    commands::config_validate(&path).await.unwrap();

    let loaded = ContendConfig::load_from_path(&path).await.unwrap();
    assert_eq!(loaded.account.initial_balance, 100);
}

#[tokio::test]
async fn test_config_init_keeps_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, "[trials]\ncount = 7\n").await.unwrap();

    commands::config_init(&path, false).await.unwrap();
    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(content.contains("count = 7"));

    commands::config_init(&path, true).await.unwrap();
    let loaded = ContendConfig::load_from_path(&path).await.unwrap();
    assert_eq!(loaded.trials.count, ContendConfig::default().trials.count);
}

#[tokio::test]
async fn test_config_validate_rejects_bad_strategy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, "[lock_pair]\nstrategy = \"hopeful\"\n")
        .await
        .unwrap();

    assert!(commands::config_validate(&path).await.is_err());
}

#[tokio::test]
async fn test_missing_config_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let config = commands::load_config(Some(&path)).await.unwrap();
    assert_eq!(config.counter.increments_per_worker, 100_000);
}

// ==============================================================================
// Scenario Command Tests
// ==============================================================================

#[tokio::test]
async fn test_guarded_counter_succeeds() {
    let overrides = CounterOverrides {
        increments: Some(1_000),
        ..CounterOverrides::default()
    };
    let ok = commands::counter(
        &ContendConfig::default(),
        &overrides,
        Variant::Guarded,
        OutputFormat::Json,
    )
    .await
    .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn test_guarded_withdraw_succeeds() {
    let overrides = WithdrawOverrides {
        think_ms: Some(1),
        ..WithdrawOverrides::default()
    };
    let ok = commands::withdraw(
        &ContendConfig::default(),
        &overrides,
        Variant::Guarded,
        OutputFormat::Json,
    )
    .await
    .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn test_ordered_lock_pair_succeeds() {
    let overrides = LockPairOverrides {
        strategy: Some(AcquisitionStrategy::Ordered),
        rounds: Some(20),
        ..LockPairOverrides::default()
    };
    let ok = commands::lock_pair(&ContendConfig::default(), &overrides, OutputFormat::Json)
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn test_guarded_trials_succeed() {
    let mut config = ContendConfig::default();
    config.account.think_time_ms = 1;

    let ok = commands::trials(
        &config,
        Scenario::Withdrawal,
        Some(3),
        Variant::Guarded,
        OutputFormat::Human,
    )
    .await
    .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn test_detect_succeeds() {
    let ok = commands::detect(DetectionWorkload::default(), OutputFormat::Json)
        .await
        .unwrap();
    assert!(ok);
}
