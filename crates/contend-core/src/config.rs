//! Configuration for contend scenario runs.
//!
//! Configuration lives in a single TOML file, by default `~/.contend/config.toml`.
//! The location can be overridden with the `CONTEND_CONFIG_PATH` environment variable,
//! and a handful of values can be overridden individually (see the `ENV_*` constants).
//!
//! # Example
//!
//! ```no_run
//! use contend_core::config::ContendConfig;
//!
//! # async fn example() -> contend_core::Result<()> {
//! let mut config = ContendConfig::load_or_default().await?;
//! config.counter.workers = 4;
//! config.save().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ContendError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// The current configuration version
pub const CONFIG_VERSION: &str = "0.1.0";

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "CONTEND_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "CONTEND_LOG_LEVEL";
pub const ENV_WORKERS: &str = "CONTEND_WORKERS";
pub const ENV_TRIALS: &str = "CONTEND_TRIALS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "CONTEND_LOCK_TIMEOUT_MS";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_WINDOWS: [&str; 3] = ["none", "yield", "sleep"];
const VALID_STRATEGIES: [&str; 4] = ["naive", "ordered", "backoff", "combined"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContendConfig {
    pub general: GeneralConfig,
    pub counter: CounterConfig,
    pub account: AccountConfig,
    pub lock_pair: LockPairConfig,
    pub trials: TrialsConfig,
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Configuration version
    pub version: String,
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

/// Lost-update counter workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub workers: usize,
    pub increments_per_worker: u64,
    pub amount: i64,
    /// Pause between read and write: none, yield, sleep
    pub window: String,
    /// Sleep length in microseconds when `window = "sleep"`
    pub window_us: u64,
}

/// Guarded withdrawal workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub initial_balance: i64,
    pub workers: usize,
    pub attempts_per_worker: u32,
    pub amount: i64,
    /// Pause between the funds check and the debit, in milliseconds
    pub think_time_ms: u64,
}

/// Two-resource lock workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPairConfig {
    pub tasks: usize,
    pub rounds: u32,
    /// How long a task sits on the first lock before asking for the second
    pub hold_ms: u64,
    /// Bound on every single lock wait
    pub lock_timeout_ms: u64,
    /// naive, ordered, backoff, combined
    pub strategy: String,
    pub backoff: BackoffConfig,
}

/// Release-and-retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

/// Repeated-run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialsConfig {
    pub count: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            increments_per_worker: 100_000,
            amount: 1,
            window: "none".to_string(),
            window_us: 0,
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100,
            workers: 2,
            attempts_per_worker: 3,
            amount: 30,
            think_time_ms: 5,
        }
    }
}

impl Default for LockPairConfig {
    fn default() -> Self {
        Self {
            tasks: 2,
            rounds: 50,
            hold_ms: 1,
            lock_timeout_ms: 200,
            strategy: "ordered".to_string(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1,
            max_ms: 50,
            multiplier: 2.0,
            max_attempts: 32,
        }
    }
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self { count: 20 }
    }
}

impl CounterConfig {
    /// Sleep length of the race window
    pub fn window_duration(&self) -> Duration {
        Duration::from_micros(self.window_us)
    }
}

impl AccountConfig {
    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }
}

impl LockPairConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl ContendConfig {
    /// Load configuration from the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path).await
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ContendError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::import_toml(&content)?;
        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when no file exists
    pub async fn load_or_default() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path_or_default(&config_path).await
    }

    /// Load from `path`, falling back to defaults (plus env overrides) when it is missing
    pub async fn load_from_path_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await? {
            Self::load_from_path(path).await
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            let mut config = Self::default();
            config.merge_env_vars()?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path).await
    }

    /// Save configuration to a specific path atomically (temp file, then rename)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or cannot be written
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !tokio::fs::try_exists(parent).await? {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ContendError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.export_toml()?;
        let temp_path = path.with_extension("toml.tmp");

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| ContendError::Config(format!("Failed to write config file: {}", e)))?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| ContendError::Config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(ContendError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.counter.workers == 0 {
            return Err(ContendError::config("counter.workers must be greater than 0"));
        }

        if !VALID_WINDOWS.contains(&self.counter.window.as_str()) {
            return Err(ContendError::Config(format!(
                "Invalid race window '{}'. Must be one of: {}",
                self.counter.window,
                VALID_WINDOWS.join(", ")
            )));
        }

        if self.account.workers == 0 {
            return Err(ContendError::config("account.workers must be greater than 0"));
        }

        if self.account.amount <= 0 {
            return Err(ContendError::config("account.amount must be greater than 0"));
        }

        if self.account.initial_balance < 0 {
            return Err(ContendError::config("account.initial_balance cannot be negative"));
        }

        if self.lock_pair.tasks == 0 {
            return Err(ContendError::config("lock_pair.tasks must be greater than 0"));
        }

        if self.lock_pair.lock_timeout_ms == 0 {
            return Err(ContendError::config(
                "lock_pair.lock_timeout_ms must be greater than 0",
            ));
        }

        if !VALID_STRATEGIES.contains(&self.lock_pair.strategy.as_str()) {
            return Err(ContendError::Config(format!(
                "Invalid lock strategy '{}'. Must be one of: {}",
                self.lock_pair.strategy,
                VALID_STRATEGIES.join(", ")
            )));
        }

        let backoff = &self.lock_pair.backoff;
        if backoff.max_attempts == 0 {
            return Err(ContendError::config("backoff.max_attempts must be greater than 0"));
        }
        if backoff.multiplier < 1.0 {
            return Err(ContendError::config("backoff.multiplier must be at least 1.0"));
        }
        if backoff.initial_ms > backoff.max_ms {
            return Err(ContendError::config(
                "backoff.initial_ms cannot be greater than backoff.max_ms",
            ));
        }

        if self.trials.count == 0 {
            return Err(ContendError::config("trials.count must be greater than 0"));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Merge environment variable overrides into the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Ok(workers) = std::env::var(ENV_WORKERS) {
            let workers = parse_env::<usize>(ENV_WORKERS, &workers)?;
            debug!("Overriding worker count from environment: {}", workers);
            self.counter.workers = workers;
            self.account.workers = workers;
            self.lock_pair.tasks = workers;
        }

        if let Ok(trials) = std::env::var(ENV_TRIALS) {
            self.trials.count = parse_env(ENV_TRIALS, &trials)?;
        }

        if let Ok(timeout) = std::env::var(ENV_LOCK_TIMEOUT_MS) {
            self.lock_pair.lock_timeout_ms = parse_env(ENV_LOCK_TIMEOUT_MS, &timeout)?;
        }

        Ok(())
    }

    /// Path of the configuration file
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::base_dir()?.join("config.toml"))
    }

    /// `~/.contend`
    pub fn base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".contend"))
            .ok_or_else(|| ContendError::config("Could not determine home directory"))
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn export_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ContendError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn import_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ContendError::Config(format!("Failed to parse config file: {}", e)))
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ContendError::Config(format!("Invalid value for {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ContendConfig::default();
        assert_eq!(config.general.version, CONFIG_VERSION);
        assert_eq!(config.counter.workers, 2);
        assert_eq!(config.counter.increments_per_worker, 100_000);
        assert_eq!(config.account.initial_balance, 100);
        assert_eq!(config.account.amount, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ContendConfig::default();

        config.general.log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.general.log_level = "debug".to_string();

        config.counter.window = "nap".to_string();
        assert!(config.validate().is_err());
        config.counter.window = "yield".to_string();

        config.account.amount = 0;
        assert!(config.validate().is_err());
        config.account.amount = 30;

        config.lock_pair.strategy = "hope".to_string();
        assert!(config.validate().is_err());
        config.lock_pair.strategy = "backoff".to_string();

        config.lock_pair.backoff.initial_ms = 100;
        config.lock_pair.backoff.max_ms = 10;
        assert!(config.validate().is_err());
        config.lock_pair.backoff.max_ms = 100;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ContendConfig::import_toml("[counter]\nworkers = 8\n").unwrap();
        assert_eq!(config.counter.workers, 8);
        assert_eq!(config.counter.increments_per_worker, 100_000);
        assert_eq!(config.account, AccountConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = ContendConfig::default();
        config.lock_pair.strategy = "combined".to_string();
        config.trials.count = 7;

        config.save_to_path(&config_path).await.unwrap();
        assert!(config_path.exists());
        assert!(!config_path.with_extension("toml.tmp").exists());

        let loaded = ContendConfig::load_from_path(&config_path).await.unwrap();
        assert_eq!(loaded.lock_pair.strategy, "combined");
        assert_eq!(loaded.trials.count, 7);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("absent.toml");

        let config = ContendConfig::load_from_path_or_default(&config_path)
            .await
            .unwrap();
        assert_eq!(config.account.workers, ContendConfig::default().account.workers);
    }

    #[test]
    fn test_export_json() {
        let json = ContendConfig::default().export_json().unwrap();
        assert!(json.contains("\"increments_per_worker\": 100000"));
    }
}
