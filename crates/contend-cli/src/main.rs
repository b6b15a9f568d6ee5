//! contend - run shared-state concurrency scenarios and check their invariants.
//!
//! # Usage
//!
//! ```bash
//! # Lost update, corrected and racy
//! contend counter --workers 2 --increments 100000
//! contend counter --unguarded --window yield
//!
//! # Check-then-act race on a balance
//! contend withdraw --balance 100 --amount 30 --unguarded
//!
//! # Two locks, four acquisition strategies
//! contend lock-pair --strategy naive --hold-ms 20 --timeout-ms 50
//!
//! # Repeat a scenario and count violations
//! contend trials counter --count 50 --unguarded
//!
//! # Circular wait caught by the lock table
//! contend detect --holders 3
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use contend_cli::commands::{self, CounterOverrides, LockPairOverrides, WithdrawOverrides};
use contend_cli::{output, OutputFormat};
use contend_sync::{AcquisitionStrategy, DetectionWorkload, RaceWindow, Scenario, Variant};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "contend")]
#[command(about = "contend - shared-state concurrency scenarios", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (human, json)
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Increment a shared counter from several threads
    Counter {
        /// Worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Increments per worker
        #[arg(short, long)]
        increments: Option<u64>,

        /// Amount added per increment
        #[arg(short, long, allow_negative_numbers = true)]
        amount: Option<i64>,

        /// Use the racy read-then-write counter
        #[arg(long)]
        unguarded: bool,

        /// Pause between read and write: none, yield, sleep-us:N, sleep-ms:N
        #[arg(long)]
        window: Option<RaceWindow>,
    },

    /// Withdraw from a shared balance from several threads
    Withdraw {
        /// Starting balance
        #[arg(short, long, allow_negative_numbers = true)]
        balance: Option<i64>,

        /// Shopper threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Withdrawal attempts per shopper
        #[arg(long)]
        attempts: Option<u32>,

        /// Amount per withdrawal
        #[arg(short, long)]
        amount: Option<i64>,

        /// Use the racy check-then-act account
        #[arg(long)]
        unguarded: bool,

        /// Pause between the funds check and the debit, in milliseconds
        #[arg(long)]
        think_ms: Option<u64>,
    },

    /// Take two locks from several tasks in opposite orders
    LockPair {
        /// naive, ordered, backoff, combined
        #[arg(short, long)]
        strategy: Option<AcquisitionStrategy>,

        /// Task threads
        #[arg(short, long)]
        tasks: Option<usize>,

        /// Rounds per task
        #[arg(short, long)]
        rounds: Option<u32>,

        /// Time on the first lock before asking for the second, in milliseconds
        #[arg(long)]
        hold_ms: Option<u64>,

        /// Bound on a single lock wait, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Repeat a scenario and count invariant violations
    Trials {
        /// counter, withdraw, lock-pair
        scenario: Scenario,

        /// Number of runs (default from configuration)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Run the racy baseline (naive order for lock-pair)
        #[arg(long)]
        unguarded: bool,
    },

    /// Build a circular wait on the lock table and watch it get broken
    Detect {
        /// Holders in the ring
        #[arg(long, default_value = "2")]
        holders: usize,

        /// Bound on each wait, in milliseconds
        #[arg(long, default_value = "2000")]
        wait_ms: u64,

        /// Time spent holding both resources, in milliseconds
        #[arg(long, default_value = "5")]
        hold_ms: u64,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Check the configuration file
    Validate,

    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            output::error(format!("{:#}", e));
            process::exit(1);
        }
    }
}

/// Returns whether the command behaved as expected
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format);
    let config_path = commands::resolve_config_path(cli.config.as_deref())?;

    // Config commands must work even when the file is broken
    if let Commands::Config(config_cmd) = &cli.command {
        init_logging(cli.verbose, "info");
        match config_cmd {
            ConfigCommands::Show => {
                let config = commands::load_config(Some(&config_path)).await?;
                commands::config_show(&config, format).await?;
            }
            ConfigCommands::Init { force } => commands::config_init(&config_path, *force).await?,
            ConfigCommands::Validate => commands::config_validate(&config_path).await?,
            ConfigCommands::Path => commands::config_path(&config_path, format)?,
        }
        return Ok(true);
    }

    let config = commands::load_config(Some(&config_path)).await?;
    init_logging(cli.verbose, &config.general.log_level);

    let as_expected = match cli.command {
        Commands::Counter {
            workers,
            increments,
            amount,
            unguarded,
            window,
        } => {
            let overrides = CounterOverrides {
                workers,
                increments,
                amount,
                window,
            };
            commands::counter(&config, &overrides, Variant::from_unguarded_flag(unguarded), format)
                .await?
        }

        Commands::Withdraw {
            balance,
            workers,
            attempts,
            amount,
            unguarded,
            think_ms,
        } => {
            let overrides = WithdrawOverrides {
                balance,
                workers,
                attempts,
                amount,
                think_ms,
            };
            commands::withdraw(&config, &overrides, Variant::from_unguarded_flag(unguarded), format)
                .await?
        }

        Commands::LockPair {
            strategy,
            tasks,
            rounds,
            hold_ms,
            timeout_ms,
        } => {
            let overrides = LockPairOverrides {
                strategy,
                tasks,
                rounds,
                hold_ms,
                timeout_ms,
            };
            commands::lock_pair(&config, &overrides, format).await?
        }

        Commands::Trials {
            scenario,
            count,
            unguarded,
        } => {
            commands::trials(
                &config,
                scenario,
                count,
                Variant::from_unguarded_flag(unguarded),
                format,
            )
            .await?
        }

        Commands::Detect {
            holders,
            wait_ms,
            hold_ms,
        } => {
            let workload = DetectionWorkload {
                holders,
                wait: Duration::from_millis(wait_ms),
                hold: Duration::from_millis(hold_ms),
            };
            commands::detect(workload, format).await?
        }

        Commands::Config(_) => true,
    };

    Ok(as_expected)
}

/// `RUST_LOG` wins; otherwise the configured level. Thread names identify workers.
fn init_logging(verbose: bool, level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("contend_sync=debug,contend_core=debug,contend_cli=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "contend_sync={0},contend_core={0},contend_cli={0},warn",
                level
            ))
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(true),
        )
        .init();
}
