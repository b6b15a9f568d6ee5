//! Output formatting utilities for the contend CLI.
//!
//! - Colored status lines
//! - Key/value and table rendering of scenario reports
//! - JSON output for scripting

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::style;
use contend_sync::{
    CounterReport, DetectionReport, Invariant, LockPairReport, ScenarioReport, TrialSummary,
    WithdrawalReport,
};
use serde::Serialize;
use std::fmt::Display;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable formatted output
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Print a success message
pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: impl Display) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print a section header
pub fn header(msg: impl Display) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: impl Display, value: impl Display) {
    println!("  {}: {}", style(key).cyan(), value);
}

/// Create a formatted table
pub struct TableBuilder {
    table: Table,
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        Self { table }
    }

    pub fn header<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String> + Display,
    {
        let row: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect();
        self.table.set_header(row);
        self
    }

    pub fn row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String> + Display,
    {
        let row: Vec<Cell> = cells.into_iter().map(Cell::new).collect();
        self.table.add_row(row);
        self
    }

    pub fn print(self) {
        println!("{}", self.table);
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Format milliseconds, switching to seconds past one second
pub fn format_elapsed(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Output data in the specified format
pub fn output<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        // Structured data without a dedicated renderer
        OutputFormat::Human => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

/// Final line of a human report: did the run behave as expected?
pub fn verdict(as_expected: bool, description: impl Display) {
    if as_expected {
        success(description);
    } else {
        warning(description);
    }
}

fn counter_lines(report: &CounterReport) {
    header(format!("Lost update ({} counter)", report.counter));
    kv("workers", report.workload.workers);
    kv("increments per worker", report.workload.increments_per_worker);
    kv("amount", report.workload.amount);
    kv("expected", report.expected);
    kv("observed", report.observed);
    kv("lost updates", report.lost_updates);
    kv("elapsed", format_elapsed(report.elapsed_ms));
}

fn withdrawal_lines(report: &WithdrawalReport) {
    header(format!("Guarded withdrawal ({} account)", report.account));
    kv("initial balance", report.initial);
    kv("final balance", report.final_balance);
    kv("lowest balance", report.lowest_balance);
    kv("attempts", report.attempts);
    kv("completed", report.completed);
    kv("declined", report.declined);
    kv("withdrawn", report.withdrawn());
    if report.overdrawn {
        kv("overdrawn", style("yes").red().bold());
    }
    kv("elapsed", format_elapsed(report.elapsed_ms));
}

fn lock_pair_lines(report: &LockPairReport) {
    header(format!("Lock pair ({} strategy)", report.strategy));
    kv("tasks", report.tasks);
    kv("rounds", format!("{}/{}", report.completed_rounds, report.expected_rounds()));
    kv("suspected deadlocks", report.suspected_deadlocks);
    kv("abandoned rounds", report.abandoned_rounds);
    kv("retries", report.retries);
    kv("all released", report.all_released);
    kv("elapsed", format_elapsed(report.elapsed_ms));
}

/// Print one scenario report. Returns whether its invariant held.
pub fn print_scenario_report(report: &ScenarioReport, format: OutputFormat) -> Result<bool> {
    if format == OutputFormat::Json {
        output(report, format)?;
        return Ok(report.holds());
    }

    match report {
        ScenarioReport::LostUpdate(r) => counter_lines(r),
        ScenarioReport::Withdrawal(r) => withdrawal_lines(r),
        ScenarioReport::LockPair(r) => lock_pair_lines(r),
    }
    println!();
    verdict(report.holds(), report.describe());

    Ok(report.holds())
}

/// Trial summary plus the context the table needs
#[derive(Debug, Clone, Serialize)]
pub struct TrialsView<'a> {
    pub scenario: String,
    pub variant: String,
    /// Whether this variant is expected to violate its invariant
    pub expect_violation: bool,
    #[serde(flatten)]
    pub summary: &'a TrialSummary,
}

impl TrialsView<'_> {
    pub fn as_expected(&self) -> bool {
        if self.expect_violation {
            self.summary.violated()
        } else {
            self.summary.always_held()
        }
    }
}

pub fn print_trials(view: &TrialsView<'_>, format: OutputFormat) -> Result<bool> {
    if format == OutputFormat::Json {
        output(view, format)?;
        return Ok(view.as_expected());
    }

    header(format!("Trials: {} ({})", view.scenario, view.variant));
    TableBuilder::new()
        .header(["Trials", "Violations", "Rate", "First violation"])
        .row([
            view.summary.trials.to_string(),
            view.summary.violations.to_string(),
            format!("{:.1}%", view.summary.violation_rate() * 100.0),
            view.summary
                .first_violation
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        ])
        .print();

    let expectation = if view.expect_violation {
        "the racy baseline should violate its invariant at least once"
    } else {
        "the corrected implementation should never violate its invariant"
    };
    verdict(view.as_expected(), format!("{}: {}", view.summary.describe(), expectation));

    Ok(view.as_expected())
}

pub fn print_detection(report: &DetectionReport, format: OutputFormat) -> Result<bool> {
    if format == OutputFormat::Json {
        output(report, format)?;
        return Ok(report.holds());
    }

    header("Lock table deadlock detection");
    kv("holders", report.holders);
    kv("finished", report.acquired);
    kv("victims", report.victims.join(", "));
    kv("timeouts", report.timeouts);
    kv("locks left", report.locks_left);
    kv("elapsed", format_elapsed(report.elapsed_ms));

    let stats = &report.statistics;
    TableBuilder::new()
        .header(["Acquired", "Released", "Conflicts", "Deadlocks", "Timeouts"])
        .row([
            stats.total_acquired,
            stats.total_released,
            stats.total_conflicts,
            stats.total_deadlocks,
            stats.total_timeouts,
        ]
        .map(|n| n.to_string()))
        .print();

    verdict(report.holds(), report.describe());
    Ok(report.holds())
}
