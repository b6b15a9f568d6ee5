//! Artificial pauses that widen a race window.

use contend_core::{ContendError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Pause inserted between a read (or check) and the write that depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceWindow {
    /// No pause
    #[default]
    None,
    /// Give up the rest of the time slice
    Yield,
    /// Sleep for a fixed duration
    Sleep(Duration),
}

impl RaceWindow {
    /// Build a window from the configuration's `window` / `window_us` pair.
    pub fn from_config(kind: &str, sleep: Duration) -> Result<Self> {
        match kind {
            "none" => Ok(Self::None),
            "yield" => Ok(Self::Yield),
            "sleep" => Ok(Self::Sleep(sleep)),
            other => Err(ContendError::invalid_input(format!(
                "Unknown race window '{}'",
                other
            ))),
        }
    }

    /// A sleep window, or no window at all for a zero duration.
    pub fn sleep_or_none(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::None
        } else {
            Self::Sleep(duration)
        }
    }

    pub fn pause(&self) {
        match self {
            Self::None => {}
            Self::Yield => std::thread::yield_now(),
            Self::Sleep(duration) => std::thread::sleep(*duration),
        }
    }
}

impl FromStr for RaceWindow {
    type Err = ContendError;

    /// Accepts `none`, `yield`, `sleep-us:<n>` and `sleep-ms:<n>`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        if let Some(us) = lower.strip_prefix("sleep-us:") {
            return parse_amount(us).map(|n| Self::Sleep(Duration::from_micros(n)));
        }
        if let Some(ms) = lower.strip_prefix("sleep-ms:") {
            return parse_amount(ms).map(|n| Self::Sleep(Duration::from_millis(n)));
        }
        Self::from_config(&lower, Duration::ZERO)
    }
}

impl fmt::Display for RaceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Yield => write!(f, "yield"),
            Self::Sleep(d) => write!(f, "sleep-us:{}", d.as_micros()),
        }
    }
}

fn parse_amount(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|e| ContendError::invalid_input(format!("Invalid window length '{}': {}", s, e)))
}
