//! Core types for the contend workspace.
//!
//! This crate provides the error type and the configuration used by the
//! scenario runners and the CLI.

pub mod config;
pub mod error;

pub use config::{
    AccountConfig, BackoffConfig, ContendConfig, CounterConfig, GeneralConfig, LockPairConfig,
    TrialsConfig,
};
pub use error::{ContendError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ContendConfig;
    pub use crate::error::{ContendError, Result};
}
