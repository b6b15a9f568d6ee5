//! Error types shared by the contend crates.

use std::time::Duration;

/// Result type alias for contend operations.
pub type Result<T> = std::result::Result<T, ContendError>;

/// Main error type for the contend workspace.
///
/// Silent data corruption (a lost update, an overdrawn balance) never shows up here:
/// those are detected by checking a run report after the fact.
#[derive(Debug, thiserror::Error)]
pub enum ContendError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Bounded lock acquisition gave up. Callers may release and retry.
    #[error("Timed out acquiring {resource} after {waited:?} ({attempts} attempt(s))")]
    LockTimeout {
        resource: String,
        waited: Duration,
        attempts: u32,
    },

    /// A wait-for cycle was found between lock holders
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    /// A worker thread panicked before reporting
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContendError {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new lock timeout error
    pub fn lock_timeout(resource: impl Into<String>, waited: Duration, attempts: u32) -> Self {
        Self::LockTimeout {
            resource: resource.into(),
            waited,
            attempts,
        }
    }

    /// Create a new deadlock error
    pub fn deadlock(msg: impl Into<String>) -> Self {
        Self::Deadlock(msg.into())
    }

    /// Create a new worker panic error
    pub fn worker_panicked(msg: impl Into<String>) -> Self {
        Self::WorkerPanicked(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the operation can be retried after releasing held resources
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Deadlock(_))
    }

    /// Check if this is a lock timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Check if this is a deadlock error
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::Deadlock(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
