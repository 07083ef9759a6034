//! Error types for pool and worker operations.

use thiserror::Error;

/// Errors produced by the resource pool, its strategies, and the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A blocking operation was abandoned because the run was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// The pool returned neither a valid resource nor `Cancelled`.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    /// A worker was woken from a sleep or wait by a forced shutdown.
    #[error("forced interruption")]
    ForcedInterruption,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A simulation is already running on this worker pool.
    #[error("simulation already running")]
    AlreadyRunning,
    /// Internal failure (thread spawn error, worker panic, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// Returns true for the expected, locally recoverable cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true for errors that must halt the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ContractViolation(_) | Self::Internal(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
