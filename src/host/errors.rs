//! Host-facing error taxonomy.

use thiserror::Error;

/// Errors surfaced synchronously to lifecycle callers.
///
/// Failures that occur after the runtime reaches `Running` are never
/// returned to a sender; they are funneled through the exception reporter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// Runtime bootstrap failed; the worker never reached its dispatch loop.
    #[error("runtime initialization failed: {0}")]
    Initialization(String),

    /// `start` was called while the worker is already starting or running.
    #[error("runtime thread is already running")]
    AlreadyRunning,
}

/// Result alias for lifecycle operations.
pub type HostResult<T> = Result<T, HostError>;
