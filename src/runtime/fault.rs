//! Worker-side fault taxonomy.

use thiserror::Error;

/// Fatal failures raised on the worker thread after startup.
///
/// A fault always ends the worker thread. Faults travel as tagged values and
/// are rendered to a display string only at the host boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeFault {
    /// An error value raised by a message handler or scheduled task.
    #[error("{0}")]
    Raised(String),

    /// Dispatch found no handler bound to the message type tag.
    #[error("no handler bound for message type `{0}`")]
    UnboundType(String),

    /// The worker thread panicked while running program code.
    #[error("worker thread panicked: {0}")]
    Panicked(String),
}

impl RuntimeFault {
    /// Raise a fault from an arbitrary message.
    #[inline]
    pub fn raised(message: impl Into<String>) -> Self {
        RuntimeFault::Raised(message.into())
    }
}

/// Result alias for program code running on the worker thread.
pub type FaultResult<T> = Result<T, RuntimeFault>;
