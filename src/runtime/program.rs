//! Embedded program contract.

use crate::runtime::dispatch::Runtime;
use crate::runtime::fault::{FaultResult, RuntimeFault};

/// The application hosted on the worker thread.
///
/// A fresh instance is built (via the host's program factory) for every
/// `start`, so no program state survives a stop/start cycle.
///
/// All methods run on the worker thread.
pub trait EmbeddedProgram: Send + 'static {
    /// Bootstrap entry point: bind message handlers and schedule startup
    /// work through `rt`. An error here is surfaced synchronously to the
    /// `start` caller and the worker never enters its dispatch loop.
    fn boot(
        &mut self,
        rt: &Runtime,
    ) -> FaultResult<()>;

    /// Cleanup hook invoked on the worker thread while a fatal fault is
    /// propagating, before the host's exception hook fires.
    fn teardown(
        &mut self,
        _fault: &RuntimeFault,
    ) {
    }
}
