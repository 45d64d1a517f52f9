//! Unhandled-fault reporting.

use parking_lot::Mutex;
use tracing::error;

use crate::runtime::fault::RuntimeFault;

/// Host callback fired on the worker thread right before it dies from an
/// unhandled fault.
pub type ExceptionHook = Box<dyn Fn(&str) + Send + 'static>;

/// Single hook slot, re-armed by every `start` call.
///
/// The hook fires at most once per worker-thread lifetime, synchronously on
/// the worker thread, before the exit gate opens. Bootstrap failures never
/// reach it; they surface through the startup result instead.
#[derive(Default)]
pub struct ExceptionReporter {
    hook: Mutex<Option<ExceptionHook>>,
}

impl ExceptionReporter {
    /// Create an empty reporter.
    #[inline]
    pub fn new() -> Self {
        Self {
            hook: Mutex::new(None),
        }
    }

    /// Install the hook for the next worker lifetime, replacing any
    /// previous one. `None` clears the slot.
    pub fn arm(
        &self,
        hook: Option<ExceptionHook>,
    ) {
        *self.hook.lock() = hook;
    }

    /// Fire the armed hook with the fault, rendered to a display string at
    /// this boundary. Taking the hook out of the slot makes repeat calls
    /// within one worker lifetime no-ops.
    pub fn report(
        &self,
        fault: &RuntimeFault,
    ) {
        error!("unhandled runtime fault: {}", fault);
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook(&fault.to_string());
        }
    }
}

impl std::fmt::Debug for ExceptionReporter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let armed = self.hook.lock().is_some();
        f.debug_struct("ExceptionReporter")
            .field("armed", &armed)
            .finish()
    }
}
