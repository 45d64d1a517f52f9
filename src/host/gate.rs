//! One-shot signaling gates.

use parking_lot::{Condvar, Mutex};

/// Binary one-shot semaphore for cross-thread readiness signaling.
///
/// A gate starts closed. [`Gate::open`] opens it exactly once per lifetime,
/// waking every current waiter; any later [`Gate::wait`] returns
/// immediately. Waits are intentionally unbounded.
#[derive(Debug, Default)]
pub struct Gate {
    opened: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    /// Create a closed gate.
    #[inline]
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Open the gate, waking all waiters. Idempotent.
    pub fn open(&self) {
        let mut opened = self.opened.lock();
        *opened = true;
        self.cv.notify_all();
    }

    /// Block until the gate opens. Returns immediately if already open.
    pub fn wait(&self) {
        let mut opened = self.opened.lock();
        while !*opened {
            self.cv.wait(&mut opened);
        }
    }

    /// Whether the gate has been opened.
    #[inline]
    pub fn is_open(&self) -> bool {
        *self.opened.lock()
    }
}
