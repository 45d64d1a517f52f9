//! Handler table and worker-side dispatch context.
//!
//! Everything here is single-threaded state owned by the worker; host
//! threads never touch it. The one crossing point is [`reenter`], which lets
//! a synchronous send issued *from* the worker thread run inline instead of
//! deadlocking on the worker's own queue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::host::channel::MessageChannel;
use crate::runtime::fault::{FaultResult, RuntimeFault};
use crate::runtime::payload::OpaquePayload;
use crate::runtime::timer::TimerQueue;

/// A message handler bound to a type tag.
pub type HandlerFn = dyn Fn(&Runtime, OpaquePayload) -> FaultResult<OpaquePayload>;

pub(crate) struct LoopState {
    handlers: RefCell<HashMap<String, Rc<HandlerFn>>>,
    timers: RefCell<TimerQueue>,
    /// Fault recorded by an inline reentrant dispatch; surfaces once the
    /// outer handler returns.
    pending_fault: RefCell<Option<RuntimeFault>>,
}

/// Worker-side runtime handle.
///
/// Handed to the program's bootstrap, to message handlers and to scheduled
/// tasks. Cheap to clone; not `Send` — it never leaves the worker thread.
#[derive(Clone)]
pub struct Runtime {
    state: Rc<LoopState>,
    channel: Arc<MessageChannel>,
}

impl Runtime {
    pub(crate) fn new(channel: Arc<MessageChannel>) -> Self {
        Self {
            state: Rc::new(LoopState {
                handlers: RefCell::new(HashMap::new()),
                timers: RefCell::new(TimerQueue::new()),
                pending_fault: RefCell::new(None),
            }),
            channel,
        }
    }

    /// Bind a handler to a message type tag, replacing any previous binding.
    pub fn bind<F>(
        &self,
        tag: impl Into<String>,
        handler: F,
    ) where
        F: Fn(&Runtime, OpaquePayload) -> FaultResult<OpaquePayload> + 'static,
    {
        let tag = tag.into();
        trace!("binding handler for message type `{}`", tag);
        self.state
            .handlers
            .borrow_mut()
            .insert(tag, Rc::new(handler));
    }

    /// Remove the handler bound to `tag`. Returns whether one was bound.
    pub fn unbind(
        &self,
        tag: &str,
    ) -> bool {
        self.state.handlers.borrow_mut().remove(tag).is_some()
    }

    /// Schedule `task` to run on the worker thread after `delay`.
    ///
    /// Scheduled tasks are distinct from the immediate message queue: a
    /// `stop(false)` discards the ones not yet due, while `stop(true)` waits
    /// them out.
    pub fn schedule<F>(
        &self,
        delay: Duration,
        task: F,
    ) where
        F: FnOnce(&Runtime) -> FaultResult<()> + 'static,
    {
        self.state.timers.borrow_mut().schedule(delay, task);
    }

    /// Look up and invoke the handler for `tag`.
    pub(crate) fn dispatch(
        &self,
        tag: &str,
        payload: OpaquePayload,
    ) -> FaultResult<OpaquePayload> {
        let handler = self.state.handlers.borrow().get(tag).cloned();
        match handler {
            Some(handler) => handler(self, payload),
            None => Err(RuntimeFault::UnboundType(tag.to_owned())),
        }
    }

    pub(crate) fn record_fault(
        &self,
        fault: RuntimeFault,
    ) {
        let mut pending = self.state.pending_fault.borrow_mut();
        if pending.is_none() {
            *pending = Some(fault);
        }
    }

    pub(crate) fn take_fault(&self) -> Option<RuntimeFault> {
        self.state.pending_fault.borrow_mut().take()
    }

    /// Access the timer queue. Worker-loop internal.
    pub(crate) fn with_timers<R>(
        &self,
        f: impl FnOnce(&mut TimerQueue) -> R,
    ) -> R {
        f(&mut self.state.timers.borrow_mut())
    }

    fn shares_channel(
        &self,
        channel: &MessageChannel,
    ) -> bool {
        std::ptr::eq(self.channel.as_ref(), channel)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("handlers", &self.state.handlers.borrow().len())
            .field("timers", &self.state.timers.borrow().len())
            .finish()
    }
}

thread_local! {
    /// The runtime whose dispatch loop is executing on this thread, if any.
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// Installs the current runtime into the worker thread's context for the
/// lifetime of the dispatch loop; removed again on drop (including unwind).
pub(crate) struct ContextGuard;

impl ContextGuard {
    pub(crate) fn install(runtime: Runtime) -> Self {
        CURRENT.with(|current| *current.borrow_mut() = Some(runtime));
        ContextGuard
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| *current.borrow_mut() = None);
    }
}

/// Inline dispatch for a synchronous send issued from the worker thread of
/// the same embedding.
///
/// Returns `None` when the caller is not that worker (the normal enqueue
/// path applies). An inline fault is recorded against the loop and yields a
/// null result; it ends the worker once the outer handler unwinds.
pub(crate) fn reenter(
    channel: &MessageChannel,
    tag: &str,
    payload: OpaquePayload,
) -> Option<OpaquePayload> {
    let runtime = CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .filter(|runtime| runtime.shares_channel(channel))
            .cloned()
    })?;

    trace!("reentrant sync message `{}` dispatched inline", tag);
    match runtime.dispatch(tag, payload) {
        Ok(result) => Some(result),
        Err(fault) => {
            runtime.record_fault(fault);
            Some(OpaquePayload::null())
        }
    }
}
