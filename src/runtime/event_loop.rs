//! The worker's cooperative dispatch loop.
//!
//! One message or scheduled task at a time, in order; no parallelism inside
//! the runtime. This is a design requirement of the embedded environment,
//! not an optimization.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::host::channel::{Envelope, Message, MessageChannel, ReplyGuard};
use crate::runtime::dispatch::{ContextGuard, Runtime};
use crate::runtime::fault::FaultResult;

/// Endless-loop entry point for the worker thread.
pub(crate) struct EventLoop {
    channel: Arc<MessageChannel>,
    runtime: Runtime,
}

impl EventLoop {
    pub(crate) fn new(channel: Arc<MessageChannel>) -> Self {
        let runtime = Runtime::new(channel.clone());
        Self { channel, runtime }
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Process queued messages and scheduled tasks until a termination
    /// token is honored (`Ok`) or a fault ends the worker (`Err`).
    ///
    /// After the token arrives, `drain_scheduled` decides whether the loop
    /// waits out the timer queue (serving late messages meanwhile) or
    /// discards it and exits once the immediate backlog is done.
    pub(crate) fn run(&mut self) -> FaultResult<()> {
        let _context = ContextGuard::install(self.runtime.clone());
        let mut terminating: Option<bool> = None;

        loop {
            self.run_due_timers()?;

            if let Some(drain_scheduled) = terminating {
                let timers_left = self.runtime.with_timers(|timers| !timers.is_empty());
                if !drain_scheduled || !timers_left {
                    debug!("dispatch loop terminating");
                    return Ok(());
                }
            }

            let deadline = self.runtime.with_timers(|timers| timers.next_due());
            match self.channel.pop_deadline(deadline) {
                Some(Envelope::Message(message)) => self.dispatch_message(message)?,
                Some(Envelope::Terminate { drain_scheduled }) => {
                    debug!(
                        "termination token received (drain_scheduled = {})",
                        drain_scheduled
                    );
                    if !drain_scheduled {
                        self.runtime.with_timers(|timers| timers.clear());
                    }
                    terminating = Some(drain_scheduled);
                }
                // a timer came due; the next pass runs it
                None => {}
            }
        }
    }

    fn run_due_timers(&self) -> FaultResult<()> {
        loop {
            let now = Instant::now();
            let task = self.runtime.with_timers(|timers| timers.pop_due(now));
            let Some(task) = task else {
                return Ok(());
            };
            task.run(&self.runtime)?;
            if let Some(fault) = self.runtime.take_fault() {
                return Err(fault);
            }
        }
    }

    fn dispatch_message(
        &self,
        message: Message,
    ) -> FaultResult<()> {
        let Message {
            tag,
            payload,
            reply,
            on_complete,
        } = message;

        // The guard resolves a blocked sync sender with null even if the
        // handler panics out of this frame.
        let guard = ReplyGuard::new(reply);
        trace!("dispatching message `{}`", tag);

        match self.runtime.dispatch(&tag, payload) {
            Ok(result) => {
                guard.fulfill(result);
                if let Some(on_complete) = on_complete {
                    on_complete(payload);
                }
                // a fault raised by an inline reentrant dispatch surfaces
                // once the outer handler has returned
                match self.runtime.take_fault() {
                    Some(fault) => Err(fault),
                    None => Ok(()),
                }
            }
            Err(fault) => {
                // a failed call still resolves the sender, with null
                drop(guard);
                Err(fault)
            }
        }
    }
}
