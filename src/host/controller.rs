//! Runtime thread lifecycle controller.
//!
//! One [`RuntimeHost`] per embedding. It owns the worker thread's identity,
//! the lifecycle state machine and the current message channel; every host
//! thread drives the runtime exclusively through it. There are no
//! process-wide globals, so embeddings can be constructed independently and
//! injected in tests.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

use crate::host::channel::{CompletionHook, MessageChannel};
use crate::host::errors::{HostError, HostResult};
use crate::host::gate::Gate;
use crate::host::reporter::{ExceptionHook, ExceptionReporter};
use crate::runtime::event_loop::EventLoop;
use crate::runtime::fault::{FaultResult, RuntimeFault};
use crate::runtime::payload::OpaquePayload;
use crate::runtime::program::EmbeddedProgram;

/// Lifecycle of the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// No worker has ever been started.
    Uninitialized,
    /// `start` has claimed the slot; the worker is bootstrapping.
    Starting,
    /// The worker is serving its dispatch loop.
    Running,
    /// The previous worker has exited; a new `start` is permitted.
    Stopped,
}

/// Worker thread settings.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Worker stack size; `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            thread_name: "suzhu-worker".to_owned(),
            stack_size: None,
        }
    }
}

type ProgramFactory = Box<dyn Fn() -> Box<dyn EmbeddedProgram> + Send + Sync>;

struct Lifecycle {
    state: ThreadState,
    /// Exit gate of the currently running worker.
    exit_gate: Option<Arc<Gate>>,
}

/// One-shot bootstrap outcome: written exactly once by the worker, consumed
/// exactly once by the thread that called `start`.
struct StartupSlot {
    gate: Gate,
    error: Mutex<Option<RuntimeFault>>,
}

impl StartupSlot {
    fn new() -> Self {
        Self {
            gate: Gate::new(),
            error: Mutex::new(None),
        }
    }

    fn succeed(&self) {
        self.gate.open();
    }

    fn fail(
        &self,
        fault: RuntimeFault,
    ) {
        *self.error.lock() = Some(fault);
        self.gate.open();
    }

    fn is_signaled(&self) -> bool {
        self.gate.is_open()
    }

    /// Block on the startup gate, then take the error out of the slot.
    fn consume(&self) -> Option<RuntimeFault> {
        self.gate.wait();
        self.error.lock().take()
    }
}

/// Controller for one embedded runtime.
///
/// All methods take `&self` and are safe to call from any host thread;
/// `start` and `stop` must not be called from the worker thread itself
/// (caller-respected precondition — a worker-side `stop` would deadlock on
/// its own exit gate).
pub struct RuntimeHost {
    config: HostConfig,
    factory: ProgramFactory,
    lifecycle: Mutex<Lifecycle>,
    /// Inbox of the current worker lifetime. Replaced on every successful
    /// `start`; the slot lock is held only to clone the `Arc`, never across
    /// a blocking send.
    channel: Mutex<Arc<MessageChannel>>,
    reporter: Arc<ExceptionReporter>,
}

impl RuntimeHost {
    /// Create a host with default configuration.
    ///
    /// `factory` builds a fresh program instance for every `start`; nothing
    /// survives a stop/start cycle.
    #[inline]
    pub fn new<P, F>(factory: F) -> Self
    where
        P: EmbeddedProgram,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::with_config(HostConfig::default(), factory)
    }

    /// Create a host with custom configuration.
    pub fn with_config<P, F>(
        config: HostConfig,
        factory: F,
    ) -> Self
    where
        P: EmbeddedProgram,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Box::new(move || Box::new(factory())),
            lifecycle: Mutex::new(Lifecycle {
                state: ThreadState::Uninitialized,
                exit_gate: None,
            }),
            channel: Mutex::new(Arc::new(MessageChannel::new_closed())),
            reporter: Arc::new(ExceptionReporter::new()),
        }
    }

    /// Start the worker thread and block until its bootstrap settles.
    ///
    /// `on_exception` is fired on the worker thread if an unhandled fault
    /// ends it later; pass `None` for no hook. Bootstrap failures are
    /// returned here instead and leave the state `Stopped`, so the host may
    /// retry without an intervening `stop`.
    pub fn start(
        &self,
        on_exception: Option<ExceptionHook>,
    ) -> HostResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                ThreadState::Starting | ThreadState::Running => {
                    return Err(HostError::AlreadyRunning);
                }
                ThreadState::Uninitialized | ThreadState::Stopped => {
                    lifecycle.state = ThreadState::Starting;
                }
            }
        }

        self.reporter.arm(on_exception);
        let channel = Arc::new(MessageChannel::new());
        let startup = Arc::new(StartupSlot::new());
        let exit_gate = Arc::new(Gate::new());
        let program = (self.factory)();

        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let spawned = {
            let channel = channel.clone();
            let startup = startup.clone();
            let exit_gate = exit_gate.clone();
            let reporter = self.reporter.clone();
            builder.spawn(move || worker_main(program, channel, startup, exit_gate, reporter))
        };
        if let Err(err) = spawned {
            self.lifecycle.lock().state = ThreadState::Stopped;
            return Err(HostError::Initialization(format!(
                "failed to spawn worker thread: {}",
                err
            )));
        }

        // The worker is detached; its exit gate stands in for a join
        // handle. Block on the startup gate without holding any lock.
        match startup.consume() {
            None => {
                *self.channel.lock() = channel;
                let mut lifecycle = self.lifecycle.lock();
                lifecycle.state = ThreadState::Running;
                lifecycle.exit_gate = Some(exit_gate);
                debug!("runtime thread running");
                Ok(())
            }
            Some(fault) => {
                // A failed bootstrap still opens the exit gate on its way
                // out; wait for it so a retry never overlaps the dying
                // worker.
                exit_gate.wait();
                let mut lifecycle = self.lifecycle.lock();
                lifecycle.state = ThreadState::Stopped;
                lifecycle.exit_gate = None;
                Err(HostError::Initialization(fault.to_string()))
            }
        }
    }

    /// Stop the worker thread and block until it has exited.
    ///
    /// No-op unless the runtime is running. The termination token shares
    /// the message FIFO, so every message queued ahead of it still runs.
    /// With `wait_for_scheduled` the worker also waits out its scheduled
    /// tasks; otherwise they are discarded.
    pub fn stop(
        &self,
        wait_for_scheduled: bool,
    ) {
        let exit_gate = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.state != ThreadState::Running {
                return;
            }
            lifecycle.exit_gate.clone()
        };
        let Some(exit_gate) = exit_gate else {
            return;
        };

        debug!("stop requested (wait_for_scheduled = {})", wait_for_scheduled);
        let channel = self.channel.lock().clone();
        channel.push_termination(wait_for_scheduled);
        exit_gate.wait();

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == ThreadState::Running {
            lifecycle.state = ThreadState::Stopped;
            lifecycle.exit_gate = None;
        }
        debug!("runtime thread stopped");
    }

    /// Send a message and block until its handler has run; see
    /// [`MessageChannel::send_sync`].
    pub fn send_sync(
        &self,
        tag: &str,
        payload: OpaquePayload,
    ) -> OpaquePayload {
        let channel = self.channel.lock().clone();
        channel.send_sync(tag, payload)
    }

    /// Queue a message without waiting; see [`MessageChannel::send_async`].
    pub fn send_async(
        &self,
        tag: &str,
        payload: OpaquePayload,
        on_complete: Option<CompletionHook>,
    ) {
        let channel = self.channel.lock().clone();
        channel.send_async(tag, payload, on_complete)
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ThreadState {
        self.lifecycle.lock().state
    }

    /// Whether the runtime is running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }
}

impl std::fmt::Debug for RuntimeHost {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RuntimeHost")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Worker thread main: bootstrap, loop, orderly death.
///
/// Whatever happens inside the body, the channel is closed and the exit
/// gate opened before the thread ends, so no host thread stays blocked.
fn worker_main(
    mut program: Box<dyn EmbeddedProgram>,
    channel: Arc<MessageChannel>,
    startup: Arc<StartupSlot>,
    exit_gate: Arc<Gate>,
    reporter: Arc<ExceptionReporter>,
) {
    debug!("worker thread started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        worker_body(program.as_mut(), &channel, &startup)
    }));
    let fault = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(fault)) => Some(fault),
        Err(panic) => Some(RuntimeFault::Panicked(panic_message(panic.as_ref()))),
    };

    if let Some(fault) = fault {
        if startup.is_signaled() {
            // Unhandled failure after a successful bootstrap: run the
            // program's teardown hook, then the host's exception hook,
            // before anyone blocked on this worker wakes up.
            let _ = panic::catch_unwind(AssertUnwindSafe(|| program.teardown(&fault)));
            reporter.report(&fault);
        } else {
            // The bootstrap itself died; this goes to the start() caller
            // through the startup result, never through the reporter.
            startup.fail(fault);
        }
    }

    channel.close_and_flush();
    exit_gate.open();
    debug!("worker thread exited");
}

fn worker_body(
    program: &mut dyn EmbeddedProgram,
    channel: &Arc<MessageChannel>,
    startup: &StartupSlot,
) -> FaultResult<()> {
    let mut event_loop = EventLoop::new(channel.clone());
    match program.boot(event_loop.runtime()) {
        Ok(()) => startup.succeed(),
        Err(fault) => {
            startup.fail(fault);
            return Ok(());
        }
    }
    debug!("runtime bootstrapped; entering dispatch loop");
    event_loop.run()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
