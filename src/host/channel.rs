//! Cross-thread message channel.
//!
//! A single FIFO inbox shared by all host senders and the worker's dispatch
//! loop. Synchronous and asynchronous messages share one queue and one total
//! order; the worker consumes it strictly sequentially.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::runtime::dispatch;
use crate::runtime::payload::OpaquePayload;

/// Callback invoked on the worker thread after an async message's handler
/// has run, handing the payload back for reclamation.
pub type CompletionHook = Box<dyn FnOnce(OpaquePayload) + Send + 'static>;

/// A unit of cross-thread work.
pub struct Message {
    /// Message type tag; selects the bound handler.
    pub(crate) tag: String,
    /// Untyped payload, agreed out-of-band per tag.
    pub(crate) payload: OpaquePayload,
    /// Reply cell for a blocked synchronous sender.
    pub(crate) reply: Option<ReplySlot>,
    /// Completion hook for an asynchronous sender.
    pub(crate) on_complete: Option<CompletionHook>,
}

/// Queue entry: either a message or the termination token.
pub(crate) enum Envelope {
    Message(Message),
    /// Ends the dispatch loop once everything queued ahead has run. When
    /// `drain_scheduled` is set the loop first waits out the timer queue.
    Terminate { drain_scheduled: bool },
}

/// One-shot reply cell for synchronous sends. First write wins.
#[derive(Clone, Default)]
pub(crate) struct ReplySlot {
    inner: std::sync::Arc<ReplyInner>,
}

#[derive(Default)]
struct ReplyInner {
    result: Mutex<Option<OpaquePayload>>,
    cv: Condvar,
}

impl ReplySlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store the result and wake the sender. Later writes are ignored, so
    /// an unwind-path null cannot clobber a real result.
    pub(crate) fn fulfill(
        &self,
        result: OpaquePayload,
    ) {
        let mut slot = self.inner.result.lock();
        if slot.is_none() {
            *slot = Some(result);
            self.inner.cv.notify_all();
        }
    }

    /// Block until the slot is fulfilled. Unbounded.
    pub(crate) fn wait(&self) -> OpaquePayload {
        let mut slot = self.inner.result.lock();
        loop {
            if let Some(result) = *slot {
                return result;
            }
            self.inner.cv.wait(&mut slot);
        }
    }
}

/// Fulfills a reply slot with null on drop unless disarmed first.
///
/// The dispatch loop holds one of these across the handler call so a worker
/// death mid-message still resolves the blocked sender.
pub(crate) struct ReplyGuard {
    slot: Option<ReplySlot>,
}

impl ReplyGuard {
    pub(crate) fn new(slot: Option<ReplySlot>) -> Self {
        Self { slot }
    }

    /// Deliver the real result and disarm the guard.
    pub(crate) fn fulfill(
        mut self,
        result: OpaquePayload,
    ) {
        if let Some(slot) = self.slot.take() {
            slot.fulfill(result);
        }
    }
}

impl Drop for ReplyGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.fulfill(OpaquePayload::null());
        }
    }
}

struct Inbox {
    items: VecDeque<Envelope>,
    closed: bool,
}

/// FIFO task queue feeding the worker's dispatch loop.
///
/// Host threads push; the single worker pops. The inbox lock is the only
/// synchronization between senders, and it is distinct from the controller's
/// lifecycle mutex, so sends never contend with start/stop bookkeeping.
pub struct MessageChannel {
    inbox: Mutex<Inbox>,
    ready: Condvar,
}

impl MessageChannel {
    /// Create an open channel for a new worker lifetime.
    pub(crate) fn new() -> Self {
        Self::with_state(false)
    }

    /// Create a channel that is already closed. Used as the placeholder
    /// before the first `start`, so early sends observe a dead worker.
    pub(crate) fn new_closed() -> Self {
        Self::with_state(true)
    }

    fn with_state(closed: bool) -> Self {
        Self {
            inbox: Mutex::new(Inbox {
                items: VecDeque::new(),
                closed,
            }),
            ready: Condvar::new(),
        }
    }

    /// Send a message and block until its handler has run.
    ///
    /// Returns the handler's result, or null if the worker terminated before
    /// completing this message (or was not running at all). When called from
    /// the worker thread of this same embedding the handler executes inline
    /// immediately, since the worker cannot wait on its own queue.
    pub fn send_sync(
        &self,
        tag: &str,
        payload: OpaquePayload,
    ) -> OpaquePayload {
        if let Some(result) = dispatch::reenter(self, tag, payload) {
            return result;
        }

        let slot = ReplySlot::new();
        {
            let mut inbox = self.inbox.lock();
            if inbox.closed {
                return OpaquePayload::null();
            }
            inbox.items.push_back(Envelope::Message(Message {
                tag: tag.to_owned(),
                payload,
                reply: Some(slot.clone()),
                on_complete: None,
            }));
            self.ready.notify_one();
        }
        slot.wait()
    }

    /// Queue a message without waiting for its handler.
    ///
    /// `on_complete`, if given, runs on the worker thread after the handler
    /// so the sender can reclaim the payload. Messages sent to a dead worker
    /// are dropped; their hooks never fire.
    pub fn send_async(
        &self,
        tag: &str,
        payload: OpaquePayload,
        on_complete: Option<CompletionHook>,
    ) {
        let mut inbox = self.inbox.lock();
        if inbox.closed {
            debug!("async message `{}` dropped: channel closed", tag);
            return;
        }
        inbox.items.push_back(Envelope::Message(Message {
            tag: tag.to_owned(),
            payload,
            reply: None,
            on_complete,
        }));
        self.ready.notify_one();
    }

    /// Queue the termination token.
    pub(crate) fn push_termination(
        &self,
        drain_scheduled: bool,
    ) {
        let mut inbox = self.inbox.lock();
        if inbox.closed {
            return;
        }
        inbox.items.push_back(Envelope::Terminate { drain_scheduled });
        self.ready.notify_one();
    }

    /// Worker-side pop: block until an envelope arrives or `deadline`
    /// passes. `None` means the deadline fired (the next timer is due);
    /// without a deadline the wait is unbounded.
    pub(crate) fn pop_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> Option<Envelope> {
        let mut inbox = self.inbox.lock();
        loop {
            if let Some(envelope) = inbox.items.pop_front() {
                return Some(envelope);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut inbox, deadline).timed_out() {
                        return None;
                    }
                }
                None => self.ready.wait(&mut inbox),
            }
        }
    }

    /// Worker-side close: mark the channel dead and flush everything still
    /// queued. Pending synchronous senders resolve with null; completion
    /// hooks of discarded async messages are dropped unfired.
    pub(crate) fn close_and_flush(&self) {
        let mut inbox = self.inbox.lock();
        inbox.closed = true;
        let discarded = inbox.items.len();
        while let Some(envelope) = inbox.items.pop_front() {
            if let Envelope::Message(message) = envelope {
                if let Some(reply) = message.reply {
                    reply.fulfill(OpaquePayload::null());
                }
            }
        }
        if discarded > 0 {
            trace!("flushed {} undelivered message(s)", discarded);
        }
    }

    /// Whether the worker behind this channel has exited (or never ran).
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inbox.lock().closed
    }

    /// Number of queued envelopes.
    #[inline]
    pub fn len(&self) -> usize {
        self.inbox.lock().items.len()
    }

    /// Whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inbox.lock().items.is_empty()
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let inbox = self.inbox.lock();
        f.debug_struct("MessageChannel")
            .field("queued", &inbox.items.len())
            .field("closed", &inbox.closed)
            .finish()
    }
}
