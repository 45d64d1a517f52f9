//! Scheduled future work for the event loop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::runtime::dispatch::Runtime;
use crate::runtime::fault::FaultResult;

type TimerAction = Box<dyn FnOnce(&Runtime) -> FaultResult<()>>;

/// A unit of future work owned by the worker's loop.
pub(crate) struct ScheduledTask {
    due: Instant,
    /// Submission order; ties on `due` run FIFO.
    seq: u64,
    action: TimerAction,
}

impl ScheduledTask {
    pub(crate) fn run(
        self,
        runtime: &Runtime,
    ) -> FaultResult<()> {
        (self.action)(runtime)
    }
}

impl PartialEq for ScheduledTask {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    // BinaryHeap is a max-heap; reverse so the earliest due (then lowest
    // seq) surfaces first.
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of scheduled tasks, ordered by due time then submission order.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<ScheduledTask>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a task due after `delay`.
    pub(crate) fn schedule<F>(
        &mut self,
        delay: Duration,
        action: F,
    ) where
        F: FnOnce(&Runtime) -> FaultResult<()> + 'static,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledTask {
            due: Instant::now() + delay,
            seq,
            action: Box::new(action),
        });
    }

    /// The due time of the nearest task, if any.
    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|task| task.due)
    }

    /// Remove and return the nearest task if it is due at `now`.
    pub(crate) fn pop_due(
        &mut self,
        now: Instant,
    ) -> Option<ScheduledTask> {
        if self.heap.peek().is_some_and(|task| task.due <= now) {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Discard every not-yet-run task.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
