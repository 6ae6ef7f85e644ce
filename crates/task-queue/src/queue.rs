use std::collections::VecDeque;

use futures::future::BoxFuture;
use tracing::debug;

/// A zero-argument deferred operation. State the operation needs is
/// captured at enqueue time (collectors close over the shared run state).
pub type QueueOp<E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<StepSignal, E>> + Send>;

/// What an operation tells the queue to do after it finishes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepSignal {
    /// Keep draining.
    Continue,
    /// Stop draining and wait for an external `unblock` (wait-for-event).
    Block,
}

/// Outcome of a `drain` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrainStatus {
    /// Every pending operation ran.
    Drained,
    /// An operation suspended the queue; resume with `unblock` + `drain`.
    Blocked,
}

/// FIFO queue that serializes asynchronous operations into one logical
/// stream. At most one operation runs at a time, transitions between
/// operations are asynchronous (never same-tick), and a blocked queue
/// runs nothing until it is unblocked.
///
/// A failing operation blocks the queue *and* surfaces its error to the
/// caller. Silent halting is deliberately not supported: the caller
/// always learns why draining stopped.
pub struct TaskQueue<E> {
    pending: VecDeque<QueueOp<E>>,
    flushing: bool,
    blocked: bool,
}

impl<E> Default for TaskQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TaskQueue<E> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            flushing: false,
            blocked: false,
        }
    }

    /// Append an operation to the pending list.
    pub fn add<F>(&mut self, op: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<StepSignal, E>> + Send + 'static,
    {
        self.pending.push_back(Box::new(op));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Pause draining while awaiting an external one-shot event.
    pub fn block(&mut self) {
        self.blocked = true;
    }

    /// Clear the blocked flag. The caller resumes by draining again.
    pub fn unblock(&mut self) {
        self.blocked = false;
    }

    /// Discard all pending operations and reset draining state. Used
    /// between repeated test runs.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.flushing = false;
        self.blocked = false;
    }

    /// Execute exactly one pending operation inside its own async unit.
    ///
    /// On failure the queue transitions to blocked and the error is
    /// returned; the remaining tail of the pipeline does not run.
    pub async fn step(&mut self) -> Result<StepSignal, E> {
        let op = match self.pending.pop_front() {
            Some(op) => op,
            None => return Ok(StepSignal::Continue),
        };

        // Never run an operation in the same tick it was scheduled; each
        // step observes only the state left by the previous one.
        tokio::task::yield_now().await;

        match op().await {
            Ok(signal) => {
                if signal == StepSignal::Block {
                    self.blocked = true;
                }
                Ok(signal)
            }
            Err(err) => {
                self.blocked = true;
                Err(err)
            }
        }
    }

    /// Run pending operations FIFO, one at a time, until the queue is
    /// empty, an operation blocks it, or an operation fails.
    pub async fn drain(&mut self) -> Result<DrainStatus, E> {
        if self.blocked {
            return Ok(DrainStatus::Blocked);
        }
        self.flushing = true;
        while !self.pending.is_empty() {
            match self.step().await {
                Ok(StepSignal::Continue) => {}
                Ok(StepSignal::Block) => {
                    debug!(remaining = self.pending.len(), "queue blocked mid-drain");
                    return Ok(DrainStatus::Blocked);
                }
                Err(err) => return Err(err),
            }
        }
        self.flushing = false;
        Ok(DrainStatus::Drained)
    }
}
