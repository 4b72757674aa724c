//! engine/task.rs
//! Task cells, their lifecycle, and the helping `get()` protocol.
//!
//! A task moves `Initialized -> Selected -> Running -> Done`, or
//! `Initialized -> Canceled`. Exactly one thread runs the body. Waiters
//! never block a worker thread on a specific task while other queued
//! work could make progress.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use num_enum::TryFromPrimitive;
use tracing::trace;

use crate::engine::worker::{is_worker_of, EngineShared};
use crate::utils::{lock_unpoisoned, panic_message, wait_timeout_unpoisoned, wait_unpoisoned};

pub type TaskId = u64;

/// Lifecycle state of a submitted task.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive)]
pub enum TaskState {
    Initialized = 0,
    Selected = 1,
    Running = 2,
    Done = 3,
    Canceled = 4,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        self >= TaskState::Done
    }
}

/// Error observed through [`TaskHandle::get`].
///
/// The same value is handed to every caller, so a failing body is
/// reported identically no matter how many threads wait on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("task failed: {0:#}")]
    Failed(Arc<anyhow::Error>),
    #[error("task panicked: {0}")]
    Panicked(Arc<str>),
    #[error("task was cancelled before it was selected")]
    Cancelled,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// Type-erased view of a task used by the queue and worker loop.
pub(crate) trait Job: Send + Sync {
    fn id(&self) -> TaskId;
    /// Run the body unless another thread already did.
    fn run(&self);
    /// Cancel if still `Initialized`. Used when the engine shuts down.
    fn abandon(&self);
}

type Body<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

struct Slot<T> {
    state: TaskState,
    body: Option<Body<T>>,
    outcome: Option<Result<T, TaskError>>,
}

pub(crate) struct TaskCell<T> {
    id: TaskId,
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

impl<T: Send + 'static> TaskCell<T> {
    pub fn new(id: TaskId, body: Body<T>) -> Self {
        Self {
            id,
            slot: Mutex::new(Slot {
                state: TaskState::Initialized,
                body: Some(body),
                outcome: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn state(&self) -> TaskState {
        lock_unpoisoned(&self.slot).state
    }

    /// `Initialized -> Canceled`. Returns false once the task was selected.
    fn try_cancel(&self) -> bool {
        let mut slot = lock_unpoisoned(&self.slot);
        if slot.state != TaskState::Initialized {
            return false;
        }
        slot.state = TaskState::Canceled;
        slot.body = None;
        slot.outcome = Some(Err(TaskError::Cancelled));
        self.changed.notify_all();
        true
    }
}

impl<T: Send + 'static> Job for TaskCell<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn run(&self) {
        let body = {
            let mut slot = lock_unpoisoned(&self.slot);
            if slot.state > TaskState::Selected {
                return;
            }
            slot.state = TaskState::Running;
            slot.body.take()
        };

        let outcome = match body {
            Some(body) => match catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(TaskError::Failed(Arc::new(err))),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload).into())),
            },
            None => Err(TaskError::Panicked("task body missing".into())),
        };

        let mut slot = lock_unpoisoned(&self.slot);
        slot.state = TaskState::Done;
        slot.outcome = Some(outcome);
        self.changed.notify_all();
    }

    fn abandon(&self) {
        self.try_cancel();
    }
}

// -----------------------------------------------------------------------------
// Helping wait
// -----------------------------------------------------------------------------

/// What a waiter does next, decided under the task lock.
enum WaitStep {
    /// Terminal state reached; the outcome can be read.
    Settled,
    /// The waiter selected the task and runs it inline.
    RunSelf,
    /// The waiter runs some other queued task while this one is busy.
    RunOther(Arc<dyn Job>),
    /// Sleep on the task's condvar, optionally bounded.
    Park(Option<Duration>),
}

/// Future-style handle returned by [`crate::engine::TaskEngine::submit`].
pub struct TaskHandle<T> {
    cell: Arc<TaskCell<T>>,
    shared: Arc<EngineShared>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.cell.id).finish()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) fn new(cell: Arc<TaskCell<T>>, shared: Arc<EngineShared>) -> Self {
        Self { cell, shared }
    }

    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// True once the task finished or was cancelled.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Canceled
    }

    /// Cancel the task if no thread has selected it yet.
    pub fn cancel(&self) -> bool {
        if !self.cell.try_cancel() {
            return false;
        }
        self.shared.remove(self.cell.id);
        trace!(target: "ultragz::engine", task = self.cell.id, "task cancelled");
        true
    }

    /// Block until the task is terminal, without reading its value.
    pub fn wait(&self) -> Result<(), TaskError> {
        let slot = self.settle();
        match &slot.outcome {
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(TaskError::Cancelled),
        }
    }

    /// Block until the task is terminal and return its result.
    pub fn get(&self) -> Result<T, TaskError>
    where
        T: Clone,
    {
        let slot = self.settle();
        match &slot.outcome {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(TaskError::Cancelled),
        }
    }

    fn settle(&self) -> MutexGuard<'_, Slot<T>> {
        let on_worker = is_worker_of(self.shared.engine_id());
        let mut slot = lock_unpoisoned(&self.cell.slot);
        loop {
            let step = self.next_step(&mut slot, on_worker);
            slot = match step {
                WaitStep::Settled => return slot,
                WaitStep::RunSelf => {
                    drop(slot);
                    trace!(target: "ultragz::engine", task = self.cell.id, "running awaited task inline");
                    self.cell.run();
                    lock_unpoisoned(&self.cell.slot)
                }
                WaitStep::RunOther(job) => {
                    drop(slot);
                    trace!(
                        target: "ultragz::engine",
                        task = self.cell.id,
                        helped = job.id(),
                        "helping with queued task while waiting"
                    );
                    job.run();
                    lock_unpoisoned(&self.cell.slot)
                }
                WaitStep::Park(Some(timeout)) => {
                    wait_timeout_unpoisoned(&self.cell.changed, slot, timeout)
                }
                WaitStep::Park(None) => wait_unpoisoned(&self.cell.changed, slot),
            };
        }
    }

    // Called with the task lock held. Only touches the queue lock after it,
    // never the other way round.
    fn next_step(&self, slot: &mut Slot<T>, on_worker: bool) -> WaitStep {
        match slot.state {
            TaskState::Done | TaskState::Canceled => WaitStep::Settled,
            TaskState::Initialized if on_worker => {
                slot.state = TaskState::Selected;
                self.shared.remove(self.cell.id);
                WaitStep::RunSelf
            }
            TaskState::Initialized => {
                self.shared.boost(self.cell.id);
                WaitStep::Park(Some(self.shared.poll_interval()))
            }
            TaskState::Selected | TaskState::Running if on_worker => {
                match self.shared.try_pop() {
                    Some(job) => WaitStep::RunOther(job),
                    None => WaitStep::Park(Some(self.shared.poll_interval())),
                }
            }
            TaskState::Selected | TaskState::Running => WaitStep::Park(None),
        }
    }
}
