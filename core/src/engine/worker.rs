//! engine/worker.rs
//! Shared engine state and the worker thread loop.

use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::engine::queue::TaskQueue;
use crate::engine::task::{Job, TaskId};
use crate::utils::{lock_unpoisoned, wait_unpoisoned};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ENGINE: Cell<Option<u64>> = const { Cell::new(None) };
}

/// True if the calling thread is a worker of the given engine.
///
/// A worker of some other engine counts as an outside caller.
pub(crate) fn is_worker_of(engine_id: u64) -> bool {
    CURRENT_ENGINE.with(|c| c.get() == Some(engine_id))
}

/// State shared between the engine, its workers and every task handle.
pub(crate) struct EngineShared {
    engine_id: u64,
    queue: Mutex<TaskQueue>,
    available: Condvar,
    shutdown: AtomicBool,
    next_task: AtomicU64,
    poll_interval: Duration,
}

impl EngineShared {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            engine_id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            queue: Mutex::new(TaskQueue::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_task: AtomicU64::new(1),
            poll_interval,
        }
    }

    pub fn engine_id(&self) -> u64 {
        self.engine_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn next_task_id(&self) -> TaskId {
        self.next_task.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Push a task and wake one idle worker. Refused after shutdown.
    pub fn enqueue(&self, job: Arc<dyn Job>) -> bool {
        let mut queue = lock_unpoisoned(&self.queue);
        if self.is_shut_down() {
            return false;
        }
        if queue.push_front(job) {
            self.available.notify_one();
        }
        true
    }

    pub fn remove(&self, id: TaskId) {
        lock_unpoisoned(&self.queue).remove(id);
    }

    pub fn boost(&self, id: TaskId) {
        if lock_unpoisoned(&self.queue).move_to_front(id) {
            trace!(target: "ultragz::engine", task = id, "boosted task to queue head");
        }
    }

    pub fn try_pop(&self) -> Option<Arc<dyn Job>> {
        lock_unpoisoned(&self.queue).pop_front()
    }

    pub fn queued(&self) -> usize {
        lock_unpoisoned(&self.queue).len()
    }

    /// Block until a task is available. `None` once the engine stops.
    fn next_blocking(&self) -> Option<Arc<dyn Job>> {
        let mut queue = lock_unpoisoned(&self.queue);
        loop {
            if self.is_shut_down() {
                return None;
            }
            if let Some(job) = queue.pop_front() {
                return Some(job);
            }
            queue = wait_unpoisoned(&self.available, queue);
        }
    }

    /// Stop accepting work and cancel everything still queued.
    pub fn stop(&self) -> usize {
        let pending = {
            let mut queue = lock_unpoisoned(&self.queue);
            self.shutdown.store(true, Ordering::Release);
            self.available.notify_all();
            queue.drain()
        };
        // Task locks are taken only after the queue lock is released.
        for job in &pending {
            job.abandon();
        }
        pending.len()
    }
}

/// Spawn one named worker thread running [`run_worker_loop`].
pub(crate) fn spawn_worker(shared: Arc<EngineShared>, index: usize) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("ultragz-worker-{index}"))
        .spawn(move || run_worker_loop(shared, index))
}

/// Single worker loop: pop the queue head, run it, repeat.
pub(crate) fn run_worker_loop(shared: Arc<EngineShared>, index: usize) {
    CURRENT_ENGINE.with(|c| c.set(Some(shared.engine_id())));
    debug!(target: "ultragz::engine", worker = index, "worker started");

    while let Some(job) = shared.next_blocking() {
        trace!(target: "ultragz::engine", worker = index, task = job.id(), "worker picked task");
        job.run();
    }

    CURRENT_ENGINE.with(|c| c.set(None));
    debug!(target: "ultragz::engine", worker = index, "worker stopped");
}
