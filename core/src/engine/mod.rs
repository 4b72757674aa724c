//! engine/mod.rs
//! Fixed worker pool with a shared LIFO queue and helping futures.
//!
//! Tasks may submit further tasks and wait on them from inside the pool.
//! A worker that waits never idles while the queue holds runnable work,
//! so recursive waits complete with any pool size of at least one.

pub mod queue;
pub mod task;
pub mod worker;

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::constants::{DEFAULT_POLL_INTERVAL, MAX_WORKERS};
use crate::utils::lock_unpoisoned;

pub use task::{TaskError, TaskHandle, TaskId, TaskState};
use task::TaskCell;
use worker::{is_worker_of, spawn_worker, EngineShared};

/// Errors raised while building or running the engine itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Parallelism configuration
#[derive(Debug, Clone)]
pub struct ParallelismProfile {
    pub worker_count: usize,
    pub poll_interval: Duration,
}

impl ParallelismProfile {
    pub fn single_threaded() -> Self {
        Self::fixed(1)
    }

    /// One worker per logical core.
    pub fn dynamic() -> Self {
        Self::fixed(num_cpus::get())
    }

    /// An explicit worker count, clamped into `1..MAX_WORKERS`.
    pub fn fixed(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.clamp(1, MAX_WORKERS - 1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ParallelismProfile {
    fn default() -> Self {
        Self::dynamic()
    }
}

/// Cheap, clonable capability to submit work to one engine.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<EngineShared>,
}

impl EngineHandle {
    /// Submit a fallible unit of work. It runs on a worker or on a
    /// helping waiter, whichever selects it first.
    pub fn submit<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let id = self.shared.next_task_id();
        let cell = Arc::new(TaskCell::new(id, Box::new(work)));
        let handle = TaskHandle::new(Arc::clone(&cell), Arc::clone(&self.shared));

        if self.shared.enqueue(cell.clone()) {
            trace!(target: "ultragz::engine", task = id, "task submitted");
        } else {
            warn!(target: "ultragz::engine", task = id, "engine is shut down; task cancelled");
            task::Job::abandon(cell.as_ref());
        }
        handle
    }

    /// Submit a procedure with no result value.
    pub fn execute<F>(&self, work: F) -> TaskHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(move || {
            work();
            Ok(())
        })
    }

    /// Tasks submitted but not yet selected.
    pub fn queued(&self) -> usize {
        self.shared.queued()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// True if the calling thread is one of this engine's workers.
    pub fn on_worker_thread(&self) -> bool {
        is_worker_of(self.shared.engine_id())
    }
}

/// Owner of the worker threads. Dropping it shuts the pool down.
pub struct TaskEngine {
    handle: EngineHandle,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl TaskEngine {
    pub fn new(profile: ParallelismProfile) -> Result<Self, EngineError> {
        let profile = ParallelismProfile {
            worker_count: profile.worker_count.clamp(1, MAX_WORKERS - 1),
            ..profile
        };
        let shared = Arc::new(EngineShared::new(profile.poll_interval));

        let mut workers = Vec::with_capacity(profile.worker_count);
        for index in 0..profile.worker_count {
            match spawn_worker(Arc::clone(&shared), index) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.stop();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(EngineError::Spawn(e));
                }
            }
        }

        info!(
            target: "ultragz::engine",
            workers = profile.worker_count,
            "task engine started"
        );

        Ok(Self {
            handle: EngineHandle { shared },
            workers: Mutex::new(workers),
            worker_count: profile.worker_count,
        })
    }

    pub fn with_workers(worker_count: usize) -> Result<Self, EngineError> {
        Self::new(ParallelismProfile::fixed(worker_count))
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn submit<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.handle.submit(work)
    }

    pub fn execute<F>(&self, work: F) -> TaskHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.execute(work)
    }

    pub fn queued(&self) -> usize {
        self.handle.queued()
    }

    /// Stop the workers. Queued tasks are cancelled; running ones finish.
    ///
    /// Idempotent. When called from one of this engine's own workers the
    /// threads are signalled but not joined.
    pub fn shutdown(&self) {
        let cancelled = self.handle.shared.stop();
        let workers: Vec<_> = lock_unpoisoned(&self.workers).drain(..).collect();
        if workers.is_empty() {
            return;
        }
        if self.handle.on_worker_thread() {
            debug!(target: "ultragz::engine", "shutdown requested from a worker; not joining");
            return;
        }
        for handle in workers {
            let _ = handle.join();
        }
        info!(target: "ultragz::engine", cancelled, "task engine stopped");
    }
}

impl Drop for TaskEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
