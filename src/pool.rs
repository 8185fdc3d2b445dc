//! Fixed-size worker pool draining a bounded task queue.
//!
//! This module provides `WorkerPool`, a set of worker threads created once and
//! joined once, all pulling from one `BoundedQueue` of boxed tasks. Submission
//! applies backpressure when the queue is full; shutdown is two-phase, first
//! refusing new work and then draining everything already queued before any
//! worker exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::queue::BoundedQueue;
use crate::{IoError, PoolError};

/// A unit of work: opaque, side-effecting, fire-and-forget.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pool lifecycle. Transitions are one-way:
/// `Accepting` → `Draining` → `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Submissions are accepted and workers are running.
    Accepting,
    /// Shutdown was requested; queued tasks still execute, new ones are refused.
    Draining,
    /// The queue is empty and every worker has exited.
    Stopped,
}

/// Handle to one pooled worker thread.
struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<const SLOTS: usize>(
        id: usize,
        queue: Arc<BoundedQueue<SLOTS, Task>>,
        panicked: Arc<AtomicUsize>,
    ) -> Result<Self, PoolError> {
        let handle = thread::Builder::new()
            .name(format!("pool-worker-{id}"))
            .spawn(move || {
                // `pop` fails with `Closed` only once the queue is closed *and*
                // empty, so a worker never exits while tasks are still queued.
                while let Ok(task) = queue.pop() {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        panicked.fetch_add(1, Relaxed);
                        log::error!("worker {id}: task panicked, worker continues");
                    }
                }
                log::debug!("worker {id}: queue closed and drained, exiting");
            })
            .map_err(|err| PoolError::from(IoError::from(err)))?;
        Ok(Self {
            id,
            handle: Some(handle),
        })
    }
}

/// A fixed set of worker threads sharing one bounded task queue.
///
/// Workers are spawned at construction and never added or removed. `submit`
/// blocks when the queue is full rather than growing it. Dropping the pool
/// shuts it down gracefully, draining whatever was already accepted.
pub struct WorkerPool<const SLOTS: usize> {
    queue: Arc<BoundedQueue<SLOTS, Task>>,
    workers: Vec<Worker>,
    state: Mutex<PoolState>,
    panicked: Arc<AtomicUsize>,
}

impl<const SLOTS: usize> WorkerPool<SLOTS> {
    /// Creates a pool with `workers` threads over a queue of `SLOTS` slots.
    /// Both counts must be greater than 0.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let queue = Arc::new(BoundedQueue::new()?);
        let panicked = Arc::new(AtomicUsize::new(0));
        let workers = (0..workers)
            .map(|id| Worker::spawn(id, Arc::clone(&queue), Arc::clone(&panicked)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            queue,
            workers,
            state: Mutex::new(PoolState::Accepting),
            panicked,
        })
    }

    /// Submits a task for execution on some worker, blocking while the queue
    /// is full.
    ///
    /// Fails with `Rejected` once the pool is no longer accepting, without
    /// blocking and without enqueuing. A shutdown racing past the state check
    /// is still caught: the queue re-checks its closed flag under its own lock.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state() != PoolState::Accepting {
            return Err(PoolError::Rejected);
        }
        self.queue.push(Box::new(task)).map_err(|err| match err {
            PoolError::Closed => PoolError::Rejected,
            other => other,
        })
    }

    /// Blocks until the queue is observably empty.
    ///
    /// Tasks already handed to a worker may still be executing when this
    /// returns; only queue occupancy is awaited.
    pub fn wait_drained(&self) {
        self.queue.wait_empty();
    }

    /// Stops accepting new tasks and wakes idle workers. Idempotent, safe to
    /// call from any thread, and never cancels a task mid-execution.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == PoolState::Accepting {
            *state = PoolState::Draining;
            log::debug!("pool shutting down, draining {} queued tasks", self.queue.len());
        }
        drop(state);
        self.queue.close();
    }

    /// Shuts down, then joins every worker. Returns once the queue is drained
    /// and all workers have exited.
    pub fn shutdown_and_wait(&mut self) {
        self.shutdown();
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::error!("worker {}: exited by panic", worker.id);
                }
            }
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = PoolState::Stopped;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub const fn capacity(&self) -> usize {
        SLOTS
    }

    /// Number of tasks queued but not yet handed to a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of tasks that panicked during execution so far.
    pub fn panicked_tasks(&self) -> usize {
        self.panicked.load(Relaxed)
    }
}

impl<const SLOTS: usize> Drop for WorkerPool<SLOTS> {
    fn drop(&mut self) {
        self.shutdown_and_wait();
    }
}
