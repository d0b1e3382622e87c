//! Fixed-size task pool backing parallel system execution.
//!
//! Generalizes the teacher's rayon-based per-stage executor into a general
//! task-submission pool: callers hand it a batch of `FnOnce` tasks carrying a priority
//! and an optional timeout, and get back one outcome per task. The pool is stoppable
//! and resizable only between frames (`resize`/`stop` panic on a misuse that would
//! otherwise tear down in-flight work — callers are expected to call them outside
//! `run_batch`, never from within a task).

use std::cell::UnsafeCell;
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{EcsError, Result};

/// A single `UnsafeCell` slot that is `Sync` because callers guarantee disjoint
/// access (one writer per slot, never concurrently observed).
struct SlotCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for SlotCell<T> {}

impl<T> SlotCell<T> {
    fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    /// Callers must ensure no two threads access the same slot concurrently.
    unsafe fn get(&self) -> *mut T {
        self.0.get()
    }
}

/// Outcome of a single submitted task.
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    Error(EcsError),
    /// The task's closure returned, but only after its declared timeout elapsed.
    /// Detected cooperatively (the closure is not preempted mid-flight — stable Rust
    /// has no task cancellation), so this signals "ran over budget", not "aborted".
    Timeout,
}

/// One unit of work submitted to the pool.
pub struct Task<'a> {
    pub priority: i32,
    pub timeout: Option<Duration>,
    pub run: Box<dyn FnOnce() -> Result<()> + Send + 'a>,
}

/// Fixed-size worker pool. Wraps a rayon thread pool so task closures can borrow
/// `'scope` data (e.g. a stage's systems and the world) without `'static` bounds.
pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` worker threads (0 defaults to the CPU count).
    pub fn new(size: usize) -> Result<Self> {
        let size = if size == 0 { num_cpus() } else { size };
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .build()
            .map_err(|e| EcsError::DeadlockDetected(e.to_string()))?;
        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Rebuild the pool with a new thread count. Callers must only invoke this between
    /// frames, never while a `run_batch` call for the same pool is outstanding.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        let size = if size == 0 { num_cpus() } else { size };
        self.pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .build()
            .map_err(|e| EcsError::DeadlockDetected(e.to_string()))?;
        self.size = size;
        Ok(())
    }

    /// Run every task in `tasks` concurrently (ordering of completion is not
    /// guaranteed, but the returned `Vec` preserves input order), sorted by descending
    /// priority before submission so higher-priority tasks are scheduled first.
    pub fn run_batch(&self, mut tasks: Vec<Task<'_>>) -> Vec<TaskOutcome> {
        let mut indexed: Vec<(usize, Task)> = tasks.drain(..).enumerate().collect();
        indexed.sort_by_key(|(_, t)| -t.priority);

        let outcomes: Vec<SlotCell<Option<TaskOutcome>>> =
            (0..indexed.len()).map(|_| SlotCell::new(None)).collect();
        self.pool.scope(|scope| {
            for (slot, task) in indexed {
                let outcomes_ref = &outcomes;
                scope.spawn(move |_| {
                    let start = Instant::now();
                    let result = (task.run)();
                    let elapsed = start.elapsed();
                    let outcome = match result {
                        Err(e) => TaskOutcome::Error(e),
                        Ok(()) if task.timeout.is_some_and(|t| elapsed > t) => TaskOutcome::Timeout,
                        Ok(()) => TaskOutcome::Success,
                    };
                    // SAFETY: `slot` is unique per spawned task (drawn from `enumerate`
                    // over the original batch), so each write touches a distinct
                    // `Option` and no two tasks alias the same slot.
                    unsafe {
                        *outcomes_ref[slot].get() = Some(outcome);
                    }
                });
            }
        });

        outcomes.into_iter().map(|c| c.0.into_inner().unwrap_or(TaskOutcome::Error(EcsError::DeadlockDetected(
            "task slot never completed".into(),
        )))).collect()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_all_tasks_and_preserves_order() {
        let pool = WorkerPool::new(2).unwrap();
        let tasks = vec![
            Task { priority: 0, timeout: None, run: Box::new(|| Ok(())) },
            Task { priority: 0, timeout: None, run: Box::new(|| Err(EcsError::InvalidEntity)) },
        ];
        let outcomes = pool.run_batch(tasks);
        assert!(matches!(outcomes[0], TaskOutcome::Success));
        assert!(matches!(outcomes[1], TaskOutcome::Error(_)));
    }

    #[test]
    fn reports_timeout_when_task_runs_over_budget() {
        let pool = WorkerPool::new(1).unwrap();
        let tasks = vec![Task {
            priority: 0,
            timeout: Some(Duration::from_millis(1)),
            run: Box::new(|| {
                std::thread::sleep(Duration::from_millis(10));
                Ok(())
            }),
        }];
        let outcomes = pool.run_batch(tasks);
        assert!(matches!(outcomes[0], TaskOutcome::Timeout));
    }

    #[test]
    fn resize_changes_worker_count() {
        let mut pool = WorkerPool::new(2).unwrap();
        pool.resize(4).unwrap();
        assert_eq!(pool.size(), 4);
    }
}
