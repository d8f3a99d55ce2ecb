//! The worker pool: bounded, lazily scaling, strict FIFO dispatch.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::PoolError;
use crate::sync::{lock, wait};
use crate::task::{Job, Task, TaskState};

/// Hard ceiling on the worker count of any pool.
pub const MAX_THREADS: usize = 20;

/// Hard ceiling on the number of queued tasks.
pub const MAX_TASKS: usize = 100_000;

// ---------------------------------------------------------------------------
//  Pool State
// ---------------------------------------------------------------------------

/// Everything guarded by the pool mutex: the queue, the thread counters,
/// the shutdown flag, and the retained worker handles.
struct PoolState {
    queue: VecDeque<Arc<dyn Job>>,
    threads_created: usize,
    threads_busy: usize,
    shutting_down: bool,
    handles: Vec<JoinHandle<()>>,
}

struct PoolShared {
    max_threads: usize,
    state: Mutex<PoolState>,
    /// Signaled once per push, broadcast on shutdown.
    task_available: Condvar,
    /// Signaled when the last in-flight task completes and the queue is
    /// empty.
    all_idle: Condvar,
}

// ---------------------------------------------------------------------------
//  Thread Pool
// ---------------------------------------------------------------------------

/// A bounded pool of worker threads.
///
/// Workers are spawned lazily: a push that finds every live worker busy
/// starts one more, up to the configured cap. Tasks dispatch FIFO with
/// respect to successful pushes.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool").finish_non_exhaustive()
    }
}

impl ThreadPool {
    /// Create a pool with no workers yet. `max_threads` must be in
    /// `1..=MAX_THREADS`.
    pub fn new(max_threads: usize) -> Result<Self, PoolError> {
        if max_threads == 0 || max_threads > MAX_THREADS {
            return Err(PoolError::InvalidArgument {
                detail: format!("max_threads must be in 1..={MAX_THREADS}, got {max_threads}"),
            });
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                max_threads,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    threads_created: 0,
                    threads_busy: 0,
                    shutting_down: false,
                    handles: Vec::new(),
                }),
                task_available: Condvar::new(),
                all_idle: Condvar::new(),
            }),
        })
    }

    /// Number of workers created so far.
    pub fn thread_count(&self) -> usize {
        lock(&self.shared.state).threads_created
    }

    /// Enqueue a task. The task must be `New` or `Done`; on success its
    /// state becomes `Queued` and exactly one sleeping worker is woken.
    pub fn push<T: Send + 'static>(&self, task: &Task<T>) -> Result<(), PoolError> {
        let mut state = lock(&self.shared.state);
        if state.shutting_down {
            return Err(PoolError::InvalidArgument {
                detail: String::from("pool is shutting down"),
            });
        }
        if state.queue.len() >= MAX_TASKS {
            return Err(PoolError::TooManyTasks { limit: MAX_TASKS });
        }

        {
            let mut slot = lock(&task.shared.slot);
            match slot.state {
                TaskState::New | TaskState::Done => {
                    slot.state = TaskState::Queued;
                    slot.pushed = true;
                    slot.result = None;
                }
                TaskState::Queued | TaskState::Running => return Err(PoolError::TaskInPool),
            }
        }
        let job: Arc<dyn Job> = task.shared.clone();
        state.queue.push_back(job);

        // Lazy growth: only when every live worker is busy.
        if state.threads_created < self.shared.max_threads
            && state.threads_busy == state.threads_created
        {
            let shared = Arc::clone(&self.shared);
            let name = format!("taskpool-worker-{}", state.threads_created);
            if let Ok(handle) = thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(shared))
            {
                state.handles.push(handle);
                state.threads_created += 1;
            }
        }

        self.shared.task_available.notify_one();
        Ok(())
    }

    /// Block until the pool has no queued and no running work.
    pub fn wait_idle(&self) {
        let mut state = lock(&self.shared.state);
        while !state.queue.is_empty() || state.threads_busy > 0 {
            state = wait(&self.shared.all_idle, state);
        }
    }

    /// Shut the pool down: refuse while work is outstanding, otherwise
    /// wake every worker and join them all. Idempotent afterwards.
    pub fn shutdown(&mut self) -> Result<(), PoolError> {
        let handles = {
            let mut state = lock(&self.shared.state);
            if !state.queue.is_empty() || state.threads_busy > 0 {
                return Err(PoolError::HasTasks {
                    queued: state.queue.len(),
                    running: state.threads_busy,
                });
            }
            state.shutting_down = true;
            std::mem::take(&mut state.handles)
        };

        self.shared.task_available.notify_all();
        for handle in handles {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for ThreadPool {
    /// Dropping the pool drains it: outstanding work is allowed to finish,
    /// then the workers are stopped and joined.
    fn drop(&mut self) {
        let handles = {
            let mut state = lock(&self.shared.state);
            while !state.queue.is_empty() || state.threads_busy > 0 {
                state = wait(&self.shared.all_idle, state);
            }
            state.shutting_down = true;
            std::mem::take(&mut state.handles)
        };

        self.shared.task_available.notify_all();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
//  Worker Loop
// ---------------------------------------------------------------------------

fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let job = {
            let mut state = lock(&shared.state);
            while !state.shutting_down && state.queue.is_empty() {
                state = wait(&shared.task_available, state);
            }
            if state.shutting_down {
                return;
            }
            let job = match state.queue.pop_front() {
                Some(job) => job,
                None => continue,
            };
            state.threads_busy += 1;
            job
        };

        // The pool lock is released while the task function runs; the
        // result is published under the task's own lock.
        job.run();

        let mut state = lock(&shared.state);
        state.threads_busy -= 1;
        if state.queue.is_empty() && state.threads_busy == 0 {
            shared.all_idle.notify_all();
        }
    }
}

// ===========================================================================
//  Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_thread_counts() {
        assert!(matches!(
            ThreadPool::new(0).unwrap_err(),
            PoolError::InvalidArgument { .. }
        ));
        assert!(matches!(
            ThreadPool::new(MAX_THREADS + 1).unwrap_err(),
            PoolError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_fresh_pool_has_no_workers() {
        let pool = ThreadPool::new(4).unwrap();
        assert_eq!(pool.thread_count(), 0);
    }

    #[test]
    fn test_push_queued_task_again_fails() {
        let pool = ThreadPool::new(1).unwrap();
        let task = Task::new(|| std::thread::sleep(std::time::Duration::from_millis(50)));
        pool.push(&task).unwrap();
        assert_eq!(pool.push(&task).unwrap_err(), PoolError::TaskInPool);
        task.join().unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut pool = ThreadPool::new(2).unwrap();
        let task = Task::new(|| 5);
        pool.push(&task).unwrap();
        assert_eq!(task.join().unwrap(), 5);
        pool.wait_idle();
        pool.shutdown().unwrap();
        pool.shutdown().unwrap();
    }
}
