//! Tasks: re-runnable units of work with per-task completion signaling.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::PoolError;
use crate::sync::{lock, wait, wait_timeout};

// ---------------------------------------------------------------------------
//  Task State
// ---------------------------------------------------------------------------

/// Lifecycle of a task.
///
/// `New → Queued → Running → Done`; a joined `Done` task may be pushed
/// again (`Done → Queued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, never pushed.
    New,
    /// Waiting in a pool's FIFO queue.
    Queued,
    /// A worker is executing the task function.
    Running,
    /// The function returned; the result slot is populated.
    Done,
}

// ---------------------------------------------------------------------------
//  Task
// ---------------------------------------------------------------------------

pub(crate) struct TaskSlot<T> {
    pub state: TaskState,
    /// Populated on `Running → Done`; `None` at `Done` only after a panic.
    pub result: Option<T>,
    /// Whether the task has ever been pushed into a pool.
    pub pushed: bool,
}

/// Shared core of a task, referenced by the owning handle and by the pool
/// queue. The slot mutex and condvar carry the `Running → Done` transition
/// to joiners.
pub(crate) struct TaskShared<T> {
    func: Box<dyn Fn() -> T + Send + Sync>,
    pub slot: Mutex<TaskSlot<T>>,
    pub done: Condvar,
}

/// Type-erased view of a task as held by the pool queue.
pub(crate) trait Job: Send + Sync {
    fn run(&self);
}

impl<T: Send + 'static> Job for TaskShared<T> {
    fn run(&self) {
        {
            let mut slot = lock(&self.slot);
            slot.state = TaskState::Running;
        }

        let output = panic::catch_unwind(AssertUnwindSafe(|| (self.func)())).ok();

        let mut slot = lock(&self.slot);
        slot.result = output;
        slot.state = TaskState::Done;
        self.done.notify_all();
    }
}

/// A unit of work for a [`ThreadPool`](crate::ThreadPool).
///
/// The function is re-runnable: after a completed run has been joined, the
/// same task may be pushed again.
pub struct Task<T> {
    pub(crate) shared: Arc<TaskShared<T>>,
}

impl<T: Send + 'static> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(TaskShared {
                func: Box::new(func),
                slot: Mutex::new(TaskSlot {
                    state: TaskState::New,
                    result: None,
                    pushed: false,
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Block until the task is `Done` and read its result.
    ///
    /// The result slot stays populated, so a completed run can be read
    /// more than once until the task is pushed again.
    pub fn join(&self) -> Result<T, PoolError>
    where
        T: Clone,
    {
        let mut slot = lock(&self.shared.slot);
        if !slot.pushed {
            return Err(PoolError::TaskNotPushed);
        }
        while slot.state != TaskState::Done {
            slot = wait(&self.shared.done, slot);
        }
        match &slot.result {
            Some(result) => Ok(result.clone()),
            None => Err(PoolError::TaskPanicked),
        }
    }

    /// [`join`](Self::join) with a deadline; elapses with
    /// [`PoolError::Timeout`].
    pub fn timed_join(&self, timeout: Duration) -> Result<T, PoolError>
    where
        T: Clone,
    {
        let start = Instant::now();
        let mut slot = lock(&self.shared.slot);
        if !slot.pushed {
            return Err(PoolError::TaskNotPushed);
        }
        while slot.state != TaskState::Done {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(PoolError::Timeout);
            }
            let (guard, _) = wait_timeout(&self.shared.done, slot, timeout - elapsed);
            slot = guard;
        }
        match &slot.result {
            Some(result) => Ok(result.clone()),
            None => Err(PoolError::TaskPanicked),
        }
    }

    pub fn state(&self) -> TaskState {
        lock(&self.shared.slot).state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Done
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Release the task. Refuses while the task is queued or running,
    /// handing the task back with the error.
    pub fn delete(self) -> Result<(), (PoolError, Task<T>)> {
        match self.state() {
            TaskState::Queued | TaskState::Running => Err((PoolError::TaskInPool, self)),
            TaskState::New | TaskState::Done => Ok(()),
        }
    }

    /// Drop the handle to a pushed task; its resources die with the last
    /// queue reference once the run completes.
    pub fn detach(self) -> Result<(), PoolError> {
        if !lock(&self.shared.slot).pushed {
            return Err(PoolError::TaskNotPushed);
        }
        Ok(())
    }
}

// ===========================================================================
//  Tests
// ===========================================================================
