//! Pool and task error types.

use miette::Diagnostic;
use thiserror::Error;

/// Errors returned by pool and task operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum PoolError {
    /// Bad argument: zero or over-cap thread count, shut-down pool.
    #[error("invalid argument: {detail}")]
    #[diagnostic(code(taskpool::invalid_argument))]
    InvalidArgument { detail: String },

    /// The pending queue is at its hard limit.
    #[error("task queue is full: limit {limit}")]
    #[diagnostic(code(taskpool::too_many_tasks))]
    TooManyTasks { limit: usize },

    /// The pool still has queued or running work.
    #[error("pool has outstanding work: {queued} queued, {running} running")]
    #[diagnostic(code(taskpool::has_tasks))]
    HasTasks { queued: usize, running: usize },

    /// The task is currently queued or running.
    #[error("task is queued or running in a pool")]
    #[diagnostic(code(taskpool::task_in_pool))]
    TaskInPool,

    /// The task has never been pushed into a pool.
    #[error("task was never pushed into a pool")]
    #[diagnostic(code(taskpool::task_not_pushed))]
    TaskNotPushed,

    /// A timed join elapsed before the task completed.
    #[error("timed out waiting for task completion")]
    #[diagnostic(code(taskpool::timeout))]
    Timeout,

    /// The task function panicked; no result was produced.
    #[error("task function panicked")]
    #[diagnostic(code(taskpool::task_panicked))]
    TaskPanicked,

    /// Reserved for optional operations a build does not provide.
    #[error("operation not implemented")]
    #[diagnostic(code(taskpool::not_implemented))]
    NotImplemented,
}
