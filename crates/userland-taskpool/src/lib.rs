#![forbid(unsafe_code)]
//! Bounded, lazily-scaling worker thread pool.
//!
//! This crate provides:
//!
//! - **Tasks** — re-runnable units of work with a per-task result slot,
//!   completion condition, and `New → Queued → Running → Done` lifecycle
//! - **FIFO dispatch** — tasks start in push order
//! - **Lazy worker spawning** — a push that finds every live worker busy
//!   starts one more thread, up to the configured cap
//! - **Per-task join** — blocking and timed waits for completion
//! - **Graceful shutdown** — refuses while work is outstanding, then wakes
//!   and joins every worker ever created

mod error;
mod pool;
mod sync;
mod task;

pub use error::PoolError;
pub use pool::{ThreadPool, MAX_TASKS, MAX_THREADS};
pub use task::{Task, TaskState};
