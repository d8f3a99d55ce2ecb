#![forbid(unsafe_code)]
//! In-memory user-space file system.
//!
//! This crate provides:
//!
//! - **File objects** — per-file chains of fixed 4096-byte blocks with an
//!   occupancy count on the terminal block
//! - **Descriptor table** — dense small-integer handles allocated at the
//!   smallest free index, growing and shrinking with occupancy
//! - **File I/O** — open/read/write/close with per-descriptor cursors and
//!   POSIX-shaped permission flags
//! - **Deferred deletion** — a deleted file stays alive, hidden from name
//!   lookup, until its last descriptor closes
//! - **Resize** — truncation with cursor clamping, extension with zeroed
//!   bytes, under a 100 MiB per-file cap

pub mod fs;
mod table;

pub use fs::{FsError, MemFs, OpenFlags, BLOCK_SIZE, MAX_FILE_SIZE};
