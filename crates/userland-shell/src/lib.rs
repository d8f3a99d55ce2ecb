#![forbid(unsafe_code)]
//! Command-line executor.
//!
//! This crate provides:
//!
//! - **Tokenizer & parser** — words, `|`, `&&`, `||`, `>`/`>>`
//!   redirection, trailing `&`, fed incrementally in bounded chunks
//! - **Pipeline execution** — child processes wired stdout-to-stdin,
//!   with the final segment honoring redirection and background mode
//! - **Logical chains** — `&&`/`||` short-circuit across pipeline
//!   segments
//! - **Built-ins** — `cd` and `exit`, recognized only in the positions a
//!   POSIX shell would run them in-process
//! - **Background reaping** — a registry of child handles swept
//!   non-blockingly after every command line
//!
//! The `ush` binary wraps these into a stdin-driven shell loop.

pub mod exec;
pub mod parser;
pub mod registry;

pub use exec::{run_command_line, ExecResult};
pub use parser::{
    parse_command_line, tokenize, CommandLine, Connector, OutputMode, Parser, Pipeline,
    ShellError, SimpleCommand, Token,
};
pub use registry::ProcessRegistry;
