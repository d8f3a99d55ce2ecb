//! `ush` — the userland shell driver.
//!
//! Reads command lines from standard input in bounded chunks, feeds them
//! to the incremental parser, and executes every complete line in order.
//! Background children are adopted into a registry and reaped
//! opportunistically after each line.
//!
//! # Examples
//!
//! ```bash
//! # Interactive / piped use
//! echo 'echo hello | wc -c' | ush
//!
//! # One-shot command
//! ush -c 'false && echo A || echo B'
//! ```

use std::io::Read;

use clap::Parser;
use tracing::{error, warn};

use userland_shell::exec::run_command_line;
use userland_shell::parser::{CommandLine, Parser as LineParser, ShellError};
use userland_shell::registry::ProcessRegistry;

#[derive(Parser, Debug)]
#[command(name = "ush")]
#[command(author, version, about = "Pipeline-executing command shell", long_about = None)]
struct Cli {
    /// Run a single command line and exit
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut parser = LineParser::new();
    let mut registry = ProcessRegistry::new();
    let mut last_code = 0;

    if let Some(command) = cli.command {
        parser.feed(&command);
        parser.feed("\n");
        let exit = drain_ready_lines(&mut parser, &mut registry, &mut last_code);
        registry.reap_finished();
        return exit.unwrap_or(last_code);
    }

    let mut stdin = std::io::stdin().lock();
    let mut chunk = [0u8; 1024];
    loop {
        let filled = match stdin.read(&mut chunk) {
            Ok(0) => break,
            Ok(filled) => filled,
            Err(err) => {
                error!("cannot read standard input: {err}");
                break;
            }
        };
        parser.feed(&String::from_utf8_lossy(&chunk[..filled]));

        if let Some(code) = drain_ready_lines(&mut parser, &mut registry, &mut last_code) {
            registry.reap_finished();
            return code;
        }
        registry.reap_finished();
    }

    // A final line without a trailing newline still runs.
    if let Some(parsed) = parser.finish() {
        if let Some(code) = execute_parsed(parsed, &mut registry, &mut last_code) {
            registry.reap_finished();
            return code;
        }
    }

    registry.reap_finished();
    last_code
}

/// Execute every complete line buffered so far. Returns the exit code as
/// soon as a line requests shell exit.
fn drain_ready_lines(
    parser: &mut LineParser,
    registry: &mut ProcessRegistry,
    last_code: &mut i32,
) -> Option<i32> {
    while let Some(parsed) = parser.next_line() {
        if let Some(code) = execute_parsed(parsed, registry, last_code) {
            return Some(code);
        }
    }
    None
}

fn execute_parsed(
    parsed: Result<CommandLine, ShellError>,
    registry: &mut ProcessRegistry,
    last_code: &mut i32,
) -> Option<i32> {
    match parsed {
        Ok(line) => {
            let result = run_command_line(&line);
            *last_code = result.code;
            registry.adopt(result.background);
            registry.reap_finished();
            if result.exit_requested {
                return Some(result.code);
            }
        }
        Err(err) => warn!("{err}"),
    }
    None
}
