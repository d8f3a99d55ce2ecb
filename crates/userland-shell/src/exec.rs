//! Pipeline and logical-chain execution.
//!
//! A command line runs segment by segment: `&&` takes the next segment on
//! success, `||` on failure, anything else is skipped. Only the final
//! segment honors the line's output redirection and background flag;
//! non-final segments always run in the foreground with stdout feeding
//! the next stage.

use std::fs::{File, OpenOptions};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::error;

use crate::parser::{CommandLine, Connector, OutputMode, Pipeline, SimpleCommand};

/// Exit code reported when a stage's executable cannot be spawned.
const SPAWN_FAILURE_CODE: i32 = 127;

// ---------------------------------------------------------------------------
//  Results
// ---------------------------------------------------------------------------

/// Outcome of one command line.
#[derive(Debug)]
pub struct ExecResult {
    /// `exit` ran as a single-command pipeline; the shell should stop.
    pub exit_requested: bool,
    /// Exit code of the last executed segment.
    pub code: i32,
    /// Children of a background final segment, to be adopted by the
    /// driver's registry.
    pub background: Vec<Child>,
}

struct PipelineOutcome {
    code: i32,
    exit_requested: bool,
    children: Vec<Child>,
}

// ---------------------------------------------------------------------------
//  Command-Line Execution
// ---------------------------------------------------------------------------

/// Execute a parsed command line.
pub fn run_command_line(line: &CommandLine) -> ExecResult {
    let mut background = Vec::new();
    let mut code = 0;
    let Some(last_index) = line.pipelines.len().checked_sub(1) else {
        return ExecResult {
            exit_requested: false,
            code,
            background,
        };
    };

    for (index, pipeline) in line.pipelines.iter().enumerate() {
        if index > 0 {
            let taken = match line.connectors[index - 1] {
                Connector::And => code == 0,
                Connector::Or => code != 0,
            };
            if !taken {
                continue;
            }
        }

        let terminal = index == last_index;
        let redirect = if terminal {
            line.out_file.as_deref().map(|file| (file, line.out_mode))
        } else {
            None
        };
        let outcome = run_pipeline(pipeline, redirect, terminal && line.background);

        code = outcome.code;
        background.extend(outcome.children);
        if outcome.exit_requested {
            return ExecResult {
                exit_requested: true,
                code,
                background,
            };
        }
    }

    ExecResult {
        exit_requested: false,
        code,
        background,
    }
}

// ---------------------------------------------------------------------------
//  Pipeline Execution
// ---------------------------------------------------------------------------

fn run_pipeline(
    pipeline: &Pipeline,
    redirect: Option<(&str, OutputMode)>,
    background: bool,
) -> PipelineOutcome {
    let mut children: Vec<Child> = Vec::new();
    let mut previous_stdout: Option<ChildStdout> = None;
    let mut terminal_spawn_failed = false;
    let Some(last_index) = pipeline.commands.len().checked_sub(1) else {
        return PipelineOutcome {
            code: 0,
            exit_requested: false,
            children,
        };
    };

    for (index, command) in pipeline.commands.iter().enumerate() {
        let terminal = index == last_index;

        // Built-ins. `cd` runs in-process only when it is the terminal
        // stage and no stage has spawned a child yet; in any other
        // position it is executed like an ordinary command. `exit` is
        // recognized by name alone: terminal, it waits and reports its
        // code; non-terminal, the stage is a pure no-op that spawns
        // nothing.
        if terminal && children.is_empty() && command.exe == "cd" {
            return PipelineOutcome {
                code: change_directory(command),
                exit_requested: false,
                children,
            };
        }
        if command.exe == "exit" {
            if !terminal {
                // Dropping the upstream pipe end feeds the next stage EOF.
                previous_stdout = None;
                continue;
            }
            let single_command = children.is_empty();
            let _ = wait_children(&mut children);
            let code = command
                .args
                .first()
                .and_then(|arg| arg.parse::<i32>().ok())
                .unwrap_or(0);
            return PipelineOutcome {
                code,
                exit_requested: single_command,
                children,
            };
        }

        let mut process = Command::new(&command.exe);
        process.args(&command.args);

        if index == 0 {
            // The first stage of a background pipeline gets no stdin; a
            // foreground first stage inherits the shell's.
            if background {
                process.stdin(Stdio::null());
            }
        } else {
            match previous_stdout.take() {
                Some(upstream) => {
                    process.stdin(Stdio::from(upstream));
                }
                None => {
                    process.stdin(Stdio::null());
                }
            }
        }

        if !terminal {
            process.stdout(Stdio::piped());
        } else if let Some((file, mode)) = redirect {
            match open_redirect(file, mode) {
                Ok(target) => {
                    process.stdout(Stdio::from(target));
                }
                Err(err) => {
                    error!("cannot open output file {file}: {err}");
                    let _ = wait_children(&mut children);
                    return PipelineOutcome {
                        code: 1,
                        exit_requested: false,
                        children,
                    };
                }
            }
        }

        match process.spawn() {
            Ok(mut child) => {
                if !terminal {
                    previous_stdout = child.stdout.take();
                }
                children.push(child);
            }
            Err(err) => {
                error!("cannot execute {}: {err}", command.exe);
                if terminal {
                    terminal_spawn_failed = true;
                }
                // Downstream stages read from /dev/null instead of a
                // broken pipe end.
            }
        }
    }

    if background {
        PipelineOutcome {
            code: 0,
            exit_requested: false,
            children,
        }
    } else {
        let waited = wait_children(&mut children);
        PipelineOutcome {
            code: if terminal_spawn_failed {
                SPAWN_FAILURE_CODE
            } else {
                waited
            },
            exit_requested: false,
            children,
        }
    }
}

/// `cd <dir>`: exactly one argument, applied to the shell process itself.
fn change_directory(command: &SimpleCommand) -> i32 {
    if command.args.len() != 1 {
        error!("cd expects exactly one argument");
        return 1;
    }
    match std::env::set_current_dir(&command.args[0]) {
        Ok(()) => 0,
        Err(err) => {
            error!("cd {}: {err}", command.args[0]);
            1
        }
    }
}

/// Wait for every child in spawn order; the result is the exit code of
/// the last child that exited normally.
fn wait_children(children: &mut Vec<Child>) -> i32 {
    let mut code = 0;
    for child in children.iter_mut() {
        match child.wait() {
            Ok(status) => {
                if let Some(child_code) = status.code() {
                    code = child_code;
                }
            }
            Err(err) => error!("cannot wait for child: {err}"),
        }
    }
    children.clear();
    code
}

fn open_redirect(path: &str, mode: OutputMode) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if mode == OutputMode::Append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path)
}

// ===========================================================================
//  Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_command_line, tokenize};

    fn line(input: &str) -> CommandLine {
        parse_command_line(&tokenize(input)).unwrap().unwrap()
    }

    #[test]
    fn test_single_command_exit_codes() {
        assert_eq!(run_command_line(&line("true")).code, 0);
        assert_eq!(run_command_line(&line("false")).code, 1);
    }

    #[test]
    fn test_pipeline_code_is_last_stage() {
        assert_eq!(run_command_line(&line("false | true")).code, 0);
        assert_eq!(run_command_line(&line("true | false")).code, 1);
    }

    #[test]
    fn test_logical_chain_short_circuits() {
        // The skipped segment leaves the previous code in place.
        assert_eq!(run_command_line(&line("false && true")).code, 1);
        assert_eq!(run_command_line(&line("false || true")).code, 0);
        assert_eq!(run_command_line(&line("true && false")).code, 1);
        assert_eq!(run_command_line(&line("false && true || true")).code, 0);
    }

    #[test]
    fn test_exit_as_single_command_requests_shell_exit() {
        let result = run_command_line(&line("exit 7"));
        assert!(result.exit_requested);
        assert_eq!(result.code, 7);
    }

    #[test]
    fn test_exit_without_argument_defaults_to_zero() {
        let result = run_command_line(&line("exit"));
        assert!(result.exit_requested);
        assert_eq!(result.code, 0);
    }

    #[test]
    fn test_exit_at_end_of_pipeline_does_not_stop_shell() {
        let result = run_command_line(&line("echo hi | exit 5"));
        assert!(!result.exit_requested);
        assert_eq!(result.code, 5);
    }

    #[test]
    fn test_exit_non_terminal_stage_is_a_no_op() {
        // The stage spawns nothing; the rest of the pipeline decides the
        // code and the shell keeps running.
        let result = run_command_line(&line("exit | true"));
        assert!(!result.exit_requested);
        assert_eq!(result.code, 0);

        let result = run_command_line(&line("exit | false"));
        assert!(!result.exit_requested);
        assert_eq!(result.code, 1);
    }

    #[test]
    fn test_exit_pipeline_into_exit_requests_shell_exit() {
        // No stage ever spawns a child, so the terminal exit still counts
        // as a single-command pipeline.
        let result = run_command_line(&line("exit | exit 9"));
        assert!(result.exit_requested);
        assert_eq!(result.code, 9);
    }

    #[test]
    fn test_exit_mid_chain_stops_before_later_segments() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("exit 3 && touch {}", marker.display());
        let result = run_command_line(&line(&script));
        assert!(result.exit_requested);
        assert_eq!(result.code, 3);
        assert!(!marker.exists());
    }

    #[test]
    fn test_cd_argument_validation() {
        // Neither call may change the test process's directory.
        let before = std::env::current_dir().unwrap();
        assert_ne!(run_command_line(&line("cd")).code, 0);
        assert_ne!(run_command_line(&line("cd /definitely/not/a/dir")).code, 0);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_redirection_truncates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        run_command_line(&line(&format!("echo xy > {}", out.display())));
        run_command_line(&line(&format!("echo zw >> {}", out.display())));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "xy\nzw\n");

        run_command_line(&line(&format!("echo fresh > {}", out.display())));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "fresh\n");
    }

    #[test]
    fn test_redirection_applies_to_final_segment_only() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        run_command_line(&line(&format!("true && echo tail > {}", out.display())));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "tail\n");
    }

    #[test]
    fn test_missing_executable_reports_nonzero() {
        let result = run_command_line(&line("definitely-not-a-command-zz"));
        assert_eq!(result.code, SPAWN_FAILURE_CODE);
    }

    #[test]
    fn test_background_pipeline_returns_children_promptly() {
        let started = std::time::Instant::now();
        let mut result = run_command_line(&line("sleep 5 &"));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(result.code, 0);
        assert_eq!(result.background.len(), 1);

        for child in &mut result.background {
            child.kill().unwrap();
            child.wait().unwrap();
        }
    }
}
