//! Pre/post task execution.
//!
//! Runs an ordered list of command lines strictly sequentially, capturing
//! combined stdout/stderr. Execution is best-effort: a failing command is
//! logged and tallied but never stops the commands after it, so one broken
//! setup step cannot mask unrelated ones.

use crate::runner::FailureCounter;
use std::process::Command;
use tracing::{error, info};

/// Error reported when one or more tasks in a list failed.
#[derive(Debug)]
pub struct TaskFailed {
    /// Number of commands that exited non-zero or failed to launch.
    pub failed: u32,
}

impl std::fmt::Display for TaskFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} task(s) failed", self.failed)
    }
}

impl std::error::Error for TaskFailed {}

/// Split a command line into a program name and its arguments.
///
/// Splitting is on whitespace only; there is no quoting support. A task like
/// `echo "two words"` produces the literal arguments `"two` and `words"`.
pub(crate) fn split_args(input: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = input.split_whitespace();
    let name = parts.next()?;
    Some((name, parts.collect()))
}

/// Run every command in `tasks` to completion, in order.
///
/// Failures are added to `counter` in one batch at the end; when
/// `show_output` is set, each command's combined output is written to stdout
/// as it completes.
pub fn run_tasks(
    tasks: &[String],
    show_output: bool,
    counter: &FailureCounter,
) -> Result<(), TaskFailed> {
    let mut failed = 0u32;

    for task in tasks {
        info!(task, "executing task");
        let Some((name, args)) = split_args(task) else {
            error!(task, "task is empty, nothing to execute");
            failed += 1;
            continue;
        };

        match Command::new(name).args(&args).output() {
            Ok(output) => {
                if !output.status.success() {
                    error!(task, status = %output.status, "task failed");
                    failed += 1;
                }
                if show_output {
                    print!("{}", String::from_utf8_lossy(&output.stdout));
                    print!("{}", String::from_utf8_lossy(&output.stderr));
                }
            }
            Err(e) => {
                error!(task, error = %e, "failed to launch task");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        counter.add(failed);
        return Err(TaskFailed { failed });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_simple_command() {
        let (name, args) = split_args("echo hello world").unwrap();
        assert_eq!(name, "echo");
        assert_eq!(args, vec!["hello", "world"]);
    }

    #[test]
    fn split_bare_command() {
        let (name, args) = split_args("ls").unwrap();
        assert_eq!(name, "ls");
        assert!(args.is_empty());
    }

    #[test]
    fn split_empty_command() {
        assert!(split_args("").is_none());
        assert!(split_args("   ").is_none());
    }

    #[test]
    fn all_tasks_succeed() {
        let counter = FailureCounter::new();
        let tasks = vec!["echo foo".to_string(), "echo bar".to_string()];
        assert!(run_tasks(&tasks, false, &counter).is_ok());
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn failing_task_does_not_stop_later_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let counter = FailureCounter::new();
        let tasks = vec![
            "false".to_string(),
            format!("touch {}", marker.display()),
        ];

        let err = run_tasks(&tasks, false, &counter).unwrap_err();
        assert_eq!(err.failed, 1);
        assert_eq!(counter.total(), 1);
        // The second command still ran after the first failed.
        assert!(marker.exists());
    }

    #[test]
    fn unlaunchable_tasks_each_count() {
        let counter = FailureCounter::new();
        let tasks = vec![
            "definitely-not-a-binary foo".to_string(),
            "also-not-a-binary bar".to_string(),
        ];

        let err = run_tasks(&tasks, false, &counter).unwrap_err();
        assert_eq!(err.failed, 2);
        assert_eq!(counter.total(), 2);
    }
}
