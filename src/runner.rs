//! Run orchestration and run-wide failure aggregation.
//!
//! For each criteria file the pipeline is: load, pre-tasks, target session,
//! output validation, post-tasks. Execution is best-effort: a failed phase
//! is logged and counted but later phases still run, so post-tasks (usually
//! cleanup) always execute. The one exception is a load failure, which is
//! terminal for that file since there is nothing to run.

use crate::{loader, session, tasks, validator};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{error, info, warn};

/// Run-wide failure counter.
///
/// The only shared mutable state in the system. Increment-only from the
/// phases' point of view; any concurrent reporter within a session (the
/// completion waiter, the echo injector) may add to it without coordination.
#[derive(Debug, Default)]
pub struct FailureCounter(AtomicU32);

impl FailureCounter {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Record a single failure.
    pub fn bump(&self) {
        self.add(1);
    }

    /// Record `n` failures at once.
    pub fn add(&self, n: u32) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Total failures recorded so far.
    pub fn total(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run the full pipeline for one criteria file, recording failures into
/// `counter`. Capture files are written under `capture_dir`.
pub fn run_criteria_file(
    path: &Path,
    show_output: bool,
    capture_dir: &Path,
    counter: &FailureCounter,
) {
    info!(file = %path.display(), "processing criteria file");

    let criteria = match loader::load_criteria(&path.to_string_lossy()) {
        Ok(criteria) => criteria,
        Err(e) => {
            error!(file = %path.display(), error = %e, "failed to load criteria");
            counter.bump();
            return;
        }
    };

    if criteria.target.pre_tasks.is_empty() {
        warn!("no pre-tasks found");
    } else {
        info!("starting pre-tasks");
        if let Err(e) = tasks::run_tasks(&criteria.target.pre_tasks, show_output, counter) {
            error!(error = %e, "pre-tasks failed");
        }
    }

    info!("starting target execution");
    match session::run_target(&criteria, show_output, capture_dir, counter) {
        Ok(outcome) => {
            if outcome.timed_out {
                warn!(
                    file = %path.display(),
                    "target timed out; validating the partial capture"
                );
            }
            info!(capture = %outcome.capture_path.display(), "validating captured output");
            match std::fs::read_to_string(&outcome.capture_path) {
                Ok(text) => {
                    if let Err(e) = validator::validate_output(&criteria, &text, counter) {
                        error!(file = %path.display(), error = %e, "validation failed");
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to read captured output");
                    counter.bump();
                }
            }
        }
        Err(e) => {
            // Nothing was captured, so there is nothing to validate, but
            // post-tasks still run below.
            error!(file = %path.display(), error = %e, "target execution failed");
        }
    }

    if !criteria.target.post_tasks.is_empty() {
        info!("starting post-tasks");
        if let Err(e) = tasks::run_tasks(&criteria.target.post_tasks, show_output, counter) {
            error!(error = %e, "post-tasks failed");
        }
    }
}

/// Process every criteria file in order and return the aggregate failure
/// count. The batch always runs to completion; no file aborts the rest.
pub fn run_batch(files: &[std::path::PathBuf], show_output: bool, capture_dir: &Path) -> u32 {
    let counter = FailureCounter::new();

    for file in files {
        run_criteria_file(file, show_output, capture_dir, &counter);
    }

    let total = counter.total();
    if total > 0 {
        error!(failures = total, "one or more criteria checks failed");
    } else {
        info!(files = files.len(), "all criteria files passed");
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn counter_is_safe_across_threads() {
        let counter = FailureCounter::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        counter.bump();
                    }
                });
            }
        });
        assert_eq!(counter.total(), 800);
    }

    #[test]
    fn load_failure_is_terminal_for_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "not: [valid: {").unwrap();

        let counter = FailureCounter::new();
        run_criteria_file(&path, false, dir.path(), &counter);
        assert_eq!(counter.total(), 1);
        // No session ran, so no capture file was produced.
        let captures: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("shelltest-"))
            .collect();
        assert!(captures.is_empty());
    }

    #[test]
    fn passing_criteria_leave_counter_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pass.yaml");
        std::fs::write(
            &path,
            r#"
should_have:
  - ready
should_lack:
  - error
target:
  execute: echo ready
  timeout: 5
"#,
        )
        .unwrap();

        let failures = run_batch(&[path], false, dir.path());
        assert_eq!(failures, 0);
    }

    #[test]
    fn failing_criteria_count_each_unmet_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fail.yaml");
        std::fs::write(
            &path,
            r#"
should_have:
  - ready
should_lack:
  - error
target:
  execute: echo error occurred
  timeout: 5
"#,
        )
        .unwrap();

        // "ready" missing plus "error" present.
        let failures = run_batch(&[path], false, dir.path());
        assert_eq!(failures, 2);
    }

    #[test]
    fn timed_out_target_still_validates_partial_capture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hang.yaml");
        std::fs::write(
            &path,
            r#"
should_have:
  - never-appears
target:
  execute: sleep 60
  timeout: 1
"#,
        )
        .unwrap();

        let counter = FailureCounter::new();
        run_criteria_file(&path, false, dir.path(), &counter);
        // One for the timeout kill, one for the should-have missing from the
        // partial capture.
        assert_eq!(counter.total(), 2);
    }

    #[test]
    fn post_tasks_run_after_session_failure() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("cleaned");
        let path = dir.path().join("broken.yaml");
        std::fs::write(
            &path,
            format!(
                r#"
target:
  execute: definitely-not-a-binary
  post_tasks:
    - touch {}
  timeout: 5
"#,
                marker.display()
            ),
        )
        .unwrap();

        let counter = FailureCounter::new();
        run_criteria_file(&path, false, dir.path(), &counter);
        // Launch failure counted, cleanup still ran.
        assert_eq!(counter.total(), 1);
        assert!(marker.exists());
    }
}
