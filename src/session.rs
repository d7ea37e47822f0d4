//! PTY-attached process session.
//!
//! Launches the target executable with a pseudo-terminal as its controlling
//! I/O so interactive programs behave as if run from a real terminal, then
//! races process completion against the configured timeout. While the target
//! runs, three concurrent activities are in flight: a completion waiter that
//! owns the child, a drain thread copying every byte of terminal output into
//! a capture file, and (when `should_echo` is present) an injector that types
//! scripted commands into the terminal after a delay.
//!
//! Output is drained to a file rather than an in-memory buffer: the pty
//! master is unbuffered and is being written to and read from by concurrent
//! threads, so the capture has to land on stable storage as it arrives,
//! independent of the echo-injection and timeout races. The file doubles as
//! a post-mortem artifact when the timeout fires and is not deleted.

use crate::runner::FailureCounter;
use crate::schema::Criteria;
use crate::tasks::split_args;
use chrono::Local;
use nix::pty::openpty;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long the injector waits after the last echoed command before asking
/// the target to exit with SIGHUP.
const ECHO_GRACE: Duration = Duration::from_secs(5);

/// Error type for session failures that produced no capture to validate.
#[derive(Debug)]
pub enum SessionError {
    /// Could not create the capture file.
    CaptureFile(std::io::Error),
    /// Could not allocate or duplicate the pseudo-terminal.
    Pty(std::io::Error),
    /// The target command failed to launch.
    Launch(std::io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::CaptureFile(e) => write!(f, "failed to create capture file: {e}"),
            SessionError::Pty(e) => write!(f, "failed to set up pseudo-terminal: {e}"),
            SessionError::Launch(e) => write!(f, "failed to launch target: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Where the captured terminal output was written. On timeout this holds
    /// whatever the target produced before it was killed.
    pub capture_path: PathBuf,
    /// Whether the timeout fired before the target completed.
    pub timed_out: bool,
}

/// Run the target executable described by `criteria` to completion or
/// timeout, capturing all terminal output under `capture_dir`.
///
/// A timeout is reported through [`SessionOutcome::timed_out`] (with one
/// counter increment), not as an error: the partial capture is still valid
/// input for validation. Errors mean nothing was captured at all.
pub fn run_target(
    criteria: &Criteria,
    show_output: bool,
    capture_dir: &Path,
    counter: &FailureCounter,
) -> Result<SessionOutcome, SessionError> {
    let capture_path = capture_dir.join(format!(
        "shelltest-{}.log",
        Local::now().format("%Y-%m-%d_%H%M%S%.3f")
    ));
    let capture = File::create(&capture_path).map_err(|e| {
        counter.bump();
        SessionError::CaptureFile(e)
    })?;

    let Some((name, args)) = split_args(&criteria.target.execute) else {
        counter.bump();
        return Err(SessionError::Launch(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target.execute is empty",
        )));
    };

    let pty = openpty(None, None).map_err(|e| {
        counter.bump();
        SessionError::Pty(std::io::Error::from(e))
    })?;

    // Two handles on the master side: one for the drain thread, one for the
    // echo injector. The slave side becomes the child's stdio.
    let master_reader = File::from(pty.master.try_clone().map_err(|e| {
        counter.bump();
        SessionError::Pty(e)
    })?);
    let master_writer = File::from(pty.master);

    let mut cmd = Command::new(name);
    cmd.args(&args);
    let (stdin, stdout) = match (pty.slave.try_clone(), pty.slave.try_clone()) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            counter.bump();
            return Err(SessionError::Pty(e));
        }
    };
    cmd.stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(pty.slave));
    unsafe {
        cmd.pre_exec(|| {
            // New session, with the pty slave (fd 0) as controlling terminal.
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            if nix::libc::ioctl(0, nix::libc::TIOCSCTTY as _, 0) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| {
        counter.bump();
        SessionError::Launch(e)
    })?;
    // The Command still holds the parent's copies of the slave fds; they must
    // close now or the master never reaches end-of-stream after the child
    // exits and the drain below blocks forever.
    drop(cmd);
    let pid = Pid::from_raw(child.id() as i32);
    info!(command = %criteria.target.execute, pid = child.id(), "target launched");

    let timeout = Duration::from_secs(criteria.target.timeout as u64);
    let mut timed_out = false;
    let (done_tx, done_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        let drain = s.spawn(move || drain_output(master_reader, capture));

        // Completion waiter: owns the child and may block unboundedly; the
        // timeout branch below guarantees forward progress via SIGKILL.
        s.spawn(move || {
            let status = child.wait();
            let _ = done_tx.send(status);
        });

        if !criteria.should_echo.is_empty() {
            s.spawn(move || inject_echoes(criteria, master_writer, pid, &stop_rx, counter));
        } else {
            drop(master_writer);
        }

        match done_rx.recv_timeout(timeout) {
            Ok(Ok(status)) => {
                info!(%status, "target completed before timeout");
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to wait on target");
                counter.bump();
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout = criteria.target.timeout,
                    "target timeout exceeded, killing process"
                );
                if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
                    error!(error = %e, "failed to kill target");
                }
                counter.bump();
                timed_out = true;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                error!("completion waiter exited without reporting");
                counter.bump();
            }
        }

        // The race is decided; cancel any in-flight echo sleeps.
        drop(stop_tx);

        if let Err(e) = drain.join().expect("drain thread panicked") {
            warn!(error = %e, "failed to copy target output to capture file");
        }
    });

    if show_output {
        match std::fs::read_to_string(&capture_path) {
            Ok(text) => {
                info!(capture = %capture_path.display(), "captured output follows");
                println!("{text}");
            }
            Err(e) => {
                error!(error = %e, "failed to read back capture file");
                counter.bump();
            }
        }
    }

    Ok(SessionOutcome {
        capture_path,
        timed_out,
    })
}

/// Copy everything the target writes to its terminal into the capture file
/// until the stream ends.
fn drain_output(mut master: File, capture: File) -> std::io::Result<()> {
    let mut writer = BufWriter::new(capture);
    let mut buf = [0u8; 4096];
    loop {
        match master.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => writer.write_all(&buf[..n])?,
            // Linux reports EIO on the master once every slave handle is
            // closed; that is the pty's end-of-stream.
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    writer.flush()
}

/// Type each `should_echo` command into the target's terminal, then ask the
/// target to exit cleanly.
///
/// Write failures count as criteria failures; the SIGHUP is advisory only,
/// since the session timeout is the authoritative backstop for a target that
/// refuses to exit.
fn inject_echoes(
    criteria: &Criteria,
    mut tty: File,
    pid: Pid,
    stop: &mpsc::Receiver<()>,
    counter: &FailureCounter,
) {
    let delay = Duration::from_secs(criteria.target.should_echo_delay);
    if wait_or_cancelled(stop, delay) {
        return;
    }

    for echo in &criteria.should_echo {
        info!(command = %echo.command, "echoing into target");
        if let Err(e) = tty.write_all(format!("{}\n", echo.command).as_bytes()) {
            error!(error = %e, command = %echo.command, "failed to echo command");
            counter.bump();
        }
    }

    // Give the target a moment to respond before asking it to hang up.
    if wait_or_cancelled(stop, ECHO_GRACE) {
        return;
    }
    if let Err(e) = signal::kill(pid, Signal::SIGHUP) {
        warn!(error = %e, "failed to send SIGHUP to target");
    }
}

/// Sleep for `duration`, returning true early if the session has finished.
fn wait_or_cancelled(stop: &mpsc::Receiver<()>, duration: Duration) -> bool {
    !matches!(
        stop.recv_timeout(duration),
        Err(mpsc::RecvTimeoutError::Timeout)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EchoCheck, Target};
    use std::time::Instant;
    use tempfile::tempdir;

    fn criteria_for(execute: &str, timeout: i64) -> Criteria {
        Criteria {
            should_echo: vec![],
            should_have: vec![],
            should_lack: vec![],
            target: Target {
                execute: execute.to_string(),
                pre_tasks: vec![],
                post_tasks: vec![],
                should_echo_delay: 0,
                timeout,
            },
        }
    }

    #[test]
    fn captures_target_output() {
        let dir = tempdir().unwrap();
        let counter = FailureCounter::new();
        let criteria = criteria_for("echo ready", 5);

        let outcome = run_target(&criteria, false, dir.path(), &counter).unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(counter.total(), 0);

        let captured = std::fs::read_to_string(&outcome.capture_path).unwrap();
        assert!(captured.contains("ready"), "captured: {captured:?}");
    }

    #[test]
    fn session_finishes_promptly_after_target_exit() {
        let dir = tempdir().unwrap();
        let counter = FailureCounter::new();
        let criteria = criteria_for("echo ready", 30);

        // The drain must see end-of-stream as soon as the child exits; if any
        // parent-side slave handle is left open the session only ends when
        // the 30s timeout fires.
        let start = Instant::now();
        let outcome = run_target(&criteria, false, dir.path(), &counter).unwrap();
        let elapsed = start.elapsed();

        assert!(!outcome.timed_out);
        assert!(
            elapsed < Duration::from_secs(5),
            "session took {:.2}s for a target that exits immediately",
            elapsed.as_secs_f64()
        );
    }

    #[test]
    fn launch_failure_counts_once() {
        let dir = tempdir().unwrap();
        let counter = FailureCounter::new();
        let criteria = criteria_for("definitely-not-a-binary --flag", 5);

        let result = run_target(&criteria, false, dir.path(), &counter);
        assert!(matches!(result, Err(SessionError::Launch(_))));
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn timeout_kills_target_and_keeps_partial_capture() {
        let dir = tempdir().unwrap();
        let counter = FailureCounter::new();
        let criteria = criteria_for("sleep 60", 1);

        let start = Instant::now();
        let outcome = run_target(&criteria, false, dir.path(), &counter).unwrap();
        let elapsed = start.elapsed();

        assert!(outcome.timed_out);
        assert_eq!(counter.total(), 1);
        // Killed within a bounded margin of the 1s timeout.
        assert!(
            elapsed < Duration::from_secs(5),
            "took {:.2}s to enforce a 1s timeout",
            elapsed.as_secs_f64()
        );
        assert!(outcome.capture_path.exists());
    }

    #[test]
    fn echoed_commands_reach_the_target() {
        let dir = tempdir().unwrap();
        let counter = FailureCounter::new();
        let mut criteria = criteria_for("cat", 30);
        criteria.should_echo = vec![EchoCheck {
            command: "hello-from-the-injector".to_string(),
            should_have: "hello-from-the-injector".to_string(),
        }];

        let outcome = run_target(&criteria, false, dir.path(), &counter).unwrap();
        // cat exits on the post-injection SIGHUP, well before the timeout.
        assert!(!outcome.timed_out);
        assert_eq!(counter.total(), 0);

        let captured = std::fs::read_to_string(&outcome.capture_path).unwrap();
        assert!(
            captured.contains("hello-from-the-injector"),
            "captured: {captured:?}"
        );
    }
}
