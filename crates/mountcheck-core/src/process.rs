//! Lifecycle of one externally launched driver process.
//!
//! A [`ProcessController`] knows nothing about filesystems: it starts the
//! driver, reports on its exit, and makes sure the child is reaped on every
//! path, including drop.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::HarnessError;

/// How long [`ProcessController::terminate`] waits after the polite signal.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(3);

const TERMINATE_POLL: Duration = Duration::from_millis(100);

/// Captured result of a short-lived command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit status.
    pub status: ExitStatus,
}

#[derive(Debug)]
enum ChildState {
    Running(Child),
    /// Exit observed by `try_status`; not yet handed out by `join`.
    Exited(ExitStatus),
    Joined,
}

/// Owns a spawned child process.
#[derive(Debug)]
pub struct ProcessController {
    program: PathBuf,
    pid: u32,
    state: ChildState,
}

impl ProcessController {
    /// Launch `program` with `args` without waiting for it.
    ///
    /// Stdin is closed; stdout and stderr are inherited so driver logs stay
    /// visible next to the harness output.
    pub fn spawn<I, S>(program: &Path, args: I) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;

        let pid = child.id();
        debug!(pid, program = %program.display(), "Spawned process");

        Ok(Self {
            program: program.to_path_buf(),
            pid,
            state: ChildState::Running(child),
        })
    }

    /// Run `program` to completion and capture its output.
    pub fn run_to_completion<I, S>(program: &Path, args: I) -> Result<CommandOutput, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| HarnessError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status,
        };
        debug!(
            program = %program.display(),
            status = %result.status,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Command completed"
        );
        Ok(result)
    }

    /// OS process id of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking exit check.
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>, HarnessError> {
        match &mut self.state {
            ChildState::Running(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    self.state = ChildState::Exited(status);
                    Ok(Some(status))
                }
                Ok(None) => Ok(None),
                Err(e) => Err(self.join_error(&e.to_string())),
            },
            ChildState::Exited(status) => Ok(Some(*status)),
            ChildState::Joined => Err(self.join_error("process already reaped")),
        }
    }

    /// Block until the child exits.
    ///
    /// Fails if the status was already handed out by a previous `join` or
    /// `terminate`.
    pub fn join(&mut self) -> Result<ExitStatus, HarnessError> {
        let status = match std::mem::replace(&mut self.state, ChildState::Joined) {
            ChildState::Running(mut child) => match child.wait() {
                Ok(status) => status,
                Err(e) => {
                    // Put the handle back so drop still reaps it.
                    self.state = ChildState::Running(child);
                    return Err(self.join_error(&e.to_string()));
                }
            },
            ChildState::Exited(status) => status,
            ChildState::Joined => return Err(self.join_error("process already reaped")),
        };
        debug!(pid = self.pid, %status, "Process joined");
        Ok(status)
    }

    /// Stop the child: polite signal, bounded wait, then hard kill.
    pub fn terminate(&mut self) -> Result<ExitStatus, HarnessError> {
        let mut child = match std::mem::replace(&mut self.state, ChildState::Joined) {
            ChildState::Running(child) => child,
            ChildState::Exited(status) => return Ok(status),
            ChildState::Joined => return Err(self.join_error("process already reaped")),
        };

        if let Some(status) = self.request_stop(&mut child) {
            return Ok(status);
        }

        warn!(pid = self.pid, "Process ignored stop request, killing");
        if let Err(e) = child.kill() {
            // Already exited between the last poll and the kill.
            debug!(pid = self.pid, error = %e, "Kill failed");
        }
        child
            .wait()
            .map_err(|e| self.join_error(&e.to_string()))
    }

    /// Release the child without waiting for or killing it.
    ///
    /// The process keeps running; the caller takes responsibility for it.
    pub fn detach(mut self) -> u32 {
        if matches!(self.state, ChildState::Running(_)) {
            warn!(pid = self.pid, program = %self.program.display(), "Detaching running process");
        }
        // Dropping a std Child neither kills nor waits.
        self.state = ChildState::Joined;
        self.pid
    }

    #[cfg(unix)]
    fn request_stop(&self, child: &mut Child) -> Option<ExitStatus> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(self.pid) else {
            return None;
        };
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!(pid = self.pid, error = %e, "SIGTERM failed");
            return child.try_wait().ok().flatten();
        }

        let deadline = Instant::now() + TERMINATE_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid = self.pid, %status, "Process exited after SIGTERM");
                    return Some(status);
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(TERMINATE_POLL),
                Ok(None) | Err(_) => return None,
            }
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&self, child: &mut Child) -> Option<ExitStatus> {
        // No polite stop for arbitrary console processes; kill, then give the
        // OS the grace period to report the exit.
        if let Err(e) = child.kill() {
            debug!(pid = self.pid, error = %e, "Kill failed");
        }
        let deadline = Instant::now() + TERMINATE_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => std::thread::sleep(TERMINATE_POLL),
                Ok(None) | Err(_) => return None,
            }
        }
    }

    fn join_error(&self, reason: &str) -> HarnessError {
        HarnessError::Join {
            pid: self.pid,
            reason: reason.to_string(),
        }
    }
}

impl Drop for ProcessController {
    fn drop(&mut self) {
        if let ChildState::Running(child) = &mut self.state {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            warn!(
                pid = self.pid,
                program = %self.program.display(),
                "Process still running on drop, killing"
            );
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
