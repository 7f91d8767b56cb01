use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
    Running,
    Stopped(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(code) => Some(*code),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitStatus::Signal(sig) => Some(*sig),
            _ => None,
        }
    }
}

/// Reaps and signals the shell child. The session polls `try_wait` after
/// PTY EOF and on teardown; nothing here blocks indefinitely.
pub struct ProcessManager {
    child_pid: Pid,
}

impl ProcessManager {
    pub fn new(child_pid: Pid) -> Self {
        Self { child_pid }
    }

    /// Non-blocking WNOHANG check.
    pub fn try_wait(&self) -> Result<ExitStatus, nix::Error> {
        let status = match waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => ExitStatus::Code(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => ExitStatus::Signal(sig as i32),
            Ok(WaitStatus::Stopped(_, sig)) => ExitStatus::Stopped(sig as i32),
            Ok(_) => ExitStatus::Running,
            // ECHILD means the status was already collected elsewhere;
            // report a clean exit rather than an error
            Err(nix::Error::ECHILD) => ExitStatus::Code(0),
            Err(e) => {
                error!("waitpid({}) failed: {}", self.child_pid, e);
                return Err(e);
            }
        };
        if status != ExitStatus::Running {
            debug!(pid = self.child_pid.as_raw(), ?status, "shell child state");
        }
        Ok(status)
    }

    /// Poll for exit up to `timeout`; None if the child is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<ExitStatus>, nix::Error> {
        let start = Instant::now();
        loop {
            match self.try_wait()? {
                ExitStatus::Running => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                status => return Ok(Some(status)),
            }
        }
    }

    pub fn is_running(&self) -> Result<bool, nix::Error> {
        Ok(matches!(self.try_wait()?, ExitStatus::Running))
    }

    pub fn terminate(&self) -> Result<(), nix::Error> {
        signal::kill(self.child_pid, Signal::SIGTERM)
    }

    pub fn kill(&self) -> Result<(), nix::Error> {
        signal::kill(self.child_pid, Signal::SIGKILL)
    }

    pub fn pid(&self) -> Pid {
        self.child_pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd;

    #[test]
    fn test_process_manager_creation() {
        let pid = unistd::getpid();
        let manager = ProcessManager::new(pid);
        assert_eq!(manager.pid(), pid);
    }

    #[test]
    fn test_exit_status_methods() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(1).success());
        assert_eq!(ExitStatus::Code(42).exit_code(), Some(42));
        assert_eq!(ExitStatus::Signal(9).signal(), Some(9));
        assert_eq!(ExitStatus::Running.exit_code(), None);
    }
}
