//! PTY host: owns the master side of a pseudo-terminal pair with the
//! configured shell on the slave side. The master fd is non-blocking; the
//! host application drives reads from its own event loop.

use std::env;
use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::signal::{self, Signal};
use nix::unistd::{execvp, fork, setsid, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bounded EAGAIN retries before reporting a short write.
const WRITE_RETRIES: u32 = 8;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("PTY creation failed: {0}")]
    PtyCreation(#[from] nix::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("shell not found: {0}")]
    ShellNotFound(String),
}

/// Child environment knobs, sampled from the config snapshot at spawn.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub term: String,
    pub term_program: String,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            term: "xterm-256color".into(),
            term_program: "termgrid".into(),
        }
    }
}

pub struct PtyHost {
    master: OwnedFd,
    child_pid: Pid,
    dead: bool,
}

impl PtyHost {
    /// Open a PTY sized to (cols, rows) and exec the shell on the slave
    /// side. `LANG`/`LC_*` and the rest of the environment are inherited.
    pub fn spawn(
        shell: Option<&str>,
        cols: u16,
        rows: u16,
        opts: &SpawnOptions,
    ) -> Result<Self, PtyError> {
        let shell_path = match shell {
            Some(s) => s.to_string(),
            None => Self::detect_shell()?,
        };
        info!(shell = %shell_path, cols, rows, "spawning shell");

        let ws = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let OpenptyResult { master, slave } = openpty(Some(&ws), None)?;

        match unsafe { fork() }? {
            ForkResult::Child => {
                drop(master);
                // new session, slave becomes the controlling terminal
                let _ = setsid();
                let slave_fd = slave.as_raw_fd();
                unsafe {
                    libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0);
                    libc::dup2(slave_fd, 0);
                    libc::dup2(slave_fd, 1);
                    libc::dup2(slave_fd, 2);
                    if slave_fd > 2 {
                        libc::close(slave_fd);
                    }
                }

                env::set_var("TERM", &opts.term);
                env::set_var("COLORTERM", "truecolor");
                env::set_var("TERM_PROGRAM", &opts.term_program);
                env::set_var("TERM_PROGRAM_VERSION", env!("CARGO_PKG_VERSION"));

                let c_shell = CString::new(shell_path).unwrap_or_default();
                let _ = execvp(&c_shell, &[&c_shell]);
                // only reached when exec failed
                std::process::exit(1);
            }
            ForkResult::Parent { child } => {
                drop(slave);
                let master_fd = master.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(master_fd, libc::F_GETFL);
                    libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
                debug!(pid = child.as_raw(), fd = master_fd, "shell forked");
                Ok(Self {
                    master,
                    child_pid: child,
                    dead: false,
                })
            }
        }
    }

    /// $SHELL if it exists, otherwise the first present probe entry.
    pub fn detect_shell() -> Result<String, PtyError> {
        if let Ok(shell) = env::var("SHELL") {
            if Path::new(&shell).exists() {
                return Ok(shell);
            }
        }
        let probes = [
            "/bin/zsh",
            "/usr/bin/zsh",
            "/bin/bash",
            "/usr/bin/bash",
            "/bin/sh",
        ];
        for shell in &probes {
            if Path::new(shell).exists() {
                return Ok(shell.to_string());
            }
        }
        Err(PtyError::ShellNotFound("no usable shell found".into()))
    }

    /// Non-blocking read. Ok(0) means the child side is gone; the state
    /// latches so later calls keep reporting EOF. WouldBlock surfaces as
    /// an error for the caller's drain loop to stop on.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.dead {
            return Ok(0);
        }
        let mut file = unsafe { std::fs::File::from_raw_fd(self.master.as_raw_fd()) };
        let result = file.read(buf);
        std::mem::forget(file);
        match result {
            Ok(0) => {
                self.dead = true;
                Ok(0)
            }
            // Linux reports EIO on the master once the slave side closes
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                self.dead = true;
                Ok(0)
            }
            other => other,
        }
    }

    /// Write with a short EAGAIN retry bound; returns the (possibly
    /// partial) byte count.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut file = unsafe { std::fs::File::from_raw_fd(self.master.as_raw_fd()) };
        let mut written = 0;
        let mut retries = 0;
        let result = loop {
            if written == data.len() {
                break Ok(written);
            }
            match file.write(&data[written..]) {
                Ok(0) => break Ok(written),
                Ok(n) => {
                    written += n;
                    retries = 0;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if retries >= WRITE_RETRIES {
                        break Ok(written);
                    }
                    retries += 1;
                    std::thread::yield_now();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    if written > 0 {
                        break Ok(written);
                    }
                    break Err(e);
                }
            }
        };
        std::mem::forget(file);
        result
    }

    /// TIOCSWINSZ plus a SIGWINCH nudge for the child.
    pub fn resize(&self, cols: u16, rows: u16, pixel_width: u16, pixel_height: u16) {
        debug!(cols, rows, "resizing PTY");
        let ws = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: pixel_width,
            ws_ypixel: pixel_height,
        };
        unsafe {
            libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws);
        }
        if let Err(e) = signal::kill(self.child_pid, Signal::SIGWINCH) {
            warn!("failed to send SIGWINCH: {}", e);
        }
    }

    pub fn master_fd(&self) -> i32 {
        self.master.as_raw_fd()
    }

    pub fn child_pid(&self) -> Pid {
        self.child_pid
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }
}

impl Drop for PtyHost {
    fn drop(&mut self) {
        debug!(pid = self.child_pid.as_raw(), "dropping PTY host");
        if let Err(e) = signal::kill(self.child_pid, Signal::SIGTERM) {
            debug!("failed to signal child on drop: {}", e);
        }
    }
}
