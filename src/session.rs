//! Session façade: one terminal, one PTY, one lock. Every entry point
//! takes the session lock for its full duration, so bytes are parsed and
//! replies queued atomically and all accessors see a consistent snapshot.
//! The engine is passive: nothing here blocks or runs its own threads.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{Config, ConfigWatcher};
use crate::error::{Result, TermgridError};
use crate::pty::{ExitStatus, ProcessManager, PtyHost, SpawnOptions};
use crate::term::cell::Cell;
use crate::term::screen::{CursorShape, MouseMode};
use crate::term::{Parser, Term};

const READ_CHUNK: usize = 8192;

pub struct Session {
    inner: Mutex<Inner>,
}

struct Inner {
    parser: Parser,
    term: Term,
    pty: Option<PtyHost>,
    child: Option<ProcessManager>,
    exit_status: Option<ExitStatus>,
    eof_reported: bool,
    config: Config,
    watcher: ConfigWatcher,
    generation: u64,
}

impl Session {
    pub fn new(cols: usize, rows: usize) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(TermgridError::InvalidDimensions { cols, rows });
        }
        let config = Config::load();
        let mut term = Term::new(cols, rows, config.scrollback);
        term.set_default_colors(config.theme_fg(), config.theme_bg());
        Ok(Self {
            inner: Mutex::new(Inner {
                parser: Parser::new(),
                term,
                pty: None,
                child: None,
                exit_status: None,
                eof_reported: false,
                config,
                watcher: ConfigWatcher::new(),
                generation: 0,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- lifecycle / I/O ---

    /// Spawn the shell. A failure leaves the session usable for a retry.
    pub fn spawn_shell(&self, shell: Option<&str>) -> Result<()> {
        let mut inner = self.lock();
        let opts = SpawnOptions {
            term: inner.config.shell.term.clone(),
            term_program: inner.config.shell.term_program.clone(),
        };
        let shell = match shell {
            Some(s) => Some(s.to_string()),
            None if !inner.config.shell.program.is_empty() => {
                Some(inner.config.shell.program.clone())
            }
            None => None,
        };
        let cols = inner.term.screen.cols() as u16;
        let rows = inner.term.screen.rows() as u16;
        let pty = PtyHost::spawn(shell.as_deref(), cols, rows, &opts)?;
        inner.child = Some(ProcessManager::new(pty.child_pid()));
        inner.pty = Some(pty);
        inner.exit_status = None;
        inner.eof_reported = false;
        Ok(())
    }

    /// PTY master fd for the host's event loop; -1 without a shell.
    pub fn pty_fd(&self) -> i32 {
        self.lock().pty.as_ref().map(|p| p.master_fd()).unwrap_or(-1)
    }

    /// Drain available PTY output into the parser. Returns bytes
    /// consumed; a dead child yields one final 0 after draining, then -1.
    pub fn read_pty(&self) -> i32 {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let Some(pty) = inner.pty.as_mut() else {
            return -1;
        };

        let mut buf = [0u8; READ_CHUNK];
        let mut total: i32 = 0;
        loop {
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    inner.parser.feed(&mut inner.term, &buf[..n]);
                    total += n as i32;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("PTY read failed: {}", e);
                    return -1;
                }
            }
        }

        // replies (DA/DSR/OSC queries) go out under the same lock
        if inner.term.has_write_back() {
            let reply = inner.term.take_write_back();
            if let Err(e) = pty.write(&reply) {
                debug!("reply write failed: {}", e);
            }
        }

        if pty.is_dead() && total == 0 {
            inner.reap();
            if inner.eof_reported {
                return -1;
            }
            inner.eof_reported = true;
            return 0;
        }
        total
    }

    /// Write host input (keystrokes, paste) to the shell.
    pub fn write_pty(&self, data: &[u8]) -> i32 {
        let inner = self.lock();
        match inner.pty.as_ref() {
            Some(pty) => match pty.write(data) {
                Ok(n) => n as i32,
                Err(e) => {
                    warn!("PTY write failed: {}", e);
                    -1
                }
            },
            None => -1,
        }
    }

    /// Feed bytes directly into the parser, bypassing the PTY. Used by
    /// hosts replaying recorded output and by tests.
    pub fn advance_bytes(&self, data: &[u8]) {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.parser.feed(&mut inner.term, data);
        if inner.term.has_write_back() {
            let reply = inner.term.take_write_back();
            if let Some(pty) = inner.pty.as_ref() {
                let _ = pty.write(&reply);
            }
        }
    }

    pub fn resize(&self, cols: usize, rows: usize, pixel_width: u16, pixel_height: u16) {
        if cols == 0 || rows == 0 {
            return;
        }
        let mut inner = self.lock();
        inner.term.resize(cols, rows);
        if let Some(pty) = inner.pty.as_ref() {
            pty.resize(cols as u16, rows as u16, pixel_width, pixel_height);
        }
    }

    /// Exit code of the shell child once it has been reaped.
    pub fn child_exit_code(&self) -> Option<i32> {
        let mut inner = self.lock();
        inner.reap();
        inner.exit_status.and_then(|s| s.exit_code())
    }

    // --- grid reads ---

    pub fn grid_size(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.term.screen.cols(), inner.term.screen.rows())
    }

    pub fn cell(&self, row: usize, col: usize) -> Cell {
        let inner = self.lock();
        inner
            .term
            .screen
            .cell_at(row, col)
            .copied()
            .unwrap_or_default()
    }

    pub fn cell_fg_packed(&self, row: usize, col: usize) -> u32 {
        let inner = self.lock();
        match inner.term.screen.cell_at(row, col) {
            Some(cell) => inner.term.resolve_color(cell.fg, true).packed(),
            None => 0,
        }
    }

    pub fn cell_bg_packed(&self, row: usize, col: usize) -> u32 {
        let inner = self.lock();
        match inner.term.screen.cell_at(row, col) {
            Some(cell) => inner.term.resolve_color(cell.bg, false).packed(),
            None => 0,
        }
    }

    pub fn cursor_pos(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.term.screen.cursor.row, inner.term.screen.effective_col())
    }

    pub fn cursor_visible(&self) -> bool {
        self.lock().term.screen.modes.cursor_visible
    }

    pub fn cursor_shape(&self) -> CursorShape {
        self.lock().term.screen.cursor_shape
    }

    pub fn cursor_keys_app(&self) -> bool {
        self.lock().term.screen.modes.cursor_keys_app
    }

    pub fn bracketed_paste(&self) -> bool {
        self.lock().term.screen.modes.bracketed_paste
    }

    pub fn mouse_mode(&self) -> MouseMode {
        self.lock().term.screen.modes.mouse_mode
    }

    pub fn focus_events(&self) -> bool {
        self.lock().term.screen.modes.focus_events
    }

    // --- scrollback ---

    pub fn scrollback_len(&self) -> usize {
        self.lock().term.screen.scrollback_len()
    }

    pub fn scrollback_cell(&self, sb_row: usize, col: usize) -> Cell {
        let inner = self.lock();
        inner
            .term
            .screen
            .scrollback_cell(sb_row, col)
            .copied()
            .unwrap_or_default()
    }

    pub fn scrollback_cell_fg_packed(&self, sb_row: usize, col: usize) -> u32 {
        let inner = self.lock();
        match inner.term.screen.scrollback_cell(sb_row, col) {
            Some(cell) => inner.term.resolve_color(cell.fg, true).packed(),
            None => 0,
        }
    }

    pub fn scrollback_cell_bg_packed(&self, sb_row: usize, col: usize) -> u32 {
        let inner = self.lock();
        match inner.term.screen.scrollback_cell(sb_row, col) {
            Some(cell) => inner.term.resolve_color(cell.bg, false).packed(),
            None => 0,
        }
    }

    /// Text between two absolute positions (scrollback first, then grid).
    pub fn extract_text(&self, sr: usize, sc: usize, er: usize, ec: usize) -> String {
        self.lock().term.extract_text(sr, sc, er, ec)
    }

    // --- titles / cwd / events ---

    pub fn title(&self) -> String {
        self.lock().term.title().to_string()
    }

    pub fn working_dir(&self) -> String {
        self.lock().term.working_dir().to_string()
    }

    pub fn take_bell(&self) -> u32 {
        self.lock().term.take_bell()
    }

    pub fn clipboard_offer(&self) -> Option<String> {
        self.lock().term.clipboard_offer().map(str::to_string)
    }

    // --- command records ---

    pub fn command_count(&self) -> usize {
        self.lock().term.commands().len()
    }

    pub fn command_prompt_row(&self, idx: usize) -> Option<usize> {
        self.lock().term.commands().get(idx).map(|r| r.prompt_row)
    }

    pub fn command_exit_code(&self, idx: usize) -> Option<i32> {
        self.lock().term.commands().get(idx).and_then(|r| r.exit_code)
    }

    pub fn command_duration_ms(&self, idx: usize) -> u64 {
        self.lock()
            .term
            .commands()
            .get(idx)
            .map(|r| r.duration_ms())
            .unwrap_or(0)
    }

    pub fn prev_prompt(&self, row: usize) -> Option<usize> {
        self.lock().term.commands().prev_prompt(row)
    }

    pub fn next_prompt(&self, row: usize) -> Option<usize> {
        self.lock().term.commands().next_prompt(row)
    }

    // --- config snapshot ---

    pub fn font_size(&self) -> f32 {
        self.lock().config.font.size
    }

    pub fn font_family(&self) -> String {
        self.lock().config.font.family.clone()
    }

    pub fn window_width(&self) -> u32 {
        self.lock().config.window.width
    }

    pub fn window_height(&self) -> u32 {
        self.lock().config.window.height
    }

    pub fn theme_fg_packed(&self) -> u32 {
        self.lock().config.theme_fg().packed()
    }

    pub fn theme_bg_packed(&self) -> u32 {
        self.lock().config.theme_bg().packed()
    }

    /// Check for a config-file change. Returns the new generation number
    /// when the snapshot was replaced, 0 otherwise.
    pub fn poll_config(&self) -> u64 {
        let mut inner = self.lock();
        let Some(new_config) = inner.watcher.poll() else {
            return 0;
        };
        let fg = new_config.theme_fg();
        let bg = new_config.theme_bg();
        inner.term.set_default_colors(fg, bg);
        inner.term.screen.set_scrollback_max(new_config.scrollback);
        inner.config = new_config;
        inner.generation += 1;
        inner.generation
    }
}

impl Inner {
    /// Capture the child's exit status once it has actually terminated.
    fn reap(&mut self) {
        if self.exit_status.is_some() {
            return;
        }
        if let Some(child) = &self.child {
            if let Ok(status) = child.try_wait() {
                if matches!(status, ExitStatus::Code(_) | ExitStatus::Signal(_)) {
                    self.exit_status = Some(status);
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.lock();
        // dropping the host sends SIGTERM; give the child a moment, then
        // make sure it is reaped
        inner.pty = None;
        if let Some(child) = inner.child.take() {
            match child.wait_timeout(Duration::from_millis(200)) {
                Ok(Some(_)) => {}
                _ => {
                    let _ = child.kill();
                    let _ = child.wait_timeout(Duration::from_millis(200));
                }
            }
        }
    }
}
