//! Termgrid - headless terminal emulation engine
//!
//! This library implements the core of a terminal emulator without any
//! rendering: a host shell feeds PTY bytes in and paints the cell grid
//! it reads back out.
//!
//! ## Components
//!
//! - **VT Parser**: byte-accurate DEC/ECMA-48/xterm state machine
//! - **Screen Model**: primary/alternate grids, scrollback, cursor,
//!   modes, scroll regions, tab stops
//! - **Command Handler**: CSI/OSC/DCS/ESC dispatch onto the screen
//! - **Command Tracking**: OSC 133 shell-integration records
//! - **PTY Host**: shell spawning with non-blocking I/O
//! - **Session**: thread-safe façade, also exported over a C ABI in
//!   [`ffi`]

pub mod config;
pub mod error;
pub mod ffi;
pub mod pty;
pub mod session;
pub mod term;

// Re-export commonly used types
pub use config::{Config, ConfigWatcher};
pub use error::{Result, TermgridError};
pub use pty::{ExitStatus, ProcessManager, PtyError, PtyHost};
pub use session::Session;
pub use term::{Cell, CellFlags, Color, CommandRecord, Parser, Perform, Rgb, Screen, Term};
