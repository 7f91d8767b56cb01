use thiserror::Error;

use crate::pty::PtyError;

#[derive(Error, Debug)]
pub enum TermgridError {
    #[error("PTY error: {0}")]
    Pty(#[from] PtyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid grid dimensions: {cols}x{rows}")]
    InvalidDimensions { cols: usize, rows: usize },
}

pub type Result<T> = std::result::Result<T, TermgridError>;
