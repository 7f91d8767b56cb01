pub mod cell;
pub mod color;
pub mod commands;
pub mod grid;
pub mod handler;
pub mod parser;
pub mod screen;
pub mod scrollback;

pub use cell::{Cell, CellFlags};
pub use color::{Color, Palette, Rgb};
pub use commands::{CommandRecord, CommandTracker};
pub use grid::{Grid, Row};
pub use handler::Term;
pub use parser::{Parser, Perform};
pub use screen::{Cursor, CursorShape, Modes, MouseEncoding, MouseMode, Pen, Screen};
pub use scrollback::{Scrollback, DEFAULT_SCROLLBACK};
