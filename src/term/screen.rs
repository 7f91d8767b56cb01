//! Screen model: the primary and alternate grids, scrollback, cursor,
//! pen, modes, scroll region, tab stops, and every mutation the command
//! handler applies. All cursor math keeps the invariants
//! `row < rows` and `col <= cols` (col == cols is the pending-wrap state).

use unicode_width::UnicodeWidthChar;

use crate::term::cell::{Cell, CellFlags};
use crate::term::grid::{sever_pair_at, unlink_wide_pair, Grid, Row};
use crate::term::scrollback::Scrollback;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Beam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseMode {
    #[default]
    Off,
    X10,
    Normal,
    Button,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseEncoding {
    #[default]
    Default,
    Sgr,
}

/// Current SGR state applied to printed cells.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pen {
    pub flags: CellFlags,
    pub fg: crate::term::color::Color,
    pub bg: crate::term::color::Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Ascii,
    DecSpecial,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Charsets {
    pub g0: Charset,
    pub g1: Charset,
    /// 0 = G0 (SI), 1 = G1 (SO).
    pub active: u8,
}

impl Charsets {
    pub fn map(&self, ch: char) -> char {
        let set = if self.active == 1 { self.g1 } else { self.g0 };
        match set {
            Charset::Ascii => ch,
            Charset::DecSpecial => dec_special(ch),
        }
    }
}

/// DEC Special Graphics (ESC ( 0): line-drawing glyphs for 0x60..0x7e.
fn dec_special(ch: char) -> char {
    match ch {
        '`' => '◆',
        'a' => '▒',
        'b' => '␉',
        'c' => '␌',
        'd' => '␍',
        'e' => '␊',
        'f' => '°',
        'g' => '±',
        'h' => '␤',
        'i' => '␋',
        'j' => '┘',
        'k' => '┐',
        'l' => '┌',
        'm' => '└',
        'n' => '┼',
        'o' => '⎺',
        'p' => '⎻',
        'q' => '─',
        'r' => '⎼',
        's' => '⎽',
        't' => '├',
        'u' => '┤',
        'v' => '┴',
        'w' => '┬',
        'x' => '│',
        'y' => '≤',
        'z' => '≥',
        '{' => 'π',
        '|' => '≠',
        '}' => '£',
        '~' => '·',
        _ => ch,
    }
}

#[derive(Debug, Clone)]
pub struct Modes {
    pub cursor_keys_app: bool,
    pub autowrap: bool,
    pub origin: bool,
    pub insert: bool,
    pub newline: bool,
    pub cursor_visible: bool,
    pub cursor_blink: bool,
    pub bracketed_paste: bool,
    pub focus_events: bool,
    pub synchronized_updates: bool,
    pub keypad_app: bool,
    pub column_132: bool,
    pub mouse_mode: MouseMode,
    pub mouse_encoding: MouseEncoding,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            cursor_keys_app: false,
            autowrap: true,
            origin: false,
            insert: false,
            newline: false,
            cursor_visible: true,
            cursor_blink: false,
            bracketed_paste: false,
            focus_events: false,
            synchronized_updates: false,
            keypad_app: false,
            column_132: false,
            mouse_mode: MouseMode::Off,
            mouse_encoding: MouseEncoding::Default,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SavedCursor {
    cursor: Cursor,
    pen: Pen,
    charsets: Charsets,
    origin: bool,
}

impl Default for SavedCursor {
    fn default() -> Self {
        Self {
            cursor: Cursor { row: 0, col: 0 },
            pen: Pen::default(),
            charsets: Charsets::default(),
            origin: false,
        }
    }
}

pub struct Screen {
    primary: Grid,
    alt: Grid,
    alt_active: bool,
    scrollback: Scrollback,
    pub cursor: Cursor,
    pub pen: Pen,
    pub modes: Modes,
    pub cursor_shape: CursorShape,
    pub charsets: Charsets,
    saved_primary: SavedCursor,
    saved_alt: SavedCursor,
    scroll_top: usize,
    scroll_bottom: usize,
    tab_stops: Vec<bool>,
}

fn default_tabs(cols: usize) -> Vec<bool> {
    (0..cols).map(|c| c % 8 == 0).collect()
}

impl Screen {
    pub fn new(cols: usize, rows: usize, scrollback_max: usize) -> Self {
        Self {
            primary: Grid::new(cols, rows),
            alt: Grid::new(cols, rows),
            alt_active: false,
            scrollback: Scrollback::new(scrollback_max),
            cursor: Cursor { row: 0, col: 0 },
            pen: Pen::default(),
            modes: Modes::default(),
            cursor_shape: CursorShape::default(),
            charsets: Charsets::default(),
            saved_primary: SavedCursor::default(),
            saved_alt: SavedCursor::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            tab_stops: default_tabs(cols),
        }
    }

    pub fn grid(&self) -> &Grid {
        if self.alt_active {
            &self.alt
        } else {
            &self.primary
        }
    }

    fn grid_mut(&mut self) -> &mut Grid {
        if self.alt_active {
            &mut self.alt
        } else {
            &mut self.primary
        }
    }

    pub fn cols(&self) -> usize {
        self.grid().cols()
    }

    pub fn rows(&self) -> usize {
        self.grid().rows()
    }

    pub fn is_alt_active(&self) -> bool {
        self.alt_active
    }

    pub fn scroll_region(&self) -> (usize, usize) {
        (self.scroll_top, self.scroll_bottom)
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    pub fn set_scrollback_max(&mut self, max: usize) {
        self.scrollback.set_max(max);
    }

    /// Cursor row in absolute coordinates (scrollback origin).
    pub fn absolute_cursor_row(&self) -> usize {
        self.scrollback.len() + self.cursor.row
    }

    /// BCE blank carrying the current background.
    fn template(&self) -> Cell {
        Cell::blank(self.pen.bg)
    }

    /// Cursor column with pending wrap collapsed.
    pub fn effective_col(&self) -> usize {
        self.cursor.col.min(self.cols() - 1)
    }

    fn clamp_pending(&mut self) {
        self.cursor.col = self.effective_col();
    }

    // --- printing ---

    pub fn put_char(&mut self, ch: char) {
        let ch = self.charsets.map(ch);
        let width = match ch.width() {
            Some(w) if w > 0 => w,
            _ => return,
        };
        let cols = self.cols();
        if width > cols {
            return;
        }

        if self.cursor.col >= cols {
            if self.modes.autowrap {
                self.wrap_line();
            } else {
                self.cursor.col = cols - 1;
            }
        }

        // a wide glyph that would straddle the right edge
        if width == 2 && self.cursor.col + 1 >= cols {
            if self.modes.autowrap {
                let (row, col) = (self.cursor.row, self.cursor.col);
                let pen = self.pen;
                unlink_wide_pair(self.grid_mut(), row, col);
                *self.grid_mut().cell_mut(row, col) = Cell {
                    ch: ' ',
                    fg: pen.fg,
                    bg: pen.bg,
                    flags: pen.flags.style(),
                };
                self.wrap_line();
            } else {
                self.cursor.col = cols - 2;
            }
        }

        if self.modes.insert {
            let (row, col) = (self.cursor.row, self.cursor.col);
            let template = self.template();
            sever_pair_at(self.grid_mut(), row, col);
            self.grid_mut().insert_chars(row, col, width, template);
            let last = self.grid_mut().cell_mut(row, cols - 1);
            if last.is_wide() {
                *last = Cell::blank(last.bg);
            }
        }

        let (row, col) = (self.cursor.row, self.cursor.col);
        let pen = self.pen;
        unlink_wide_pair(self.grid_mut(), row, col);
        let mut flags = pen.flags.style();
        if width == 2 {
            flags |= CellFlags::WIDE;
        }
        *self.grid_mut().cell_mut(row, col) = Cell {
            ch,
            fg: pen.fg,
            bg: pen.bg,
            flags,
        };
        if width == 2 {
            unlink_wide_pair(self.grid_mut(), row, col + 1);
            *self.grid_mut().cell_mut(row, col + 1) = Cell {
                ch: '\0',
                fg: pen.fg,
                bg: pen.bg,
                flags: pen.flags.style() | CellFlags::WIDE_SPACER,
            };
        }
        self.cursor.col += width;
        if !self.modes.autowrap && self.cursor.col >= cols {
            self.cursor.col = cols - 1;
        }
    }

    fn wrap_line(&mut self) {
        let row = self.cursor.row;
        self.grid_mut().row_mut(row).wrapped = true;
        self.linefeed_no_clamp();
        self.cursor.col = 0;
    }

    // --- vertical motion & scrolling ---

    pub fn linefeed(&mut self) {
        self.clamp_pending();
        self.linefeed_no_clamp();
    }

    fn linefeed_no_clamp(&mut self) {
        if self.cursor.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows() {
            self.cursor.row += 1;
        }
    }

    pub fn reverse_index(&mut self) {
        self.clamp_pending();
        if self.cursor.row == self.scroll_top {
            self.scroll_down(1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
    }

    /// Scroll the region up `n` lines. When the region spans the full
    /// grid and the primary grid is active, evicted rows enter scrollback.
    pub fn scroll_up(&mut self, n: usize) {
        let template = self.template();
        let (top, bottom) = (self.scroll_top, self.scroll_bottom);
        let full_grid = top == 0 && bottom == self.rows() - 1;
        let keep = full_grid && !self.alt_active;
        for _ in 0..n.min(bottom + 1 - top) {
            let evicted = self.grid_mut().scroll_up(top, bottom, template);
            if keep {
                self.scrollback.push(evicted);
            }
        }
    }

    pub fn scroll_down(&mut self, n: usize) {
        let template = self.template();
        let (top, bottom) = (self.scroll_top, self.scroll_bottom);
        for _ in 0..n.min(bottom + 1 - top) {
            self.grid_mut().scroll_down(top, bottom, template);
        }
    }

    // --- horizontal motion ---

    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
    }

    pub fn backspace(&mut self) {
        self.cursor.col = self.effective_col().saturating_sub(1);
    }

    pub fn tab_forward(&mut self, n: usize) {
        self.clamp_pending();
        for _ in 0..n {
            let col = self.cursor.col;
            self.cursor.col = (col + 1..self.cols())
                .find(|&c| self.tab_stops[c])
                .unwrap_or(self.cols() - 1);
        }
    }

    pub fn tab_backward(&mut self, n: usize) {
        self.clamp_pending();
        for _ in 0..n {
            let col = self.cursor.col;
            self.cursor.col = (0..col).rev().find(|&c| self.tab_stops[c]).unwrap_or(0);
        }
    }

    pub fn set_tab_stop(&mut self) {
        let col = self.effective_col();
        self.tab_stops[col] = true;
    }

    pub fn clear_tab_stop(&mut self) {
        let col = self.effective_col();
        self.tab_stops[col] = false;
    }

    pub fn clear_all_tab_stops(&mut self) {
        self.tab_stops.fill(false);
    }

    // --- cursor addressing ---

    pub fn cursor_up(&mut self, n: usize) {
        self.clamp_pending();
        let top = if self.modes.origin { self.scroll_top } else { 0 };
        self.cursor.row = self.cursor.row.saturating_sub(n).max(top);
    }

    pub fn cursor_down(&mut self, n: usize) {
        self.clamp_pending();
        let bottom = if self.modes.origin {
            self.scroll_bottom
        } else {
            self.rows() - 1
        };
        self.cursor.row = (self.cursor.row + n).min(bottom);
    }

    pub fn cursor_forward(&mut self, n: usize) {
        self.cursor.col = (self.effective_col() + n).min(self.cols() - 1);
    }

    pub fn cursor_back(&mut self, n: usize) {
        self.cursor.col = self.effective_col().saturating_sub(n);
    }

    /// Absolute addressing, 0-based; origin mode offsets and clamps rows
    /// to the scroll region.
    pub fn goto(&mut self, row: usize, col: usize) {
        if self.modes.origin {
            self.cursor.row = (self.scroll_top + row).min(self.scroll_bottom);
        } else {
            self.cursor.row = row.min(self.rows() - 1);
        }
        self.cursor.col = col.min(self.cols() - 1);
    }

    pub fn goto_col(&mut self, col: usize) {
        self.cursor.col = col.min(self.cols() - 1);
    }

    pub fn goto_row(&mut self, row: usize) {
        let col = self.effective_col();
        self.goto(row, col);
    }

    // --- erase / edit ---

    pub fn erase_display_below(&mut self) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        let cols = self.cols();
        unlink_wide_pair(self.grid_mut(), row, col);
        self.grid_mut().erase_in_row(row, col, cols, template);
        for r in row + 1..self.rows() {
            self.grid_mut().fill_row(r, template);
        }
    }

    pub fn erase_display_above(&mut self) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        for r in 0..row {
            self.grid_mut().fill_row(r, template);
        }
        unlink_wide_pair(self.grid_mut(), row, col);
        self.grid_mut().erase_in_row(row, 0, col + 1, template);
    }

    pub fn erase_display_all(&mut self) {
        let template = self.template();
        self.grid_mut().clear(template);
    }

    /// ED 3: clear the display and the scrollback.
    pub fn erase_display_and_history(&mut self) {
        self.erase_display_all();
        self.scrollback.clear();
    }

    pub fn erase_line_right(&mut self) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        let cols = self.cols();
        unlink_wide_pair(self.grid_mut(), row, col);
        self.grid_mut().erase_in_row(row, col, cols, template);
    }

    pub fn erase_line_left(&mut self) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        unlink_wide_pair(self.grid_mut(), row, col);
        self.grid_mut().erase_in_row(row, 0, col + 1, template);
    }

    pub fn erase_line_all(&mut self) {
        let template = self.template();
        let row = self.cursor.row;
        self.grid_mut().fill_row(row, template);
    }

    pub fn erase_chars(&mut self, n: usize) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        let end = (col + n.max(1)).min(self.cols());
        unlink_wide_pair(self.grid_mut(), row, col);
        if end > 0 {
            unlink_wide_pair(self.grid_mut(), row, end - 1);
        }
        self.grid_mut().erase_in_row(row, col, end, template);
    }

    pub fn insert_blank_chars(&mut self, n: usize) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        let cols = self.cols();
        sever_pair_at(self.grid_mut(), row, col);
        self.grid_mut().insert_chars(row, col, n.max(1), template);
        // a wide primary shifted onto the last column lost its spacer
        let last = self.grid_mut().cell_mut(row, cols - 1);
        if last.is_wide() {
            *last = Cell::blank(last.bg);
        }
    }

    pub fn delete_chars(&mut self, n: usize) {
        let template = self.template();
        let (row, col) = (self.cursor.row, self.effective_col());
        let n = n.max(1).min(self.cols() - col);
        sever_pair_at(self.grid_mut(), row, col);
        sever_pair_at(self.grid_mut(), row, col + n);
        self.grid_mut().delete_chars(row, col, n, template);
    }

    /// IL: only acts when the cursor is inside the scroll region.
    pub fn insert_lines(&mut self, n: usize) {
        if self.cursor.row < self.scroll_top || self.cursor.row > self.scroll_bottom {
            return;
        }
        let template = self.template();
        let (row, bottom) = (self.cursor.row, self.scroll_bottom);
        self.grid_mut().insert_lines(row, n.max(1), bottom, template);
    }

    pub fn delete_lines(&mut self, n: usize) {
        if self.cursor.row < self.scroll_top || self.cursor.row > self.scroll_bottom {
            return;
        }
        let template = self.template();
        let (row, bottom) = (self.cursor.row, self.scroll_bottom);
        self.grid_mut().delete_lines(row, n.max(1), bottom, template);
    }

    /// DECALN: fill the active grid with 'E'.
    pub fn alignment_fill(&mut self) {
        for r in 0..self.rows() {
            let row = self.grid_mut().row_mut(r);
            row.wrapped = false;
            for cell in &mut row.cells {
                *cell = Cell {
                    ch: 'E',
                    ..Cell::default()
                };
            }
        }
    }

    // --- scroll region ---

    /// DECSTBM, 0-based inclusive. Invalid regions are ignored; a valid
    /// one homes the cursor.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows() - 1);
        if top >= bottom {
            return;
        }
        self.scroll_top = top;
        self.scroll_bottom = bottom;
        self.goto(0, 0);
    }

    // --- saved cursors & alt screen ---

    pub fn save_cursor(&mut self) {
        let saved = SavedCursor {
            cursor: Cursor {
                row: self.cursor.row,
                col: self.effective_col(),
            },
            pen: self.pen,
            charsets: self.charsets,
            origin: self.modes.origin,
        };
        if self.alt_active {
            self.saved_alt = saved;
        } else {
            self.saved_primary = saved;
        }
    }

    pub fn restore_cursor(&mut self) {
        let saved = if self.alt_active {
            self.saved_alt
        } else {
            self.saved_primary
        };
        self.cursor.row = saved.cursor.row.min(self.rows() - 1);
        self.cursor.col = saved.cursor.col.min(self.cols() - 1);
        self.pen = saved.pen;
        self.charsets = saved.charsets;
        self.modes.origin = saved.origin;
    }

    pub fn enter_alt(&mut self, clear: bool) {
        if self.alt_active {
            return;
        }
        self.alt_active = true;
        if clear {
            let template = self.template();
            self.alt.clear(template);
        }
    }

    pub fn leave_alt(&mut self, clear: bool) {
        if !self.alt_active {
            return;
        }
        if clear {
            self.alt.clear(Cell::default());
        }
        self.alt_active = false;
        self.cursor.row = self.cursor.row.min(self.rows() - 1);
        self.cursor.col = self.cursor.col.min(self.cols());
    }

    // --- resize ---

    pub fn resize(&mut self, new_cols: usize, new_rows: usize) {
        if new_cols == 0 || new_rows == 0 {
            return;
        }
        if new_cols == self.primary.cols() && new_rows == self.primary.rows() {
            return;
        }

        self.alt.reshape(new_cols, new_rows, Cell::default());
        self.reflow_primary(new_cols, new_rows);

        if self.alt_active {
            self.cursor.row = self.cursor.row.min(new_rows - 1);
            self.cursor.col = self.cursor.col.min(new_cols - 1);
        }
        self.scroll_top = 0;
        self.scroll_bottom = new_rows - 1;
        self.tab_stops = default_tabs(new_cols);
    }

    /// Re-wrap the primary grid. Logical lines are reconstructed from the
    /// per-row wrap flags (with trailing never-written blanks trimmed from
    /// each line's final row) and re-wrapped to the new width. When the
    /// rewrap comes up short of the new height, rows are pulled back out
    /// of scrollback and rejoined; overflow rows at the top are pushed in.
    fn reflow_primary(&mut self, new_cols: usize, new_rows: usize) {
        let track_cursor = !self.alt_active;
        let old_cursor = self.cursor;
        let mut sources: Vec<Row> = self.primary.take_rows();
        let mut pulled = 0usize;

        let (mut rewrapped, cursor_pos) = loop {
            // a wrapped row at the scrollback tail belongs to the grid's
            // first logical line; rejoin before rewrapping
            while self.scrollback.newest_wrapped() {
                match self.scrollback.pop() {
                    Some(row) => {
                        sources.insert(0, row);
                        pulled += 1;
                    }
                    None => break,
                }
            }
            let cursor = if track_cursor {
                Some((pulled + old_cursor.row, old_cursor.col))
            } else {
                None
            };
            let (rows, cpos) = rewrap_rows(&sources, cursor, new_cols);
            if rows.len() >= new_rows || self.scrollback.is_empty() {
                break (rows, cpos);
            }
            match self.scrollback.pop() {
                Some(row) => {
                    sources.insert(0, row);
                    pulled += 1;
                }
                None => break (rows, cpos),
            }
        };

        // Empty rows below the last content (and below the cursor) are
        // surplus, not history; drop them before anything is evicted.
        while rewrapped.len() > new_rows {
            let last = rewrapped.len() - 1;
            let blank = rewrapped[last].cells.iter().all(|c| *c == Cell::default());
            let holds_cursor = cursor_pos.map_or(false, |(r, _)| r >= last);
            if blank && !holds_cursor {
                rewrapped.pop();
            } else {
                break;
            }
        }

        let mut cursor_row = cursor_pos.map(|(r, _)| r as isize).unwrap_or(0);
        while rewrapped.len() > new_rows {
            let row = rewrapped.remove(0);
            self.scrollback.push(row);
            cursor_row -= 1;
        }
        while rewrapped.len() < new_rows {
            rewrapped.push(Row::blank(new_cols, Cell::default()));
        }

        self.primary = Grid::new(new_cols, 0);
        for row in rewrapped {
            self.primary.push_row(row);
        }

        if track_cursor {
            let col = cursor_pos.map(|(_, c)| c).unwrap_or(0);
            self.cursor.row = cursor_row.clamp(0, new_rows as isize - 1) as usize;
            self.cursor.col = col.min(new_cols - 1);
        }
    }

    // --- resets ---

    /// DECSTR subset: modes, pen, region, charsets, saved cursors.
    pub fn soft_reset(&mut self) {
        self.modes.cursor_visible = true;
        self.modes.origin = false;
        self.modes.insert = false;
        self.scroll_top = 0;
        self.scroll_bottom = self.rows() - 1;
        self.pen = Pen::default();
        self.charsets = Charsets::default();
        self.saved_primary = SavedCursor::default();
        self.saved_alt = SavedCursor::default();
    }

    /// RIS: everything back to power-on defaults, scrollback included.
    pub fn hard_reset(&mut self) {
        let cols = self.primary.cols();
        let rows = self.primary.rows();
        *self = Screen::new(cols, rows, self.scrollback.max());
    }

    // --- read accessors ---

    pub fn cell_at(&self, row: usize, col: usize) -> Option<&Cell> {
        if row < self.rows() && col < self.cols() {
            Some(self.grid().cell(row, col))
        } else {
            None
        }
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    pub fn scrollback_cell(&self, idx: usize, col: usize) -> Option<&Cell> {
        self.scrollback.cell(idx, col)
    }
}

/// Join rows into logical lines along their wrap flags, then wrap the
/// lines to `new_cols`. `cursor` is (source row, col); the returned cursor
/// is (output row, col). Wide pairs are kept whole: a pair that would
/// straddle the new right edge moves down a row, mirroring the write path.
fn rewrap_rows(
    sources: &[Row],
    cursor: Option<(usize, usize)>,
    new_cols: usize,
) -> (Vec<Row>, Option<(usize, usize)>) {
    struct LogicalLine {
        cells: Vec<Cell>,
        cursor_off: Option<usize>,
    }

    let mut lines: Vec<LogicalLine> = Vec::new();
    let mut current = LogicalLine {
        cells: Vec::new(),
        cursor_off: None,
    };
    for (r, row) in sources.iter().enumerate() {
        if let Some((cr, cc)) = cursor {
            if cr == r {
                current.cursor_off = Some(current.cells.len() + cc);
            }
        }
        if row.wrapped {
            current.cells.extend(row.cells.iter().copied());
        } else {
            current.cells.extend(row.trimmed().iter().copied());
            lines.push(std::mem::replace(
                &mut current,
                LogicalLine {
                    cells: Vec::new(),
                    cursor_off: None,
                },
            ));
        }
    }
    if !current.cells.is_empty() || current.cursor_off.is_some() {
        lines.push(current);
    }

    let template = Cell::default();
    let mut out: Vec<Row> = Vec::new();
    let mut cursor_pos: Option<(usize, usize)> = None;
    for line in lines {
        let mut row = Row::blank(new_cols, template);
        let mut col = 0usize;
        for (i, cell) in line.cells.iter().enumerate() {
            if cell.is_spacer() {
                if line.cursor_off == Some(i) {
                    cursor_pos = Some((out.len(), col.min(new_cols - 1)));
                }
                continue;
            }
            let w = if cell.is_wide() { 2 } else { 1 };
            if w > new_cols {
                continue;
            }
            if col + w > new_cols {
                row.wrapped = true;
                out.push(row);
                row = Row::blank(new_cols, template);
                col = 0;
            }
            if line.cursor_off == Some(i) {
                cursor_pos = Some((out.len(), col));
            }
            row.cells[col] = *cell;
            if w == 2 {
                row.cells[col + 1] = Cell {
                    ch: '\0',
                    fg: cell.fg,
                    bg: cell.bg,
                    flags: cell.flags.style() | CellFlags::WIDE_SPACER,
                };
            }
            col += w;
        }
        // cursor sitting past the line's content
        if let Some(off) = line.cursor_off {
            if off >= line.cells.len() && cursor_pos.is_none() {
                let mut ccol = col + (off - line.cells.len());
                while ccol >= new_cols {
                    out.push(row);
                    row = Row::blank(new_cols, template);
                    ccol -= new_cols;
                }
                cursor_pos = Some((out.len(), ccol));
            }
        }
        out.push(row);
    }
    if out.is_empty() {
        out.push(Row::blank(new_cols, template));
    }
    (out, cursor_pos)
}
