use crate::term::cell::Cell;

/// One grid row. The wrap flag marks a row whose logical line continues on
/// the next row; resize reflow joins on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub wrapped: bool,
}

impl Row {
    pub fn blank(cols: usize, template: Cell) -> Self {
        Self {
            cells: vec![template; cols],
            wrapped: false,
        }
    }

    /// Truncate or pad to `cols` without reflowing.
    pub fn reshape(&mut self, cols: usize, template: Cell) {
        self.cells.resize(cols, template);
    }

    /// Cells up to (not including) the trailing run of never-written blanks.
    pub fn trimmed(&self) -> &[Cell] {
        let end = self
            .cells
            .iter()
            .rposition(|c| *c != Cell::default())
            .map_or(0, |i| i + 1);
        &self.cells[..end]
    }
}

/// Rectangular cell storage. Rows are owned vectors so that scroll
/// eviction moves a row into scrollback instead of copying it.
pub struct Grid {
    cols: usize,
    rows: Vec<Row>,
}

impl Grid {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows: (0..rows).map(|_| Row::blank(cols, Cell::default())).collect(),
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row].cells[col]
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        &mut self.rows[row].cells[col]
    }

    pub fn row(&self, row: usize) -> &Row {
        &self.rows[row]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut Row {
        &mut self.rows[row]
    }

    pub fn clear(&mut self, template: Cell) {
        for row in &mut self.rows {
            *row = Row::blank(self.cols, template);
        }
    }

    pub fn fill_row(&mut self, row: usize, template: Cell) {
        self.rows[row] = Row::blank(self.cols, template);
    }

    /// Erase `[start, end)` of one row with a BCE blank.
    pub fn erase_in_row(&mut self, row: usize, start: usize, end: usize, template: Cell) {
        let r = &mut self.rows[row];
        let end = end.min(self.cols);
        for cell in &mut r.cells[start.min(end)..end] {
            *cell = template;
        }
        // erasing through the right edge breaks the logical-line join
        if end == self.cols {
            r.wrapped = false;
        }
    }

    /// Scroll rows `[top, bottom]` up by one, returning the evicted top
    /// row so the caller can decide whether it enters scrollback.
    pub fn scroll_up(&mut self, top: usize, bottom: usize, template: Cell) -> Row {
        let evicted = self.rows.remove(top);
        self.rows.insert(bottom, Row::blank(self.cols, template));
        evicted
    }

    /// Scroll rows `[top, bottom]` down by one; the bottom row is dropped.
    pub fn scroll_down(&mut self, top: usize, bottom: usize, template: Cell) {
        self.rows.remove(bottom);
        self.rows.insert(top, Row::blank(self.cols, template));
    }

    /// Insert `n` blank rows at `at`, pushing rows toward `bottom` off the
    /// region.
    pub fn insert_lines(&mut self, at: usize, n: usize, bottom: usize, template: Cell) {
        let n = n.min(bottom + 1 - at);
        for _ in 0..n {
            self.rows.remove(bottom);
            self.rows.insert(at, Row::blank(self.cols, template));
        }
    }

    /// Delete `n` rows at `at`, pulling rows up from `bottom`.
    pub fn delete_lines(&mut self, at: usize, n: usize, bottom: usize, template: Cell) {
        let n = n.min(bottom + 1 - at);
        for _ in 0..n {
            self.rows.remove(at);
            self.rows.insert(bottom, Row::blank(self.cols, template));
        }
    }

    /// Insert `n` blanks at (row, col); cells shift right, rightmost drop.
    pub fn insert_chars(&mut self, row: usize, col: usize, n: usize, template: Cell) {
        let cells = &mut self.rows[row].cells;
        let n = n.min(self.cols - col);
        for _ in 0..n {
            cells.pop();
            cells.insert(col, template);
        }
    }

    /// Delete `n` cells at (row, col); cells shift left, blanks fill in.
    pub fn delete_chars(&mut self, row: usize, col: usize, n: usize, template: Cell) {
        let cells = &mut self.rows[row].cells;
        let n = n.min(self.cols - col);
        for _ in 0..n {
            cells.remove(col);
            cells.push(template);
        }
    }

    /// Take all rows out, leaving an empty grid. Used by resize reflow.
    pub fn take_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn insert_row_at_top(&mut self, row: Row) {
        self.rows.insert(0, row);
    }

    pub fn remove_top_row(&mut self) -> Row {
        self.rows.remove(0)
    }

    /// Reshape without reflow (alternate grid): pad or truncate columns,
    /// drop or add rows at the bottom.
    pub fn reshape(&mut self, cols: usize, rows: usize, template: Cell) {
        for row in &mut self.rows {
            row.reshape(cols, template);
        }
        self.cols = cols;
        while self.rows.len() > rows {
            self.rows.pop();
        }
        while self.rows.len() < rows {
            self.rows.push(Row::blank(cols, template));
        }
    }

    pub fn set_cols(&mut self, cols: usize) {
        self.cols = cols;
    }
}

/// Blank both halves of a wide pair straddling the boundary before `col`.
/// Shifting cells across such a boundary would otherwise strand one half.
pub fn sever_pair_at(grid: &mut Grid, row: usize, col: usize) {
    if col == 0 || col >= grid.cols() {
        return;
    }
    if grid.cell(row, col).is_spacer() && grid.cell(row, col - 1).is_wide() {
        for c in [col - 1, col] {
            let cell = grid.cell_mut(row, c);
            *cell = Cell::blank(cell.bg);
        }
    }
}

/// Remove a trailing wide-spacer pair fragment: overwriting either half of
/// a wide pair must clear the other half so pairs never appear alone.
pub fn unlink_wide_pair(grid: &mut Grid, row: usize, col: usize) {
    let cols = grid.cols();
    let cell = *grid.cell(row, col);
    if cell.is_wide() && col + 1 < cols {
        let spacer = grid.cell_mut(row, col + 1);
        if spacer.is_spacer() {
            *spacer = Cell::blank(spacer.bg);
        }
    }
    if cell.is_spacer() && col > 0 {
        let primary = grid.cell_mut(row, col - 1);
        if primary.is_wide() {
            *primary = Cell::blank(primary.bg);
        }
    }
}
