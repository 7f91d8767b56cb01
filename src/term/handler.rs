//! Command handler: applies parsed VT actions to the screen. Dispatch is
//! keyed on (final byte, intermediates, private marker); anything
//! unrecognized is consumed without touching state.

use tracing::debug;

use crate::term::cell::CellFlags;
use crate::term::color::{format_color_spec, parse_color_spec, Color, Palette, Rgb};
use crate::term::commands::CommandTracker;
use crate::term::parser::Perform;
use crate::term::screen::{Charset, CursorShape, MouseEncoding, MouseMode, Pen, Screen};

pub struct Term {
    pub screen: Screen,
    pub palette: Palette,
    tracker: CommandTracker,
    title: String,
    hyperlink: Option<String>,
    clipboard_offer: Option<String>,
    last_printed: Option<char>,
    bell_count: u32,
    /// Replies (DA, DSR, OSC queries) waiting to be flushed to the PTY.
    write_back: Vec<u8>,
    /// Default colors from the host theme, reinstated on RIS.
    base_fg: Rgb,
    base_bg: Rgb,
}

impl Term {
    pub fn new(cols: usize, rows: usize, scrollback_max: usize) -> Self {
        let palette = Palette::default();
        let base_fg = palette.default_fg;
        let base_bg = palette.default_bg;
        Self {
            screen: Screen::new(cols, rows, scrollback_max),
            palette,
            tracker: CommandTracker::new(),
            title: String::new(),
            hyperlink: None,
            clipboard_offer: None,
            last_printed: None,
            bell_count: 0,
            write_back: Vec::new(),
            base_fg,
            base_bg,
        }
    }

    /// Apply the host theme's default colors. Survives RIS.
    pub fn set_default_colors(&mut self, fg: Rgb, bg: Rgb) {
        self.base_fg = fg;
        self.base_bg = bg;
        self.palette.default_fg = fg;
        self.palette.default_bg = bg;
    }

    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.screen.resize(cols, rows);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn working_dir(&self) -> &str {
        &self.tracker.working_dir
    }

    pub fn commands(&self) -> &CommandTracker {
        &self.tracker
    }

    pub fn hyperlink(&self) -> Option<&str> {
        self.hyperlink.as_deref()
    }

    /// Latest OSC 52 clipboard write offer, base64 as sent by the shell.
    /// The host decides whether to honor it; read queries are never
    /// answered.
    pub fn clipboard_offer(&self) -> Option<&str> {
        self.clipboard_offer.as_deref()
    }

    /// Bell rings since the last call.
    pub fn take_bell(&mut self) -> u32 {
        std::mem::take(&mut self.bell_count)
    }

    pub fn take_write_back(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.write_back)
    }

    pub fn has_write_back(&self) -> bool {
        !self.write_back.is_empty()
    }

    /// Resolve a cell color for display.
    pub fn resolve_color(&self, color: Color, is_fg: bool) -> Rgb {
        self.palette.resolve(color, is_fg)
    }

    /// Extract text between two absolute positions (scrollback rows first,
    /// then the grid), end column exclusive. Spacer cells are skipped,
    /// never-written gaps read as spaces, trailing blanks are trimmed.
    pub fn extract_text(&self, sr: usize, sc: usize, er: usize, ec: usize) -> String {
        let total = self.screen.scrollback_len() + self.screen.rows();
        if total == 0 || sr > er || (sr == er && sc >= ec) {
            return String::new();
        }
        let er = er.min(total - 1);
        let mut out = String::new();
        for row in sr..=er {
            let mut line = String::new();
            let start = if row == sr { sc } else { 0 };
            let end = if row == er { ec } else { usize::MAX };
            let mut col = start;
            while col < end {
                let cell = match self.abs_cell(row, col) {
                    Some(c) => c,
                    None => break,
                };
                if !cell.is_spacer() {
                    line.push(if cell.ch == '\0' { ' ' } else { cell.ch });
                }
                col += 1;
            }
            out.push_str(line.trim_end());
            if row != er {
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }

    fn abs_cell(&self, row: usize, col: usize) -> Option<&crate::term::cell::Cell> {
        let sb_len = self.screen.scrollback_len();
        if row < sb_len {
            self.screen.scrollback_cell(row, col)
        } else {
            self.screen.cell_at(row - sb_len, col)
        }
    }

    fn reply(&mut self, bytes: &[u8]) {
        self.write_back.extend_from_slice(bytes);
    }

    fn reply_str(&mut self, s: String) {
        self.write_back.extend_from_slice(s.as_bytes());
    }

    /// RIS: screen, modes, tab stops, palette, and command records all
    /// return to power-on defaults.
    pub fn hard_reset(&mut self) {
        self.screen.hard_reset();
        self.palette.reset_all();
        self.palette.default_fg = self.base_fg;
        self.palette.default_bg = self.base_bg;
        self.tracker.clear();
        self.tracker.working_dir.clear();
        self.hyperlink = None;
        self.clipboard_offer = None;
        self.last_printed = None;
        self.write_back.clear();
    }

    // --- CSI helpers ---

    fn handle_sgr(&mut self, params: &[u16]) {
        if params.is_empty() {
            self.screen.pen = Pen::default();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            let pen = &mut self.screen.pen;
            match params[i] {
                0 => *pen = Pen::default(),
                1 => pen.flags.insert(CellFlags::BOLD),
                2 => pen.flags.insert(CellFlags::DIM),
                3 => pen.flags.insert(CellFlags::ITALIC),
                4 => pen.flags.insert(CellFlags::UNDERLINE),
                5 | 6 => pen.flags.insert(CellFlags::BLINK),
                7 => pen.flags.insert(CellFlags::REVERSE),
                8 => pen.flags.insert(CellFlags::HIDDEN),
                9 => pen.flags.insert(CellFlags::STRIKE),
                22 => pen.flags.remove(CellFlags::BOLD | CellFlags::DIM),
                23 => pen.flags.remove(CellFlags::ITALIC),
                24 => pen.flags.remove(CellFlags::UNDERLINE),
                25 => pen.flags.remove(CellFlags::BLINK),
                27 => pen.flags.remove(CellFlags::REVERSE),
                28 => pen.flags.remove(CellFlags::HIDDEN),
                29 => pen.flags.remove(CellFlags::STRIKE),
                30..=37 | 90..=97 => {
                    if let Some(c) = Color::from_sgr_base(params[i]) {
                        pen.fg = c;
                    }
                }
                39 => pen.fg = Color::Default,
                40..=47 | 100..=107 => {
                    if let Some(c) = Color::from_sgr_base(params[i]) {
                        pen.bg = c;
                    }
                }
                49 => pen.bg = Color::Default,
                38 => {
                    if let Some((color, skip)) = parse_extended_color(params, i + 1) {
                        self.screen.pen.fg = color;
                        i += skip;
                    }
                }
                48 => {
                    if let Some((color, skip)) = parse_extended_color(params, i + 1) {
                        self.screen.pen.bg = color;
                        i += skip;
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn set_dec_mode(&mut self, params: &[u16], enable: bool) {
        for &p in params {
            match p {
                1 => self.screen.modes.cursor_keys_app = enable,
                3 => self.screen.modes.column_132 = enable,
                6 => {
                    self.screen.modes.origin = enable;
                    self.screen.goto(0, 0);
                }
                7 => self.screen.modes.autowrap = enable,
                9 => {
                    self.screen.modes.mouse_mode =
                        if enable { MouseMode::X10 } else { MouseMode::Off }
                }
                12 => self.screen.modes.cursor_blink = enable,
                25 => self.screen.modes.cursor_visible = enable,
                47 => {
                    if enable {
                        self.screen.enter_alt(false);
                    } else {
                        self.screen.leave_alt(false);
                    }
                }
                1000 => {
                    self.screen.modes.mouse_mode =
                        if enable { MouseMode::Normal } else { MouseMode::Off }
                }
                1002 => {
                    self.screen.modes.mouse_mode =
                        if enable { MouseMode::Button } else { MouseMode::Off }
                }
                1003 => {
                    self.screen.modes.mouse_mode =
                        if enable { MouseMode::Any } else { MouseMode::Off }
                }
                1004 => self.screen.modes.focus_events = enable,
                1006 => {
                    self.screen.modes.mouse_encoding = if enable {
                        MouseEncoding::Sgr
                    } else {
                        MouseEncoding::Default
                    }
                }
                1047 => {
                    if enable {
                        self.screen.enter_alt(true);
                    } else {
                        self.screen.leave_alt(true);
                    }
                }
                1048 => {
                    if enable {
                        self.screen.save_cursor();
                    } else {
                        self.screen.restore_cursor();
                    }
                }
                1049 => {
                    if enable {
                        self.screen.save_cursor();
                        self.screen.enter_alt(true);
                    } else {
                        self.screen.leave_alt(true);
                        self.screen.restore_cursor();
                    }
                }
                2004 => self.screen.modes.bracketed_paste = enable,
                2026 => self.screen.modes.synchronized_updates = enable,
                _ => debug!(mode = p, enable, "unhandled DEC private mode"),
            }
        }
    }

    fn set_ansi_mode(&mut self, params: &[u16], enable: bool) {
        for &p in params {
            match p {
                4 => self.screen.modes.insert = enable,
                20 => self.screen.modes.newline = enable,
                _ => debug!(mode = p, enable, "unhandled ANSI mode"),
            }
        }
    }

    fn device_status_report(&mut self, code: u16, private: bool) {
        match code {
            5 => self.reply(b"\x1b[0n"),
            6 => {
                let (top, _) = self.screen.scroll_region();
                let row = if self.screen.modes.origin {
                    self.screen.cursor.row.saturating_sub(top) + 1
                } else {
                    self.screen.cursor.row + 1
                };
                let col = self.screen.effective_col() + 1;
                if private {
                    self.reply_str(format!("\x1b[?{};{}R", row, col));
                } else {
                    self.reply_str(format!("\x1b[{};{}R", row, col));
                }
            }
            _ => {}
        }
    }

    fn set_cursor_shape(&mut self, style: u16) {
        let (shape, blink) = match style {
            0 | 1 => (CursorShape::Block, true),
            2 => (CursorShape::Block, false),
            3 => (CursorShape::Underline, true),
            4 => (CursorShape::Underline, false),
            5 => (CursorShape::Beam, true),
            6 => (CursorShape::Beam, false),
            _ => return,
        };
        self.screen.cursor_shape = shape;
        self.screen.modes.cursor_blink = blink;
    }

    // --- OSC helpers ---

    fn osc_palette_set(&mut self, payload: &str) {
        let mut parts = payload.split(';');
        while let (Some(idx), Some(spec)) = (parts.next(), parts.next()) {
            let Ok(idx) = idx.parse::<u8>() else { continue };
            if spec == "?" {
                let spec = format_color_spec(self.palette.color(idx));
                self.reply_str(format!("\x1b]4;{};{}\x1b\\", idx, spec));
            } else if let Some(rgb) = parse_color_spec(spec) {
                self.palette.set_color(idx, rgb);
            }
        }
    }

    fn osc_palette_reset(&mut self, payload: &str) {
        if payload.is_empty() {
            self.palette.reset_all();
            return;
        }
        for part in payload.split(';') {
            if let Ok(idx) = part.parse::<u8>() {
                self.palette.reset_color(idx);
            }
        }
    }

    fn osc_default_color(&mut self, num: u16, payload: &str) {
        let is_fg = num == 10;
        if payload == "?" {
            let rgb = if is_fg {
                self.palette.default_fg
            } else {
                self.palette.default_bg
            };
            self.reply_str(format!("\x1b]{};{}\x1b\\", num, format_color_spec(rgb)));
        } else if let Some(rgb) = parse_color_spec(payload) {
            if is_fg {
                self.palette.default_fg = rgb;
            } else {
                self.palette.default_bg = rgb;
            }
        }
    }

    fn osc_hyperlink(&mut self, payload: &str) {
        // format: params;uri — empty uri closes the link
        let uri = payload.split_once(';').map(|(_, u)| u).unwrap_or("");
        self.hyperlink = if uri.is_empty() {
            None
        } else {
            Some(uri.to_string())
        };
    }

    fn osc_clipboard(&mut self, payload: &str) {
        // format: selection;base64-data — a '?' asks to read the
        // clipboard, which is denied
        let Some((_, data)) = payload.split_once(';') else {
            return;
        };
        if data == "?" {
            debug!("OSC 52 clipboard read query denied");
            return;
        }
        self.clipboard_offer = Some(data.to_string());
    }
}

/// Parse SGR 38/48 extensions: `5;idx` and `2;r;g;b`. Returns the color
/// and how many extra params were consumed.
fn parse_extended_color(params: &[u16], start: usize) -> Option<(Color, usize)> {
    match *params.get(start)? {
        5 => {
            let idx = *params.get(start + 1)?;
            Some((Color::Indexed256(idx.min(255) as u8), 2))
        }
        2 => {
            let r = (*params.get(start + 1)?).min(255) as u8;
            let g = (*params.get(start + 2)?).min(255) as u8;
            let b = (*params.get(start + 3)?).min(255) as u8;
            Some((Color::Rgb(r, g, b), 4))
        }
        _ => None,
    }
}

/// Param at `idx`, treating missing and zero as `default`.
fn param(params: &[u16], idx: usize, default: u16) -> u16 {
    params
        .get(idx)
        .copied()
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

fn charset_for(final_byte: u8) -> Charset {
    match final_byte {
        b'0' => Charset::DecSpecial,
        _ => Charset::Ascii,
    }
}

impl Perform for Term {
    fn print(&mut self, ch: char) {
        self.last_printed = Some(ch);
        self.screen.put_char(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.bell_count += 1,
            0x08 => self.screen.backspace(),
            0x09 => self.screen.tab_forward(1),
            0x0a | 0x0b | 0x0c => {
                self.screen.linefeed();
                if self.screen.modes.newline {
                    self.screen.carriage_return();
                }
            }
            0x0d => self.screen.carriage_return(),
            0x0e => self.screen.charsets.active = 1,
            0x0f => self.screen.charsets.active = 0,
            // CAN/SUB abort sequences and show up as replacements
            0x18 | 0x1a => self.screen.put_char(char::REPLACEMENT_CHARACTER),
            _ => {}
        }
    }

    fn csi_dispatch(
        &mut self,
        params: &[u16],
        intermediates: &[u8],
        private: Option<u8>,
        final_byte: u8,
    ) {
        match (intermediates.first().copied(), final_byte) {
            (Some(b' '), b'q') => {
                self.set_cursor_shape(param(params, 0, 1));
                return;
            }
            (Some(b'!'), b'p') => {
                self.screen.soft_reset();
                return;
            }
            (Some(_), _) => {
                debug!(final_byte, ?intermediates, "unhandled CSI with intermediates");
                return;
            }
            (None, _) => {}
        }

        match (private, final_byte) {
            (None, b'A') => self.screen.cursor_up(param(params, 0, 1) as usize),
            (None, b'B') | (None, b'e') => self.screen.cursor_down(param(params, 0, 1) as usize),
            (None, b'C') | (None, b'a') => self.screen.cursor_forward(param(params, 0, 1) as usize),
            (None, b'D') => self.screen.cursor_back(param(params, 0, 1) as usize),
            (None, b'E') => {
                self.screen.cursor_down(param(params, 0, 1) as usize);
                self.screen.carriage_return();
            }
            (None, b'F') => {
                self.screen.cursor_up(param(params, 0, 1) as usize);
                self.screen.carriage_return();
            }
            (None, b'G') | (None, b'`') => {
                self.screen.goto_col(param(params, 0, 1) as usize - 1)
            }
            (None, b'H') | (None, b'f') => {
                let row = param(params, 0, 1) as usize - 1;
                let col = param(params, 1, 1) as usize - 1;
                self.screen.goto(row, col);
            }
            (None, b'd') => self.screen.goto_row(param(params, 0, 1) as usize - 1),
            (None, b'I') => self.screen.tab_forward(param(params, 0, 1) as usize),
            (None, b'Z') => self.screen.tab_backward(param(params, 0, 1) as usize),
            (None, b'J') => match param(params, 0, 0) {
                0 => self.screen.erase_display_below(),
                1 => self.screen.erase_display_above(),
                2 => self.screen.erase_display_all(),
                3 => self.screen.erase_display_and_history(),
                _ => {}
            },
            (None, b'K') => match param(params, 0, 0) {
                0 => self.screen.erase_line_right(),
                1 => self.screen.erase_line_left(),
                2 => self.screen.erase_line_all(),
                _ => {}
            },
            (None, b'X') => self.screen.erase_chars(param(params, 0, 1) as usize),
            (None, b'@') => self.screen.insert_blank_chars(param(params, 0, 1) as usize),
            (None, b'P') => self.screen.delete_chars(param(params, 0, 1) as usize),
            (None, b'L') => self.screen.insert_lines(param(params, 0, 1) as usize),
            (None, b'M') => self.screen.delete_lines(param(params, 0, 1) as usize),
            (None, b'S') => self.screen.scroll_up(param(params, 0, 1) as usize),
            (None, b'T') => self.screen.scroll_down(param(params, 0, 1) as usize),
            (None, b'b') => {
                if let Some(ch) = self.last_printed {
                    for _ in 0..param(params, 0, 1) {
                        self.screen.put_char(ch);
                    }
                }
            }
            (None, b'm') => self.handle_sgr(params),
            (None, b'r') => {
                let top = param(params, 0, 1) as usize - 1;
                let bottom = param(params, 1, self.screen.rows() as u16) as usize - 1;
                self.screen.set_scroll_region(top, bottom);
            }
            (None, b's') => self.screen.save_cursor(),
            (None, b'u') => self.screen.restore_cursor(),
            (None, b'h') => self.set_ansi_mode(params, true),
            (None, b'l') => self.set_ansi_mode(params, false),
            (Some(b'?'), b'h') => self.set_dec_mode(params, true),
            (Some(b'?'), b'l') => self.set_dec_mode(params, false),
            (None, b'n') => self.device_status_report(param(params, 0, 0), false),
            (Some(b'?'), b'n') => self.device_status_report(param(params, 0, 0), true),
            (None, b'c') => {
                if param(params, 0, 0) == 0 {
                    self.reply(b"\x1b[?1;2c");
                }
            }
            (Some(b'>'), b'c') => {
                if param(params, 0, 0) == 0 {
                    self.reply(b"\x1b[>0;0;0c");
                }
            }
            (None, b'g') => match param(params, 0, 0) {
                0 => self.screen.clear_tab_stop(),
                3 => self.screen.clear_all_tab_stops(),
                _ => {}
            },
            _ => debug!(final_byte, ?private, "unhandled CSI"),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], final_byte: u8) {
        match (intermediates.first().copied(), final_byte) {
            (Some(b'#'), b'8') => self.screen.alignment_fill(),
            (Some(b'('), f) => self.screen.charsets.g0 = charset_for(f),
            (Some(b')'), f) => self.screen.charsets.g1 = charset_for(f),
            (Some(_), _) => {}
            (None, b'7') => self.screen.save_cursor(),
            (None, b'8') => self.screen.restore_cursor(),
            (None, b'D') => self.screen.linefeed(),
            (None, b'E') => {
                self.screen.linefeed();
                self.screen.carriage_return();
            }
            (None, b'M') => self.screen.reverse_index(),
            (None, b'H') => self.screen.set_tab_stop(),
            (None, b'c') => self.hard_reset(),
            (None, b'=') => self.screen.modes.keypad_app = true,
            (None, b'>') => self.screen.modes.keypad_app = false,
            (None, b'\\') => {}
            _ => debug!(final_byte, "unhandled ESC"),
        }
    }

    fn osc_dispatch(&mut self, num: u16, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload).into_owned();
        match num {
            0 | 1 | 2 => self.title = payload,
            4 => self.osc_palette_set(&payload),
            7 => self.tracker.handle_cwd(&payload),
            8 => self.osc_hyperlink(&payload),
            10 | 11 => self.osc_default_color(num, &payload),
            52 => self.osc_clipboard(&payload),
            104 => self.osc_palette_reset(&payload),
            133 => {
                let row = self.screen.absolute_cursor_row();
                self.tracker.handle_marker(&payload, row);
            }
            _ => debug!(num, "unhandled OSC"),
        }
    }

    fn dcs_hook(&mut self, _params: &[u16], _intermediates: &[u8], final_byte: u8) {
        debug!(final_byte, "ignoring DCS sequence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::color::DEFAULT_FG;
    use crate::term::parser::Parser;
    use crate::term::screen::{Cursor, Modes};

    fn make_term() -> (Term, Parser) {
        (Term::new(80, 24, 1000), Parser::new())
    }

    fn small_term() -> (Term, Parser) {
        (Term::new(10, 5, 1000), Parser::new())
    }

    fn feed(t: &mut Term, p: &mut Parser, bytes: &[u8]) {
        p.feed(t, bytes);
    }

    fn row_text(t: &Term, row: usize) -> String {
        (0..t.screen.cols())
            .map(|c| {
                let cell = t.screen.cell_at(row, c).unwrap();
                if cell.ch == '\0' {
                    ' '
                } else {
                    cell.ch
                }
            })
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    // --- end-to-end sequences ---

    #[test]
    fn test_scenario_sgr_colored_cells() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"A\x1b[31mB\x1b[0mC");
        let a = t.screen.cell_at(0, 0).unwrap();
        let b = t.screen.cell_at(0, 1).unwrap();
        let c = t.screen.cell_at(0, 2).unwrap();
        assert_eq!(a.ch, 'A');
        assert_eq!(a.fg, Color::Default);
        assert_eq!(b.ch, 'B');
        assert_eq!(b.fg, Color::Indexed16(1));
        assert_eq!(c.ch, 'C');
        assert_eq!(c.fg, Color::Default);
        assert_eq!(t.screen.cursor, Cursor { row: 0, col: 3 });
    }

    #[test]
    fn test_scenario_crlf() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"ABC\r\nDE");
        assert_eq!(row_text(&t, 0), "ABC");
        assert_eq!(row_text(&t, 1), "DE");
        assert_eq!(t.screen.cursor, Cursor { row: 1, col: 2 });
    }

    #[test]
    fn test_scenario_alt_screen_roundtrip() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"main\x1b[3;7H");
        let pos = t.screen.cursor;
        feed(&mut t, &mut p, b"\x1b[?1049h");
        feed(&mut t, &mut p, b"X");
        feed(&mut t, &mut p, b"\x1b[?1049l");
        assert_eq!(row_text(&t, 0), "main");
        assert_eq!(t.screen.cursor, pos);
        assert!(!t.screen.is_alt_active());
    }

    #[test]
    fn test_scenario_pending_wrap() {
        let (mut t, mut p) = (Term::new(5, 3, 100), Parser::new());
        feed(&mut t, &mut p, b"ABCDE");
        assert_eq!(t.screen.cursor, Cursor { row: 0, col: 5 });
        feed(&mut t, &mut p, b"F");
        assert_eq!(row_text(&t, 0), "ABCDE");
        assert_eq!(t.screen.cell_at(1, 0).unwrap().ch, 'F');
    }

    #[test]
    fn test_scenario_osc_title() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]0;hello\x07");
        assert_eq!(t.title(), "hello");
    }

    #[test]
    fn test_scenario_da1_reply() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[c");
        assert_eq!(t.take_write_back(), b"\x1b[?1;2c");
    }

    #[test]
    fn test_scenario_scrollback_fifo() {
        let (mut t, mut p) = (Term::new(10, 3, 3), Parser::new());
        for _ in 0..4 {
            feed(&mut t, &mut p, b"A\r\nB\r\nC\r\n");
        }
        assert_eq!(t.screen.scrollback_len(), 3);
    }

    // --- replies ---

    #[test]
    fn test_da2_reply() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[>c");
        assert_eq!(t.take_write_back(), b"\x1b[>0;0;0c");
    }

    #[test]
    fn test_dsr_status_ok() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[5n");
        assert_eq!(t.take_write_back(), b"\x1b[0n");
    }

    #[test]
    fn test_dsr_cursor_position() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[3;5H\x1b[6n");
        assert_eq!(t.take_write_back(), b"\x1b[3;5R");
    }

    #[test]
    fn test_dsr_cursor_position_origin_relative() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[5;10r\x1b[?6h\x1b[2;1H\x1b[6n");
        assert_eq!(t.take_write_back(), b"\x1b[2;1R");
    }

    #[test]
    fn test_decxcpr_reply() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[2;3H\x1b[?6n");
        assert_eq!(t.take_write_back(), b"\x1b[?2;3R");
    }

    #[test]
    fn test_osc_color_query_reply() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]10;?\x07");
        let reply = t.take_write_back();
        let expected = format!("\x1b]10;{}\x1b\\", format_color_spec(DEFAULT_FG));
        assert_eq!(reply, expected.as_bytes());
    }

    // --- movement ---

    #[test]
    fn test_cup_and_relative_moves() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[10;20H");
        assert_eq!(t.screen.cursor, Cursor { row: 9, col: 19 });
        feed(&mut t, &mut p, b"\x1b[3A\x1b[2B\x1b[4C\x1b[8D");
        assert_eq!(t.screen.cursor, Cursor { row: 8, col: 15 });
    }

    #[test]
    fn test_movement_clamps_at_edges() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"\x1b[99;99H");
        assert_eq!(t.screen.cursor, Cursor { row: 4, col: 9 });
        feed(&mut t, &mut p, b"\x1b[99A");
        assert_eq!(t.screen.cursor.row, 0);
        feed(&mut t, &mut p, b"\x1b[99D");
        assert_eq!(t.screen.cursor.col, 0);
    }

    #[test]
    fn test_cnl_cpl() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[5;10H\x1b[2E");
        assert_eq!(t.screen.cursor, Cursor { row: 6, col: 0 });
        feed(&mut t, &mut p, b"\x1b[5;10H\x1b[1F");
        assert_eq!(t.screen.cursor, Cursor { row: 3, col: 0 });
    }

    #[test]
    fn test_cha_vpa() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[15G");
        assert_eq!(t.screen.cursor.col, 14);
        feed(&mut t, &mut p, b"\x1b[8d");
        assert_eq!(t.screen.cursor.row, 7);
    }

    #[test]
    fn test_cht_cbt() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[2I");
        assert_eq!(t.screen.cursor.col, 16);
        feed(&mut t, &mut p, b"\x1b[1Z");
        assert_eq!(t.screen.cursor.col, 8);
    }

    // --- erase / edit ---

    #[test]
    fn test_erase_line_variants() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"ABCDEFGHIJ\x1b[1;6H\x1b[0K");
        assert_eq!(row_text(&t, 0), "ABCDE");
        feed(&mut t, &mut p, b"\x1b[1;3H\x1b[1K");
        assert_eq!(row_text(&t, 0), "   DE");
        feed(&mut t, &mut p, b"\x1b[2K");
        assert_eq!(row_text(&t, 0), "");
    }

    #[test]
    fn test_erase_display_modes() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"AAA\r\nBBB\r\nCCC");
        feed(&mut t, &mut p, b"\x1b[2;2H\x1b[0J");
        assert_eq!(row_text(&t, 0), "AAA");
        assert_eq!(row_text(&t, 1), "B");
        assert_eq!(row_text(&t, 2), "");
        feed(&mut t, &mut p, b"\x1b[2J");
        assert_eq!(row_text(&t, 0), "");
    }

    #[test]
    fn test_ed3_clears_scrollback() {
        let (mut t, mut p) = (Term::new(5, 2, 100), Parser::new());
        feed(&mut t, &mut p, b"A\r\nB\r\nC\r\nD");
        assert!(t.screen.scrollback_len() > 0);
        feed(&mut t, &mut p, b"\x1b[3J");
        assert_eq!(t.screen.scrollback_len(), 0);
    }

    #[test]
    fn test_ech() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"ABCDEFGHIJ\x1b[1;4H\x1b[3X");
        assert_eq!(row_text(&t, 0), "ABC   GHIJ");
        assert_eq!(t.screen.cursor.col, 3);
    }

    #[test]
    fn test_ich_dch() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"ABCDEFGHIJ\x1b[1;4H\x1b[2@");
        assert_eq!(row_text(&t, 0), "ABC  DEFGH");
        feed(&mut t, &mut p, b"\x1b[2P");
        assert_eq!(row_text(&t, 0), "ABCDEFGH");
    }

    #[test]
    fn test_il_dl_respect_region() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"AAA\r\nBBB\r\nCCC\r\nDDD\r\nEEE");
        feed(&mut t, &mut p, b"\x1b[2;4r\x1b[2;1H\x1b[1L");
        assert_eq!(row_text(&t, 0), "AAA");
        assert_eq!(row_text(&t, 1), "");
        assert_eq!(row_text(&t, 2), "BBB");
        assert_eq!(row_text(&t, 3), "CCC");
        assert_eq!(row_text(&t, 4), "EEE");
        feed(&mut t, &mut p, b"\x1b[2;1H\x1b[1M");
        assert_eq!(row_text(&t, 1), "BBB");
        assert_eq!(row_text(&t, 4), "EEE");
    }

    #[test]
    fn test_il_outside_region_ignored() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"AAA\r\nBBB");
        feed(&mut t, &mut p, b"\x1b[3;5r\x1b[1;1H\x1b[5L");
        assert_eq!(row_text(&t, 0), "AAA");
        assert_eq!(row_text(&t, 1), "BBB");
    }

    // --- scrolling ---

    #[test]
    fn test_su_sd() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"L0\r\nL1\r\nL2\r\nL3\r\nL4");
        feed(&mut t, &mut p, b"\x1b[1S");
        assert_eq!(row_text(&t, 0), "L1");
        assert_eq!(row_text(&t, 4), "");
        feed(&mut t, &mut p, b"\x1b[1T");
        assert_eq!(row_text(&t, 0), "");
        assert_eq!(row_text(&t, 1), "L1");
    }

    #[test]
    fn test_decstbm_homes_cursor() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[10;10H\x1b[5;10r");
        assert_eq!(t.screen.scroll_region(), (4, 9));
        assert_eq!(t.screen.cursor, Cursor { row: 0, col: 0 });
    }

    #[test]
    fn test_invalid_decstbm_ignored() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[10;5r");
        assert_eq!(t.screen.scroll_region(), (0, 23));
    }

    #[test]
    fn test_linefeed_scrolls_region_only() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"AAA\r\nBBB\r\nCCC\r\nDDD\r\nEEE");
        feed(&mut t, &mut p, b"\x1b[2;3r\x1b[3;1H\n");
        assert_eq!(row_text(&t, 0), "AAA");
        assert_eq!(row_text(&t, 1), "CCC");
        assert_eq!(row_text(&t, 2), "");
        assert_eq!(row_text(&t, 4), "EEE");
        assert_eq!(t.screen.scrollback_len(), 0);
    }

    // --- SGR ---

    #[test]
    fn test_sgr_attributes_set_and_clear() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[1;3;4;9m");
        let f = t.screen.pen.flags;
        assert!(f.contains(CellFlags::BOLD));
        assert!(f.contains(CellFlags::ITALIC));
        assert!(f.contains(CellFlags::UNDERLINE));
        assert!(f.contains(CellFlags::STRIKE));
        feed(&mut t, &mut p, b"\x1b[22;23m");
        let f = t.screen.pen.flags;
        assert!(!f.contains(CellFlags::BOLD));
        assert!(!f.contains(CellFlags::ITALIC));
        assert!(f.contains(CellFlags::UNDERLINE));
        feed(&mut t, &mut p, b"\x1b[m");
        assert_eq!(t.screen.pen, Pen::default());
    }

    #[test]
    fn test_sgr_256_color() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[38;5;196m\x1b[48;5;21m");
        assert_eq!(t.screen.pen.fg, Color::Indexed256(196));
        assert_eq!(t.screen.pen.bg, Color::Indexed256(21));
        assert_eq!(
            t.resolve_color(t.screen.pen.fg, true),
            Rgb::new(255, 0, 0)
        );
    }

    #[test]
    fn test_sgr_truecolor() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[38;2;10;20;30m");
        assert_eq!(t.screen.pen.fg, Color::Rgb(10, 20, 30));
    }

    #[test]
    fn test_sgr_bright_and_dim() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[91;2m");
        assert_eq!(t.screen.pen.fg, Color::Indexed16(9));
        assert!(t.screen.pen.flags.contains(CellFlags::DIM));
    }

    #[test]
    fn test_sgr_params_after_extended_color_still_apply() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[38;5;100;1m");
        assert_eq!(t.screen.pen.fg, Color::Indexed256(100));
        assert!(t.screen.pen.flags.contains(CellFlags::BOLD));
    }

    // --- modes ---

    #[test]
    fn test_mode_toggles() {
        let (mut t, mut p) = make_term();
        let defaults = Modes::default();
        assert!(!defaults.cursor_keys_app);
        feed(&mut t, &mut p, b"\x1b[?1h");
        assert!(t.screen.modes.cursor_keys_app);
        feed(&mut t, &mut p, b"\x1b[?1l");
        assert!(!t.screen.modes.cursor_keys_app);
        feed(&mut t, &mut p, b"\x1b[?25l");
        assert!(!t.screen.modes.cursor_visible);
        feed(&mut t, &mut p, b"\x1b[?2004h\x1b[?1004h\x1b[?2026h\x1b[?12h");
        assert!(t.screen.modes.bracketed_paste);
        assert!(t.screen.modes.focus_events);
        assert!(t.screen.modes.synchronized_updates);
        assert!(t.screen.modes.cursor_blink);
    }

    #[test]
    fn test_mouse_modes() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[?1000h");
        assert_eq!(t.screen.modes.mouse_mode, MouseMode::Normal);
        feed(&mut t, &mut p, b"\x1b[?1002h");
        assert_eq!(t.screen.modes.mouse_mode, MouseMode::Button);
        feed(&mut t, &mut p, b"\x1b[?1003h\x1b[?1006h");
        assert_eq!(t.screen.modes.mouse_mode, MouseMode::Any);
        assert_eq!(t.screen.modes.mouse_encoding, MouseEncoding::Sgr);
        feed(&mut t, &mut p, b"\x1b[?1003l\x1b[?1006l");
        assert_eq!(t.screen.modes.mouse_mode, MouseMode::Off);
        assert_eq!(t.screen.modes.mouse_encoding, MouseEncoding::Default);
    }

    #[test]
    fn test_insert_mode() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"ABCD\x1b[1;2H\x1b[4h");
        feed(&mut t, &mut p, b"XY");
        assert_eq!(row_text(&t, 0), "AXYBCD");
        feed(&mut t, &mut p, b"\x1b[4l");
        feed(&mut t, &mut p, b"Z");
        assert_eq!(row_text(&t, 0), "AXYZCD");
    }

    #[test]
    fn test_lnm_mode() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"\x1b[20h");
        feed(&mut t, &mut p, b"AB\n");
        assert_eq!(t.screen.cursor, Cursor { row: 1, col: 0 });
    }

    #[test]
    fn test_autowrap_disable() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"\x1b[?7l");
        feed(&mut t, &mut p, b"ABCDEFGHIJKLM");
        assert_eq!(t.screen.cursor, Cursor { row: 0, col: 9 });
        assert_eq!(row_text(&t, 0), "ABCDEFGHIM");
    }

    #[test]
    fn test_keypad_modes() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b=");
        assert!(t.screen.modes.keypad_app);
        feed(&mut t, &mut p, b"\x1b>");
        assert!(!t.screen.modes.keypad_app);
    }

    // --- save/restore, reset ---

    #[test]
    fn test_decsc_decrc_roundtrip() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[5;10H\x1b[1;31m\x1b(0\x1b7");
        feed(&mut t, &mut p, b"\x1b[1;1H\x1b[0m\x1b(B");
        feed(&mut t, &mut p, b"\x1b8");
        assert_eq!(t.screen.cursor, Cursor { row: 4, col: 9 });
        assert!(t.screen.pen.flags.contains(CellFlags::BOLD));
        assert_eq!(t.screen.pen.fg, Color::Indexed16(1));
        assert_eq!(t.screen.charsets.g0, Charset::DecSpecial);
    }

    #[test]
    fn test_ansi_save_restore() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[3;7H\x1b[s\x1b[1;1H\x1b[u");
        assert_eq!(t.screen.cursor, Cursor { row: 2, col: 6 });
    }

    #[test]
    fn test_ris_restores_defaults() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"\x1b[1;31mhello\x1b[2;4r\x1b[?6h\x1b[?25l");
        feed(&mut t, &mut p, b"\x1b]133;A\x07\x1b]133;D;0\x07");
        feed(&mut t, &mut p, b"\x1bc");
        assert_eq!(row_text(&t, 0), "");
        assert_eq!(t.screen.cursor, Cursor { row: 0, col: 0 });
        assert_eq!(t.screen.pen, Pen::default());
        assert_eq!(t.screen.scroll_region(), (0, 4));
        assert!(!t.screen.modes.origin);
        assert!(t.screen.modes.cursor_visible);
        assert_eq!(t.screen.scrollback_len(), 0);
        assert_eq!(t.commands().len(), 0);
    }

    #[test]
    fn test_decstr_soft_reset() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"hello\x1b[1;31m\x1b[5;10r\x1b[?6h\x1b[4h\x1b[!p");
        assert_eq!(row_text(&t, 0), "hello");
        assert_eq!(t.screen.pen, Pen::default());
        assert_eq!(t.screen.scroll_region(), (0, 23));
        assert!(!t.screen.modes.origin);
        assert!(!t.screen.modes.insert);
        assert!(t.screen.modes.cursor_visible);
    }

    // --- DECALN / REP / cursor shape ---

    #[test]
    fn test_decaln_fill() {
        let (mut t, mut p) = (Term::new(4, 2, 10), Parser::new());
        feed(&mut t, &mut p, b"\x1b#8");
        assert_eq!(row_text(&t, 0), "EEEE");
        assert_eq!(row_text(&t, 1), "EEEE");
    }

    #[test]
    fn test_rep_repeats_last_char() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"x\x1b[3b");
        assert_eq!(row_text(&t, 0), "xxxx");
    }

    #[test]
    fn test_decscusr_shapes() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b[4 q");
        assert_eq!(t.screen.cursor_shape, CursorShape::Underline);
        assert!(!t.screen.modes.cursor_blink);
        feed(&mut t, &mut p, b"\x1b[5 q");
        assert_eq!(t.screen.cursor_shape, CursorShape::Beam);
        assert!(t.screen.modes.cursor_blink);
        feed(&mut t, &mut p, b"\x1b[0 q");
        assert_eq!(t.screen.cursor_shape, CursorShape::Block);
    }

    // --- charsets ---

    #[test]
    fn test_charset_shift_out_in() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b)0a\x0eq\x0fa");
        assert_eq!(t.screen.cell_at(0, 0).unwrap().ch, 'a');
        assert_eq!(t.screen.cell_at(0, 1).unwrap().ch, '─');
        assert_eq!(t.screen.cell_at(0, 2).unwrap().ch, 'a');
    }

    // --- OSC state ---

    #[test]
    fn test_osc_title_variants() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]2;two\x07");
        assert_eq!(t.title(), "two");
        feed(&mut t, &mut p, b"\x1b]1;one\x1b\\");
        assert_eq!(t.title(), "one");
    }

    #[test]
    fn test_osc_cwd() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]7;file://host/tmp/work\x07");
        assert_eq!(t.working_dir(), "/tmp/work");
    }

    #[test]
    fn test_osc_palette_set_and_reset() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]4;1;#102030\x07");
        assert_eq!(t.palette.color(1), Rgb::new(0x10, 0x20, 0x30));
        feed(&mut t, &mut p, b"\x1b]104;1\x07");
        assert_eq!(t.palette.color(1), Rgb::new(205, 49, 49));
    }

    #[test]
    fn test_osc_hyperlink_open_close() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]8;;https://example.com\x1b\\");
        assert_eq!(t.hyperlink(), Some("https://example.com"));
        feed(&mut t, &mut p, b"\x1b]8;;\x1b\\");
        assert_eq!(t.hyperlink(), None);
    }

    #[test]
    fn test_osc_clipboard_offer_and_deny() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x1b]52;c;aGVsbG8=\x07");
        assert_eq!(t.clipboard_offer(), Some("aGVsbG8="));
        feed(&mut t, &mut p, b"\x1b]52;c;?\x07");
        assert!(t.take_write_back().is_empty());
    }

    #[test]
    fn test_osc_133_command_tracking() {
        let (mut t, mut p) = (Term::new(20, 5, 100), Parser::new());
        feed(&mut t, &mut p, b"\x1b]133;A\x07$ ");
        feed(&mut t, &mut p, b"\x1b]133;B\x07ls\r\n");
        feed(&mut t, &mut p, b"\x1b]133;C\x07file1\r\nfile2\r\n");
        feed(&mut t, &mut p, b"\x1b]133;D;0\x07");
        assert_eq!(t.commands().len(), 1);
        let rec = t.commands().get(0).unwrap();
        assert_eq!(rec.prompt_row, 0);
        assert_eq!(rec.output_row, 1);
        assert_eq!(rec.end_row, 3);
        assert_eq!(rec.exit_code, Some(0));
    }

    #[test]
    fn test_command_rows_survive_scrolling() {
        let (mut t, mut p) = (Term::new(20, 3, 100), Parser::new());
        // push two rows into scrollback, then mark a prompt
        feed(&mut t, &mut p, b"a\r\nb\r\nc\r\nd\r\ne");
        let abs = t.screen.absolute_cursor_row();
        feed(&mut t, &mut p, b"\x1b]133;A\x07\x1b]133;D;0\x07");
        assert_eq!(t.commands().get(0).unwrap().prompt_row, abs);
    }

    // --- bell ---

    #[test]
    fn test_bell_counted_and_taken() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"\x07\x07");
        assert_eq!(t.take_bell(), 2);
        assert_eq!(t.take_bell(), 0);
    }

    // --- unknown sequences ---

    #[test]
    fn test_unknown_sequences_do_not_mutate() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, b"A\x1b[99~\x1b[?999h\x1b]777;x\x07B");
        assert_eq!(row_text(&t, 0), "AB");
        assert_eq!(t.screen.cursor, Cursor { row: 0, col: 2 });
    }

    // --- wide chars through the full stack ---

    #[test]
    fn test_cjk_through_parser() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, "中文".as_bytes());
        assert_eq!(t.screen.cursor.col, 4);
        assert_eq!(t.screen.cell_at(0, 0).unwrap().ch, '中');
        assert!(t.screen.cell_at(0, 1).unwrap().is_spacer());
    }

    #[test]
    fn test_wide_pair_count_invariant_random_input() {
        let (mut t, mut p) = (Term::new(11, 6, 50), Parser::new());
        let mut seed: u32 = 0xdead_beef;
        for _ in 0..50_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            p.advance(&mut t, (seed >> 16) as u8);
        }
        for r in 0..t.screen.rows() {
            let wides = (0..t.screen.cols())
                .filter(|&c| t.screen.cell_at(r, c).unwrap().is_wide())
                .count();
            let spacers = (0..t.screen.cols())
                .filter(|&c| t.screen.cell_at(r, c).unwrap().is_spacer())
                .count();
            assert_eq!(wides, spacers, "row {}", r);
        }
        assert!(t.screen.cursor.row < t.screen.rows());
        assert!(t.screen.cursor.col <= t.screen.cols());
    }

    // --- extract_text ---

    #[test]
    fn test_extract_text_from_grid() {
        let (mut t, mut p) = small_term();
        feed(&mut t, &mut p, b"hello\r\nworld");
        assert_eq!(t.extract_text(0, 0, 1, 5), "hello\nworld");
        assert_eq!(t.extract_text(0, 1, 0, 4), "ell");
    }

    #[test]
    fn test_extract_text_spans_scrollback() {
        let (mut t, mut p) = (Term::new(5, 2, 100), Parser::new());
        feed(&mut t, &mut p, b"one\r\ntwo\r\nsix");
        assert_eq!(t.screen.scrollback_len(), 1);
        assert_eq!(t.extract_text(0, 0, 2, 5), "one\ntwo\nsix");
    }

    #[test]
    fn test_extract_text_skips_spacers() {
        let (mut t, mut p) = make_term();
        feed(&mut t, &mut p, "a中b".as_bytes());
        assert_eq!(t.extract_text(0, 0, 0, 5), "a中b");
    }

    #[test]
    fn test_extract_text_out_of_range() {
        let (t, _) = small_term();
        assert_eq!(t.extract_text(50, 0, 60, 5), "");
    }
}
