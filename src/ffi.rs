//! C ABI for platform shells. One opaque handle per session; integer
//! errors are negative, colors are packed 0x00RRGGBB, string returns
//! transfer ownership and must be released with `tg_string_free`. Null
//! handles and out-of-range coordinates yield defensive defaults.

use std::ffi::{c_char, c_int, c_uint, CStr, CString};

use crate::session::Session;
use crate::term::screen::{CursorShape, MouseMode};

fn session_ref<'a>(session: *const Session) -> Option<&'a Session> {
    unsafe { session.as_ref() }
}

fn owned_string(s: String) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

#[no_mangle]
pub extern "C" fn tg_session_new(cols: c_uint, rows: c_uint) -> *mut Session {
    match Session::new(cols as usize, rows as usize) {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(_) => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub extern "C" fn tg_session_free(session: *mut Session) {
    if !session.is_null() {
        unsafe { drop(Box::from_raw(session)) };
    }
}

/// Spawn the shell (explicit path, or the configured/detected default
/// when null). Returns 0 on success, -1 on failure; the session stays
/// usable after a failure so the host can retry.
#[no_mangle]
pub extern "C" fn tg_session_spawn_shell(session: *mut Session, shell: *const c_char) -> c_int {
    let Some(s) = session_ref(session) else {
        return -1;
    };
    let shell = if shell.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(shell).to_str().ok() }
    };
    match s.spawn_shell(shell) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn tg_session_pty_fd(session: *const Session) -> c_int {
    session_ref(session).map(|s| s.pty_fd()).unwrap_or(-1)
}

/// Drain PTY output into the terminal. Returns bytes consumed, 0 once
/// after the child dies, then -1 (EOF).
#[no_mangle]
pub extern "C" fn tg_session_read_pty(session: *mut Session) -> c_int {
    session_ref(session).map(|s| s.read_pty()).unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn tg_session_write_pty(
    session: *mut Session,
    data: *const u8,
    len: c_uint,
) -> c_int {
    let Some(s) = session_ref(session) else {
        return -1;
    };
    if data.is_null() {
        return -1;
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len as usize) };
    s.write_pty(bytes)
}

#[no_mangle]
pub extern "C" fn tg_session_resize(
    session: *mut Session,
    cols: c_uint,
    rows: c_uint,
    pixel_width: c_uint,
    pixel_height: c_uint,
) {
    if let Some(s) = session_ref(session) {
        s.resize(
            cols as usize,
            rows as usize,
            pixel_width as u16,
            pixel_height as u16,
        );
    }
}

#[no_mangle]
pub extern "C" fn tg_session_grid_size(
    session: *const Session,
    out_cols: *mut c_uint,
    out_rows: *mut c_uint,
) {
    let (cols, rows) = session_ref(session).map(|s| s.grid_size()).unwrap_or((0, 0));
    if !out_cols.is_null() {
        unsafe { *out_cols = cols as c_uint };
    }
    if !out_rows.is_null() {
        unsafe { *out_rows = rows as c_uint };
    }
}

/// Unicode scalar at (row, col); 0 for empty cells and the trailing
/// column of a wide character.
#[no_mangle]
pub extern "C" fn tg_session_cell_char(session: *const Session, row: c_uint, col: c_uint) -> u32 {
    session_ref(session)
        .map(|s| s.cell(row as usize, col as usize).ch as u32)
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_cell_fg(session: *const Session, row: c_uint, col: c_uint) -> u32 {
    session_ref(session)
        .map(|s| s.cell_fg_packed(row as usize, col as usize))
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_cell_bg(session: *const Session, row: c_uint, col: c_uint) -> u32 {
    session_ref(session)
        .map(|s| s.cell_bg_packed(row as usize, col as usize))
        .unwrap_or(0)
}

/// Style bitfield (see CellFlags); the width-marker bits are included so
/// renderers can skip spacer cells.
#[no_mangle]
pub extern "C" fn tg_session_cell_attr(session: *const Session, row: c_uint, col: c_uint) -> u16 {
    session_ref(session)
        .map(|s| s.cell(row as usize, col as usize).flags.bits())
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_cursor_pos(
    session: *const Session,
    out_row: *mut c_uint,
    out_col: *mut c_uint,
) {
    let (row, col) = session_ref(session).map(|s| s.cursor_pos()).unwrap_or((0, 0));
    if !out_row.is_null() {
        unsafe { *out_row = row as c_uint };
    }
    if !out_col.is_null() {
        unsafe { *out_col = col as c_uint };
    }
}

#[no_mangle]
pub extern "C" fn tg_session_cursor_visible(session: *const Session) -> c_int {
    session_ref(session).map(|s| s.cursor_visible() as c_int).unwrap_or(0)
}

/// 0 = block, 1 = underline, 2 = beam.
#[no_mangle]
pub extern "C" fn tg_session_cursor_shape(session: *const Session) -> c_int {
    match session_ref(session).map(|s| s.cursor_shape()) {
        Some(CursorShape::Block) | None => 0,
        Some(CursorShape::Underline) => 1,
        Some(CursorShape::Beam) => 2,
    }
}

#[no_mangle]
pub extern "C" fn tg_session_cursor_keys_app(session: *const Session) -> c_int {
    session_ref(session).map(|s| s.cursor_keys_app() as c_int).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_bracketed_paste(session: *const Session) -> c_int {
    session_ref(session).map(|s| s.bracketed_paste() as c_int).unwrap_or(0)
}

/// 0 = off, 1 = X10, 2 = normal, 3 = button-drag, 4 = any-motion.
#[no_mangle]
pub extern "C" fn tg_session_mouse_mode(session: *const Session) -> c_int {
    match session_ref(session).map(|s| s.mouse_mode()) {
        Some(MouseMode::Off) | None => 0,
        Some(MouseMode::X10) => 1,
        Some(MouseMode::Normal) => 2,
        Some(MouseMode::Button) => 3,
        Some(MouseMode::Any) => 4,
    }
}

#[no_mangle]
pub extern "C" fn tg_session_focus_events(session: *const Session) -> c_int {
    session_ref(session).map(|s| s.focus_events() as c_int).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_scrollback_len(session: *const Session) -> c_uint {
    session_ref(session).map(|s| s.scrollback_len() as c_uint).unwrap_or(0)
}

/// Scrollback reads; `sb_row` 0 is the oldest line.
#[no_mangle]
pub extern "C" fn tg_session_scrollback_cell_char(
    session: *const Session,
    sb_row: c_uint,
    col: c_uint,
) -> u32 {
    session_ref(session)
        .map(|s| s.scrollback_cell(sb_row as usize, col as usize).ch as u32)
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_scrollback_cell_fg(
    session: *const Session,
    sb_row: c_uint,
    col: c_uint,
) -> u32 {
    session_ref(session)
        .map(|s| s.scrollback_cell_fg_packed(sb_row as usize, col as usize))
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_scrollback_cell_bg(
    session: *const Session,
    sb_row: c_uint,
    col: c_uint,
) -> u32 {
    session_ref(session)
        .map(|s| s.scrollback_cell_bg_packed(sb_row as usize, col as usize))
        .unwrap_or(0)
}

/// Extract text between two absolute positions (scrollback rows come
/// before grid rows; end column exclusive). Caller frees.
#[no_mangle]
pub extern "C" fn tg_session_extract_text(
    session: *const Session,
    start_row: c_uint,
    start_col: c_uint,
    end_row: c_uint,
    end_col: c_uint,
) -> *mut c_char {
    let text = session_ref(session)
        .map(|s| {
            s.extract_text(
                start_row as usize,
                start_col as usize,
                end_row as usize,
                end_col as usize,
            )
        })
        .unwrap_or_default();
    owned_string(text)
}

/// Window title from OSC 0/2. Caller frees.
#[no_mangle]
pub extern "C" fn tg_session_title(session: *const Session) -> *mut c_char {
    owned_string(session_ref(session).map(|s| s.title()).unwrap_or_default())
}

/// Working directory from OSC 7. Caller frees.
#[no_mangle]
pub extern "C" fn tg_session_working_dir(session: *const Session) -> *mut c_char {
    owned_string(
        session_ref(session)
            .map(|s| s.working_dir())
            .unwrap_or_default(),
    )
}

/// Bell rings since the last call.
#[no_mangle]
pub extern "C" fn tg_session_take_bell(session: *mut Session) -> c_uint {
    session_ref(session).map(|s| s.take_bell()).unwrap_or(0)
}

/// Shell exit code once the child has terminated; -1 while running or
/// unknown.
#[no_mangle]
pub extern "C" fn tg_session_child_exit_code(session: *const Session) -> c_int {
    session_ref(session)
        .and_then(|s| s.child_exit_code())
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn tg_session_command_count(session: *const Session) -> c_uint {
    session_ref(session).map(|s| s.command_count() as c_uint).unwrap_or(0)
}

/// Prompt row (absolute, scrollback origin) of command `idx`; -1 when
/// out of range.
#[no_mangle]
pub extern "C" fn tg_session_command_prompt_row(session: *const Session, idx: c_uint) -> c_int {
    session_ref(session)
        .and_then(|s| s.command_prompt_row(idx as usize))
        .map(|r| r as c_int)
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn tg_session_command_exit_code(session: *const Session, idx: c_uint) -> c_int {
    session_ref(session)
        .and_then(|s| s.command_exit_code(idx as usize))
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn tg_session_command_duration_ms(session: *const Session, idx: c_uint) -> u64 {
    session_ref(session)
        .map(|s| s.command_duration_ms(idx as usize))
        .unwrap_or(0)
}

/// Nearest prompt row above/below `row` for prompt-jump navigation; -1
/// when none.
#[no_mangle]
pub extern "C" fn tg_session_prev_prompt(session: *const Session, row: c_uint) -> c_int {
    session_ref(session)
        .and_then(|s| s.prev_prompt(row as usize))
        .map(|r| r as c_int)
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn tg_session_next_prompt(session: *const Session, row: c_uint) -> c_int {
    session_ref(session)
        .and_then(|s| s.next_prompt(row as usize))
        .map(|r| r as c_int)
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn tg_session_font_size(session: *const Session) -> f32 {
    session_ref(session).map(|s| s.font_size()).unwrap_or(0.0)
}

/// Configured font family. Caller frees.
#[no_mangle]
pub extern "C" fn tg_session_font_family(session: *const Session) -> *mut c_char {
    owned_string(
        session_ref(session)
            .map(|s| s.font_family())
            .unwrap_or_default(),
    )
}

#[no_mangle]
pub extern "C" fn tg_session_window_width(session: *const Session) -> u32 {
    session_ref(session).map(|s| s.window_width()).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_window_height(session: *const Session) -> u32 {
    session_ref(session).map(|s| s.window_height()).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_theme_fg(session: *const Session) -> u32 {
    session_ref(session).map(|s| s.theme_fg_packed()).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn tg_session_theme_bg(session: *const Session) -> u32 {
    session_ref(session).map(|s| s.theme_bg_packed()).unwrap_or(0)
}

/// Poll for a config-file change; returns the new generation number when
/// the snapshot was replaced, 0 otherwise.
#[no_mangle]
pub extern "C" fn tg_session_poll_config(session: *mut Session) -> u64 {
    session_ref(session).map(|s| s.poll_config()).unwrap_or(0)
}

/// Release a string returned by any `tg_session_*` accessor.
#[no_mangle]
pub extern "C" fn tg_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe { drop(CString::from_raw(s)) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn read_owned(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        tg_string_free(ptr);
        s
    }

    #[test]
    fn test_lifecycle_and_defaults() {
        let h = tg_session_new(80, 24);
        assert!(!h.is_null());

        let (mut cols, mut rows) = (0u32, 0u32);
        tg_session_grid_size(h, &mut cols, &mut rows);
        assert_eq!((cols, rows), (80, 24));

        assert_eq!(tg_session_cursor_visible(h), 1);
        assert_eq!(tg_session_cursor_keys_app(h), 0);
        assert_eq!(tg_session_pty_fd(h), -1);
        assert_eq!(tg_session_child_exit_code(h), -1);
        tg_session_free(h);
    }

    #[test]
    fn test_zero_dims_returns_null() {
        assert!(tg_session_new(0, 0).is_null());
    }

    #[test]
    fn test_null_handle_defaults() {
        let null = std::ptr::null_mut();
        assert_eq!(tg_session_read_pty(null), -1);
        assert_eq!(tg_session_cell_char(null, 0, 0), 0);
        assert_eq!(tg_session_cursor_visible(null), 0);
        assert_eq!(tg_session_scrollback_len(null), 0);
        assert_eq!(tg_session_command_prompt_row(null, 0), -1);
        let title = tg_session_title(null);
        assert_eq!(unsafe { read_owned(title) }, "");
        tg_session_free(null);
        tg_string_free(std::ptr::null_mut());
    }

    #[test]
    fn test_cell_reads_through_ffi() {
        let h = tg_session_new(80, 24);
        let s = unsafe { &*h };
        s.advance_bytes(b"A\x1b[31mB");

        assert_eq!(tg_session_cell_char(h, 0, 0), 'A' as u32);
        assert_eq!(tg_session_cell_char(h, 0, 1), 'B' as u32);
        // palette red, packed
        assert_eq!(tg_session_cell_fg(h, 0, 1), 0x00cd3131);
        // out of range
        assert_eq!(tg_session_cell_char(h, 99, 99), 0);

        let (mut row, mut col) = (0u32, 0u32);
        tg_session_cursor_pos(h, &mut row, &mut col);
        assert_eq!((row, col), (0, 2));
        tg_session_free(h);
    }

    #[test]
    fn test_title_ownership_transfer() {
        let h = tg_session_new(40, 10);
        let s = unsafe { &*h };
        s.advance_bytes(b"\x1b]0;my title\x07");
        let title = tg_session_title(h);
        assert_eq!(unsafe { read_owned(title) }, "my title");
        tg_session_free(h);
    }

    #[test]
    fn test_extract_text_through_ffi() {
        let h = tg_session_new(10, 4);
        let s = unsafe { &*h };
        s.advance_bytes(b"ab\r\ncd");
        let text = tg_session_extract_text(h, 0, 0, 1, 2);
        assert_eq!(unsafe { read_owned(text) }, "ab\ncd");
        tg_session_free(h);
    }

    #[test]
    fn test_mode_reads_through_ffi() {
        let h = tg_session_new(40, 10);
        let s = unsafe { &*h };
        s.advance_bytes(b"\x1b[?1h\x1b[?2004h\x1b[?1002h\x1b[?1004h\x1b[4 q");
        assert_eq!(tg_session_cursor_keys_app(h), 1);
        assert_eq!(tg_session_bracketed_paste(h), 1);
        assert_eq!(tg_session_mouse_mode(h), 3);
        assert_eq!(tg_session_focus_events(h), 1);
        assert_eq!(tg_session_cursor_shape(h), 1);
        tg_session_free(h);
    }

    #[test]
    fn test_command_records_through_ffi() {
        let h = tg_session_new(40, 10);
        let s = unsafe { &*h };
        s.advance_bytes(b"\x1b]133;A\x07$ \x1b]133;B\x07ls\r\n\x1b]133;C\x07out\r\n\x1b]133;D;2\x07");
        assert_eq!(tg_session_command_count(h), 1);
        assert_eq!(tg_session_command_prompt_row(h, 0), 0);
        assert_eq!(tg_session_command_exit_code(h, 0), 2);
        assert_eq!(tg_session_command_exit_code(h, 5), -1);
        tg_session_free(h);
    }

    #[test]
    fn test_config_snapshot_through_ffi() {
        let h = tg_session_new(40, 10);
        assert!(tg_session_font_size(h) > 0.0);
        let family = tg_session_font_family(h);
        assert!(!unsafe { read_owned(family) }.is_empty());
        assert!(tg_session_window_width(h) > 0);
        tg_session_free(h);
    }
}
