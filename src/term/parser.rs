//! Byte-at-a-time VT parser following Paul Williams' DEC ANSI state
//! diagram (vt100.net/emu/dec_ansi_parser), with UTF-8 decoding in front
//! of the print path.
//!
//! The parser owns no terminal state; every completed sequence is handed
//! to a [`Perform`] implementation. Malformed input degrades to
//! replacement characters or silent discard; the parser itself never
//! fails and every (state, byte) transition is O(1).

const MAX_PARAMS: usize = 16;
const MAX_INTERMEDIATES: usize = 4;
const MAX_OSC_LEN: usize = 4096;
const MAX_DCS_LEN: usize = 4096;

/// Receiver for parsed terminal actions.
pub trait Perform {
    fn print(&mut self, ch: char);
    fn execute(&mut self, byte: u8);
    fn csi_dispatch(
        &mut self,
        params: &[u16],
        intermediates: &[u8],
        private: Option<u8>,
        final_byte: u8,
    );
    fn esc_dispatch(&mut self, intermediates: &[u8], final_byte: u8);
    fn osc_dispatch(&mut self, num: u16, payload: &[u8]);
    fn dcs_hook(&mut self, _params: &[u16], _intermediates: &[u8], _final_byte: u8) {}
    fn dcs_put(&mut self, _byte: u8) {}
    fn dcs_unhook(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    OscString,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    SosPmApcString,
}

pub struct Parser {
    state: State,
    params: Vec<u16>,
    param: u16,
    intermediates: Vec<u8>,
    private: Option<u8>,
    osc: Vec<u8>,
    dcs_len: usize,
    utf8: Utf8Decoder,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            params: Vec::with_capacity(MAX_PARAMS),
            param: 0,
            intermediates: Vec::with_capacity(MAX_INTERMEDIATES),
            private: None,
            osc: Vec::with_capacity(256),
            dcs_len: 0,
            utf8: Utf8Decoder::new(),
        }
    }

    /// Feed a slice of bytes.
    pub fn feed<P: Perform>(&mut self, performer: &mut P, bytes: &[u8]) {
        for &b in bytes {
            self.advance(performer, b);
        }
    }

    /// Feed a single byte.
    pub fn advance<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        // Transitions valid from any state.
        match byte {
            0x18 | 0x1a => {
                self.abort_string(performer);
                self.flush_pending_utf8(performer);
                self.clear();
                self.state = State::Ground;
                performer.execute(byte);
                return;
            }
            0x1b => {
                self.finish_string(performer);
                self.flush_pending_utf8(performer);
                self.clear();
                self.state = State::Escape;
                return;
            }
            _ => {}
        }

        match self.state {
            State::Ground => self.ground(performer, byte),
            State::Escape => self.escape(performer, byte),
            State::EscapeIntermediate => self.escape_intermediate(performer, byte),
            State::CsiEntry => self.csi_entry(performer, byte),
            State::CsiParam => self.csi_param(performer, byte),
            State::CsiIntermediate => self.csi_intermediate(performer, byte),
            State::CsiIgnore => self.csi_ignore(performer, byte),
            State::OscString => self.osc_string(performer, byte),
            State::DcsEntry => self.dcs_entry(performer, byte),
            State::DcsParam => self.dcs_param(performer, byte),
            State::DcsIntermediate => self.dcs_intermediate(performer, byte),
            State::DcsPassthrough => self.dcs_passthrough(performer, byte),
            State::DcsIgnore => self.dcs_ignore(byte),
            State::SosPmApcString => self.sos_pm_apc(byte),
        }
    }

    fn clear(&mut self) {
        self.params.clear();
        self.param = 0;
        self.intermediates.clear();
        self.private = None;
        self.dcs_len = 0;
    }

    /// An open control string interrupted by ESC still dispatches what it
    /// collected (ESC is usually the first half of ST).
    fn finish_string<P: Perform>(&mut self, performer: &mut P) {
        match self.state {
            State::OscString => self.dispatch_osc(performer),
            State::DcsPassthrough => performer.dcs_unhook(),
            _ => {}
        }
    }

    /// CAN/SUB discard an open control string without dispatching it.
    fn abort_string<P: Perform>(&mut self, performer: &mut P) {
        if self.state == State::DcsPassthrough {
            performer.dcs_unhook();
        }
        self.osc.clear();
    }

    /// A control byte arriving mid-codepoint invalidates the sequence.
    fn flush_pending_utf8<P: Perform>(&mut self, performer: &mut P) {
        if self.utf8.pending() {
            self.utf8.reset();
            performer.print(char::REPLACEMENT_CHARACTER);
        }
    }

    fn push_param(&mut self) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(self.param);
        }
        self.param = 0;
    }

    fn collect(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        }
    }

    fn ground<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        if self.utf8.pending() {
            match self.utf8.feed(byte) {
                Utf8Step::Pending => {}
                Utf8Step::Emit(ch) => performer.print(ch),
                Utf8Step::Invalid { retry } => {
                    performer.print(char::REPLACEMENT_CHARACTER);
                    if retry {
                        self.ground(performer, byte);
                    }
                }
            }
            return;
        }
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x20..=0x7e => performer.print(byte as char),
            0x7f => {}
            0x80..=0xff => match self.utf8.feed(byte) {
                Utf8Step::Pending => {}
                Utf8Step::Emit(ch) => performer.print(ch),
                Utf8Step::Invalid { .. } => performer.print(char::REPLACEMENT_CHARACTER),
            },
        }
    }

    fn escape<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x20..=0x2f => {
                self.collect(byte);
                self.state = State::EscapeIntermediate;
            }
            0x50 => {
                self.clear();
                self.state = State::DcsEntry;
            }
            0x58 | 0x5e | 0x5f => self.state = State::SosPmApcString,
            0x5b => {
                self.clear();
                self.state = State::CsiEntry;
            }
            0x5d => {
                self.osc.clear();
                self.state = State::OscString;
            }
            0x30..=0x7e => {
                self.state = State::Ground;
                performer.esc_dispatch(&self.intermediates, byte);
            }
            0x7f => {}
            _ => self.state = State::Ground,
        }
    }

    fn escape_intermediate<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x20..=0x2f => self.collect(byte),
            0x30..=0x7e => {
                self.state = State::Ground;
                performer.esc_dispatch(&self.intermediates, byte);
            }
            0x7f => {}
            _ => self.state = State::Ground,
        }
    }

    fn csi_entry<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x20..=0x2f => {
                self.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x30..=0x39 => {
                self.param = (byte - b'0') as u16;
                self.state = State::CsiParam;
            }
            0x3a => self.state = State::CsiIgnore,
            0x3b => {
                self.push_param();
                self.state = State::CsiParam;
            }
            0x3c..=0x3f => {
                self.private = Some(byte);
                self.state = State::CsiParam;
            }
            0x40..=0x7e => {
                self.state = State::Ground;
                performer.csi_dispatch(&self.params, &self.intermediates, self.private, byte);
            }
            _ => {}
        }
    }

    fn csi_param<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x30..=0x39 => {
                self.param = self
                    .param
                    .saturating_mul(10)
                    .saturating_add((byte - b'0') as u16);
            }
            0x3b => self.push_param(),
            0x3a | 0x3c..=0x3f => self.state = State::CsiIgnore,
            0x20..=0x2f => {
                self.push_param();
                self.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7e => {
                self.push_param();
                self.state = State::Ground;
                performer.csi_dispatch(&self.params, &self.intermediates, self.private, byte);
            }
            _ => {}
        }
    }

    fn csi_intermediate<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x20..=0x2f => self.collect(byte),
            0x30..=0x3f => self.state = State::CsiIgnore,
            0x40..=0x7e => {
                self.state = State::Ground;
                performer.csi_dispatch(&self.params, &self.intermediates, self.private, byte);
            }
            _ => {}
        }
    }

    fn csi_ignore<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => performer.execute(byte),
            0x40..=0x7e => self.state = State::Ground,
            _ => {}
        }
    }

    fn osc_string<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x07 | 0x9c => {
                self.dispatch_osc(performer);
                self.state = State::Ground;
            }
            0x00..=0x1f | 0x7f => {}
            _ => {
                if self.osc.len() < MAX_OSC_LEN {
                    self.osc.push(byte);
                }
            }
        }
    }

    fn dispatch_osc<P: Perform>(&mut self, performer: &mut P) {
        let split = self.osc.iter().position(|&b| b == b';');
        let digits = &self.osc[..split.unwrap_or(self.osc.len())];
        let all_digits = !digits.is_empty() && digits.iter().all(u8::is_ascii_digit);
        let num = if all_digits {
            digits.iter().fold(0u16, |acc, &d| {
                acc.saturating_mul(10).saturating_add((d - b'0') as u16)
            })
        } else {
            0
        };
        let payload = match split {
            Some(i) if all_digits || digits.is_empty() => &self.osc[i + 1..],
            None if all_digits => &[],
            _ => &self.osc[..],
        };
        performer.osc_dispatch(num, payload);
        self.osc.clear();
    }

    fn dcs_entry<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => {}
            0x20..=0x2f => {
                self.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x30..=0x39 => {
                self.param = (byte - b'0') as u16;
                self.state = State::DcsParam;
            }
            0x3a => self.state = State::DcsIgnore,
            0x3b => {
                self.push_param();
                self.state = State::DcsParam;
            }
            0x3c..=0x3f => {
                self.private = Some(byte);
                self.state = State::DcsParam;
            }
            0x40..=0x7e => {
                self.push_param();
                self.state = State::DcsPassthrough;
                performer.dcs_hook(&self.params, &self.intermediates, byte);
            }
            _ => {}
        }
    }

    fn dcs_param<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => {}
            0x30..=0x39 => {
                self.param = self
                    .param
                    .saturating_mul(10)
                    .saturating_add((byte - b'0') as u16);
            }
            0x3b => self.push_param(),
            0x3a | 0x3c..=0x3f => self.state = State::DcsIgnore,
            0x20..=0x2f => {
                self.push_param();
                self.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7e => {
                self.push_param();
                self.state = State::DcsPassthrough;
                performer.dcs_hook(&self.params, &self.intermediates, byte);
            }
            _ => {}
        }
    }

    fn dcs_intermediate<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x00..=0x1f => {}
            0x20..=0x2f => self.collect(byte),
            0x30..=0x3f => self.state = State::DcsIgnore,
            0x40..=0x7e => {
                self.state = State::DcsPassthrough;
                performer.dcs_hook(&self.params, &self.intermediates, byte);
            }
            _ => {}
        }
    }

    fn dcs_passthrough<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x9c => {
                performer.dcs_unhook();
                self.state = State::Ground;
            }
            0x7f => {}
            _ => {
                if self.dcs_len < MAX_DCS_LEN {
                    self.dcs_len += 1;
                    performer.dcs_put(byte);
                }
            }
        }
    }

    fn dcs_ignore(&mut self, byte: u8) {
        if byte == 0x9c {
            self.state = State::Ground;
        }
    }

    fn sos_pm_apc(&mut self, byte: u8) {
        if byte == 0x9c {
            self.state = State::Ground;
        }
    }
}

/// Streaming UTF-8 decoder; continuation bytes may arrive in separate
/// reads. Overlong encodings and bad continuations yield one replacement
/// character, then the decoder resynchronizes on the offending byte.
struct Utf8Decoder {
    buf: [u8; 4],
    len: u8,
    need: u8,
}

enum Utf8Step {
    Pending,
    Emit(char),
    Invalid { retry: bool },
}

impl Utf8Decoder {
    fn new() -> Self {
        Self {
            buf: [0; 4],
            len: 0,
            need: 0,
        }
    }

    fn pending(&self) -> bool {
        self.need > 0
    }

    fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }

    fn feed(&mut self, byte: u8) -> Utf8Step {
        if self.need == 0 {
            let need = match byte {
                0x00..=0x7f => return Utf8Step::Emit(byte as char),
                0xc2..=0xdf => 2,
                0xe0..=0xef => 3,
                0xf0..=0xf4 => 4,
                _ => return Utf8Step::Invalid { retry: false },
            };
            self.buf[0] = byte;
            self.len = 1;
            self.need = need;
            Utf8Step::Pending
        } else if byte & 0xc0 == 0x80 {
            self.buf[self.len as usize] = byte;
            self.len += 1;
            if self.len == self.need {
                let decoded = std::str::from_utf8(&self.buf[..self.len as usize])
                    .ok()
                    .and_then(|s| s.chars().next());
                self.reset();
                match decoded {
                    Some(ch) => Utf8Step::Emit(ch),
                    None => Utf8Step::Invalid { retry: false },
                }
            } else {
                Utf8Step::Pending
            }
        } else {
            self.reset();
            Utf8Step::Invalid { retry: true }
        }
    }
}
