//! Polymorphic cell colors, resolved against the active palette at read
//! time. Cells store a tag, never a resolved value, so OSC 4 palette edits
//! retroactively recolor everything on screen.

/// A concrete 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packed 0x00RRGGBB, the wire format of the C façade.
    pub fn packed(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed16(u8),
    Indexed256(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    /// Map an SGR basic color parameter (30-37, 90-97 and the background
    /// forms) to its 16-color index.
    pub fn from_sgr_base(param: u16) -> Option<Self> {
        match param {
            30..=37 => Some(Color::Indexed16((param - 30) as u8)),
            90..=97 => Some(Color::Indexed16((param - 90 + 8) as u8)),
            40..=47 => Some(Color::Indexed16((param - 40) as u8)),
            100..=107 => Some(Color::Indexed16((param - 100 + 8) as u8)),
            _ => None,
        }
    }
}

/// Standard xterm 16-color palette.
const ANSI_COLORS: [Rgb; 16] = [
    Rgb::new(0, 0, 0),
    Rgb::new(205, 49, 49),
    Rgb::new(13, 188, 121),
    Rgb::new(229, 229, 16),
    Rgb::new(36, 114, 200),
    Rgb::new(188, 63, 188),
    Rgb::new(17, 168, 205),
    Rgb::new(204, 204, 204),
    Rgb::new(102, 102, 102),
    Rgb::new(241, 76, 76),
    Rgb::new(35, 209, 139),
    Rgb::new(245, 245, 67),
    Rgb::new(59, 142, 234),
    Rgb::new(214, 112, 214),
    Rgb::new(41, 184, 219),
    Rgb::new(242, 242, 242),
];

pub const DEFAULT_FG: Rgb = Rgb::new(204, 204, 204);
pub const DEFAULT_BG: Rgb = Rgb::new(0, 0, 0);

/// The 256-entry indexed palette plus the default foreground/background,
/// mutable via OSC 4/10/11 and restored by OSC 104 / RIS.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: [Rgb; 256],
    pub default_fg: Rgb,
    pub default_bg: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        let mut colors = [Rgb::new(0, 0, 0); 256];
        for (i, slot) in colors.iter_mut().enumerate() {
            *slot = builtin_color(i as u8);
        }
        Self {
            colors,
            default_fg: DEFAULT_FG,
            default_bg: DEFAULT_BG,
        }
    }
}

impl Palette {
    pub fn color(&self, idx: u8) -> Rgb {
        self.colors[idx as usize]
    }

    pub fn set_color(&mut self, idx: u8, rgb: Rgb) {
        self.colors[idx as usize] = rgb;
    }

    pub fn reset_color(&mut self, idx: u8) {
        self.colors[idx as usize] = builtin_color(idx);
    }

    pub fn reset_all(&mut self) {
        for i in 0..=255u8 {
            self.reset_color(i);
        }
    }

    /// Resolve a cell color tag to concrete RGB. `is_fg` picks the default.
    pub fn resolve(&self, color: Color, is_fg: bool) -> Rgb {
        match color {
            Color::Default => {
                if is_fg {
                    self.default_fg
                } else {
                    self.default_bg
                }
            }
            Color::Indexed16(i) => self.colors[(i & 0x0f) as usize],
            Color::Indexed256(i) => self.colors[i as usize],
            Color::Rgb(r, g, b) => Rgb::new(r, g, b),
        }
    }
}

/// Built-in value for a 256-palette index: the 16 ANSI colors, the 6x6x6
/// cube, then the grayscale ramp.
fn builtin_color(idx: u8) -> Rgb {
    match idx {
        0..=15 => ANSI_COLORS[idx as usize],
        16..=231 => {
            let i = (idx - 16) as usize;
            let to_val = |v: usize| if v == 0 { 0u8 } else { (55 + 40 * v) as u8 };
            Rgb::new(
                to_val(i / 36),
                to_val((i / 6) % 6),
                to_val(i % 6),
            )
        }
        232..=255 => {
            let v = 8 + 10 * (idx - 232);
            Rgb::new(v, v, v)
        }
    }
}

/// Parse an OSC color specification: `rgb:RR/GG/BB` (1-4 hex digits per
/// channel, scaled) or `#RRGGBB`.
pub fn parse_color_spec(spec: &str) -> Option<Rgb> {
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        return Some(Rgb::new(r, g, b));
    }
    if let Some(rest) = spec.strip_prefix("rgb:") {
        let mut parts = rest.split('/');
        let r = scale_channel(parts.next()?)?;
        let g = scale_channel(parts.next()?)?;
        let b = scale_channel(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        return Some(Rgb::new(r, g, b));
    }
    None
}

/// Scale an X11 hex channel of 1-4 digits to 8 bits.
fn scale_channel(s: &str) -> Option<u8> {
    if s.is_empty() || s.len() > 4 {
        return None;
    }
    let v = u16::from_str_radix(s, 16).ok()? as u32;
    let max = (1u32 << (4 * s.len() as u32)) - 1;
    Some((v * 255 / max) as u8)
}

/// Format a reply payload for OSC color queries.
pub fn format_color_spec(rgb: Rgb) -> String {
    format!(
        "rgb:{:02x}{:02x}/{:02x}{:02x}/{:02x}{:02x}",
        rgb.r, rgb.r, rgb.g, rgb.g, rgb.b, rgb.b
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed() {
        assert_eq!(Rgb::new(0x12, 0x34, 0x56).packed(), 0x123456);
    }

    #[test]
    fn test_builtin_ansi() {
        let p = Palette::default();
        assert_eq!(p.color(1), Rgb::new(205, 49, 49));
        assert_eq!(p.color(15), Rgb::new(242, 242, 242));
    }

    #[test]
    fn test_builtin_cube() {
        // 16 = (0,0,0), 196 = pure red, 231 = white corner
        assert_eq!(builtin_color(16), Rgb::new(0, 0, 0));
        assert_eq!(builtin_color(196), Rgb::new(255, 0, 0));
        assert_eq!(builtin_color(231), Rgb::new(255, 255, 255));
    }

    #[test]
    fn test_builtin_grayscale() {
        assert_eq!(builtin_color(232), Rgb::new(8, 8, 8));
        assert_eq!(builtin_color(255), Rgb::new(238, 238, 238));
    }

    #[test]
    fn test_resolve_defaults() {
        let p = Palette::default();
        assert_eq!(p.resolve(Color::Default, true), DEFAULT_FG);
        assert_eq!(p.resolve(Color::Default, false), DEFAULT_BG);
        assert_eq!(p.resolve(Color::Rgb(1, 2, 3), true), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_palette_set_and_reset() {
        let mut p = Palette::default();
        p.set_color(1, Rgb::new(9, 9, 9));
        assert_eq!(p.resolve(Color::Indexed16(1), true), Rgb::new(9, 9, 9));
        p.reset_color(1);
        assert_eq!(p.color(1), Rgb::new(205, 49, 49));
    }

    #[test]
    fn test_parse_hash_spec() {
        assert_eq!(parse_color_spec("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(parse_color_spec("#fff"), None);
    }

    #[test]
    fn test_parse_rgb_spec() {
        assert_eq!(parse_color_spec("rgb:ff/80/00"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(parse_color_spec("rgb:ffff/0000/8080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(parse_color_spec("rgb:f/0/f"), Some(Rgb::new(255, 0, 255)));
        assert_eq!(parse_color_spec("rgb:zz/00/00"), None);
    }

    #[test]
    fn test_format_roundtrip() {
        let spec = format_color_spec(Rgb::new(0xab, 0xcd, 0xef));
        assert_eq!(parse_color_spec(&spec), Some(Rgb::new(0xab, 0xcd, 0xef)));
    }
}
