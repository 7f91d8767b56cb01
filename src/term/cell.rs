use bitflags::bitflags;

use crate::term::color::Color;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellFlags: u16 {
        const BOLD        = 1 << 0;
        const DIM         = 1 << 1;
        const ITALIC      = 1 << 2;
        const UNDERLINE   = 1 << 3;
        const BLINK       = 1 << 4;
        const REVERSE     = 1 << 5;
        const HIDDEN      = 1 << 6;
        const STRIKE      = 1 << 7;
        /// First column of a double-width character.
        const WIDE        = 1 << 8;
        /// Trailing column of a double-width character; carries no character.
        const WIDE_SPACER = 1 << 9;
    }
}

impl Default for CellFlags {
    fn default() -> Self {
        CellFlags::empty()
    }
}

impl CellFlags {
    /// The SGR-controlled styling bits, without the width markers.
    pub fn style(self) -> CellFlags {
        self & !(CellFlags::WIDE | CellFlags::WIDE_SPACER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
    pub flags: CellFlags,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: '\0',
            fg: Color::Default,
            bg: Color::Default,
            flags: CellFlags::empty(),
        }
    }
}

impl Cell {
    /// Erased cell carrying the current background (BCE).
    pub fn blank(bg: Color) -> Self {
        Self {
            ch: '\0',
            fg: Color::Default,
            bg,
            flags: CellFlags::empty(),
        }
    }

    pub fn is_wide(&self) -> bool {
        self.flags.contains(CellFlags::WIDE)
    }

    pub fn is_spacer(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_SPACER)
    }

    /// True for cells that never received a character.
    pub fn is_empty(&self) -> bool {
        self.ch == '\0' && !self.is_spacer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cell_is_empty() {
        let c = Cell::default();
        assert!(c.is_empty());
        assert!(!c.is_wide());
        assert_eq!(c.fg, Color::Default);
    }

    #[test]
    fn test_blank_keeps_background() {
        let c = Cell::blank(Color::Indexed256(17));
        assert!(c.is_empty());
        assert_eq!(c.bg, Color::Indexed256(17));
    }

    #[test]
    fn test_style_masks_width_bits() {
        let f = CellFlags::BOLD | CellFlags::WIDE | CellFlags::WIDE_SPACER;
        assert_eq!(f.style(), CellFlags::BOLD);
    }
}
