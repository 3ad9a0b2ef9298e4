//! Buffer renderer: emulator grid lines to styled byte sequences.
//!
//! Walks a line of emulator cells and emits the cell text with SGR
//! run-length compression: an escape sequence is written only when a
//! cell's style differs from the previously emitted one. Each emitted
//! sequence carries a full reset prefix followed by the explicit
//! attributes; incremental removal of individual attributes (SGR 22 to
//! cancel bold, etc.) is terminal-dependent and error-prone, while
//! reset + replay is universally correct.

use std::fmt::Write as _;

use alacritty_terminal::term::cell::{Cell, Flags};
use alacritty_terminal::vte::ansi::{Color, NamedColor};

use crate::ansi::RESET;
use crate::emulator::Emulator;

/// Foreground or background color as the renderer encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpec {
    /// Terminal default (no SGR parameter beyond the reset).
    #[default]
    Default,
    /// Classic 16-color palette index (0-15).
    Palette16(u8),
    /// 256-color palette index (16-255).
    Palette256(u8),
    /// Truecolor.
    Rgb(u8, u8, u8),
}

/// Visual style of a single cell.
///
/// Compared structurally for SGR run-length compression; the ten fields
/// are exactly what the emitted escape sequence encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellStyle {
    /// Foreground color.
    pub fg: ColorSpec,
    /// Background color.
    pub bg: ColorSpec,
    /// SGR 1.
    pub bold: bool,
    /// SGR 2.
    pub dim: bool,
    /// SGR 3.
    pub italic: bool,
    /// SGR 4.
    pub underline: bool,
    /// SGR 7.
    pub inverse: bool,
    /// SGR 9.
    pub strikethrough: bool,
}

impl CellStyle {
    /// Extract the visual style from a terminal cell.
    ///
    /// Structural flags (wide-char markers, line wrap) are not styles
    /// and are ignored.
    pub fn from_cell(cell: &Cell) -> Self {
        Self {
            fg: color_spec(cell.fg),
            bg: color_spec(cell.bg),
            bold: cell.flags.contains(Flags::BOLD),
            dim: cell.flags.contains(Flags::DIM),
            italic: cell.flags.contains(Flags::ITALIC),
            underline: cell.flags.contains(Flags::UNDERLINE),
            inverse: cell.flags.contains(Flags::INVERSE),
            strikethrough: cell.flags.contains(Flags::STRIKEOUT),
        }
    }

    /// Whether this is the post-reset default style.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Emit the SGR sequence selecting this style from any prior state.
    ///
    /// Always `CSI 0 ; <attrs> ; <fg> ; <bg> m`; the reset prefix makes
    /// the previous state irrelevant.
    pub fn write_sgr(&self, out: &mut Vec<u8>) {
        let mut params = String::from("0");

        if self.bold {
            params.push_str(";1");
        }
        if self.dim {
            params.push_str(";2");
        }
        if self.italic {
            params.push_str(";3");
        }
        if self.underline {
            params.push_str(";4");
        }
        if self.inverse {
            params.push_str(";7");
        }
        if self.strikethrough {
            params.push_str(";9");
        }

        match self.fg {
            ColorSpec::Default => {}
            ColorSpec::Palette16(n) if n < 8 => {
                let _ = write!(params, ";{}", 30 + u16::from(n));
            }
            ColorSpec::Palette16(n) => {
                let _ = write!(params, ";{}", 90 + u16::from(n & 7));
            }
            ColorSpec::Palette256(n) => {
                let _ = write!(params, ";38;5;{n}");
            }
            ColorSpec::Rgb(r, g, b) => {
                let _ = write!(params, ";38;2;{r};{g};{b}");
            }
        }

        match self.bg {
            ColorSpec::Default => {}
            ColorSpec::Palette16(n) if n < 8 => {
                let _ = write!(params, ";{}", 40 + u16::from(n));
            }
            ColorSpec::Palette16(n) => {
                let _ = write!(params, ";{}", 100 + u16::from(n & 7));
            }
            ColorSpec::Palette256(n) => {
                let _ = write!(params, ";48;5;{n}");
            }
            ColorSpec::Rgb(r, g, b) => {
                let _ = write!(params, ";48;2;{r};{g};{b}");
            }
        }

        out.extend_from_slice(b"\x1b[");
        out.extend_from_slice(params.as_bytes());
        out.push(b'm');
    }
}

/// Map an alacritty color to the renderer's encoding.
fn color_spec(color: Color) -> ColorSpec {
    match color {
        Color::Named(name) => named_spec(name),
        Color::Indexed(i) if i < 16 => ColorSpec::Palette16(i),
        Color::Indexed(i) => ColorSpec::Palette256(i),
        Color::Spec(rgb) => ColorSpec::Rgb(rgb.r, rgb.g, rgb.b),
    }
}

/// Named colors map onto the 16-color palette; the default
/// foreground/background and their dim/bright variants carry no SGR
/// parameter of their own, since the reset prefix already selects them.
fn named_spec(name: NamedColor) -> ColorSpec {
    match name {
        NamedColor::Black => ColorSpec::Palette16(0),
        NamedColor::Red => ColorSpec::Palette16(1),
        NamedColor::Green => ColorSpec::Palette16(2),
        NamedColor::Yellow => ColorSpec::Palette16(3),
        NamedColor::Blue => ColorSpec::Palette16(4),
        NamedColor::Magenta => ColorSpec::Palette16(5),
        NamedColor::Cyan => ColorSpec::Palette16(6),
        NamedColor::White => ColorSpec::Palette16(7),
        NamedColor::BrightBlack => ColorSpec::Palette16(8),
        NamedColor::BrightRed => ColorSpec::Palette16(9),
        NamedColor::BrightGreen => ColorSpec::Palette16(10),
        NamedColor::BrightYellow => ColorSpec::Palette16(11),
        NamedColor::BrightBlue => ColorSpec::Palette16(12),
        NamedColor::BrightMagenta => ColorSpec::Palette16(13),
        NamedColor::BrightCyan => ColorSpec::Palette16(14),
        NamedColor::BrightWhite => ColorSpec::Palette16(15),
        NamedColor::Foreground
        | NamedColor::Background
        | NamedColor::Cursor
        | NamedColor::BrightForeground
        | NamedColor::DimForeground
        | NamedColor::DimBlack
        | NamedColor::DimRed
        | NamedColor::DimGreen
        | NamedColor::DimYellow
        | NamedColor::DimBlue
        | NamedColor::DimMagenta
        | NamedColor::DimCyan
        | NamedColor::DimWhite => ColorSpec::Default,
    }
}

/// Render one absolute grid line as styled bytes.
///
/// Wide-char spacer cells are skipped (the base glyph was already
/// emitted); zero-width combining characters are appended after their
/// base character. A line that is entirely default-styled whitespace
/// renders as the empty slice so repaints of blank rows emit no SGR
/// noise. Non-empty output is terminated with a reset.
pub fn render_line(emulator: &Emulator, y: usize) -> Vec<u8> {
    let cols = emulator.cols() as usize;
    let mut out = Vec::with_capacity(cols + 16);
    let mut current = CellStyle::default();
    let mut has_content = false;
    let mut char_buf = [0u8; 4];

    for col in 0..cols {
        let Some(cell) = emulator.cell(y, col) else {
            return Vec::new();
        };

        if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
            continue;
        }

        let style = CellStyle::from_cell(cell);
        if style != current {
            style.write_sgr(&mut out);
            current = style;
        }

        // An unwritten cell holds a space.
        let c = if cell.c == '\0' { ' ' } else { cell.c };
        out.extend_from_slice(c.encode_utf8(&mut char_buf).as_bytes());

        if let Some(zerowidth) = cell.zerowidth() {
            for &zw in zerowidth {
                out.extend_from_slice(zw.encode_utf8(&mut char_buf).as_bytes());
            }
        }

        if c != ' ' || !style.is_default() {
            has_content = true;
        }
    }

    if !has_content {
        return Vec::new();
    }

    out.extend_from_slice(RESET);
    out
}

/// Render the visible window of an emulator buffer.
///
/// Produces `min(visible_rows, emulator.rows)` lines starting at
/// `max(0, base_y - scroll_offset)`; absolute lines past the end of the
/// buffer come back empty.
pub fn render_buffer(emulator: &Emulator, scroll_offset: usize, visible_rows: usize) -> Vec<Vec<u8>> {
    let start = emulator.base_y().saturating_sub(scroll_offset);
    let count = visible_rows.min(emulator.rows() as usize);
    (0..count).map(|i| render_line(emulator, start + i)).collect()
}
