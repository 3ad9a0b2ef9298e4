//! Headless terminal emulator wrapping [`alacritty_terminal`].
//!
//! Provides [`Emulator`], a thin wrapper around [`Term`] and
//! [`Processor`] presenting the narrow surface the rest of the core
//! needs: `process(bytes)`, `resize(cols, rows)`, and read-only access
//! to dimensions, cursor, and grid lines addressed by an absolute line
//! index.
//!
//! # Line addressing
//!
//! The emulator exposes `base_y`, the number of lines that have
//! scrolled off the top of the viewport (alacritty's grid history).
//! Absolute indices run `0..total_lines()`: index `0` is the oldest
//! retained history line and `base_y()..` addresses the live viewport.
//! The buffer renderer repaints from `base_y - scroll_offset`.

use alacritty_terminal::event::EventListener;
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line, Point};
use alacritty_terminal::term::cell::Cell;
use alacritty_terminal::term::{Config, Term, TermMode};
use alacritty_terminal::vte::ansi::Processor;

/// Minimum rows/columns clamped on construction and resize.
const MIN_DIM: u16 = 1;

/// Minimal [`Dimensions`] implementor for constructing and resizing a
/// [`Term`] without pulling in alacritty's full `SizeInfo`.
#[derive(Debug, Clone, Copy)]
struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for TermSize {
    fn columns(&self) -> usize {
        self.columns
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn total_lines(&self) -> usize {
        // Viewport height is sufficient for construction/resize;
        // scrollback grows dynamically via Config::scrolling_history.
        self.screen_lines
    }
}

/// No-op event listener.
///
/// Title changes, bell, and clipboard events from wrapped sessions are
/// intentionally discarded; the host terminal renders only what the
/// compositor writes.
#[derive(Debug, Clone, Copy)]
pub struct NoopListener;

impl EventListener for NoopListener {
    fn send_event(&self, _event: alacritty_terminal::event::Event) {}
}

/// Per-session headless VT/xterm emulator.
///
/// [`Term`] has no direct byte-ingestion method; bytes are driven
/// through a [`Processor`] state machine. This wrapper bundles both so
/// the session manager holds a single owned value.
pub struct Emulator {
    term: Term<NoopListener>,
    processor: Processor,
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator")
            .field("cols", &self.cols())
            .field("rows", &self.rows())
            .field("base_y", &self.base_y())
            .finish_non_exhaustive()
    }
}

impl Emulator {
    /// Create an emulator at `cols` x `rows` with a bounded scrollback.
    pub fn new(cols: u16, rows: u16, scrollback: usize) -> Self {
        let size = TermSize {
            columns: cols.max(MIN_DIM) as usize,
            screen_lines: rows.max(MIN_DIM) as usize,
        };
        let config = Config {
            scrolling_history: scrollback,
            // Accept kitty keyboard push/pop sequences so TermMode tracks
            // them; the compositor strips them from pass-through.
            kitty_keyboard: true,
            ..Config::default()
        };
        let term = Term::new(config, &size, NoopListener);
        Self {
            term,
            processor: Processor::new(),
        }
    }

    /// Feed raw PTY bytes into the emulator.
    ///
    /// Hot path: batched chunks from the session manager arrive here and
    /// update the grid, cursor, and mode state.
    pub fn process(&mut self, data: &[u8]) {
        self.processor.advance(&mut self.term, data);
    }

    /// Resize to new dimensions, reflowing the grid.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let size = TermSize {
            columns: cols.max(MIN_DIM) as usize,
            screen_lines: rows.max(MIN_DIM) as usize,
        };
        self.term.resize(size);
    }

    /// Viewport width in columns.
    pub fn cols(&self) -> u16 {
        self.term.grid().columns() as u16
    }

    /// Viewport height in rows.
    pub fn rows(&self) -> u16 {
        self.term.grid().screen_lines() as u16
    }

    /// Number of lines that have scrolled off the top of the viewport.
    pub fn base_y(&self) -> usize {
        self.term.grid().history_size()
    }

    /// Total addressable lines: retained history plus the viewport.
    pub fn total_lines(&self) -> usize {
        self.base_y() + self.term.grid().screen_lines()
    }

    /// Cursor position as `(col, row)`, zero-indexed, viewport-relative.
    pub fn cursor(&self) -> (u16, u16) {
        let point = self.term.grid().cursor.point;
        (point.column.0 as u16, point.line.0.max(0) as u16)
    }

    /// Whether the session has hidden its cursor (`\x1b[?25l`).
    pub fn cursor_hidden(&self) -> bool {
        !self.term.mode().contains(TermMode::SHOW_CURSOR)
    }

    /// Read the cell at absolute line `y`, column `col`.
    ///
    /// Returns `None` when either coordinate is out of range. Absolute
    /// line `y < base_y` addresses history; alacritty stores history at
    /// negative [`Line`] indices.
    pub fn cell(&self, y: usize, col: usize) -> Option<&Cell> {
        if y >= self.total_lines() || col >= self.term.grid().columns() {
            return None;
        }
        let line = Line(y as i32 - self.base_y() as i32);
        Some(&self.term.grid()[Point::new(line, Column(col))])
    }

    /// Plain-text contents of the visible viewport, rows joined by `\n`.
    ///
    /// Test helper; verifies emulator state without depending on ANSI
    /// serialization.
    pub fn contents(&self) -> String {
        let grid = self.term.grid();
        let mut out = String::new();
        for row in 0..grid.screen_lines() {
            if row > 0 {
                out.push('\n');
            }
            for col in 0..grid.columns() {
                out.push(grid[Point::new(Line(row as i32), Column(col))].c);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_emulator_has_requested_dimensions() {
        let emu = Emulator::new(80, 24, 100);
        assert_eq!(emu.cols(), 80);
        assert_eq!(emu.rows(), 24);
        assert_eq!(emu.base_y(), 0);
        assert_eq!(emu.total_lines(), 24);
    }

    #[test]
    fn zero_dimensions_are_clamped() {
        let emu = Emulator::new(0, 0, 100);
        assert_eq!(emu.cols(), 1);
        assert_eq!(emu.rows(), 1);
    }

    #[test]
    fn process_basic_text() {
        let mut emu = Emulator::new(80, 24, 100);
        emu.process(b"Hello");
        assert_eq!(emu.cell(0, 0).unwrap().c, 'H');
        assert_eq!(emu.cell(0, 4).unwrap().c, 'o');
    }

    #[test]
    fn base_y_counts_scrolled_lines() {
        let mut emu = Emulator::new(80, 4, 100);
        for i in 0..10 {
            emu.process(format!("line {i}\r\n").as_bytes());
        }
        // 10 lines plus a trailing newline on a 4-row screen.
        assert!(emu.base_y() > 0);
        assert_eq!(emu.total_lines(), emu.base_y() + 4);
        // The oldest retained line is absolute index 0.
        assert_eq!(emu.cell(0, 0).unwrap().c, 'l');
    }

    #[test]
    fn cursor_tracks_output() {
        let mut emu = Emulator::new(80, 24, 100);
        emu.process(b"ab");
        assert_eq!(emu.cursor(), (2, 0));
        emu.process(b"\r\n");
        assert_eq!(emu.cursor(), (0, 1));
    }

    #[test]
    fn cursor_visibility_follows_dectcem() {
        let mut emu = Emulator::new(80, 24, 100);
        assert!(!emu.cursor_hidden());
        emu.process(b"\x1b[?25l");
        assert!(emu.cursor_hidden());
        emu.process(b"\x1b[?25h");
        assert!(!emu.cursor_hidden());
    }

    #[test]
    fn resize_updates_dimensions() {
        let mut emu = Emulator::new(80, 24, 100);
        emu.resize(100, 30);
        assert_eq!(emu.cols(), 100);
        assert_eq!(emu.rows(), 30);
    }

    #[test]
    fn out_of_range_cell_is_none() {
        let emu = Emulator::new(80, 24, 100);
        assert!(emu.cell(24, 0).is_none());
        assert!(emu.cell(0, 80).is_none());
    }

    #[test]
    fn contents_reads_viewport() {
        let mut emu = Emulator::new(10, 2, 10);
        emu.process(b"hi");
        let contents = emu.contents();
        assert!(contents.starts_with("hi"));
    }
}
