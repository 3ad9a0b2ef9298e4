//! Screen compositor: sole owner of the host terminal.
//!
//! Installs a scroll region (DECSTBM) covering all but the bottom three
//! rows, streams the active session's PTY bytes into it (letting the
//! host terminal render and push scrolled-off lines into its native
//! scrollback), and redraws the chrome rows using cursor save/restore
//! so the in-region cursor is undisturbed.
//!
//! ```text
//! row 1 ┌────────────────────────────┐ ─┐
//!       │  pass-through / repaints   │  │ scroll region
//! row N │                            │ ─┘ (inner_rows)
//!       ├────────────────────────────┤    top border / error line
//!       │  tabs · mode · hints       │    chrome line
//!       └────────────────────────────┘    bottom border
//! ```
//!
//! Every write here is best-effort: the host terminal may already be in
//! an inconsistent state, so failures are logged and the next render
//! tries again.

use std::io::Write;

use crate::ansi;
use crate::constants::CHROME_ROWS;
use crate::emulator::Emulator;
use crate::render::render_line;
use crate::status::SessionStatus;
use crate::store::Mode;

/// One tab in the chrome line.
#[derive(Debug, Clone)]
pub struct TabView {
    /// Branch label shown in the tab.
    pub branch: String,
    /// Whether this is the active tab.
    pub active: bool,
    /// Exit code if the session's child has exited.
    pub exit_code: Option<u32>,
    /// Activity status feeding the tab color.
    pub status: SessionStatus,
}

/// Everything the chrome needs to draw one frame.
#[derive(Debug, Clone, Default)]
pub struct ChromeView {
    /// Tabs in display order.
    pub tabs: Vec<TabView>,
    /// Current UI mode (drawn as a tag when non-Normal).
    pub mode: Mode,
    /// Scroll offset of the active session.
    pub scroll_offset: usize,
    /// Exit code of the active session, if exited.
    pub active_exit: Option<u32>,
    /// Transient error shown in place of the top border.
    pub error: Option<String>,
    /// Whether the in-region cursor should be visible after a chrome
    /// redraw. The active emulator owns cursor visibility; a chrome
    /// refresh must not force a hidden cursor back on.
    pub cursor_visible: bool,
}

/// Fixed keybinding hint on the right edge of the chrome line.
const KEY_HINT: &str = " ^B n:new w:close [ ]:tabs 1-9:jump \u{2191}\u{2193}:scroll q:quit ";

/// Owns stdout and the screen layout.
///
/// Generic over the sink so tests can drive it against a `Vec<u8>`.
#[derive(Debug)]
pub struct Compositor<W: Write> {
    out: W,
    total_cols: u16,
    total_rows: u16,
    inner_rows: u16,
    filter: PassthroughFilter,
    chrome_dirty: bool,
    in_modal: bool,
}

impl<W: Write> Compositor<W> {
    /// Create a compositor for a terminal of the given size.
    pub fn new(out: W, total_cols: u16, total_rows: u16) -> Self {
        let inner_rows = inner_rows_for(total_rows);
        Self {
            out,
            total_cols,
            total_rows,
            inner_rows,
            filter: PassthroughFilter::new(inner_rows),
            chrome_dirty: true,
            in_modal: false,
        }
    }

    /// Rows available to session viewports.
    pub fn inner_rows(&self) -> u16 {
        self.inner_rows
    }

    /// Columns of the host terminal.
    pub fn total_cols(&self) -> u16 {
        self.total_cols
    }

    /// Clear the screen, install the scroll region, and park the cursor
    /// at the top. Idempotent; also used after resize.
    pub fn initialize(&mut self) {
        let mut buf = Vec::new();
        buf.extend_from_slice(ansi::RESET);
        buf.extend_from_slice(ansi::CLEAR_SCREEN);
        buf.extend_from_slice(&ansi::set_scroll_region(1, self.inner_rows));
        buf.extend_from_slice(&ansi::cursor_to(1, 1));
        buf.extend_from_slice(ansi::DISABLE_FOCUS_REPORTING);
        self.write_all(&buf);
    }

    /// Release the scroll region and leave the cursor on a fresh line
    /// at the bottom of the screen.
    pub fn cleanup(&mut self) {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ansi::reset_scroll_region());
        buf.extend_from_slice(ansi::SHOW_CURSOR);
        buf.extend_from_slice(ansi::RESET);
        buf.extend_from_slice(&ansi::cursor_to(self.total_rows, 1));
        buf.push(b'\n');
        self.write_all(&buf);
    }

    /// Adopt a new terminal size and re-install the scroll region.
    pub fn resize(&mut self, total_cols: u16, total_rows: u16) {
        self.total_cols = total_cols;
        self.total_rows = total_rows;
        self.inner_rows = inner_rows_for(total_rows);
        self.filter = PassthroughFilter::new(self.inner_rows);
        self.chrome_dirty = true;
    }

    /// Request a chrome redraw before the next pass-through write.
    pub fn mark_chrome_dirty(&mut self) {
        self.chrome_dirty = true;
    }

    /// Stream filtered PTY bytes from the active session to the host.
    ///
    /// Hot path. Host-destabilizing sequences are rewritten or stripped
    /// (see [`PassthroughFilter`]). While a modal is up the bytes are
    /// dropped; the emulator still received them, and the next repaint
    /// restores the view.
    pub fn write_passthrough(&mut self, data: &[u8], chrome: &ChromeView) {
        if self.in_modal {
            return;
        }
        if self.chrome_dirty {
            self.draw_chrome(chrome);
        }
        let mut filtered = Vec::with_capacity(data.len());
        self.filter.filter(data, &mut filtered);
        self.write_all(&filtered);
    }

    /// Repaint the viewport from an emulator buffer.
    ///
    /// Used on session switch, modal exit, scroll, and resize. Resets
    /// any partial pass-through sequence so the next PTY byte starts
    /// from a known state, and leaves the cursor where the emulator
    /// says it belongs.
    pub fn repaint(&mut self, emulator: &Emulator, scroll_offset: usize) {
        self.in_modal = false;
        self.filter.reset();

        let start = emulator.base_y().saturating_sub(scroll_offset);
        let mut buf = Vec::new();
        buf.extend_from_slice(ansi::HIDE_CURSOR);
        buf.extend_from_slice(&ansi::reset_scroll_region());
        for i in 0..self.inner_rows {
            buf.extend_from_slice(&ansi::cursor_to(i + 1, 1));
            buf.extend_from_slice(ansi::CLEAR_LINE);
            buf.extend_from_slice(&render_line(emulator, start + i as usize));
            buf.extend_from_slice(ansi::RESET);
        }
        buf.extend_from_slice(&ansi::set_scroll_region(1, self.inner_rows));

        let (cx, cy) = emulator.cursor();
        buf.extend_from_slice(&ansi::cursor_to(cy.min(self.inner_rows - 1) + 1, cx + 1));
        if !emulator.cursor_hidden() && scroll_offset == 0 {
            buf.extend_from_slice(ansi::SHOW_CURSOR);
        }
        self.write_all(&buf);
    }

    /// Blank the viewport and show a hint when no session exists.
    pub fn draw_placeholder(&mut self) {
        self.in_modal = false;
        self.filter.reset();
        let lines = ["no active session", "press ^B n to create one"];
        self.draw_centered(&lines);
    }

    /// Enter a modal: clear the viewport and write centered content.
    /// The chrome stays intact underneath.
    pub fn enter_modal(&mut self, lines: &[String]) {
        self.in_modal = true;
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        self.draw_centered(&refs);
    }

    /// Leave modal state. The caller follows up with a repaint or
    /// placeholder, which re-enables pass-through.
    pub fn exit_modal(&mut self) {
        self.in_modal = false;
    }

    /// Whether a modal currently owns the viewport.
    pub fn in_modal(&self) -> bool {
        self.in_modal
    }

    fn draw_centered(&mut self, lines: &[&str]) {
        let mut buf = Vec::new();
        buf.extend_from_slice(ansi::HIDE_CURSOR);
        buf.extend_from_slice(&ansi::reset_scroll_region());
        for i in 0..self.inner_rows {
            buf.extend_from_slice(&ansi::cursor_to(i + 1, 1));
            buf.extend_from_slice(ansi::CLEAR_LINE);
        }

        let first_row = (self.inner_rows.saturating_sub(lines.len() as u16)) / 2;
        for (i, line) in lines.iter().enumerate() {
            let width = ansi::visible_width(line) as u16;
            let col = (self.total_cols.saturating_sub(width)) / 2;
            buf.extend_from_slice(&ansi::cursor_to(first_row + i as u16 + 1, col + 1));
            buf.extend_from_slice(line.as_bytes());
        }
        buf.extend_from_slice(&ansi::set_scroll_region(1, self.inner_rows));
        self.write_all(&buf);
    }

    /// Redraw the three chrome rows.
    ///
    /// Wrapped in `SAVE_CURSOR .. RESTORE_CURSOR` with the scroll region
    /// dropped and re-installed, so the in-region cursor and the host's
    /// scrollback are untouched. The cursor is hidden during the redraw
    /// and re-shown only when `view.cursor_visible` says the wrapped
    /// session wants it shown.
    pub fn draw_chrome(&mut self, view: &ChromeView) {
        self.chrome_dirty = false;

        let border_row = self.inner_rows + 1;
        let chrome_row = self.inner_rows + 2;
        let bottom_row = self.total_rows;

        let mut buf = Vec::new();
        buf.extend_from_slice(ansi::SAVE_CURSOR);
        buf.extend_from_slice(ansi::HIDE_CURSOR);
        buf.extend_from_slice(&ansi::reset_scroll_region());

        // Top border, or the transient error line.
        buf.extend_from_slice(&ansi::cursor_to(border_row, 1));
        buf.extend_from_slice(ansi::CLEAR_LINE);
        match &view.error {
            Some(message) => {
                let mut line = format!(" error: {message}");
                line.truncate(self.total_cols as usize);
                buf.extend_from_slice(&ansi::sgr("31"));
                buf.extend_from_slice(line.as_bytes());
                buf.extend_from_slice(ansi::RESET);
            }
            None => {
                buf.extend_from_slice(&ansi::sgr("90"));
                buf.extend_from_slice(border_line(self.total_cols).as_bytes());
                buf.extend_from_slice(ansi::RESET);
            }
        }

        // Status line.
        buf.extend_from_slice(&ansi::cursor_to(chrome_row, 1));
        buf.extend_from_slice(ansi::CLEAR_LINE);
        buf.extend_from_slice(self.chrome_line(view).as_bytes());

        // Bottom border.
        buf.extend_from_slice(&ansi::cursor_to(bottom_row, 1));
        buf.extend_from_slice(ansi::CLEAR_LINE);
        buf.extend_from_slice(&ansi::sgr("90"));
        buf.extend_from_slice(border_line(self.total_cols).as_bytes());
        buf.extend_from_slice(ansi::RESET);

        buf.extend_from_slice(&ansi::set_scroll_region(1, self.inner_rows));
        buf.extend_from_slice(ansi::RESTORE_CURSOR);
        if !self.in_modal && view.cursor_visible {
            buf.extend_from_slice(ansi::SHOW_CURSOR);
        }
        self.write_all(&buf);
    }

    /// Build the styled status line, padded to exactly the terminal
    /// width (escape sequences excluded from the measurement).
    pub fn chrome_line(&self, view: &ChromeView) -> String {
        let mut left = String::new();
        left.push_str(" hydra | ");

        match view.mode {
            Mode::CreatingSession => left.push_str("[CREATE] "),
            Mode::ConfirmingClose => left.push_str("[CLOSE?] "),
            Mode::Normal => {}
        }

        for (i, tab) in view.tabs.iter().enumerate() {
            if i > 0 {
                left.push('|');
            }
            let label = format!(" {}:{} ", i + 1, tab.branch);
            let style = tab_style(tab);
            left.push_str(&String::from_utf8_lossy(&ansi::sgr(style)));
            left.push_str(&label);
            left.push_str(&String::from_utf8_lossy(ansi::RESET));
        }

        if view.scroll_offset > 0 {
            left.push_str(&format!(" [scroll: -{}]", view.scroll_offset));
        }
        if let Some(code) = view.active_exit {
            left.push_str(&String::from_utf8_lossy(&ansi::sgr("31")));
            left.push_str(&format!(" exited({code})"));
            left.push_str(&String::from_utf8_lossy(ansi::RESET));
        }

        let cols = self.total_cols as usize;
        let left_width = ansi::visible_width(&left);
        let hint_width = ansi::visible_width(KEY_HINT);

        let mut line = left;
        if left_width + hint_width <= cols {
            line.push_str(&" ".repeat(cols - left_width - hint_width));
            line.push_str(&String::from_utf8_lossy(&ansi::sgr("90")));
            line.push_str(KEY_HINT);
            line.push_str(&String::from_utf8_lossy(ansi::RESET));
        } else if left_width <= cols {
            // Not enough room for the hint; pad what we have.
            line.push_str(&" ".repeat(cols - left_width));
        } else {
            // Too many tabs for the terminal: cut so the line never
            // wraps onto the border row.
            line = ansi::truncate_visible(&line, cols);
        }
        line
    }

    fn write_all(&mut self, data: &[u8]) {
        if let Err(e) = self.out.write_all(data).and_then(|()| self.out.flush()) {
            log::warn!("host terminal write failed: {e}");
        }
    }
}

/// SGR parameters for a tab label.
fn tab_style(tab: &TabView) -> &'static str {
    if tab.exit_code.is_some() {
        return "31";
    }
    if tab.active {
        return "1;37;44";
    }
    match tab.status {
        SessionStatus::Working => "32",
        SessionStatus::Waiting => "33",
        SessionStatus::Idle => "90",
    }
}

/// A full-width horizontal border.
fn border_line(cols: u16) -> String {
    "\u{2500}".repeat(cols as usize)
}

/// Viewport rows for a terminal height, never below one.
fn inner_rows_for(total_rows: u16) -> u16 {
    total_rows.saturating_sub(CHROME_ROWS).max(1)
}

// ─── Pass-through filtering ──────────────────────────────────────────────────

/// Streaming filter for host-destabilizing escape sequences.
///
/// Rewrites or strips, byte-exact and chunk-boundary safe:
/// - DECSTBM (`CSI n;m r`) → re-pinned to the compositor's own region
/// - alt-screen toggles (`CSI ? 1049/47/1047 h|l`) → stripped
/// - kitty keyboard protocol (`CSI > .. u`, `CSI < .. u`, `CSI = .. u`)
///   → stripped
/// - cursor position report (`CSI 6 n`) → stripped
/// - device attributes queries (`CSI .. c`) → stripped
/// - focus reporting (`CSI ? 1004 h|l`) → stripped
///
/// Everything else passes through unmodified. An incomplete CSI at a
/// chunk boundary is carried into the next call.
#[derive(Debug)]
pub struct PassthroughFilter {
    inner_rows: u16,
    carry: Vec<u8>,
}

/// Longest CSI we will buffer before giving up and passing it through.
const MAX_CARRY: usize = 64;

impl PassthroughFilter {
    /// Create a filter pinning DECSTBM to `[1, inner_rows]`.
    pub fn new(inner_rows: u16) -> Self {
        Self {
            inner_rows,
            carry: Vec::new(),
        }
    }

    /// Drop any buffered partial sequence (after repaints, which start
    /// the host from a known state).
    pub fn reset(&mut self) {
        self.carry.clear();
    }

    /// Filter `input`, appending the host-safe bytes to `out`.
    pub fn filter(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let data: Vec<u8> = if self.carry.is_empty() {
            input.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(input);
            joined
        };

        let mut i = 0;
        while i < data.len() {
            if data[i] != 0x1b {
                out.push(data[i]);
                i += 1;
                continue;
            }

            // ESC at the very end: wait for the next chunk.
            if i + 1 >= data.len() {
                self.carry.push(0x1b);
                return;
            }

            if data[i + 1] != b'[' {
                // Not CSI (ESC 7, OSC, charset, ...): pass the
                // introducer through; the body flows as plain bytes.
                out.push(data[i]);
                out.push(data[i + 1]);
                i += 2;
                continue;
            }

            // CSI: find the final byte.
            let param_start = i + 2;
            let mut final_pos = None;
            let mut malformed = false;
            for (j, &b) in data.iter().enumerate().skip(param_start) {
                if (0x40..=0x7e).contains(&b) {
                    final_pos = Some(j);
                    break;
                }
                if !(0x20..=0x3f).contains(&b) {
                    malformed = true;
                    final_pos = Some(j);
                    break;
                }
            }

            let Some(end) = final_pos else {
                let partial = &data[i..];
                if partial.len() > MAX_CARRY {
                    // Pathological run-on sequence: stop buffering.
                    out.extend_from_slice(partial);
                } else {
                    self.carry.extend_from_slice(partial);
                }
                return;
            };

            let seq = &data[i..=end];
            if malformed {
                out.extend_from_slice(seq);
            } else {
                self.emit_csi(seq, out);
            }
            i = end + 1;
        }
    }

    /// Decide what a complete CSI sequence becomes on the host.
    fn emit_csi(&self, seq: &[u8], out: &mut Vec<u8>) {
        let params = &seq[2..seq.len() - 1];
        let final_byte = seq[seq.len() - 1];

        match final_byte {
            // DECSTBM: the session may set any region; the host keeps ours.
            b'r' if params.iter().all(|b| b.is_ascii_digit() || *b == b';') => {
                out.extend_from_slice(&ansi::set_scroll_region(1, self.inner_rows));
            }
            // Private mode set/reset: strip alt-screen and focus toggles.
            b'h' | b'l' if params.first() == Some(&b'?') => {
                let modes = &params[1..];
                let destabilizing = modes
                    .split(|b| *b == b';')
                    .any(|m| m == b"1049" || m == b"47" || m == b"1047" || m == b"1004");
                if !destabilizing {
                    out.extend_from_slice(seq);
                }
            }
            // Kitty keyboard protocol push/pop/query.
            b'u' if matches!(params.first(), Some(&b'>') | Some(&b'<') | Some(&b'=')) => {}
            // Cursor position report request.
            b'n' if params == b"6" => {}
            // Device attributes queries (primary, secondary, tertiary).
            b'c' if params.iter().all(|b| {
                b.is_ascii_digit() || matches!(b, b'>' | b'=' | b'?' | b';')
            }) => {}
            _ => out.extend_from_slice(seq),
        }
    }
}
