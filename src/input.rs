//! Input router: prefix key, modal dispatch, PTY pass-through.
//!
//! Consumes raw stdin chunks (the terminal is in raw mode, so a chunk
//! is typically one keystroke) and translates them into
//! [`InputEffect`]s for the controller to apply. The router never
//! touches the PTY or the store directly; returning effects keeps it
//! free of borrow conflicts and directly testable.
//!
//! # Prefix state machine
//!
//! ```text
//! Inactive ──Ctrl+B──> Active ──command byte──> Inactive
//!    ^                    │
//!    └──500 ms timeout────┘  (forwards one literal Ctrl+B)
//! ```
//!
//! # ESC bundling
//!
//! A lone ESC keystroke can arrive in the same chunk as the next
//! keystroke, and arrow keys are ESC-prefixed sequences. Modal handlers
//! therefore treat any chunk *starting* with ESC as cancel.

use tokio::time::Instant;

use crate::constants::{PREFIX_KEY, PREFIX_TIMEOUT, SCROLL_STEP};
use crate::store::{Action, Mode};

/// What the controller should do with a handled chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEffect {
    /// Write these bytes to the active session's PTY.
    Forward(Vec<u8>),
    /// Dispatch a store action.
    Dispatch(Action),
    /// Create a session for this branch (modal submit).
    CreateSession(String),
    /// Close the active session (modal confirm).
    CloseActive,
    /// Begin graceful shutdown.
    Quit,
    /// A lone carriage return passed through: the user submitted a
    /// prompt to the agent.
    Submitted,
    /// The new-session modal text changed and needs a redraw.
    ModalChanged,
}

/// Prefix-key state machine and modal input editor.
#[derive(Debug, Default)]
pub struct InputRouter {
    prefix_deadline: Option<Instant>,
    /// Branch name being typed in the new-session modal.
    entry: String,
}

impl InputRouter {
    /// Create a router in the inactive state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text currently typed into the new-session modal.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Deadline at which a pending prefix expires, if armed.
    pub fn prefix_deadline(&self) -> Option<Instant> {
        self.prefix_deadline
    }

    /// The prefix window expired with no command: forward exactly one
    /// literal prefix byte so users can still send Ctrl+B.
    pub fn on_prefix_timeout(&mut self, now: Instant) -> Vec<InputEffect> {
        match self.prefix_deadline {
            Some(deadline) if deadline <= now => {
                self.prefix_deadline = None;
                vec![InputEffect::Forward(vec![PREFIX_KEY])]
            }
            _ => Vec::new(),
        }
    }

    /// Handle one stdin chunk.
    ///
    /// `has_active` / `active_exited` describe the active session so the
    /// router can decide whether pass-through applies.
    pub fn handle_chunk(
        &mut self,
        chunk: &[u8],
        mode: Mode,
        has_active: bool,
        active_exited: bool,
    ) -> Vec<InputEffect> {
        if chunk.is_empty() {
            return Vec::new();
        }

        // Modal input wins over everything, including a pending prefix.
        match mode {
            Mode::CreatingSession => return self.handle_create_modal(chunk),
            Mode::ConfirmingClose => return Self::handle_close_modal(chunk),
            Mode::Normal => {}
        }

        if self.prefix_deadline.take().is_some() {
            return self.handle_prefix_command(chunk, has_active);
        }

        if chunk[0] == PREFIX_KEY {
            self.prefix_deadline = Some(Instant::now() + PREFIX_TIMEOUT);
            if chunk.len() > 1 {
                // Prefix and command arrived bundled in one chunk.
                self.prefix_deadline = None;
                return self.handle_prefix_command(&chunk[1..], has_active);
            }
            return Vec::new();
        }

        // Pass-through to the active PTY.
        if has_active && !active_exited {
            let mut effects = vec![InputEffect::Forward(chunk.to_vec())];
            if chunk == b"\r" {
                effects.push(InputEffect::Submitted);
            }
            return effects;
        }
        Vec::new()
    }

    /// Interpret the chunk after the prefix key.
    fn handle_prefix_command(&mut self, chunk: &[u8], has_active: bool) -> Vec<InputEffect> {
        // Arrow keys arrive as full CSI sequences.
        if chunk == b"\x1b[A" {
            return vec![InputEffect::Dispatch(Action::ScrollUp(SCROLL_STEP))];
        }
        if chunk == b"\x1b[B" {
            return vec![InputEffect::Dispatch(Action::ScrollDown(SCROLL_STEP))];
        }

        match chunk[0] {
            b'q' | b'Q' => vec![InputEffect::Quit],
            b'n' | b'N' => {
                self.entry.clear();
                vec![InputEffect::Dispatch(Action::SetMode(Mode::CreatingSession))]
            }
            b'w' | b'W' if has_active => {
                vec![InputEffect::Dispatch(Action::SetMode(Mode::ConfirmingClose))]
            }
            b']' => vec![InputEffect::Dispatch(Action::NextTab)],
            b'[' => vec![InputEffect::Dispatch(Action::PrevTab)],
            n @ b'1'..=b'9' => {
                vec![InputEffect::Dispatch(Action::JumpToTab((n - b'1') as usize))]
            }
            b'A' => vec![InputEffect::Dispatch(Action::ScrollUp(SCROLL_STEP))],
            b'B' => vec![InputEffect::Dispatch(Action::ScrollDown(SCROLL_STEP))],
            _ => Vec::new(),
        }
    }

    /// Text editing inside the new-session modal.
    fn handle_create_modal(&mut self, chunk: &[u8]) -> Vec<InputEffect> {
        // Any ESC-prefixed chunk cancels (bare ESC or bundled sequence).
        if chunk[0] == 0x1b {
            self.entry.clear();
            return vec![InputEffect::Dispatch(Action::SetMode(Mode::Normal))];
        }

        match chunk[0] {
            b'\r' | b'\n' => {
                let branch = self.entry.trim().to_string();
                if branch.is_empty() {
                    return Vec::new();
                }
                self.entry.clear();
                vec![InputEffect::CreateSession(branch)]
            }
            0x7f | 0x08 => {
                self.entry.pop();
                vec![InputEffect::ModalChanged]
            }
            _ => {
                let mut changed = false;
                for c in String::from_utf8_lossy(chunk).chars() {
                    if !c.is_control() {
                        self.entry.push(c);
                        changed = true;
                    }
                }
                if changed {
                    vec![InputEffect::ModalChanged]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Yes/no handling inside the close-confirmation modal.
    fn handle_close_modal(chunk: &[u8]) -> Vec<InputEffect> {
        if chunk[0] == 0x1b {
            return vec![InputEffect::Dispatch(Action::SetMode(Mode::Normal))];
        }
        match chunk[0] {
            b'y' | b'Y' => vec![InputEffect::CloseActive],
            b'n' | b'N' => vec![InputEffect::Dispatch(Action::SetMode(Mode::Normal))],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(router: &mut InputRouter, chunk: &[u8]) -> Vec<InputEffect> {
        router.handle_chunk(chunk, Mode::Normal, true, false)
    }

    #[test]
    fn plain_keys_pass_through() {
        let mut router = InputRouter::new();
        let effects = normal(&mut router, b"a");
        assert_eq!(effects, vec![InputEffect::Forward(b"a".to_vec())]);
    }

    #[test]
    fn carriage_return_marks_submit() {
        let mut router = InputRouter::new();
        let effects = normal(&mut router, b"\r");
        assert_eq!(
            effects,
            vec![
                InputEffect::Forward(b"\r".to_vec()),
                InputEffect::Submitted
            ]
        );
    }

    #[test]
    fn no_pass_through_without_active_session() {
        let mut router = InputRouter::new();
        let effects = router.handle_chunk(b"a", Mode::Normal, false, false);
        assert!(effects.is_empty());
    }

    #[test]
    fn no_pass_through_to_exited_session() {
        let mut router = InputRouter::new();
        let effects = router.handle_chunk(b"a", Mode::Normal, true, true);
        assert!(effects.is_empty());
    }

    #[test]
    fn prefix_consumes_next_chunk_as_command() {
        let mut router = InputRouter::new();
        assert!(normal(&mut router, &[PREFIX_KEY]).is_empty());
        assert!(router.prefix_deadline().is_some());

        let effects = normal(&mut router, b"]");
        assert_eq!(effects, vec![InputEffect::Dispatch(Action::NextTab)]);
        assert!(router.prefix_deadline().is_none());
    }

    #[test]
    fn prefix_command_table() {
        let cases: Vec<(&[u8], InputEffect)> = vec![
            (b"q", InputEffect::Quit),
            (b"Q", InputEffect::Quit),
            (
                b"n",
                InputEffect::Dispatch(Action::SetMode(Mode::CreatingSession)),
            ),
            (
                b"w",
                InputEffect::Dispatch(Action::SetMode(Mode::ConfirmingClose)),
            ),
            (b"[", InputEffect::Dispatch(Action::PrevTab)),
            (b"]", InputEffect::Dispatch(Action::NextTab)),
            (b"1", InputEffect::Dispatch(Action::JumpToTab(0))),
            (b"9", InputEffect::Dispatch(Action::JumpToTab(8))),
            (b"A", InputEffect::Dispatch(Action::ScrollUp(SCROLL_STEP))),
            (b"B", InputEffect::Dispatch(Action::ScrollDown(SCROLL_STEP))),
            (b"\x1b[A", InputEffect::Dispatch(Action::ScrollUp(SCROLL_STEP))),
            (b"\x1b[B", InputEffect::Dispatch(Action::ScrollDown(SCROLL_STEP))),
        ];
        for (chunk, expected) in cases {
            let mut router = InputRouter::new();
            normal(&mut router, &[PREFIX_KEY]);
            let effects = normal(&mut router, chunk);
            assert_eq!(effects, vec![expected], "chunk {chunk:?}");
        }
    }

    #[test]
    fn close_command_requires_active_session() {
        let mut router = InputRouter::new();
        router.handle_chunk(&[PREFIX_KEY], Mode::Normal, false, false);
        let effects = router.handle_chunk(b"w", Mode::Normal, false, false);
        assert!(effects.is_empty());
    }

    #[test]
    fn unknown_prefix_command_is_dropped() {
        let mut router = InputRouter::new();
        normal(&mut router, &[PREFIX_KEY]);
        assert!(normal(&mut router, b"z").is_empty());
        // And the prefix window is closed: next key passes through.
        let effects = normal(&mut router, b"z");
        assert_eq!(effects, vec![InputEffect::Forward(b"z".to_vec())]);
    }

    #[test]
    fn bundled_prefix_and_command_in_one_chunk() {
        let mut router = InputRouter::new();
        let chunk = [PREFIX_KEY, b']'];
        let effects = normal(&mut router, &chunk);
        assert_eq!(effects, vec![InputEffect::Dispatch(Action::NextTab)]);
        assert!(router.prefix_deadline().is_none());
    }

    #[test]
    fn prefix_timeout_forwards_exactly_one_prefix_byte() {
        let mut router = InputRouter::new();
        normal(&mut router, &[PREFIX_KEY]);
        let deadline = router.prefix_deadline().unwrap();

        // Before the deadline nothing fires.
        assert!(router.on_prefix_timeout(deadline - PREFIX_TIMEOUT).is_empty());

        let effects = router.on_prefix_timeout(deadline);
        assert_eq!(effects, vec![InputEffect::Forward(vec![PREFIX_KEY])]);

        // A second firing forwards nothing.
        assert!(router.on_prefix_timeout(deadline).is_empty());
    }

    #[test]
    fn create_modal_collects_text_and_submits() {
        let mut router = InputRouter::new();
        router.handle_chunk(b"f", Mode::CreatingSession, false, false);
        router.handle_chunk(b"x", Mode::CreatingSession, false, false);
        router.handle_chunk(&[0x7f], Mode::CreatingSession, false, false);
        router.handle_chunk(b"eature-a", Mode::CreatingSession, false, false);
        assert_eq!(router.entry(), "feature-a");

        let effects = router.handle_chunk(b"\r", Mode::CreatingSession, false, false);
        assert_eq!(
            effects,
            vec![InputEffect::CreateSession("feature-a".to_string())]
        );
        assert_eq!(router.entry(), "");
    }

    #[test]
    fn create_modal_ignores_empty_submit() {
        let mut router = InputRouter::new();
        let effects = router.handle_chunk(b"\r", Mode::CreatingSession, false, false);
        assert!(effects.is_empty());
    }

    #[test]
    fn create_modal_cancels_on_esc_prefixed_chunk() {
        // A bare ESC and a bundled arrow sequence both cancel.
        for chunk in [&b"\x1b"[..], &b"\x1b[A"[..]] {
            let mut router = InputRouter::new();
            router.handle_chunk(b"abc", Mode::CreatingSession, false, false);
            let effects = router.handle_chunk(chunk, Mode::CreatingSession, false, false);
            assert_eq!(
                effects,
                vec![InputEffect::Dispatch(Action::SetMode(Mode::Normal))]
            );
            assert_eq!(router.entry(), "");
        }
    }

    #[test]
    fn close_modal_confirm_and_cancel() {
        let mut router = InputRouter::new();
        let yes = router.handle_chunk(b"y", Mode::ConfirmingClose, true, false);
        assert_eq!(yes, vec![InputEffect::CloseActive]);

        let no = router.handle_chunk(b"n", Mode::ConfirmingClose, true, false);
        assert_eq!(
            no,
            vec![InputEffect::Dispatch(Action::SetMode(Mode::Normal))]
        );

        let esc = router.handle_chunk(b"\x1b", Mode::ConfirmingClose, true, false);
        assert_eq!(
            esc,
            vec![InputEffect::Dispatch(Action::SetMode(Mode::Normal))]
        );

        let other = router.handle_chunk(b"x", Mode::ConfirmingClose, true, false);
        assert!(other.is_empty());
    }
}
