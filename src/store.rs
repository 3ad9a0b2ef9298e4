//! Event-sourced application state.
//!
//! A single immutable [`AppState`] value is replaced by a pure reducer
//! on every dispatched [`Action`]. The store only reports a change when
//! the reducer produced a state that differs by value, so the render
//! policy never reacts to no-op dispatches.
//!
//! The store holds session *metadata* only. Live resources (emulator,
//! PTY child) belong to the session manager, keyed by the same id; the
//! id is the only reference crossing module boundaries.

use std::path::PathBuf;

/// UI mode. Non-Normal modes route input to a modal editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Keystrokes pass through to the active session.
    #[default]
    Normal,
    /// The new-session modal is open and collecting a branch name.
    CreatingSession,
    /// The close-confirmation modal is open.
    ConfirmingClose,
}

/// Metadata for one session tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    /// Opaque session id (`session-<counter>-<ms-epoch>`).
    pub id: String,
    /// Branch checked out for this session.
    pub branch: String,
    /// Worktree directory the session runs in.
    pub checkout_path: PathBuf,
    /// Exit code once the PTY child has exited.
    pub exit_code: Option<u32>,
}

/// The application state replaced atomically by the reducer.
///
/// Invariants (checked by tests, maintained by [`reduce`]):
/// - non-empty `sessions` implies `active_session_id` is a present id;
/// - empty `sessions` implies `active_session_id` is `None`;
/// - any session-list or active-id change resets `scroll_offset` to 0
///   and `mode` to [`Mode::Normal`] where the action table says so.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    /// Ordered session tabs.
    pub sessions: Vec<SessionMeta>,
    /// Id of the session owning the viewport, if any.
    pub active_session_id: Option<String>,
    /// Current UI mode.
    pub mode: Mode,
    /// Lines scrolled up from live view. Zero means live.
    pub scroll_offset: usize,
}

impl AppState {
    /// Index of the active session in the tab order.
    pub fn active_index(&self) -> Option<usize> {
        let active = self.active_session_id.as_ref()?;
        self.sessions.iter().position(|s| &s.id == active)
    }

    /// Metadata of the active session.
    pub fn active_session(&self) -> Option<&SessionMeta> {
        self.active_index().map(|i| &self.sessions[i])
    }
}

/// Actions accepted by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append a session and activate it.
    AddSession(SessionMeta),
    /// Remove a session by id.
    RemoveSession(String),
    /// Activate a session by id.
    SetActive(String),
    /// Activate the next tab, wrapping.
    NextTab,
    /// Activate the previous tab, wrapping.
    PrevTab,
    /// Activate the tab at this index, if present.
    JumpToTab(usize),
    /// Switch UI mode.
    SetMode(Mode),
    /// Record a session's PTY exit.
    SessionExited {
        /// Exited session id.
        id: String,
        /// Process exit code.
        code: u32,
    },
    /// Scroll up into history.
    ScrollUp(usize),
    /// Scroll back toward live view.
    ScrollDown(usize),
}

/// Pure reducer: current state + action → next state.
pub fn reduce(state: &AppState, action: &Action) -> AppState {
    let mut next = state.clone();

    match action {
        Action::AddSession(meta) => {
            next.active_session_id = Some(meta.id.clone());
            next.sessions.push(meta.clone());
            next.mode = Mode::Normal;
            next.scroll_offset = 0;
        }
        Action::RemoveSession(id) => {
            let Some(index) = next.sessions.iter().position(|s| &s.id == id) else {
                return next;
            };
            next.sessions.remove(index);
            if next.active_session_id.as_ref() == Some(id) {
                next.active_session_id = if next.sessions.is_empty() {
                    None
                } else {
                    let fallback = index.min(next.sessions.len() - 1);
                    Some(next.sessions[fallback].id.clone())
                };
            }
            next.mode = Mode::Normal;
            next.scroll_offset = 0;
        }
        Action::SetActive(id) => {
            if next.sessions.iter().any(|s| &s.id == id) {
                next.active_session_id = Some(id.clone());
                next.scroll_offset = 0;
            }
        }
        Action::NextTab => cycle(&mut next, 1),
        Action::PrevTab => cycle(&mut next, -1),
        Action::JumpToTab(i) => {
            if let Some(meta) = next.sessions.get(*i) {
                next.active_session_id = Some(meta.id.clone());
                next.scroll_offset = 0;
            }
        }
        Action::SetMode(mode) => {
            next.mode = *mode;
        }
        Action::SessionExited { id, code } => {
            if let Some(meta) = next.sessions.iter_mut().find(|s| &s.id == id) {
                meta.exit_code = Some(*code);
            }
        }
        Action::ScrollUp(n) => {
            next.scroll_offset = next.scroll_offset.saturating_add(*n);
        }
        Action::ScrollDown(n) => {
            next.scroll_offset = next.scroll_offset.saturating_sub(*n);
        }
    }

    next
}

/// Move the active tab by `step`, wrapping circularly.
fn cycle(state: &mut AppState, step: isize) {
    if state.sessions.is_empty() {
        return;
    }
    let len = state.sessions.len() as isize;
    let current = state.active_index().unwrap_or(0) as isize;
    let target = (current + step).rem_euclid(len) as usize;
    state.active_session_id = Some(state.sessions[target].id.clone());
    state.scroll_offset = 0;
}

/// Holds the current state and detects real changes.
#[derive(Debug, Default)]
pub struct Store {
    state: AppState,
    version: u64,
}

impl Store {
    /// Create a store with the default empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Monotonic counter bumped on every accepted change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply an action. Returns `true` iff the state changed by value;
    /// the caller runs its render policy exactly when that happens.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let next = reduce(&self.state, &action);
        if next == self.state {
            return false;
        }
        log::debug!("store: {action:?} (v{})", self.version + 1);
        self.state = next;
        self.version += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, branch: &str) -> SessionMeta {
        SessionMeta {
            id: id.to_string(),
            branch: branch.to_string(),
            checkout_path: PathBuf::from("/tmp").join(branch),
            exit_code: None,
        }
    }

    fn state_with(ids: &[&str], active: &str) -> AppState {
        AppState {
            sessions: ids.iter().map(|id| meta(id, id)).collect(),
            active_session_id: Some(active.to_string()),
            mode: Mode::Normal,
            scroll_offset: 0,
        }
    }

    #[test]
    fn add_session_activates_and_resets() {
        let mut state = state_with(&["a"], "a");
        state.mode = Mode::CreatingSession;
        state.scroll_offset = 7;

        let next = reduce(&state, &Action::AddSession(meta("b", "dev")));
        assert_eq!(next.sessions.len(), 2);
        assert_eq!(next.active_session_id.as_deref(), Some("b"));
        assert_eq!(next.mode, Mode::Normal);
        assert_eq!(next.scroll_offset, 0);
    }

    #[test]
    fn remove_active_mid_list_activates_successor() {
        // Sessions [a,b,c], active b: removing b activates c, the
        // element that slid into the removed slot.
        let state = state_with(&["a", "b", "c"], "b");
        let next = reduce(&state, &Action::RemoveSession("b".to_string()));
        let ids: Vec<_> = next.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(next.active_session_id.as_deref(), Some("c"));
    }

    #[test]
    fn remove_last_session_clears_active() {
        let state = state_with(&["a"], "a");
        let next = reduce(&state, &Action::RemoveSession("a".to_string()));
        assert!(next.sessions.is_empty());
        assert!(next.active_session_id.is_none());
    }

    #[test]
    fn remove_tail_active_activates_new_tail() {
        let state = state_with(&["a", "b"], "b");
        let next = reduce(&state, &Action::RemoveSession("b".to_string()));
        assert_eq!(next.active_session_id.as_deref(), Some("a"));
    }

    #[test]
    fn remove_inactive_keeps_active() {
        let state = state_with(&["a", "b", "c"], "c");
        let next = reduce(&state, &Action::RemoveSession("a".to_string()));
        assert_eq!(next.active_session_id.as_deref(), Some("c"));
    }

    #[test]
    fn remove_missing_id_is_noop() {
        let mut state = state_with(&["a"], "a");
        state.scroll_offset = 3;
        let next = reduce(&state, &Action::RemoveSession("ghost".to_string()));
        assert_eq!(next, state);
    }

    #[test]
    fn next_and_prev_wrap() {
        let state = state_with(&["a", "b", "c"], "c");
        let next = reduce(&state, &Action::NextTab);
        assert_eq!(next.active_session_id.as_deref(), Some("a"));

        let state = state_with(&["a", "b", "c"], "a");
        let prev = reduce(&state, &Action::PrevTab);
        assert_eq!(prev.active_session_id.as_deref(), Some("c"));
    }

    #[test]
    fn tab_cycle_on_empty_is_noop() {
        let state = AppState::default();
        assert_eq!(reduce(&state, &Action::NextTab), state);
        assert_eq!(reduce(&state, &Action::PrevTab), state);
    }

    #[test]
    fn jump_out_of_range_leaves_state_untouched() {
        // With two sessions, jumping to tab 5 must not touch anything,
        // not even the scroll offset.
        let mut state = state_with(&["main", "dev"], "main");
        state.scroll_offset = 2;
        let next = reduce(&state, &Action::JumpToTab(4));
        assert_eq!(next, state);
    }

    #[test]
    fn jump_in_range_activates() {
        let state = state_with(&["main", "dev"], "main");
        let next = reduce(&state, &Action::JumpToTab(1));
        assert_eq!(next.active_session_id.as_deref(), Some("dev"));
    }

    #[test]
    fn scroll_down_saturates_at_zero() {
        // Scrolling down past the live view clamps at zero.
        let mut state = state_with(&["a"], "a");
        state.scroll_offset = 3;
        let next = reduce(&state, &Action::ScrollDown(5));
        assert_eq!(next.scroll_offset, 0);
    }

    #[test]
    fn scroll_up_accumulates() {
        let state = state_with(&["a"], "a");
        let next = reduce(&state, &Action::ScrollUp(5));
        let next = reduce(&next, &Action::ScrollUp(5));
        assert_eq!(next.scroll_offset, 10);
    }

    #[test]
    fn session_exited_records_code() {
        let state = state_with(&["a"], "a");
        let next = reduce(
            &state,
            &Action::SessionExited {
                id: "a".to_string(),
                code: 3,
            },
        );
        assert_eq!(next.sessions[0].exit_code, Some(3));
    }

    #[test]
    fn session_switch_resets_scroll() {
        let mut state = state_with(&["a", "b"], "a");
        state.scroll_offset = 12;
        for action in [
            Action::NextTab,
            Action::PrevTab,
            Action::JumpToTab(1),
            Action::SetActive("b".to_string()),
        ] {
            let next = reduce(&state, &action);
            assert_eq!(next.scroll_offset, 0, "{action:?} must reset scroll");
        }
    }

    #[test]
    fn store_reports_change_only_on_difference() {
        let mut store = Store::new();
        assert!(store.dispatch(Action::AddSession(meta("a", "main"))));
        let v = store.version();

        // Activating the already-active session changes nothing.
        assert!(!store.dispatch(Action::SetActive("a".to_string())));
        assert_eq!(store.version(), v);

        // Out-of-range jump changes nothing.
        assert!(!store.dispatch(Action::JumpToTab(9)));
        assert_eq!(store.version(), v);
    }

    #[test]
    fn active_invariant_holds_over_action_sequences() {
        let mut store = Store::new();
        let actions = [
            Action::AddSession(meta("a", "main")),
            Action::AddSession(meta("b", "dev")),
            Action::NextTab,
            Action::RemoveSession("a".to_string()),
            Action::AddSession(meta("c", "fix")),
            Action::PrevTab,
            Action::RemoveSession("b".to_string()),
            Action::RemoveSession("c".to_string()),
        ];
        for action in actions {
            store.dispatch(action);
            let state = store.state();
            match state.active_session_id {
                Some(ref id) => {
                    assert!(state.sessions.iter().any(|s| &s.id == id));
                }
                None => assert!(state.sessions.is_empty()),
            }
        }
    }

    #[test]
    fn remove_is_idempotent_after_first_application() {
        let state = state_with(&["a", "b"], "a");
        let once = reduce(&state, &Action::RemoveSession("b".to_string()));
        let twice = reduce(&once, &Action::RemoveSession("b".to_string()));
        assert_eq!(once, twice);
    }
}
