//! App controller: wiring, render policy, event loop, shutdown.
//!
//! Runs the single-threaded cooperative loop that owns all mutable
//! state. Blocking sources (stdin, each PTY) live on helper threads and
//! feed channels; `tokio::select!` on a current-thread runtime
//! multiplexes them with unix signals and timer deadlines, so the loop
//! sleeps between events instead of polling.
//!
//! ```text
//! stdin thread ──chunks──┐
//! PTY readers ──events──┤ tokio::select! ── input router ── store
//! signals ──────────────┤      │                │
//! timer deadlines ──────┘      └── compositor <─┘ (render policy)
//! ```

use std::io::Read;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::checkout::CheckoutManager;
use crate::compositor::{ChromeView, Compositor, TabView};
use crate::config::Config;
use crate::input::{InputEffect, InputRouter};
use crate::pty::PtyEvent;
use crate::session::SessionManager;
use crate::status::StatusTracker;
use crate::store::{Action, Mode, Store};

/// Idle wakeup when no timer is pending; keeps the select arm simple.
const IDLE_TICK: Duration = Duration::from_secs(60);

/// Restores the host terminal even if the event loop panics.
///
/// Dropping the guard disables raw mode, releases the scroll region,
/// and shows the cursor.
#[derive(Debug)]
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut out = std::io::stdout();
        let _ = std::io::Write::write_all(&mut out, b"\x1b[r\x1b[?25h\x1b[0m");
        let _ = std::io::Write::flush(&mut out);
    }
}

/// Owns every subsystem and drives the event loop.
pub struct App {
    store: Store,
    sessions: SessionManager,
    input: InputRouter,
    status: StatusTracker,
    compositor: Compositor<std::io::Stdout>,
    /// Session whose viewport was last painted.
    last_rendered_session: Option<String>,
    last_mode: Mode,
    last_scroll: usize,
    /// Transient error shown above the chrome until the next change.
    last_error: Option<String>,
    quit: bool,
    cleaning: bool,
}

/// Run hydra until quit or a termination signal.
pub async fn run(config: Config, checkouts: CheckoutManager) -> Result<()> {
    let (pty_tx, mut pty_rx) = mpsc::unbounded_channel();
    let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel();

    let (total_cols, total_rows) =
        crossterm::terminal::size().context("Cannot query terminal size")?;

    enable_raw_mode().context("Cannot enable raw mode")?;
    let _guard = TerminalGuard;

    let mut app = App {
        store: Store::new(),
        sessions: SessionManager::new(checkouts, pty_tx, config.command.clone()),
        input: InputRouter::new(),
        status: StatusTracker::new(),
        compositor: Compositor::new(std::io::stdout(), total_cols, total_rows),
        last_rendered_session: None,
        last_mode: Mode::Normal,
        last_scroll: 0,
        last_error: None,
        quit: false,
        cleaning: false,
    };

    spawn_stdin_reader(stdin_tx);

    app.compositor.initialize();
    app.sessions.cleanup_orphans();

    // Restore runs to completion before the first select iteration, so
    // the first render always sees the full session list.
    let inner_rows = app.compositor.inner_rows();
    for meta in app.sessions.restore_existing_sessions(total_cols, inner_rows) {
        app.dispatch(Action::AddSession(meta));
    }
    if app.store.state().sessions.is_empty() {
        app.compositor.draw_placeholder();
        app.draw_chrome();
    }

    let result = app.event_loop(&mut pty_rx, &mut stdin_rx).await;
    app.shutdown();
    result
}

impl App {
    /// The select loop. Receivers are passed in rather than stored on
    /// `self` so the futures borrow them independently of the `&mut
    /// self` the match arms need.
    async fn event_loop(
        &mut self,
        pty_rx: &mut UnboundedReceiver<PtyEvent>,
        stdin_rx: &mut UnboundedReceiver<Vec<u8>>,
    ) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigwinch = signal(SignalKind::window_change())?;

        while !self.quit {
            let deadline = self
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_TICK);

            tokio::select! {
                biased;
                _ = sigint.recv() => self.quit = true,
                _ = sigterm.recv() => self.quit = true,
                _ = sighup.recv() => self.quit = true,
                _ = sigwinch.recv() => self.handle_resize(),
                event = pty_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_pty_event(event);
                    }
                }
                chunk = stdin_rx.recv() => {
                    match chunk {
                        Some(chunk) => self.handle_stdin(&chunk),
                        // stdin is gone; nothing left to drive us.
                        None => self.quit = true,
                    }
                }
                () = tokio::time::sleep_until(deadline) => self.fire_timers(),
            }
        }
        Ok(())
    }

    /// Earliest pending deadline across batches, prefix, and silence.
    fn next_deadline(&self) -> Option<Instant> {
        [
            self.sessions.next_flush_deadline(),
            self.input.prefix_deadline(),
            self.status.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();

        // Batched PTY bytes reach the emulators.
        let _ = self.sessions.flush_due_batches(now);

        // Prefix expiry forwards the literal prefix byte.
        let effects = self.input.on_prefix_timeout(now);
        self.apply_effects(effects);

        // Silence transitions recolor tabs.
        if !self.status.fire_due(now).is_empty() {
            self.draw_chrome();
        }
    }

    fn handle_pty_event(&mut self, event: PtyEvent) {
        match event {
            PtyEvent::Output { session_id, data } => {
                // Hot path: the active session's bytes stream straight to
                // the host while it shows the live viewport.
                let state = self.store.state();
                let is_active = state.active_session_id.as_deref() == Some(session_id.as_str());
                if is_active && state.mode == Mode::Normal && state.scroll_offset == 0 {
                    let view = self.chrome_view();
                    self.compositor.write_passthrough(&data, &view);
                }
                self.status.on_output(&session_id, Instant::now());
                self.sessions.on_pty_output(&session_id, data);
            }
            PtyEvent::Exited { session_id, code } => {
                log::info!("Session {session_id} exited with code {code}");
                self.sessions.mark_exited(&session_id);
                self.dispatch(Action::SessionExited {
                    id: session_id,
                    code,
                });
                // The exit may not change state (session already removed);
                // the chrome still needs the red tab.
                self.draw_chrome();
            }
        }
    }

    fn handle_stdin(&mut self, chunk: &[u8]) {
        let state = self.store.state();
        let mode = state.mode;
        let has_active = state.active_session_id.is_some();
        let active_exited = state
            .active_session()
            .is_some_and(|meta| meta.exit_code.is_some());

        let effects = self.input.handle_chunk(chunk, mode, has_active, active_exited);
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<InputEffect>) {
        for effect in effects {
            match effect {
                InputEffect::Forward(bytes) => {
                    if let Some(id) = self.store.state().active_session_id.clone() {
                        if let Err(e) = self.sessions.write_input(&id, &bytes) {
                            log::warn!("Forwarding input to {id} failed: {e}");
                        }
                    }
                }
                InputEffect::Dispatch(action) => self.dispatch(action),
                InputEffect::CreateSession(branch) => self.create_session(&branch),
                InputEffect::CloseActive => self.close_active(),
                InputEffect::Quit => self.quit = true,
                InputEffect::Submitted => {
                    if let Some(id) = self.store.state().active_session_id.clone() {
                        if self.status.on_submit(&id, Instant::now()) {
                            self.draw_chrome();
                        }
                    }
                }
                InputEffect::ModalChanged => {
                    if self.store.state().mode == Mode::CreatingSession {
                        let lines = self.create_modal_lines();
                        self.compositor.enter_modal(&lines);
                    }
                }
            }
        }
    }

    fn create_session(&mut self, branch: &str) {
        let cols = self.compositor.total_cols();
        let rows = self.compositor.inner_rows();
        match self.sessions.create_session(branch, cols, rows, None) {
            Ok(meta) => {
                // AddSession resets mode to Normal and activates the tab.
                self.dispatch(Action::AddSession(meta));
            }
            Err(e) => {
                log::error!("{e}");
                self.dispatch(Action::SetMode(Mode::Normal));
                self.last_error = Some(e.to_string());
                self.draw_chrome();
            }
        }
    }

    fn close_active(&mut self) {
        let Some(meta) = self.store.state().active_session().cloned() else {
            self.dispatch(Action::SetMode(Mode::Normal));
            return;
        };
        self.sessions.close_session(&meta.id);
        self.dispatch(Action::RemoveSession(meta.id));
    }

    /// Dispatch an action and, when it changed the state, run the
    /// render policy before anything else is processed.
    fn dispatch(&mut self, action: Action) {
        if self.store.dispatch(action) {
            self.on_state_changed();
        }
    }

    /// Render policy, applied after every accepted state change.
    fn on_state_changed(&mut self) {
        self.last_error = None;

        let ids: Vec<String> = self
            .store
            .state()
            .sessions
            .iter()
            .map(|s| s.id.clone())
            .collect();
        self.status.sync(ids.iter().map(String::as_str));

        let mode = self.store.state().mode;
        let active = self.store.state().active_session_id.clone();
        let scroll = self.store.state().scroll_offset;

        match mode {
            Mode::CreatingSession => {
                let lines = self.create_modal_lines();
                self.compositor.enter_modal(&lines);
            }
            Mode::ConfirmingClose => {
                let branch = self
                    .store
                    .state()
                    .active_session()
                    .map(|meta| meta.branch.clone())
                    .unwrap_or_default();
                let lines = vec![
                    format!("Close session '{branch}'?"),
                    String::new(),
                    "y to close, n to cancel".to_string(),
                ];
                self.compositor.enter_modal(&lines);
            }
            Mode::Normal => {
                let modal_exited = self.last_mode != Mode::Normal;
                let switched = active != self.last_rendered_session;
                let scrolled = scroll != self.last_scroll;
                if modal_exited || switched || scrolled {
                    self.repaint_active();
                }
            }
        }

        self.last_mode = mode;
        self.last_rendered_session = active;
        self.last_scroll = scroll;
        self.draw_chrome();
    }

    /// Repaint the active session's viewport, or the placeholder.
    fn repaint_active(&mut self) {
        let state = self.store.state();
        let scroll = state.scroll_offset;
        match state
            .active_session_id
            .as_deref()
            .and_then(|id| self.sessions.emulator(id))
        {
            Some(emulator) => self.compositor.repaint(emulator, scroll),
            None => self.compositor.draw_placeholder(),
        }
    }

    fn create_modal_lines(&self) -> Vec<String> {
        vec![
            "Create new session".to_string(),
            String::new(),
            format!("branch: {}_", self.input.entry()),
            String::new(),
            "Enter to create, Esc to cancel".to_string(),
        ]
    }

    fn chrome_view(&self) -> ChromeView {
        let state = self.store.state();
        let tabs = state
            .sessions
            .iter()
            .map(|meta| TabView {
                branch: meta.branch.clone(),
                active: state.active_session_id.as_ref() == Some(&meta.id),
                exit_code: meta.exit_code,
                status: self.status.status(&meta.id),
            })
            .collect();

        // The active session decides cursor visibility; same gating as
        // the repaint path.
        let cursor_visible = state.mode == Mode::Normal
            && state.scroll_offset == 0
            && state
                .active_session_id
                .as_deref()
                .and_then(|id| self.sessions.emulator(id))
                .is_some_and(|emulator| !emulator.cursor_hidden());

        ChromeView {
            tabs,
            mode: state.mode,
            scroll_offset: state.scroll_offset,
            active_exit: state.active_session().and_then(|meta| meta.exit_code),
            error: self.last_error.clone(),
            cursor_visible,
        }
    }

    fn draw_chrome(&mut self) {
        let view = self.chrome_view();
        self.compositor.mark_chrome_dirty();
        self.compositor.draw_chrome(&view);
    }

    fn handle_resize(&mut self) {
        let Ok((cols, rows)) = crossterm::terminal::size() else {
            return;
        };
        log::info!("Terminal resized to {cols}x{rows}");
        self.compositor.resize(cols, rows);
        self.compositor.initialize();
        self.sessions
            .resize_all_sessions(cols, self.compositor.inner_rows());
        self.repaint_active();
        self.draw_chrome();
    }

    /// Idempotent shutdown: kill children, restore the terminal.
    /// Checkouts stay on disk for the next launch to restore.
    fn shutdown(&mut self) {
        if self.cleaning {
            return;
        }
        self.cleaning = true;
        log::info!("Shutting down");
        self.sessions.kill_all();
        self.compositor.cleanup();
    }
}

/// Blocking stdin reader bridging raw-mode bytes into the event loop.
fn spawn_stdin_reader(tx: UnboundedSender<Vec<u8>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("stdin read error: {e}");
                    break;
                }
            }
        }
        log::debug!("stdin reader thread exiting");
    })
}
