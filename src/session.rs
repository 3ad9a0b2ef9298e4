//! Session lifecycle: PTY child + emulator + checkout triples.
//!
//! The session manager owns every live session resource, keyed by the
//! opaque session id that also identifies the metadata record in the
//! store. It wires PTY output into the per-session emulator through an
//! 8 ms coalescing batch (chunks arriving within the window are joined
//! and fed to the emulator in one call) while the raw chunks reach the
//! compositor's pass-through immediately.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use crate::checkout::CheckoutManager;
use crate::constants::{MAX_SCROLLBACK, PTY_BATCH_DELAY};
use crate::emulator::Emulator;
use crate::error::HydraError;
use crate::pty::{PtyEvent, PtyProcess};
use crate::store::SessionMeta;

/// Live resources for one session.
#[derive(Debug)]
pub struct LiveSession {
    /// Headless emulator mirroring the child's screen.
    pub emulator: Emulator,
    /// Worktree directory the child runs in.
    pub checkout_path: PathBuf,
    pty: PtyProcess,
    /// Chunks waiting for the batch deadline.
    pending: Vec<Bytes>,
    /// Deadline of the pending batch, re-armed per chunk.
    flush_deadline: Option<Instant>,
    exited: bool,
}

/// Owns live sessions and their PTY/emulator wiring.
pub struct SessionManager {
    live: HashMap<String, LiveSession>,
    checkouts: CheckoutManager,
    event_tx: UnboundedSender<PtyEvent>,
    /// Process-local monotonically increasing id counter.
    counter: u64,
    command: String,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("live", &self.live.len())
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager running `command` in each session.
    pub fn new(
        checkouts: CheckoutManager,
        event_tx: UnboundedSender<PtyEvent>,
        command: String,
    ) -> Self {
        Self {
            live: HashMap::new(),
            checkouts,
            event_tx,
            counter: 0,
            command,
        }
    }

    /// The checkout manager backing this session set.
    pub fn checkouts(&self) -> &CheckoutManager {
        &self.checkouts
    }

    /// Create a session for `branch` at the given viewport size.
    ///
    /// With `existing_path` the checkout is attached rather than created
    /// (restore path). The returned metadata is what the caller
    /// dispatches as `AddSession`.
    pub fn create_session(
        &mut self,
        branch: &str,
        cols: u16,
        rows: u16,
        existing_path: Option<PathBuf>,
    ) -> Result<SessionMeta, HydraError> {
        let checkout_path = match existing_path {
            Some(path) => path,
            None => self
                .checkouts
                .add(branch)
                .map_err(|e| HydraError::SessionCreate {
                    branch: branch.to_string(),
                    reason: e.to_string(),
                })?,
        };

        let emulator = Emulator::new(cols, rows, MAX_SCROLLBACK);

        let id = format!(
            "session-{}-{}",
            self.counter,
            chrono::Utc::now().timestamp_millis()
        );
        self.counter += 1;

        let mut env = HashMap::new();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        env.insert("COLORTERM".to_string(), "truecolor".to_string());

        let pty = PtyProcess::spawn(
            &self.command,
            &checkout_path,
            cols,
            rows,
            &env,
            id.clone(),
            self.event_tx.clone(),
        )
        .map_err(|e| HydraError::SessionCreate {
            branch: branch.to_string(),
            reason: e.to_string(),
        })?;

        log::info!("Created session {id} for branch {branch}");

        self.live.insert(
            id.clone(),
            LiveSession {
                emulator,
                checkout_path: checkout_path.clone(),
                pty,
                pending: Vec::new(),
                flush_deadline: None,
                exited: false,
            },
        );

        Ok(SessionMeta {
            id,
            branch: branch.to_string(),
            checkout_path,
            exit_code: None,
        })
    }

    /// Re-create sessions for every checkout left on disk.
    ///
    /// Failures are logged and skipped; the survivors are returned in
    /// listing order for the caller to dispatch.
    pub fn restore_existing_sessions(&mut self, cols: u16, rows: u16) -> Vec<SessionMeta> {
        let entries = match self.checkouts.list() {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot list checkouts for restore: {e}");
                return Vec::new();
            }
        };

        let mut restored = Vec::new();
        for entry in entries {
            if entry.branch.is_empty() {
                log::warn!(
                    "Skipping detached checkout at {} during restore",
                    entry.path.display()
                );
                continue;
            }
            match self.create_session(&entry.branch, cols, rows, Some(entry.path.clone())) {
                Ok(meta) => restored.push(meta),
                Err(e) => log::error!("Failed to restore session for {}: {e}", entry.branch),
            }
        }
        log::info!("Restored {} session(s)", restored.len());
        restored
    }

    /// Tear down a session: kill the child, drop the emulator, remove
    /// the checkout. Checkout removal is best-effort; the session is
    /// gone either way.
    pub fn close_session(&mut self, id: &str) {
        let Some(mut session) = self.live.remove(id) else {
            return;
        };
        session.pty.kill();
        if let Err(e) = self.checkouts.remove(&session.checkout_path) {
            log::warn!("{e}");
        }
        log::info!("Closed session {id}");
    }

    /// Resize every live (non-exited) session.
    ///
    /// The emulator resizes before the PTY so the child never writes
    /// for a grid larger than the emulator has.
    pub fn resize_all_sessions(&mut self, cols: u16, rows: u16) {
        for (id, session) in &mut self.live {
            if session.exited {
                continue;
            }
            session.emulator.resize(cols, rows);
            if let Err(e) = session.pty.resize(cols, rows) {
                log::warn!("Failed to resize PTY for {id}: {e}");
            }
        }
    }

    /// Remove stale checkout directories from previous runs.
    pub fn cleanup_orphans(&self) {
        self.checkouts.prune_orphans();
    }

    /// Queue an output chunk and (re)arm the batch deadline.
    pub fn on_pty_output(&mut self, id: &str, chunk: Bytes) {
        if let Some(session) = self.live.get_mut(id) {
            session.pending.push(chunk);
            session.flush_deadline = Some(Instant::now() + PTY_BATCH_DELAY);
        }
    }

    /// Flush every session whose batch deadline has passed.
    ///
    /// Joins the pending chunks and feeds them to the emulator in one
    /// call. Returns the ids that were flushed so the caller can refresh
    /// dependent UI.
    pub fn flush_due_batches(&mut self, now: Instant) -> Vec<String> {
        let mut flushed = Vec::new();
        for (id, session) in &mut self.live {
            let due = session.flush_deadline.is_some_and(|d| d <= now);
            if !due {
                continue;
            }
            session.flush_deadline = None;
            let batch: Vec<u8> = session.pending.drain(..).flatten().collect();
            if !batch.is_empty() {
                session.emulator.process(&batch);
            }
            flushed.push(id.clone());
        }
        flushed
    }

    /// Earliest pending batch deadline, if any.
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.live.values().filter_map(|s| s.flush_deadline).min()
    }

    /// Record that a session's child exited.
    pub fn mark_exited(&mut self, id: &str) {
        if let Some(session) = self.live.get_mut(id) {
            session.exited = true;
        }
    }

    /// Forward input bytes to a session's PTY.
    pub fn write_input(&mut self, id: &str, bytes: &[u8]) -> Result<()> {
        let session = self
            .live
            .get_mut(id)
            .with_context(|| format!("No live session {id}"))?;
        session.pty.write(bytes)
    }

    /// The emulator backing a session, for repaints.
    pub fn emulator(&self, id: &str) -> Option<&Emulator> {
        self.live.get(id).map(|s| &s.emulator)
    }

    /// Kill every child. Pending batches are dropped intentionally,
    /// as the children are being killed. Checkouts are preserved; only
    /// the startup orphan prune removes directories.
    pub fn kill_all(&mut self) {
        for (id, session) in &mut self.live {
            log::info!("Killing session {id}");
            session.pending.clear();
            session.flush_deadline = None;
            session.pty.kill();
        }
        self.live.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_flush_joins_chunks_in_order() {
        // Exercise the batching path without spawning a PTY by driving
        // an emulator the same way flush_due_batches does.
        let mut pending: Vec<Bytes> = vec![
            Bytes::from_static(b"hel"),
            Bytes::from_static(b"lo"),
        ];
        let batch: Vec<u8> = pending.drain(..).flatten().collect();
        assert_eq!(batch, b"hello");

        let mut emulator = Emulator::new(20, 4, 50);
        emulator.process(&batch);
        assert!(emulator.contents().starts_with("hello"));
    }

    #[test]
    fn session_id_format_is_counter_then_epoch() {
        let id = format!("session-{}-{}", 3, 1_700_000_000_000_i64);
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "session");
        assert_eq!(parts[1], "3");
        assert!(parts[2].parse::<i64>().is_ok());
    }
}
