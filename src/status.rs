//! Per-session activity status derived from submits and PTY silence.
//!
//! A session is `Idle` until the user submits a prompt (a lone carriage
//! return passed through to the PTY), `Working` while the agent keeps
//! producing output, and `Waiting` once the PTY has been silent for the
//! silence window. Exited sessions are colored red in the chrome
//! regardless of this state.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::constants::SILENCE_TIMEOUT;

/// Activity state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No prompt submitted yet (or the last answer was consumed).
    #[default]
    Idle,
    /// The agent is producing output.
    Working,
    /// The agent went quiet, likely waiting for the user.
    Waiting,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Working => write!(f, "working"),
            SessionStatus::Waiting => write!(f, "waiting"),
        }
    }
}

#[derive(Debug, Default)]
struct StatusEntry {
    status: SessionStatus,
    silence_deadline: Option<Instant>,
}

/// Tracks activity status for every known session.
#[derive(Debug, Default)]
pub struct StatusTracker {
    entries: HashMap<String, StatusEntry>,
}

impl StatusTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Align the tracked set with the current session ids: missing
    /// entries are created `Idle`, removed sessions are dropped.
    pub fn sync<'a>(&mut self, ids: impl Iterator<Item = &'a str>) {
        let mut seen: Vec<&str> = Vec::new();
        for id in ids {
            seen.push(id);
            self.entries.entry(id.to_string()).or_default();
        }
        self.entries.retain(|id, _| seen.contains(&id.as_str()));
    }

    /// Current status of a session.
    pub fn status(&self, id: &str) -> SessionStatus {
        self.entries.get(id).map(|e| e.status).unwrap_or_default()
    }

    /// The user submitted a prompt: the session starts working.
    /// Returns `true` if the status actually changed.
    pub fn on_submit(&mut self, id: &str, now: Instant) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.silence_deadline = Some(now + SILENCE_TIMEOUT);
        if entry.status != SessionStatus::Working {
            entry.status = SessionStatus::Working;
            return true;
        }
        false
    }

    /// PTY output arrived: push the silence deadline out.
    pub fn on_output(&mut self, id: &str, now: Instant) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.silence_deadline = Some(now + SILENCE_TIMEOUT);
        }
    }

    /// Fire every elapsed silence deadline.
    ///
    /// A Working session whose deadline passed becomes Waiting; other
    /// states just drop the stale deadline. Returns ids whose status
    /// changed so the chrome can recolor.
    pub fn fire_due(&mut self, now: Instant) -> Vec<String> {
        let mut changed = Vec::new();
        for (id, entry) in &mut self.entries {
            let due = entry.silence_deadline.is_some_and(|d| d <= now);
            if !due {
                continue;
            }
            entry.silence_deadline = None;
            if entry.status == SessionStatus::Working {
                entry.status = SessionStatus::Waiting;
                changed.push(id.clone());
            }
        }
        changed
    }

    /// Earliest pending silence deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().filter_map(|e| e.silence_deadline).min()
    }
}
