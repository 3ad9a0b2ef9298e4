//! Error kinds surfaced by the control plane.
//!
//! The hot path (compositor writes, pass-through) swallows failures and
//! recovers on the next render; these types cover the operations that
//! report to the user instead: preflight checks, session creation, and
//! checkout cleanup.

use std::path::PathBuf;

/// Control-plane errors with a user-facing rendering.
#[derive(Debug, thiserror::Error)]
pub enum HydraError {
    /// The process cannot start: not inside a git working tree, or the
    /// environment is too broken to locate one.
    #[error("preflight failed: {0}")]
    Preflight(String),

    /// Creating a session failed (checkout creation, PTY spawn, or
    /// branch checkout). The session is not added to the tab list.
    #[error("failed to create session for '{branch}': {reason}")]
    SessionCreate {
        /// Branch the session was being created for.
        branch: String,
        /// Human-readable failure cause.
        reason: String,
    },

    /// Removing a checkout failed. The session is still removed from
    /// state; the directory is left for the next orphan prune.
    #[error("failed to remove checkout {path}: {reason}")]
    Cleanup {
        /// Checkout directory that could not be removed.
        path: PathBuf,
        /// Human-readable failure cause.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_branch() {
        let err = HydraError::SessionCreate {
            branch: "feature-a".to_string(),
            reason: "spawn failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("feature-a"));
        assert!(msg.contains("spawn failed"));
    }

    #[test]
    fn display_preflight() {
        let err = HydraError::Preflight("not in a git repository".to_string());
        assert!(err.to_string().contains("not in a git repository"));
    }
}
