//! Application-wide constants for hydra.
//!
//! This module centralizes all magic numbers to improve maintainability
//! and discoverability. Constants are grouped by domain with documentation
//! explaining their purpose.
//!
//! # Categories
//!
//! - **Layout**: chrome geometry
//! - **Timing**: batching, prefix, and silence timers
//! - **Input**: prefix key and scroll step
//! - **Emulator**: scrollback depth

use std::time::Duration;

// ============================================================================
// Layout
// ============================================================================

/// Rows reserved at the bottom of the host terminal for the chrome:
/// top border, status line, bottom border.
pub const CHROME_ROWS: u16 = 3;

// ============================================================================
// Timing
// ============================================================================

/// Coalescing delay for PTY output before it is fed to the emulator.
///
/// Chunks arriving within this window are joined into a single
/// `Emulator::process` call. The deadline is re-armed on each chunk
/// (coalesce while pending, flush on deadline) rather than ticking at
/// a fixed rate.
pub const PTY_BATCH_DELAY: Duration = Duration::from_millis(8);

/// How long a pending prefix key stays armed before it is forwarded
/// to the active PTY as a literal byte.
pub const PREFIX_TIMEOUT: Duration = Duration::from_millis(500);

/// PTY silence window after which a Working session is considered
/// Waiting (the wrapped agent has stopped producing output).
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Input
// ============================================================================

/// The prefix byte that opens the command window (Ctrl+B, tmux-style).
pub const PREFIX_KEY: u8 = 0x02;

/// Lines moved per scroll command.
pub const SCROLL_STEP: usize = 5;

// ============================================================================
// Emulator
// ============================================================================

/// Scrollback line limit per session emulator.
///
/// 5 000 lines is large enough to capture a full agent session without
/// excessive memory use; the host terminal's own scrollback holds the
/// full pass-through history anyway.
pub const MAX_SCROLLBACK: usize = 5_000;
