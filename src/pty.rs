//! PTY adapter: spawn, write, resize, kill.
//!
//! Thin wrapper over `portable-pty`. Each spawned process gets two
//! helper threads: a reader that forwards output chunks and a waiter
//! that reports the exit code. Both deliver [`PtyEvent`]s into the
//! app's event channel, bridging blocking PTY I/O into the
//! single-threaded event loop.
//!
//! ```text
//! PtyProcess
//!  ├── master: MasterPty          (resize)
//!  ├── writer: Write              (keystroke forwarding)
//!  ├── killer: ChildKiller        (close / shutdown)
//!  ├── reader thread ──PtyEvent::Output──> event channel
//!  └── waiter thread ──PtyEvent::Exited──> event channel
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::thread;

use anyhow::{Context, Result};
use bytes::Bytes;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc::UnboundedSender;

/// Events delivered by the PTY helper threads.
#[derive(Debug, Clone)]
pub enum PtyEvent {
    /// A chunk of output from the session's child process.
    Output {
        /// Session id the chunk belongs to.
        session_id: String,
        /// Raw bytes as read from the PTY.
        data: Bytes,
    },
    /// The child process exited.
    Exited {
        /// Session id of the exited child.
        session_id: String,
        /// Process exit code.
        code: u32,
    },
}

/// A running PTY child and the handles needed to drive it.
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    reader_thread: Option<thread::JoinHandle<()>>,
    waiter_thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess").finish_non_exhaustive()
    }
}

impl PtyProcess {
    /// Spawn `command_str` under a fresh PTY in `cwd`.
    ///
    /// The child inherits the parent environment plus `extra_env`.
    /// Output and exit events are tagged with `session_id` and sent on
    /// `event_tx`.
    pub fn spawn(
        command_str: &str,
        cwd: &Path,
        cols: u16,
        rows: u16,
        extra_env: &HashMap<String, String>,
        session_id: String,
        event_tx: UnboundedSender<PtyEvent>,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system.openpty(size).context("Failed to open PTY")?;

        let parts: Vec<&str> = command_str.split_whitespace().collect();
        let program = parts.first().context("Empty session command")?;
        let mut cmd = CommandBuilder::new(program);
        for arg in &parts[1..] {
            cmd.arg(arg);
        }
        cmd.cwd(cwd);
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("Failed to spawn command")?;
        // Close our copy of the slave end so reads see EOF when the child exits.
        drop(pair.slave);

        let killer = child.clone_killer();
        let reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        let reader_thread = Some(spawn_reader_thread(
            reader,
            session_id.clone(),
            event_tx.clone(),
        ));
        let waiter_thread = Some(spawn_waiter_thread(child, session_id, event_tx));

        Ok(Self {
            master: pair.master,
            writer,
            killer,
            reader_thread,
            waiter_thread,
        })
    }

    /// Write input bytes to the child.
    pub fn write(&mut self, input: &[u8]) -> Result<()> {
        self.writer.write_all(input)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Resize the PTY. The child receives SIGWINCH.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    /// Kill the child process. Best-effort; the waiter thread reaps it.
    pub fn kill(&mut self) {
        if let Err(e) = self.killer.kill() {
            log::warn!("Failed to kill PTY child: {e}");
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        // Quiet kill: the child is usually already dead here.
        let _ = self.killer.kill();
        // Helper threads exit on their own once the child dies (reader
        // sees EOF, waiter returns from wait); detach rather than join
        // so drop never blocks the event loop.
        drop(self.reader_thread.take());
        drop(self.waiter_thread.take());
    }
}

/// Reader thread: forward PTY output chunks until EOF or read error.
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    session_id: String,
    event_tx: UnboundedSender<PtyEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let event = PtyEvent::Output {
                        session_id: session_id.clone(),
                        data: Bytes::copy_from_slice(&buf[..n]),
                    };
                    if event_tx.send(event).is_err() {
                        // Event loop is gone; nothing left to do.
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("PTY reader for {session_id} stopping: {e}");
                    break;
                }
            }
        }
        log::debug!("PTY reader thread for {session_id} exiting");
    })
}

/// Waiter thread: reap the child and report its exit code.
fn spawn_waiter_thread(
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
    session_id: String,
    event_tx: UnboundedSender<PtyEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let code = match child.wait() {
            Ok(status) => status.exit_code(),
            Err(e) => {
                log::warn!("Failed to wait for PTY child {session_id}: {e}");
                1
            }
        };
        let _ = event_tx.send(PtyEvent::Exited { session_id, code });
    })
}
