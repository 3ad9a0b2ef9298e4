// Library modules
pub mod ansi;
pub mod app;
pub mod checkout;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod emulator;
pub mod error;
pub mod input;
pub mod pty;
pub mod render;
pub mod session;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use checkout::{CheckoutEntry, CheckoutManager};
pub use compositor::{ChromeView, Compositor, PassthroughFilter, TabView};
pub use config::Config;
pub use emulator::Emulator;
pub use error::HydraError;
pub use input::{InputEffect, InputRouter};
pub use pty::{PtyEvent, PtyProcess};
pub use render::{render_buffer, render_line, CellStyle, ColorSpec};
pub use session::SessionManager;
pub use status::{SessionStatus, StatusTracker};
pub use store::{reduce, Action, AppState, Mode, SessionMeta, Store};
