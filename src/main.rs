//! Hydra CLI - terminal multiplexer for PTY-wrapped agent sessions.
//!
//! This is the main binary entry point. See the `hydra` library for the
//! core functionality.

use anyhow::Result;
use clap::Parser;
use hydra::{app, CheckoutManager, Config};
use mimalloc::MiMalloc;

/// Global allocator; mimalloc outperforms the system allocator under
/// the many small buffers the PTY pipeline produces.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hydra takes no arguments; the parser exists so `--help`/`--version`
/// work and stray arguments fail fast with a usage message.
#[derive(Parser)]
#[command(name = "hydra")]
#[command(version = VERSION)]
#[command(about = "Run multiple CLI agent sessions side by side, each in its own git worktree")]
struct Cli {}

fn main() {
    env_logger::init();
    let Cli {} = Cli::parse();

    let (config, checkouts) = match preflight() {
        Ok(ok) => ok,
        Err(e) => {
            eprintln!("hydra: {e:#}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("hydra: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(app::run(config, checkouts)) {
        eprintln!("hydra: {e:#}");
        std::process::exit(1);
    }
}

/// Checks that must pass before the terminal enters raw mode.
fn preflight() -> Result<(Config, CheckoutManager)> {
    if !atty::is(atty::Stream::Stdout) || !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("stdin/stdout must be a terminal");
    }

    let config = Config::load()?;
    let checkouts = CheckoutManager::new(&config.checkout_base_path())?;
    Ok((config, checkouts))
}
