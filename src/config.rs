//! User configuration, persisted as JSON under `~/.hydra/`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Settings controlling session spawning and checkout placement.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Command each session runs under its PTY.
    pub command: String,
    /// Root directory for per-repository checkout trees. Tilde is
    /// expanded on load.
    pub checkout_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            checkout_base: "~/.hydra/worktrees".to_string(),
        }
    }
}

impl Config {
    /// Configuration directory, created on first use.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::home_dir()
            .context("No home directory")?
            .join(".hydra");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Load the config, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            let default = Self::default();
            default.save()?;
            Ok(default)
        }
    }

    /// Persist the config as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Checkout base with the tilde expanded.
    pub fn checkout_base_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.checkout_base).as_ref())
    }
}
