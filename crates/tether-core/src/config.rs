//! Client configuration.
//!
//! Everything has a usable default; a TOML file and the agent-URL
//! environment variable can override it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment override for the agent's base URL.
pub const AGENT_URL_ENV: &str = "TETHER_AGENT_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:2024";
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_REVEAL_TICK_MS: u64 = 8;
const DEFAULT_REVEAL_STEP_CHARS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the agent endpoint, without a trailing path.
    pub base_url: String,

    /// SQLite file backing the thread store.
    pub store_path: PathBuf,

    /// Trailing-edge window for mid-stream thread saves.
    pub debounce_ms: u64,

    /// Reveal timer period.
    pub reveal_tick_ms: u64,

    /// Characters disclosed per reveal tick.
    pub reveal_step_chars: usize,

    /// Most-recent threads kept in the store index.
    pub thread_index_cap: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            store_path: default_store_path(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            reveal_tick_ms: DEFAULT_REVEAL_TICK_MS,
            reveal_step_chars: DEFAULT_REVEAL_STEP_CHARS,
            thread_index_cap: crate::store::DEFAULT_THREAD_CAP,
        }
    }
}

impl AgentConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Configuration(format!("invalid config file: {e}")))?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(AGENT_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        Ok(config)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reveal_tick(&self) -> Duration {
        Duration::from_millis(self.reveal_tick_ms)
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
        .join("threads.db")
}
