//! Runtime configuration
//!
//! One TOML file covers the evolution core and the runner around it. Every
//! field has a default so a partial or missing file still loads.

use crate::evolution::{GradingConfig, MemoryConfig, PolicyConfig};
use crate::simulator::SimulatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "KILLCORE_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "killcore.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillcoreConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl KillcoreConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `KILLCORE_CONFIG_PATH` or the default path, falling back to
    /// defaults when neither parses.
    pub fn from_env() -> Self {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default killcore config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Directory holding agent, performance, memory and market files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Round archives; defaults to `<state_dir>/archives`
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
    /// Exclusivity marker for the daemon
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    /// Pause between daemon rounds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Fixed RNG seed; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Candidate symbols for a freshly generated agent
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("killcore_state")
}

fn default_lock_path() -> PathBuf {
    std::env::temp_dir().join("killcore_archiver.lock")
}

fn default_interval_secs() -> u64 {
    10
}

fn default_symbols() -> Vec<String> {
    crate::agent::DEFAULT_SYMBOLS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            archive_dir: None,
            lock_path: default_lock_path(),
            interval_secs: default_interval_secs(),
            seed: None,
            symbols: default_symbols(),
        }
    }
}

impl RunnerConfig {
    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("archives"))
    }
}
