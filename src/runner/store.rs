//! JSON state files for one agent.
//!
//! Files are the transport between rounds. Writes go through a temp file and
//! a rename so a crash mid-write never leaves a truncated record behind.

use crate::agent::SymbolMemory;
use crate::error::{EvolutionError, Result};
use crate::evolution::{MemorySnapshot, SelfEvaluation};
use crate::models::{AgentState, MarketRegimeInput, PerformanceRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const AGENT_FILE: &str = "agent.json";
pub const PERFORMANCE_FILE: &str = "performance.json";
pub const MEMORY_FILE: &str = "memory.json";
pub const MARKET_FILE: &str = "market_status.json";
pub const EVALUATION_FILE: &str = "self_evaluation.json";
pub const SYMBOL_MEMORY_FILE: &str = "symbol_memory.json";

/// Files copied into each round archive.
pub const ARCHIVED_FILES: [&str; 3] = [AGENT_FILE, PERFORMANCE_FILE, MEMORY_FILE];

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn has_agent(&self) -> bool {
        self.path(AGENT_FILE).exists()
    }

    pub fn load_agent(&self) -> Result<AgentState> {
        self.read(AGENT_FILE)?.ok_or_else(|| {
            EvolutionError::PersistenceUnavailable(format!(
                "{} missing; generate an agent first",
                self.path(AGENT_FILE).display()
            ))
        })
    }

    pub fn save_agent(&self, agent: &AgentState) -> Result<()> {
        self.write(AGENT_FILE, agent)
    }

    pub fn load_performance(&self) -> Result<Option<PerformanceRecord>> {
        self.read(PERFORMANCE_FILE)
    }

    pub fn save_performance(&self, record: &PerformanceRecord) -> Result<()> {
        self.write(PERFORMANCE_FILE, record)
    }

    /// Missing memory is an empty memory.
    pub fn load_memory(&self) -> Result<MemorySnapshot> {
        Ok(self.read(MEMORY_FILE)?.unwrap_or_default())
    }

    pub fn save_memory(&self, snapshot: &MemorySnapshot) -> Result<()> {
        self.write(MEMORY_FILE, snapshot)
    }

    pub fn load_market(&self) -> Result<Option<MarketRegimeInput>> {
        self.read(MARKET_FILE)
    }

    pub fn save_market(&self, market: &MarketRegimeInput) -> Result<()> {
        self.write(MARKET_FILE, market)
    }

    pub fn load_evaluation(&self) -> Result<Option<SelfEvaluation>> {
        self.read(EVALUATION_FILE)
    }

    pub fn save_evaluation(&self, evaluation: &SelfEvaluation) -> Result<()> {
        self.write(EVALUATION_FILE, evaluation)
    }

    pub fn load_symbol_memory(&self) -> Result<Option<SymbolMemory>> {
        self.read(SYMBOL_MEMORY_FILE)
    }

    pub fn save_symbol_memory(&self, memory: &SymbolMemory) -> Result<()> {
        self.write(SYMBOL_MEMORY_FILE, memory)
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.path(file);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EvolutionError::PersistenceUnavailable(format!(
                    "read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&contents).map(Some).map_err(|e| {
            if e.is_data() || e.is_syntax() || e.is_eof() {
                EvolutionError::malformed(file, e.to_string())
            } else {
                EvolutionError::PersistenceUnavailable(format!("read {}: {}", path.display(), e))
            }
        })
    }

    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(file);
        let tmp = self.dir.join(format!(".{}.tmp", file));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
