//! Numbered per-round archives of the mutable state files.

use crate::error::Result;
use crate::runner::store::{StateStore, ARCHIVED_FILES};
use std::fs;
use std::path::{Path, PathBuf};

const ROUND_PREFIX: &str = "round_";

#[derive(Debug, Clone)]
pub struct RoundArchiver {
    root: PathBuf,
}

impl RoundArchiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Highest archived round number, 0 when nothing is archived yet.
    pub fn latest_round(&self) -> Result<u32> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut latest = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let number = name
                .to_str()
                .and_then(|n| n.strip_prefix(ROUND_PREFIX))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(number) = number {
                latest = latest.max(number);
            }
        }
        Ok(latest)
    }

    /// Copy the state files present in `store` into the next round directory.
    /// Returns the new directory.
    pub fn archive(&self, store: &StateStore) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let round = self.latest_round()? + 1;
        let round_dir = self.root.join(format!("{}{:04}", ROUND_PREFIX, round));
        fs::create_dir(&round_dir)?;

        for file in ARCHIVED_FILES {
            let src = store.path(file);
            if src.exists() {
                fs::copy(&src, round_dir.join(file))?;
            }
        }
        Ok(round_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{agent, record};
    use crate::runner::store::{AGENT_FILE, MEMORY_FILE, PERFORMANCE_FILE};

    #[test]
    fn test_rounds_are_numbered_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state"));
        store.save_agent(&agent()).unwrap();
        store.save_performance(&record(1.0, 1.0)).unwrap();

        let archiver = RoundArchiver::new(dir.path().join("archives"));
        assert_eq!(archiver.latest_round().unwrap(), 0);

        let first = archiver.archive(&store).unwrap();
        assert!(first.ends_with("round_0001"));
        assert!(first.join(AGENT_FILE).exists());
        assert!(first.join(PERFORMANCE_FILE).exists());
        // memory was never written, so it is skipped
        assert!(!first.join(MEMORY_FILE).exists());

        // gaps do not cause reuse of a number
        fs::create_dir_all(archiver.root().join("round_0007")).unwrap();
        let next = archiver.archive(&store).unwrap();
        assert!(next.ends_with("round_0008"));
        assert_eq!(archiver.latest_round().unwrap(), 8);
    }
}
