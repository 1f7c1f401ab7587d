use chrono::{DateTime, Utc};
use reelsmith_core::types::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::artifact::{hash_file, write_atomic};
use crate::error::Result;

/// Record of one completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Artifact file name, relative to the run directory.
    pub artifact: String,
    pub bytes: u64,
    pub sha256: String,
    pub completed_at: DateTime<Utc>,
}

/// Per-run record of completed stages, stored as `{slug}_ledger.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub run_id: Uuid,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stages: BTreeMap<Stage, LedgerEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl Ledger {
    /// Load the ledger at `path`, or start a fresh one. An unreadable ledger
    /// is replaced; valid artifacts are re-adopted afterwards.
    pub fn open(path: impl Into<PathBuf>, topic: &str) -> Self {
        let path = path.into();
        let loaded = std::fs::read(&path)
            .ok()
            .and_then(|data| match serde_json::from_slice::<Ledger>(&data) {
                Ok(ledger) => Some(ledger),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable ledger");
                    None
                }
            });
        match loaded {
            Some(mut ledger) => {
                ledger.path = path;
                ledger
            }
            None => Self {
                run_id: Uuid::new_v4(),
                topic: topic.to_string(),
                created_at: Utc::now(),
                stages: BTreeMap::new(),
                path,
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, stage: Stage) -> Option<&LedgerEntry> {
        self.stages.get(&stage)
    }

    /// Hash `artifact` and record `stage` as complete. Does not save.
    pub fn record(&mut self, stage: Stage, artifact: &Path) -> Result<&LedgerEntry> {
        let (bytes, sha256) = hash_file(artifact)?;
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.stages.insert(
            stage,
            LedgerEntry {
                artifact: name,
                bytes,
                sha256,
                completed_at: Utc::now(),
            },
        );
        Ok(&self.stages[&stage])
    }

    pub fn remove(&mut self, stage: Stage) -> Option<LedgerEntry> {
        self.stages.remove(&stage)
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(&self.path, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("snail_cropped.mp4");
        std::fs::write(&artifact, b"video bytes").unwrap();

        let path = dir.path().join("snail_ledger.json");
        let mut ledger = Ledger::open(&path, "The Snail");
        let entry = ledger.record(Stage::Crop, &artifact).unwrap().clone();
        assert_eq!(entry.artifact, "snail_cropped.mp4");
        assert_eq!(entry.bytes, 11);
        ledger.save().unwrap();

        let reopened = Ledger::open(&path, "ignored");
        assert_eq!(reopened.run_id, ledger.run_id);
        assert_eq!(reopened.topic, "The Snail");
        assert_eq!(reopened.entry(Stage::Crop), Some(&entry));
        assert!(reopened.entry(Stage::Mix).is_none());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"crop\""));
    }

    #[test]
    fn corrupt_ledger_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snail_ledger.json");
        std::fs::write(&path, b"{ truncated").unwrap();
        let ledger = Ledger::open(&path, "The Snail");
        assert!(ledger.stages.is_empty());
        assert_eq!(ledger.path(), path.as_path());
    }

    #[test]
    fn remove_drops_entry() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("snail.mp3");
        std::fs::write(&artifact, b"mp3").unwrap();
        let mut ledger = Ledger::open(dir.path().join("l.json"), "t");
        ledger.record(Stage::Voice, &artifact).unwrap();
        assert!(ledger.remove(Stage::Voice).is_some());
        assert!(ledger.entry(Stage::Voice).is_none());
    }
}
