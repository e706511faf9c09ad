//! Atomic point-in-time snapshots of ledger + risk engine state.
//!
//! A snapshot is never partially visible: it is staged to a temp file in the
//! same directory, fsync'd, atomically renamed into place, and the directory
//! is fsync'd so the install survives power loss.

use crate::ledger::LedgerSnapshot;
use crate::risk::RiskEngineState;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported snapshot schema {0}")]
    UnsupportedSchema(u32),
}

/// The durable snapshot artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub schema: u32,
    /// Journal sequence this snapshot reflects; replay fences on it.
    pub as_of_seq: u64,
    pub created_at: String,
    pub ledger: LedgerSnapshot,
    pub risk: RiskEngineState,
}

impl SnapshotPayload {
    pub fn new(as_of_seq: u64, ledger: LedgerSnapshot, risk: RiskEngineState) -> Self {
        SnapshotPayload {
            schema: SNAPSHOT_SCHEMA_VERSION,
            as_of_seq,
            created_at: chrono::Utc::now().to_rfc3339(),
            ledger,
            risk,
        }
    }
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(SnapshotStore { path })
    }

    /// Stage, fsync, rename, fsync-dir.
    pub fn save(&self, payload: &SnapshotPayload) -> Result<(), SnapshotError> {
        let tmp_path = self.path.with_extension("tmp");

        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(serde_json::to_string(payload)?.as_bytes())?;
        tmp.flush()?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }

        info!(as_of_seq = payload.as_of_seq, path = %self.path.display(), "snapshot installed");
        Ok(())
    }

    /// Load the latest snapshot, if any exists.
    pub fn load(&self) -> Result<Option<SnapshotPayload>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let payload: SnapshotPayload = serde_json::from_str(&contents)?;
        if payload.schema != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchema(payload.schema));
        }
        Ok(Some(payload))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::domain::Decimal;
    use crate::ledger::Ledger;
    use crate::risk::RiskEngine;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn payload(seq: u64) -> SnapshotPayload {
        let ledger = Ledger::new(d("100000"));
        let risk = RiskEngine::new(&RiskConfig::default());
        SnapshotPayload::new(seq, ledger.snapshot(), risk.state())
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();

        assert!(store.load().unwrap().is_none());

        let p = payload(7);
        store.save(&p).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, p);
        assert_eq!(loaded.as_of_seq, 7);
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();

        store.save(&payload(1)).unwrap();
        store.save(&payload(2)).unwrap();

        assert_eq!(store.load().unwrap().unwrap().as_of_seq, 2);
        // No staging residue left behind.
        assert!(!dir.path().join("snapshot.tmp").exists());
    }

    #[test]
    fn test_unsupported_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = SnapshotStore::new(&path).unwrap();

        let mut p = payload(1);
        p.schema = 99;
        std::fs::write(&path, serde_json::to_string(&p).unwrap()).unwrap();

        assert!(matches!(
            store.load(),
            Err(SnapshotError::UnsupportedSchema(99))
        ));
    }
}
