//! Append-only, hash-chained write-ahead log of fill records.
//!
//! Each record carries the hash of its predecessor plus a hash of its own
//! contents, so any mutation or truncation in the middle of the file is
//! detectable by recomputing the chain. Appends are fsync'd before they
//! return; an acknowledged append survives a crash.

use crate::domain::Fill;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Sentinel the hash chain starts from, and restarts from after `reset`.
pub const GENESIS_HASH: &str = "genesis";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("hash chain broken at record {index}: {detail}")]
    ChainBroken { index: usize, detail: String },
    #[error("fill has no sequence number assigned")]
    MissingSeq,
}

/// One WAL line: the journaled fill wrapped with chain metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Sequence number of the fill; absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// RFC 3339 append timestamp.
    pub ts: String,
    pub fill: Fill,
    pub prev_hash: String,
    pub hash: String,
}

impl JournalRecord {
    /// Recompute this record's content hash from its fields.
    pub fn compute_hash(
        seq: Option<u64>,
        ts: &str,
        fill: &Fill,
        prev_hash: &str,
    ) -> Result<String, serde_json::Error> {
        let mut hasher = Sha256::new();
        if let Some(seq) = seq {
            hasher.update(seq.to_le_bytes());
        }
        hasher.update(ts.as_bytes());
        hasher.update(serde_json::to_string(fill)?.as_bytes());
        hasher.update(prev_hash.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Append-only fill journal with a sha256 hash chain.
pub struct Journal {
    path: PathBuf,
    file: File,
    last_hash: String,
}

impl Journal {
    /// Open (or create) the journal at `path`, scanning any existing records
    /// to pick up the tip of the hash chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let last_hash = if path.exists() {
            Self::read_records(&path)
                .last()
                .map(|r| r.hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string())
        } else {
            GENESIS_HASH.to_string()
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Journal {
            path,
            file,
            last_hash,
        })
    }

    /// Append a fill, extending the hash chain and fsyncing before returning.
    ///
    /// The fill must already carry its sequence number (the ledger assigns it
    /// from its authoritative counter just before appending).
    pub fn append(&mut self, fill: &Fill) -> Result<(), JournalError> {
        let seq = fill.seq.ok_or(JournalError::MissingSeq)?;
        let ts = chrono::Utc::now().to_rfc3339();
        let hash = JournalRecord::compute_hash(Some(seq), &ts, fill, &self.last_hash)?;

        let record = JournalRecord {
            seq: Some(seq),
            ts,
            fill: fill.clone(),
            prev_hash: self.last_hash.clone(),
            hash: hash.clone(),
        };

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;

        self.last_hash = hash;
        Ok(())
    }

    /// Read all structurally valid records in append order.
    ///
    /// Corrupt lines (a crash can leave a partial record at the tail) are
    /// skipped with a warning, never an error.
    pub fn read_all(&self) -> Vec<JournalRecord> {
        Self::read_records(&self.path)
    }

    fn read_records(path: &Path) -> Vec<JournalRecord> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(lineno, error = %e, "unreadable journal line, skipping");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    warn!(lineno, error = %e, "corrupt journal line, skipping");
                }
            }
        }
        records
    }

    /// Recompute the full hash chain and verify every record.
    ///
    /// Detects any mutated record (content hash mismatch) and any broken
    /// linkage (prev_hash not matching the preceding record's hash).
    pub fn verify_chain(&self) -> Result<usize, JournalError> {
        let records = self.read_all();
        let mut prev = GENESIS_HASH.to_string();

        for (index, rec) in records.iter().enumerate() {
            if rec.prev_hash != prev {
                return Err(JournalError::ChainBroken {
                    index,
                    detail: format!("prev_hash {} does not link to {}", rec.prev_hash, prev),
                });
            }
            let expected = JournalRecord::compute_hash(rec.seq, &rec.ts, &rec.fill, &rec.prev_hash)?;
            if expected != rec.hash {
                return Err(JournalError::ChainBroken {
                    index,
                    detail: "content hash mismatch".to_string(),
                });
            }
            prev = rec.hash.clone();
        }

        Ok(records.len())
    }

    /// Truncate the journal and restart the hash chain from genesis.
    ///
    /// Only safe immediately after a snapshot has durably captured the state
    /// the truncated records produced.
    pub fn reset(&mut self) -> Result<(), JournalError> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(0)?;
        file.sync_all()?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.last_hash = GENESIS_HASH.to_string();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
