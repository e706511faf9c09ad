use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::wal::{JournalError, RecoveryError, SnapshotError};
use thiserror::Error;

/// Top-level error for callers that drive the whole core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
