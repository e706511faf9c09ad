//! Durability layer: hash-chained write-ahead journal, atomic snapshots,
//! and the recovery protocol that ties them together.

pub mod journal;
pub mod recovery;
pub mod snapshot;

pub use journal::{Journal, JournalError, JournalRecord, GENESIS_HASH};
pub use recovery::{checkpoint, recover, CheckpointPolicy, Recovered, RecoveryError};
pub use snapshot::{SnapshotError, SnapshotPayload, SnapshotStore, SNAPSHOT_SCHEMA_VERSION};
