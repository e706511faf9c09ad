//! Bootstrap protocol: snapshot load + sequence-fenced journal replay, and
//! the snapshot-then-truncate checkpoint that keeps recovery bounded.

use crate::config::RiskConfig;
use crate::domain::Decimal;
use crate::ledger::{ApplyOutcome, Ledger, LedgerError};
use crate::risk::RiskEngine;
use crate::wal::journal::{Journal, JournalError};
use crate::wal::snapshot::{SnapshotError, SnapshotPayload, SnapshotStore};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result of a bootstrap, with replay accounting for observability.
pub struct Recovered {
    pub ledger: Ledger,
    pub risk: RiskEngine,
    /// Sequence the loaded snapshot reflected; `None` for a cold start.
    pub snapshot_seq: Option<u64>,
    pub replayed: usize,
    pub fenced: usize,
    pub duplicates: usize,
}

/// Reconstruct ledger and risk engine state after a restart.
///
/// Loads the latest snapshot (if any), then replays journal records whose
/// sequence exceeds the snapshot's `as_of_seq`. Records with no sequence
/// number (legacy format) are always applied; records that fail to parse or
/// carry invalid fields are skipped, never fatal. Replay runs through the
/// same `apply_fill` math as live processing, with fill-id dedup enforced,
/// so replaying a journal tail that overlaps the snapshot is idempotent.
pub fn recover(
    journal: Journal,
    snapshot_store: &SnapshotStore,
    starting_cash: Decimal,
    risk_config: &RiskConfig,
) -> Result<Recovered, RecoveryError> {
    let mut ledger = Ledger::new(starting_cash);
    let mut risk = RiskEngine::new(risk_config);

    let mut as_of = 0u64;
    let mut snapshot_seq = None;
    if let Some(snapshot) = snapshot_store.load()? {
        as_of = snapshot.as_of_seq;
        snapshot_seq = Some(snapshot.as_of_seq);
        ledger.restore(snapshot.ledger);
        risk.load_state(&snapshot.risk);
        info!(as_of_seq = as_of, "snapshot loaded");
    }

    let mut replayed = 0usize;
    let mut fenced = 0usize;
    let mut duplicates = 0usize;

    for record in journal.read_all() {
        if let Some(seq) = record.seq {
            // Sequence fencing: already captured by the snapshot.
            if seq <= as_of {
                fenced += 1;
                continue;
            }
        }

        let mut fill = record.fill;
        fill.seq = record.seq;
        match ledger.replay_fill(&fill) {
            Ok(ApplyOutcome::Applied(_)) => replayed += 1,
            Ok(ApplyOutcome::Duplicate) => duplicates += 1,
            Err(LedgerError::InvalidFill(detail)) => {
                warn!(%detail, "invalid journal record skipped during replay");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(replayed, fenced, duplicates, "journal replay complete");

    Ok(Recovered {
        ledger: ledger.with_journal(journal),
        risk,
        snapshot_seq,
        replayed,
        fenced,
        duplicates,
    })
}

/// Snapshot the current state, then truncate the journal.
///
/// If the process dies between the two steps, the next recovery replays a
/// few records the snapshot already captured; fill-id dedup and sequence
/// fencing make that replay a no-op.
pub fn checkpoint(
    ledger: &mut Ledger,
    risk: &RiskEngine,
    snapshot_store: &SnapshotStore,
) -> Result<u64, RecoveryError> {
    let as_of = ledger.apply_seq();
    let payload = SnapshotPayload::new(as_of, ledger.snapshot(), risk.state());
    snapshot_store.save(&payload)?;

    if let Some(journal) = ledger.journal_mut() {
        journal.reset()?;
    }

    Ok(as_of)
}

/// Checkpoint cadence: every N applied fills (0 disables).
#[derive(Debug, Clone, Copy)]
pub struct CheckpointPolicy {
    pub every: u64,
}

impl CheckpointPolicy {
    pub fn is_due(&self, apply_seq: u64) -> bool {
        self.every > 0 && apply_seq % self.every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_policy() {
        let policy = CheckpointPolicy { every: 5 };
        assert!(!policy.is_due(4));
        assert!(policy.is_due(5));
        assert!(policy.is_due(10));
        assert!(!CheckpointPolicy { every: 0 }.is_due(5));
    }
}
