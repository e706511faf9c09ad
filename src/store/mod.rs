//! Event-sourced persistence boundary: an append-only, versioned event log
//! with optimistic concurrency, stream replay, and shadow-replay consistency
//! checking against a live ledger.
//!
//! This is the alternate durability path to the WAL+snapshot pair; a
//! deployment picks one, or runs both in a shadow-verification setup.

use crate::domain::{Decimal, Fill};
use crate::ledger::{Ledger, LedgerError};
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Event type tag for journaled fills.
pub const FILL_EVENT_TYPE: &str = "fill";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("concurrency conflict on stream {stream}: expected version {expected}, got {actual}")]
    ConcurrencyConflict {
        stream: String,
        expected: i64,
        actual: i64,
    },
    #[error("state divergence detected: {0}")]
    StateDivergence(String),
    #[error("event store database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("event payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One stored event, as read back from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub stream: String,
    pub event_type: String,
    pub version: i64,
    pub payload: serde_json::Value,
}

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { version: i64 },
    /// The event id was already stored; a retried append is a safe no-op.
    Duplicate,
}

/// Initialize the SQLite event store with schema and pragmas.
pub async fn init_store(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    let schema_sql = include_str!("schema.sql");
    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(&pool).await?;
        }
    }

    info!("event store initialized at {}", db_path);
    Ok(pool)
}

async fn configure_pragmas(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    // journal_mode returns the actual mode set; must use fetch to get result
    sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        EventStore { pool }
    }

    /// Current max version of a stream (0 when empty).
    pub async fn stream_version(&self, stream: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) FROM events WHERE stream = ?")
            .bind(stream)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Append an event with optimistic concurrency.
    ///
    /// Rejects with `ConcurrencyConflict` if `expected_version` is stale.
    /// A retried append of an already-stored event id is a no-op.
    pub async fn append(
        &self,
        stream: &str,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
        expected_version: i64,
    ) -> Result<AppendOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) FROM events WHERE stream = ?")
            .bind(stream)
            .fetch_one(&mut *tx)
            .await?;
        let current: i64 = row.get(0);

        if current != expected_version {
            // A lost race is only a conflict if this exact event is new;
            // a duplicate id means the original append already won.
            if self.event_exists(event_id).await? {
                warn!(event_id, stream, "duplicate event append ignored");
                return Ok(AppendOutcome::Duplicate);
            }
            return Err(StoreError::ConcurrencyConflict {
                stream: stream.to_string(),
                expected: expected_version,
                actual: current,
            });
        }

        let version = expected_version + 1;
        let result = sqlx::query(
            r#"
            INSERT INTO events (id, stream, event_type, version, payload, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_id)
        .bind(stream)
        .bind(event_type)
        .bind(version)
        .bind(payload.to_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(AppendOutcome::Appended { version })
            }
            Err(sqlx::Error::Database(db))
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                drop(tx);
                if self.event_exists(event_id).await? {
                    warn!(event_id, stream, "duplicate event append ignored");
                    Ok(AppendOutcome::Duplicate)
                } else {
                    // (stream, version) collision: a concurrent writer
                    // committed between our read and insert.
                    let actual = self.stream_version(stream).await?;
                    Err(StoreError::ConcurrencyConflict {
                        stream: stream.to_string(),
                        expected: expected_version,
                        actual,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn event_exists(&self, event_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM events WHERE id = ?")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    /// Append a fill event keyed by its fill id, so a retried append of the
    /// same fill is a safe no-op.
    pub async fn append_fill(
        &self,
        stream: &str,
        fill: &Fill,
        expected_version: i64,
    ) -> Result<AppendOutcome, StoreError> {
        let payload = serde_json::to_value(fill)?;
        self.append(
            stream,
            fill.fill_id.as_str(),
            FILL_EVENT_TYPE,
            &payload,
            expected_version,
        )
        .await
    }

    /// Append, re-reading the stream version and retrying with exponential
    /// backoff when a concurrent writer wins the version race.
    pub async fn append_with_retry(
        &self,
        stream: &str,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<AppendOutcome, StoreError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(10),
            max_elapsed_time: Some(Duration::from_secs(5)),
            ..Default::default()
        };

        backoff::future::retry(policy, || async {
            let expected = self
                .stream_version(stream)
                .await
                .map_err(backoff::Error::permanent)?;
            match self
                .append(stream, event_id, event_type, payload, expected)
                .await
            {
                Ok(outcome) => Ok(outcome),
                Err(e @ StoreError::ConcurrencyConflict { .. }) => {
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Read a stream's events in version order.
    pub async fn read_stream(&self, stream: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, stream, event_type, version, payload
            FROM events
            WHERE stream = ?
            ORDER BY version ASC
            "#,
        )
        .bind(stream)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let payload_text: String = row.get("payload");
            events.push(StoredEvent {
                id: row.get("id"),
                stream: row.get("stream"),
                event_type: row.get("event_type"),
                version: row.get("version"),
                payload: serde_json::from_str(&payload_text)?,
            });
        }
        Ok(events)
    }

    /// Fold all events for a stream, in version order, through a handler.
    pub async fn replay_stream<F>(&self, stream: &str, mut handler: F) -> Result<usize, StoreError>
    where
        F: FnMut(&StoredEvent) -> Result<(), StoreError>,
    {
        let events = self.read_stream(stream).await?;
        for event in &events {
            handler(event)?;
        }
        Ok(events.len())
    }

    /// Rebuild a fresh ledger by folding a stream's fill events from empty.
    pub async fn rebuild_ledger(
        &self,
        stream: &str,
        starting_cash: Decimal,
    ) -> Result<Ledger, StoreError> {
        let mut ledger = Ledger::new(starting_cash);
        self.replay_stream(stream, |event| {
            if event.event_type != FILL_EVENT_TYPE {
                return Ok(());
            }
            let fill: Fill = serde_json::from_value(event.payload.clone())?;
            ledger.replay_fill(&fill)?;
            Ok(())
        })
        .await?;
        Ok(ledger)
    }

    /// Rebuild a second ledger from the full event history and assert it
    /// matches the live one.
    ///
    /// Divergence is fatal: it signals a correctness bug, and the caller
    /// must stop processing rather than continue on a wrong state.
    pub async fn shadow_replay(
        &self,
        stream: &str,
        live: &Ledger,
        starting_cash: Decimal,
    ) -> Result<(), StoreError> {
        let shadow = self.rebuild_ledger(stream, starting_cash).await?;

        // Marks and peak equity live outside the event history; compare the
        // pure fold of fills: cash, realized PnL, and position basis.
        if shadow.cash() != live.cash() {
            return Err(StoreError::StateDivergence(format!(
                "cash: shadow {} vs live {}",
                shadow.cash(),
                live.cash()
            )));
        }
        if shadow.realized_pnl() != live.realized_pnl() {
            return Err(StoreError::StateDivergence(format!(
                "realized pnl: shadow {} vs live {}",
                shadow.realized_pnl(),
                live.realized_pnl()
            )));
        }

        let shadow_snap = shadow.snapshot();
        let live_snap = live.snapshot();
        if shadow_snap.positions.len() != live_snap.positions.len() {
            return Err(StoreError::StateDivergence(format!(
                "position count: shadow {} vs live {}",
                shadow_snap.positions.len(),
                live_snap.positions.len()
            )));
        }
        for shadow_pos in &shadow_snap.positions {
            let live_pos = live_snap
                .positions
                .iter()
                .find(|p| p.symbol == shadow_pos.symbol);
            let matches = live_pos.map(|p| {
                p.qty == shadow_pos.qty
                    && p.avg_price == shadow_pos.avg_price
                    && p.realized_pnl == shadow_pos.realized_pnl
            });
            if matches != Some(true) {
                return Err(StoreError::StateDivergence(format!(
                    "position {} differs between shadow and live",
                    shadow_pos.symbol
                )));
            }
        }

        Ok(())
    }
}
