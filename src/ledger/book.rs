//! The position/portfolio ledger: applies fills under strict numeric
//! invariants, marks positions to market, and derives equity, exposure and
//! drawdown.
//!
//! Single logical writer: no two threads may mutate the same `Ledger`.
//! When a journal is attached, every live fill is appended (and fsync'd)
//! before any in-memory state changes.

use crate::domain::{Decimal, Fill, FillId, Symbol};
use crate::ledger::position::Position;
use crate::risk::{RiskContext, CONTEXT_SCHEMA_VERSION};
use crate::wal::journal::{Journal, JournalError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid fill: {0}")]
    InvalidFill(String),
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Result of applying one fill.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(RealizedDelta),
    /// The fill id was already applied; state is unchanged.
    Duplicate,
}

/// What a single applied fill changed.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedDelta {
    pub symbol: Symbol,
    pub realized_pnl: Decimal,
    pub qty_after: Decimal,
    pub avg_price_after: Decimal,
    pub cash_after: Decimal,
    pub seq: u64,
}

/// Derived portfolio state returned to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub cash: Decimal,
    pub equity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub exposure: Decimal,
    pub drawdown: Decimal,
    pub daily_realized_pnl: Decimal,
    pub apply_seq: u64,
}

/// Serializable ledger state captured into snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub starting_cash: Decimal,
    pub cash: Decimal,
    pub daily_realized_pnl: Decimal,
    pub trading_day: Option<chrono::NaiveDate>,
    pub peak_equity: Decimal,
    pub apply_seq: u64,
    pub positions: Vec<Position>,
    pub marks: BTreeMap<Symbol, Decimal>,
    pub applied_fill_ids: Vec<FillId>,
}

pub struct Ledger {
    starting_cash: Decimal,
    cash: Decimal,
    positions: BTreeMap<Symbol, Position>,
    marks: BTreeMap<Symbol, Decimal>,
    applied: BTreeSet<FillId>,
    peak_equity: Decimal,
    daily_realized_pnl: Decimal,
    trading_day: Option<chrono::NaiveDate>,
    apply_seq: u64,
    journal: Option<Journal>,
}

impl Ledger {
    pub fn new(starting_cash: Decimal) -> Self {
        Ledger {
            starting_cash,
            cash: starting_cash,
            positions: BTreeMap::new(),
            marks: BTreeMap::new(),
            applied: BTreeSet::new(),
            peak_equity: starting_cash,
            daily_realized_pnl: Decimal::zero(),
            trading_day: None,
            apply_seq: 0,
            journal: None,
        }
    }

    /// Attach a write-ahead journal; subsequent live fills are appended to it
    /// before state mutation.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn journal_mut(&mut self) -> Option<&mut Journal> {
        self.journal.as_mut()
    }

    /// Apply a fill on the live path: journal first (if attached), then
    /// mutate. Duplicate fill ids are a logged no-op.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<ApplyOutcome, LedgerError> {
        self.apply_inner(fill, false)
    }

    /// Apply a fill during recovery: no journal write, dedup still enforced.
    pub fn replay_fill(&mut self, fill: &Fill) -> Result<ApplyOutcome, LedgerError> {
        self.apply_inner(fill, true)
    }

    fn apply_inner(&mut self, fill: &Fill, replay: bool) -> Result<ApplyOutcome, LedgerError> {
        if !fill.is_well_formed() {
            return Err(LedgerError::InvalidFill(format!(
                "fill {} has non-positive qty/price or negative commission",
                fill.fill_id
            )));
        }

        if self.applied.contains(&fill.fill_id) {
            warn!(fill_id = %fill.fill_id, "duplicate fill ignored");
            return Ok(ApplyOutcome::Duplicate);
        }

        let seq = match fill.seq {
            Some(s) if replay => self.apply_seq.max(s),
            _ => self.apply_seq + 1,
        };

        if !replay {
            if let Some(journal) = self.journal.as_mut() {
                let mut journaled = fill.clone();
                journaled.seq = Some(seq);
                journal.append(&journaled)?;
            }
        }

        // Trading-day rollover resets the daily realized accumulator.
        let day = fill.time_ms.trading_day();
        if self.trading_day != Some(day) {
            if self.trading_day.is_some() {
                debug!(%day, "trading day rollover, daily realized PnL reset");
            }
            self.trading_day = Some(day);
            self.daily_realized_pnl = Decimal::zero();
        }

        let position = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| {
                let mut p = Position::new(fill.symbol.clone());
                p.mark_price = self.marks.get(&fill.symbol).copied();
                p
            });

        let signed_qty = fill.signed_qty();
        let realized = position.apply(signed_qty, fill.price);

        self.cash -= signed_qty * fill.price;
        self.cash -= fill.commission;
        self.daily_realized_pnl += realized;
        self.apply_seq = seq;
        self.applied.insert(fill.fill_id.clone());

        let delta = RealizedDelta {
            symbol: fill.symbol.clone(),
            realized_pnl: realized,
            qty_after: position.qty,
            avg_price_after: position.avg_price,
            cash_after: self.cash,
            seq,
        };

        debug!(
            fill_id = %fill.fill_id,
            symbol = %fill.symbol,
            seq,
            realized = %realized,
            "fill applied"
        );

        Ok(ApplyOutcome::Applied(delta))
    }

    /// Update the mark price for a symbol.
    pub fn mark(&mut self, symbol: &Symbol, price: Decimal) {
        self.marks.insert(symbol.clone(), price);
        if let Some(position) = self.positions.get_mut(symbol) {
            position.mark_price = Some(price);
        }
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn apply_seq(&self) -> u64 {
        self.apply_seq
    }

    /// Total realized PnL across all positions (ex commission).
    pub fn realized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::zero(), |acc, p| acc + p.realized_pnl)
    }

    /// Aggregate unrealized PnL over non-flat positions.
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::zero(), |acc, p| acc + p.unrealized_pnl())
    }

    fn market_value(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::zero(), |acc, p| acc + p.market_value())
    }

    fn gross_exposure(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::zero(), |acc, p| acc + p.exposure())
    }

    /// Recompute equity, exposure and drawdown, checking the ledger's hard
    /// invariants.
    ///
    /// # Errors
    /// `InvariantViolation` is fatal: the caller must halt, not retry.
    pub fn compute_state(&mut self) -> Result<LedgerState, LedgerError> {
        let exposure = self.gross_exposure();
        if exposure.is_negative() {
            return Err(LedgerError::InvariantViolation(format!(
                "negative exposure {}",
                exposure
            )));
        }

        let unrealized = self.unrealized_pnl();
        for position in self.positions.values() {
            if position.is_flat() && !position.avg_price.is_zero() {
                return Err(LedgerError::InvariantViolation(format!(
                    "flat position {} holds avg price {}",
                    position.symbol, position.avg_price
                )));
            }
        }

        let all_flat = self.positions.values().all(|p| p.is_flat());
        if all_flat && (!exposure.is_zero() || !unrealized.is_zero()) {
            return Err(LedgerError::InvariantViolation(format!(
                "flat book reports exposure {} / unrealized {}",
                exposure, unrealized
            )));
        }

        let equity = self.cash + self.market_value();

        // Cross-check the identity via the cost-basis route.
        let cost_basis = self
            .positions
            .values()
            .fold(Decimal::zero(), |acc, p| acc + p.qty * p.avg_price);
        let equity_check = self.cash + cost_basis + unrealized;
        if !equity.approx_eq(equity_check) {
            return Err(LedgerError::InvariantViolation(format!(
                "equity identity broken: {} vs {}",
                equity, equity_check
            )));
        }

        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        let drawdown = if self.peak_equity.is_positive() {
            (self.peak_equity - equity) / self.peak_equity
        } else {
            Decimal::zero()
        };

        Ok(LedgerState {
            cash: self.cash,
            equity,
            realized_pnl: self.realized_pnl(),
            unrealized_pnl: unrealized,
            exposure,
            drawdown,
            daily_realized_pnl: self.daily_realized_pnl,
            apply_seq: self.apply_seq,
        })
    }

    /// Build the read-only context consumed by the risk rule engine.
    pub fn risk_context(&self) -> RiskContext {
        let equity = self.cash + self.market_value();
        let peak = self.peak_equity.max(equity);
        let drawdown = if peak.is_positive() {
            (peak - equity) / peak
        } else {
            Decimal::zero()
        };

        let exposure_by_symbol = self
            .positions
            .iter()
            .filter(|(_, p)| !p.is_flat())
            .map(|(s, p)| (s.clone(), p.exposure()))
            .collect();

        RiskContext {
            schema: CONTEXT_SCHEMA_VERSION,
            equity,
            cash: self.cash,
            gross_exposure: self.gross_exposure(),
            drawdown,
            daily_realized_pnl: self.daily_realized_pnl,
            realized_pnl: self.realized_pnl(),
            unrealized_pnl: self.unrealized_pnl(),
            exposure_by_symbol,
        }
    }

    /// Capture the ledger into a serializable snapshot.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            starting_cash: self.starting_cash,
            cash: self.cash,
            daily_realized_pnl: self.daily_realized_pnl,
            trading_day: self.trading_day,
            peak_equity: self.peak_equity,
            apply_seq: self.apply_seq,
            positions: self.positions.values().cloned().collect(),
            marks: self.marks.clone(),
            applied_fill_ids: self.applied.iter().cloned().collect(),
        }
    }

    /// Restore ledger state from a snapshot, replacing current state.
    pub fn restore(&mut self, snapshot: LedgerSnapshot) {
        self.starting_cash = snapshot.starting_cash;
        self.cash = snapshot.cash;
        self.daily_realized_pnl = snapshot.daily_realized_pnl;
        self.trading_day = snapshot.trading_day;
        self.peak_equity = snapshot.peak_equity;
        self.apply_seq = snapshot.apply_seq;
        self.positions = snapshot
            .positions
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();
        self.marks = snapshot.marks;
        self.applied = snapshot.applied_fill_ids.into_iter().collect();
    }

    /// Trading day of the last applied fill.
    pub fn trading_day(&self) -> Option<chrono::NaiveDate> {
        self.trading_day
    }
}
