//! Read-only portfolio context consumed by risk rules.

use crate::domain::{Decimal, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version stamp for [`RiskContext`], bumped on field changes.
pub const CONTEXT_SCHEMA_VERSION: u32 = 1;

/// Explicit, versioned snapshot of ledger state handed to the rule chain.
///
/// Constructed by `Ledger::risk_context`; rules read it, never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContext {
    pub schema: u32,
    pub equity: Decimal,
    pub cash: Decimal,
    /// Sum of absolute notional of open positions.
    pub gross_exposure: Decimal,
    /// Fractional decline from the equity high-water mark.
    pub drawdown: Decimal,
    /// Realized PnL accrued on the current trading day (ex commission).
    pub daily_realized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Absolute notional per open (non-flat) symbol.
    pub exposure_by_symbol: BTreeMap<Symbol, Decimal>,
}

impl RiskContext {
    pub fn exposure_for(&self, symbol: &Symbol) -> Decimal {
        self.exposure_by_symbol
            .get(symbol)
            .copied()
            .unwrap_or_else(Decimal::zero)
    }

    /// Symbols with an open position.
    pub fn held_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.exposure_by_symbol.keys()
    }
}
