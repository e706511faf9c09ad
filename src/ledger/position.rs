//! Per-symbol position state and fill arithmetic.

use crate::domain::{Decimal, Symbol};
use serde::{Deserialize, Serialize};

/// Net position in one symbol.
///
/// Invariant: `qty == 0` implies `avg_price == 0`, so a flat position can
/// never contribute mark-dependent PnL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed net quantity: positive = long, negative = short.
    pub qty: Decimal,
    /// Quantity-weighted average entry price; zero when flat.
    pub avg_price: Decimal,
    /// Realized PnL accumulated by reducing/closing fills (ex commission).
    pub realized_pnl: Decimal,
    /// Last mark price seen for this symbol, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_price: Option<Decimal>,
}

impl Position {
    pub fn new(symbol: Symbol) -> Self {
        Position {
            symbol,
            qty: Decimal::zero(),
            avg_price: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            mark_price: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.qty.is_zero()
    }

    /// Price used for valuation: the last mark, falling back to entry.
    pub fn valuation_price(&self) -> Decimal {
        self.mark_price.unwrap_or(self.avg_price)
    }

    /// Signed market value (`qty × valuation price`).
    pub fn market_value(&self) -> Decimal {
        self.qty * self.valuation_price()
    }

    /// Absolute notional exposure.
    pub fn exposure(&self) -> Decimal {
        self.market_value().abs()
    }

    /// Unrealized PnL: `(mark − avg) × qty`, zero when flat.
    pub fn unrealized_pnl(&self) -> Decimal {
        if self.is_flat() {
            return Decimal::zero();
        }
        (self.valuation_price() - self.avg_price) * self.qty
    }

    /// Apply a signed fill quantity at `price`, returning the realized PnL
    /// delta.
    ///
    /// Same-sign (or from-flat) fills blend the average price; opposite-sign
    /// fills realize `min(|old|, |fill|) × (price − avg) × sign(old)`. A fill
    /// that reverses through zero re-bases the residual at the fill's price.
    pub fn apply(&mut self, signed_qty: Decimal, price: Decimal) -> Decimal {
        let old_qty = self.qty;

        let same_direction = old_qty.is_zero() || old_qty.signum() == signed_qty.signum();
        if same_direction {
            let new_qty = old_qty + signed_qty;
            if !new_qty.is_zero() {
                self.avg_price = (old_qty * self.avg_price + signed_qty * price) / new_qty;
            }
            self.qty = new_qty;
            return Decimal::zero();
        }

        let closing_qty = old_qty.abs().min(signed_qty.abs());
        let realized = closing_qty * (price - self.avg_price) * old_qty.signum();
        self.realized_pnl += realized;
        self.qty = old_qty + signed_qty;

        if self.qty.is_zero() {
            self.avg_price = Decimal::zero();
        } else if self.qty.signum() != old_qty.signum() {
            // Reversed through zero: the residual opened at the fill price.
            self.avg_price = price;
        }

        realized
    }
}
