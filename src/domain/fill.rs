//! Fill and trade-intent types.

use crate::domain::{Decimal, FillId, Side, Symbol, TimeMs};
use serde::{Deserialize, Serialize};

/// A confirmed trade execution.
///
/// Immutable once journaled; `seq` is assigned by the journal at append time
/// and is `None` for fills that have not been journaled (or for legacy
/// records written before sequence numbers existed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Idempotency key; a fill is applied to the ledger at most once per id.
    pub fill_id: FillId,
    pub symbol: Symbol,
    pub side: Side,
    /// Traded quantity, always positive; the sign comes from `side`.
    pub qty: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub time_ms: TimeMs,
    /// Journal sequence number, assigned at append time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Fill {
    pub fn new(
        fill_id: FillId,
        symbol: Symbol,
        side: Side,
        qty: Decimal,
        price: Decimal,
        commission: Decimal,
        time_ms: TimeMs,
    ) -> Self {
        Fill {
            fill_id,
            symbol,
            side,
            qty,
            price,
            commission,
            time_ms,
            seq: None,
        }
    }

    /// Derive a stable fill id from deterministic fields, for executions
    /// whose source did not assign one.
    pub fn derive_fill_id(
        symbol: &Symbol,
        side: Side,
        qty: &Decimal,
        price: &Decimal,
        time_ms: TimeMs,
    ) -> FillId {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(symbol.as_str());
        hasher.update(if side == Side::Buy { b"B" } else { b"S" });
        hasher.update(qty.to_canonical_string());
        hasher.update(price.to_canonical_string());
        hasher.update(time_ms.as_i64().to_le_bytes());
        let hash = hasher.finalize();
        FillId::new(format!("hash:{}", hex::encode(&hash[..16])))
    }

    /// Quantity with the side's sign applied: +qty for Buy, -qty for Sell.
    pub fn signed_qty(&self) -> Decimal {
        match self.side {
            Side::Buy => self.qty,
            Side::Sell => -self.qty,
        }
    }

    /// Check the boundary constraints: qty > 0, price > 0, commission >= 0.
    pub fn is_well_formed(&self) -> bool {
        self.qty.is_positive() && self.price.is_positive() && !self.commission.is_negative()
    }
}

/// A candidate trade proposed by the strategy/sizing collaborator, evaluated
/// by the risk engine before any order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
}

impl TradeIntent {
    pub fn new(symbol: Symbol, side: Side, qty: Decimal, price: Decimal) -> Self {
        TradeIntent {
            symbol,
            side,
            qty,
            price,
        }
    }

    /// Absolute notional value of the candidate trade.
    pub fn notional(&self) -> Decimal {
        (self.qty * self.price).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn fill(side: Side, qty: &str, px: &str) -> Fill {
        Fill::new(
            FillId::new("f1"),
            Symbol::new("AAPL"),
            side,
            d(qty),
            d(px),
            d("1"),
            TimeMs::new(1000),
        )
    }

    #[test]
    fn test_signed_qty() {
        assert_eq!(fill(Side::Buy, "10", "100").signed_qty(), d("10"));
        assert_eq!(fill(Side::Sell, "10", "100").signed_qty(), d("-10"));
    }

    #[test]
    fn test_well_formed() {
        assert!(fill(Side::Buy, "10", "100").is_well_formed());
        assert!(!fill(Side::Buy, "0", "100").is_well_formed());
        assert!(!fill(Side::Buy, "10", "-1").is_well_formed());
        let mut f = fill(Side::Buy, "10", "100");
        f.commission = d("-1");
        assert!(!f.is_well_formed());
    }

    #[test]
    fn test_derived_fill_id_deterministic() {
        let sym = Symbol::new("AAPL");
        let a = Fill::derive_fill_id(&sym, Side::Buy, &d("10"), &d("100"), TimeMs::new(1));
        let b = Fill::derive_fill_id(&sym, Side::Buy, &d("10"), &d("100"), TimeMs::new(1));
        let c = Fill::derive_fill_id(&sym, Side::Sell, &d("10"), &d("100"), TimeMs::new(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("hash:"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let f = fill(Side::Buy, "10", "100");
        let json = serde_json::to_string(&f).unwrap();
        let back: Fill = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
        assert!(!json.contains("seq"));
    }

    #[test]
    fn test_intent_notional() {
        let intent = TradeIntent::new(Symbol::new("AAPL"), Side::Sell, d("5"), d("200"));
        assert_eq!(intent.notional(), d("1000"));
    }
}
