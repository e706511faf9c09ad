//! Domain types and determinism layer for the accounting core.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, Symbol, FillId, Side
//! - Fill and TradeIntent types with canonical JSON serialization

pub mod decimal;
pub mod fill;
pub mod primitives;

pub use decimal::Decimal;
pub use fill::{Fill, TradeIntent};
pub use primitives::{FillId, Side, Symbol, TimeMs};
