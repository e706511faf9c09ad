pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod risk;
pub mod store;
pub mod wal;

pub use config::{Config, RiskConfig};
pub use domain::{Decimal, Fill, FillId, Side, Symbol, TimeMs, TradeIntent};
pub use error::CoreError;
pub use ledger::{ApplyOutcome, Ledger, LedgerError, LedgerState, Position, RealizedDelta};
pub use risk::{RiskContext, RiskDecision, RiskEngine, RiskEngineState};
pub use store::{AppendOutcome, EventStore, StoreError};
pub use wal::{Journal, JournalError, SnapshotStore};
