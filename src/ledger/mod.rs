//! Position/portfolio ledger: pure accounting math plus its persistence
//! hooks into the write-ahead journal.

pub mod book;
pub mod position;

pub use book::{ApplyOutcome, Ledger, LedgerError, LedgerSnapshot, LedgerState, RealizedDelta};
pub use position::Position;
