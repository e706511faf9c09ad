//! Risk rule engine: pre/post-trade gating with a sticky freeze state.

pub mod context;
pub mod decision;
pub mod engine;
pub mod rules;

pub use context::{RiskContext, CONTEXT_SCHEMA_VERSION};
pub use decision::{RiskDecision, RuleVerdict, TraceEntry};
pub use engine::{RiskEngine, RiskEngineState};
pub use rules::RiskRule;
