//! Risk decision and rule verdict types.
//!
//! A denial is a normal control-flow outcome, never an error.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};

/// What a single rule concluded.
///
/// `freeze` requests the `Active -> Frozen` transition; the engine applies
/// it once at the top of the chain, rules never flip shared state themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    /// Scaled-down quantity when a rule throttles rather than rejects.
    pub adjusted_qty: Option<Decimal>,
    pub freeze: bool,
}

impl RuleVerdict {
    pub fn allow() -> Self {
        RuleVerdict {
            allowed: true,
            reason: None,
            adjusted_qty: None,
            freeze: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        RuleVerdict {
            allowed: false,
            reason: Some(reason.into()),
            adjusted_qty: None,
            freeze: false,
        }
    }

    pub fn freeze(reason: impl Into<String>) -> Self {
        RuleVerdict {
            allowed: false,
            reason: Some(reason.into()),
            adjusted_qty: None,
            freeze: true,
        }
    }

    pub fn scale(qty: Decimal, reason: impl Into<String>) -> Self {
        RuleVerdict {
            allowed: true,
            reason: Some(reason.into()),
            adjusted_qty: Some(qty),
            freeze: false,
        }
    }
}

/// One entry in the evaluation audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub rule: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of one engine evaluation, with the full rule trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub allowed: bool,
    /// Reason code of the denying (or throttling) rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Name of the rule that denied, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Quantity after any drawdown-band scaling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_qty: Option<Decimal>,
    pub trace: Vec<TraceEntry>,
}

impl RiskDecision {
    pub fn allowed(adjusted_qty: Option<Decimal>, trace: Vec<TraceEntry>) -> Self {
        RiskDecision {
            allowed: true,
            reason: None,
            rule: None,
            adjusted_qty,
            trace,
        }
    }

    pub fn denied(rule: impl Into<String>, reason: impl Into<String>, trace: Vec<TraceEntry>) -> Self {
        RiskDecision {
            allowed: false,
            reason: Some(reason.into()),
            rule: Some(rule.into()),
            adjusted_qty: None,
            trace,
        }
    }
}
