//! The risk rule engine: an ordered rule chain in front of a two-state
//! freeze machine (Active / Frozen).
//!
//! Frozen is terminal until an operator calls `reset_freeze`; no rule can
//! clear it. Rules request the transition through their verdicts and the
//! engine applies it exactly once per evaluation.

use crate::config::RiskConfig;
use crate::domain::{TimeMs, TradeIntent};
use crate::risk::context::RiskContext;
use crate::risk::decision::{RiskDecision, TraceEntry};
use crate::risk::rules::{
    CorrelationRule, DailyLossRule, DrawdownRule, ExposureRule, PortfolioHeatRule, RiskRule,
    TradingEnabledRule,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Persisted engine state: the freeze flag plus each stateful rule's
/// counters. Stored inside every snapshot so a freeze survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEngineState {
    pub frozen: bool,
    pub freeze_reason: Option<String>,
    pub freeze_ts: Option<TimeMs>,
    #[serde(default)]
    pub rule_state: BTreeMap<String, serde_json::Value>,
}

pub struct RiskEngine {
    rules: Vec<Box<dyn RiskRule>>,
    frozen: bool,
    freeze_reason: Option<String>,
    freeze_ts: Option<TimeMs>,
}

impl RiskEngine {
    /// Build the rule chain from configuration. Rules are sorted once by
    /// their fixed priority; evaluation short-circuits on the first denial.
    pub fn new(config: &RiskConfig) -> Self {
        let mut rules: Vec<Box<dyn RiskRule>> = Vec::new();

        rules.push(Box::new(TradingEnabledRule {
            enabled: config.trading_enabled,
        }));
        if config.exposure_enabled {
            rules.push(Box::new(ExposureRule {
                max_total_pct: config.max_total_exposure_pct,
                max_symbol_pct: config.max_symbol_exposure_pct,
            }));
        }
        if config.drawdown_enabled {
            rules.push(Box::new(DrawdownRule::new(
                config.max_drawdown_pct,
                config.drawdown_bands_enabled,
            )));
        }
        if config.daily_loss_enabled {
            rules.push(Box::new(DailyLossRule {
                limit_pct: config.daily_loss_limit_pct,
            }));
        }
        if config.heat_enabled {
            rules.push(Box::new(PortfolioHeatRule {
                max_heat: config.max_portfolio_heat,
                vol_proxies: config.vol_proxies.clone(),
                default_vol_proxy: config.default_vol_proxy,
            }));
        }
        if config.correlation_enabled {
            rules.push(Box::new(CorrelationRule::new(
                config.correlation_threshold,
                config.correlations.clone(),
            )));
        }

        rules.sort_by_key(|r| r.priority());

        RiskEngine {
            rules,
            frozen: false,
            freeze_reason: None,
            freeze_ts: None,
        }
    }

    /// Evaluate a candidate trade before execution.
    pub fn evaluate(&mut self, intent: &TradeIntent, ctx: &RiskContext) -> RiskDecision {
        self.run(Some(intent), ctx)
    }

    /// Evaluate the portfolio itself (post-trade or periodic), no candidate.
    pub fn evaluate_portfolio(&mut self, ctx: &RiskContext) -> RiskDecision {
        self.run(None, ctx)
    }

    fn run(&mut self, intent: Option<&TradeIntent>, ctx: &RiskContext) -> RiskDecision {
        if self.frozen {
            let trace = vec![TraceEntry {
                rule: "engine".to_string(),
                allowed: false,
                reason: Some("system_frozen".to_string()),
            }];
            return RiskDecision::denied("engine", "system_frozen", trace);
        }

        let mut trace = Vec::with_capacity(self.rules.len());
        let mut adjusted_qty = None;

        for rule in &mut self.rules {
            let verdict = rule.evaluate(intent, ctx);
            trace.push(TraceEntry {
                rule: rule.name().to_string(),
                allowed: verdict.allowed,
                reason: verdict.reason.clone(),
            });

            if verdict.freeze {
                // Single, explicit Active -> Frozen transition.
                self.frozen = true;
                self.freeze_reason = verdict.reason.clone();
                self.freeze_ts = Some(TimeMs::now());
                warn!(
                    rule = rule.name(),
                    reason = verdict.reason.as_deref().unwrap_or(""),
                    "risk engine frozen"
                );
                return RiskDecision::denied(
                    rule.name(),
                    verdict.reason.unwrap_or_else(|| "frozen".to_string()),
                    trace,
                );
            }

            if !verdict.allowed {
                return RiskDecision::denied(
                    rule.name(),
                    verdict.reason.unwrap_or_else(|| "denied".to_string()),
                    trace,
                );
            }

            if verdict.adjusted_qty.is_some() {
                adjusted_qty = verdict.adjusted_qty;
            }
        }

        RiskDecision::allowed(adjusted_qty, trace)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze_reason(&self) -> Option<&str> {
        self.freeze_reason.as_deref()
    }

    /// Operator-only: clear the freeze and return to Active.
    pub fn reset_freeze(&mut self) {
        if self.frozen {
            info!(
                reason = self.freeze_reason.as_deref().unwrap_or(""),
                "risk engine freeze cleared by operator"
            );
        }
        self.frozen = false;
        self.freeze_reason = None;
        self.freeze_ts = None;
    }

    /// Serialize engine state (freeze + stateful rule counters) for the
    /// snapshot store.
    pub fn state(&self) -> RiskEngineState {
        let rule_state = self
            .rules
            .iter()
            .filter_map(|r| r.state().map(|s| (r.name().to_string(), s)))
            .collect();
        RiskEngineState {
            frozen: self.frozen,
            freeze_reason: self.freeze_reason.clone(),
            freeze_ts: self.freeze_ts,
            rule_state,
        }
    }

    pub fn load_state(&mut self, state: &RiskEngineState) {
        self.frozen = state.frozen;
        self.freeze_reason = state.freeze_reason.clone();
        self.freeze_ts = state.freeze_ts;
        for rule in &mut self.rules {
            if let Some(s) = state.rule_state.get(rule.name()) {
                rule.load_state(s);
            }
        }
    }
}
