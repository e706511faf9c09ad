//! The individual risk rules.
//!
//! Each rule is a small, independently togglable check over a
//! [`RiskContext`] and an optional candidate [`TradeIntent`]. Rules return
//! verdicts; the engine owns the freeze state machine.

use crate::domain::{Decimal, Symbol, TradeIntent};
use crate::risk::context::RiskContext;
use crate::risk::decision::RuleVerdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single pre/post-trade risk check.
///
/// `evaluate` takes `&mut self` because some rules carry state across calls
/// (the drawdown rule's running high-water mark); stateful rules expose that
/// state for snapshot persistence via `state`/`load_state`.
pub trait RiskRule: Send {
    fn name(&self) -> &'static str;

    /// Fixed chain position; the engine sorts rules by this once.
    fn priority(&self) -> u32;

    fn evaluate(&mut self, intent: Option<&TradeIntent>, ctx: &RiskContext) -> RuleVerdict;

    fn state(&self) -> Option<serde_json::Value> {
        None
    }

    fn load_state(&mut self, _state: &serde_json::Value) {}
}

/// Hard off-switch for all trading.
pub struct TradingEnabledRule {
    pub enabled: bool,
}

impl RiskRule for TradingEnabledRule {
    fn name(&self) -> &'static str {
        "trading_enabled"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn evaluate(&mut self, _intent: Option<&TradeIntent>, _ctx: &RiskContext) -> RuleVerdict {
        if !self.enabled {
            return RuleVerdict::deny("trading_disabled");
        }
        RuleVerdict::allow()
    }
}

/// Caps projected total and per-symbol notional as fractions of equity.
pub struct ExposureRule {
    pub max_total_pct: Decimal,
    pub max_symbol_pct: Decimal,
}

impl RiskRule for ExposureRule {
    fn name(&self) -> &'static str {
        "exposure"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn evaluate(&mut self, intent: Option<&TradeIntent>, ctx: &RiskContext) -> RuleVerdict {
        if !ctx.equity.is_positive() {
            if intent.is_some() || ctx.gross_exposure.is_positive() {
                return RuleVerdict::deny("zero_equity");
            }
            return RuleVerdict::allow();
        }

        let added = intent.map(|i| i.notional()).unwrap_or_else(Decimal::zero);

        let projected_total = ctx.gross_exposure + added;
        if projected_total > self.max_total_pct * ctx.equity {
            return RuleVerdict::deny("max_total_exposure_exceeded");
        }

        if let Some(intent) = intent {
            let projected_symbol = ctx.exposure_for(&intent.symbol) + added;
            if projected_symbol > self.max_symbol_pct * ctx.equity {
                return RuleVerdict::deny("max_symbol_exposure_exceeded");
            }
        }

        RuleVerdict::allow()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DrawdownRuleState {
    peak_equity: Decimal,
}

/// Tracks a running equity high-water mark; freezes on breach, or scales
/// trade size down in bands when banded mode is on.
pub struct DrawdownRule {
    pub max_drawdown_pct: Decimal,
    pub banded: bool,
    peak_equity: Decimal,
    bands: Vec<(Decimal, Decimal)>,
}

impl DrawdownRule {
    pub fn new(max_drawdown_pct: Decimal, banded: bool) -> Self {
        let d = |s: &str| Decimal::from_str_canonical(s).unwrap_or_else(|_| Decimal::zero());
        DrawdownRule {
            max_drawdown_pct,
            banded,
            peak_equity: Decimal::zero(),
            bands: vec![
                (d("0.15"), Decimal::zero()),
                (d("0.10"), d("0.4")),
                (d("0.05"), d("0.7")),
            ],
        }
    }

    fn current_drawdown(&mut self, equity: Decimal) -> Decimal {
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        if !self.peak_equity.is_positive() {
            return Decimal::zero();
        }
        (self.peak_equity - equity) / self.peak_equity
    }
}

impl RiskRule for DrawdownRule {
    fn name(&self) -> &'static str {
        "drawdown"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn evaluate(&mut self, intent: Option<&TradeIntent>, ctx: &RiskContext) -> RuleVerdict {
        let drawdown = self.current_drawdown(ctx.equity);

        if self.banded {
            for (threshold, multiplier) in &self.bands {
                if drawdown >= *threshold {
                    if multiplier.is_zero() {
                        return RuleVerdict::deny("drawdown_trading_halted");
                    }
                    if let Some(intent) = intent {
                        return RuleVerdict::scale(
                            intent.qty * *multiplier,
                            "drawdown_size_scaled",
                        );
                    }
                    return RuleVerdict::allow();
                }
            }
            return RuleVerdict::allow();
        }

        if drawdown >= self.max_drawdown_pct {
            return RuleVerdict::freeze("max_drawdown_exceeded");
        }
        RuleVerdict::allow()
    }

    fn state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(DrawdownRuleState {
            peak_equity: self.peak_equity,
        })
        .ok()
    }

    fn load_state(&mut self, state: &serde_json::Value) {
        if let Ok(s) = serde_json::from_value::<DrawdownRuleState>(state.clone()) {
            self.peak_equity = s.peak_equity;
        }
    }
}

/// Freezes once same-day realized losses breach a fraction of equity.
pub struct DailyLossRule {
    pub limit_pct: Decimal,
}

impl RiskRule for DailyLossRule {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn evaluate(&mut self, _intent: Option<&TradeIntent>, ctx: &RiskContext) -> RuleVerdict {
        if !ctx.equity.is_positive() {
            return RuleVerdict::allow();
        }
        let daily_ratio = ctx.daily_realized_pnl / ctx.equity;
        if daily_ratio <= -self.limit_pct.abs() {
            return RuleVerdict::freeze("daily_loss_limit_exceeded");
        }
        RuleVerdict::allow()
    }
}

/// Caps aggregate `notional × volatility-proxy` risk relative to equity.
pub struct PortfolioHeatRule {
    pub max_heat: Decimal,
    pub vol_proxies: BTreeMap<Symbol, Decimal>,
    pub default_vol_proxy: Decimal,
}

impl PortfolioHeatRule {
    fn vol_for(&self, symbol: &Symbol) -> Decimal {
        self.vol_proxies
            .get(symbol)
            .copied()
            .unwrap_or(self.default_vol_proxy)
    }
}

impl RiskRule for PortfolioHeatRule {
    fn name(&self) -> &'static str {
        "portfolio_heat"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn evaluate(&mut self, intent: Option<&TradeIntent>, ctx: &RiskContext) -> RuleVerdict {
        if !ctx.equity.is_positive() {
            return RuleVerdict::allow();
        }

        let mut heat = ctx
            .exposure_by_symbol
            .iter()
            .fold(Decimal::zero(), |acc, (symbol, notional)| {
                acc + *notional * self.vol_for(symbol)
            });
        if let Some(intent) = intent {
            heat += intent.notional() * self.vol_for(&intent.symbol);
        }

        if heat > self.max_heat * ctx.equity {
            return RuleVerdict::deny("portfolio_heat_exceeded");
        }
        RuleVerdict::allow()
    }
}

/// Rejects a candidate correlated above a threshold with a held position.
pub struct CorrelationRule {
    pub threshold: Decimal,
    correlations: BTreeMap<(Symbol, Symbol), Decimal>,
}

impl CorrelationRule {
    pub fn new(threshold: Decimal, pairs: impl IntoIterator<Item = (Symbol, Symbol, Decimal)>) -> Self {
        let mut correlations = BTreeMap::new();
        for (a, b, rho) in pairs {
            correlations.insert(Self::pair_key(a, b), rho);
        }
        CorrelationRule {
            threshold,
            correlations,
        }
    }

    fn pair_key(a: Symbol, b: Symbol) -> (Symbol, Symbol) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn correlation(&self, a: &Symbol, b: &Symbol) -> Decimal {
        self.correlations
            .get(&Self::pair_key(a.clone(), b.clone()))
            .copied()
            .unwrap_or_else(Decimal::zero)
    }
}

impl RiskRule for CorrelationRule {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn evaluate(&mut self, intent: Option<&TradeIntent>, ctx: &RiskContext) -> RuleVerdict {
        let Some(intent) = intent else {
            return RuleVerdict::allow();
        };

        for held in ctx.held_symbols() {
            if held == &intent.symbol {
                continue;
            }
            if self.correlation(held, &intent.symbol) >= self.threshold {
                return RuleVerdict::deny("correlated_exposure");
            }
        }
        RuleVerdict::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::risk::context::CONTEXT_SCHEMA_VERSION;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn ctx(equity: &str, gross: &str) -> RiskContext {
        RiskContext {
            schema: CONTEXT_SCHEMA_VERSION,
            equity: d(equity),
            cash: d(equity),
            gross_exposure: d(gross),
            drawdown: Decimal::zero(),
            daily_realized_pnl: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            unrealized_pnl: Decimal::zero(),
            exposure_by_symbol: BTreeMap::new(),
        }
    }

    fn intent(sym: &str, qty: &str, px: &str) -> TradeIntent {
        TradeIntent::new(Symbol::new(sym), Side::Buy, d(qty), d(px))
    }

    #[test]
    fn test_trading_disabled_denies() {
        let mut rule = TradingEnabledRule { enabled: false };
        let verdict = rule.evaluate(None, &ctx("100000", "0"));
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason.as_deref(), Some("trading_disabled"));
    }

    #[test]
    fn test_exposure_total_cap() {
        let mut rule = ExposureRule {
            max_total_pct: d("0.5"),
            max_symbol_pct: d("0.5"),
        };
        let c = ctx("100000", "40000");
        // 40000 + 15000 > 50000
        let verdict = rule.evaluate(Some(&intent("AAPL", "150", "100")), &c);
        assert_eq!(verdict.reason.as_deref(), Some("max_total_exposure_exceeded"));

        let verdict = rule.evaluate(Some(&intent("AAPL", "50", "100")), &c);
        assert!(verdict.allowed);
    }

    #[test]
    fn test_exposure_symbol_cap() {
        let mut rule = ExposureRule {
            max_total_pct: d("1.0"),
            max_symbol_pct: d("0.1"),
        };
        let mut c = ctx("100000", "8000");
        c.exposure_by_symbol.insert(Symbol::new("AAPL"), d("8000"));
        let verdict = rule.evaluate(Some(&intent("AAPL", "30", "100")), &c);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("max_symbol_exposure_exceeded")
        );
    }

    #[test]
    fn test_exposure_zero_equity() {
        let mut rule = ExposureRule {
            max_total_pct: d("1.0"),
            max_symbol_pct: d("1.0"),
        };
        let verdict = rule.evaluate(Some(&intent("AAPL", "1", "100")), &ctx("0", "0"));
        assert_eq!(verdict.reason.as_deref(), Some("zero_equity"));
    }

    #[test]
    fn test_drawdown_freezes_without_bands() {
        let mut rule = DrawdownRule::new(d("0.1"), false);
        assert!(rule.evaluate(None, &ctx("100000", "0")).allowed);

        let verdict = rule.evaluate(None, &ctx("89000", "0"));
        assert!(verdict.freeze);
        assert_eq!(verdict.reason.as_deref(), Some("max_drawdown_exceeded"));
    }

    #[test]
    fn test_drawdown_bands_scale_and_halt() {
        let mut rule = DrawdownRule::new(d("0.2"), true);
        rule.evaluate(None, &ctx("100000", "0"));

        // 7% drawdown: 0.7 multiplier.
        let verdict = rule.evaluate(Some(&intent("AAPL", "10", "100")), &ctx("93000", "0"));
        assert!(verdict.allowed);
        assert_eq!(verdict.adjusted_qty, Some(d("7")));

        // 12% drawdown: 0.4 multiplier.
        let verdict = rule.evaluate(Some(&intent("AAPL", "10", "100")), &ctx("88000", "0"));
        assert_eq!(verdict.adjusted_qty, Some(d("4")));

        // 20% drawdown: halted, but no freeze in banded mode.
        let verdict = rule.evaluate(Some(&intent("AAPL", "10", "100")), &ctx("80000", "0"));
        assert!(!verdict.allowed);
        assert!(!verdict.freeze);
        assert_eq!(verdict.reason.as_deref(), Some("drawdown_trading_halted"));
    }

    #[test]
    fn test_drawdown_state_roundtrip() {
        let mut rule = DrawdownRule::new(d("0.1"), false);
        rule.evaluate(None, &ctx("123000", "0"));
        let state = rule.state().unwrap();

        let mut restored = DrawdownRule::new(d("0.1"), false);
        restored.load_state(&state);
        // Peak carried over: 10.5% below 123000 freezes immediately.
        let verdict = restored.evaluate(None, &ctx("110000", "0"));
        assert!(verdict.freeze);
    }

    #[test]
    fn test_daily_loss_freezes() {
        let mut rule = DailyLossRule { limit_pct: d("0.05") };
        let mut c = ctx("100000", "0");
        c.daily_realized_pnl = d("-6000");

        let verdict = rule.evaluate(None, &c);
        assert!(verdict.freeze);
        assert_eq!(verdict.reason.as_deref(), Some("daily_loss_limit_exceeded"));

        c.daily_realized_pnl = d("-4000");
        assert!(rule.evaluate(None, &c).allowed);
    }

    #[test]
    fn test_portfolio_heat_cap() {
        let mut vols = BTreeMap::new();
        vols.insert(Symbol::new("TSLA"), d("0.8"));
        let mut rule = PortfolioHeatRule {
            max_heat: d("0.2"),
            vol_proxies: vols,
            default_vol_proxy: d("0.3"),
        };

        let mut c = ctx("100000", "20000");
        c.exposure_by_symbol.insert(Symbol::new("TSLA"), d("20000"));
        // Held heat 16000 + candidate 30000*0.3=9000 > 20000 cap.
        let verdict = rule.evaluate(Some(&intent("AAPL", "300", "100")), &c);
        assert_eq!(verdict.reason.as_deref(), Some("portfolio_heat_exceeded"));

        let verdict = rule.evaluate(Some(&intent("AAPL", "100", "100")), &c);
        assert!(verdict.allowed);
    }

    #[test]
    fn test_correlation_blocks_correlated_symbol() {
        let mut rule = CorrelationRule::new(
            d("0.8"),
            vec![(Symbol::new("AAPL"), Symbol::new("MSFT"), d("0.9"))],
        );
        let mut c = ctx("100000", "10000");
        c.exposure_by_symbol.insert(Symbol::new("MSFT"), d("10000"));

        let verdict = rule.evaluate(Some(&intent("AAPL", "10", "100")), &c);
        assert_eq!(verdict.reason.as_deref(), Some("correlated_exposure"));

        // Uncorrelated symbol passes.
        let verdict = rule.evaluate(Some(&intent("NVDA", "10", "100")), &c);
        assert!(verdict.allowed);

        // Adding to the already-held symbol is not a correlation breach.
        let verdict = rule.evaluate(Some(&intent("MSFT", "10", "100")), &c);
        assert!(verdict.allowed);
    }
}
