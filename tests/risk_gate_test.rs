use fillbook::config::RiskConfig;
use fillbook::risk::RiskEngine;
use fillbook::wal::{checkpoint, recover, Journal, SnapshotStore};
use fillbook::{Decimal, Fill, FillId, Ledger, Side, Symbol, TimeMs, TradeIntent};

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn fill(id: &str, sym: &str, side: Side, qty: &str, px: &str, time_ms: i64) -> Fill {
    Fill::new(
        FillId::new(id),
        Symbol::new(sym),
        side,
        d(qty),
        d(px),
        Decimal::zero(),
        TimeMs::new(time_ms),
    )
}

fn buy_intent(sym: &str, qty: &str, px: &str) -> TradeIntent {
    TradeIntent::new(Symbol::new(sym), Side::Buy, d(qty), d(px))
}

#[test]
fn test_daily_loss_freeze_from_real_fills() {
    let mut ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&RiskConfig::default());

    // Same trading day: buy 100@100, dump at 40. Daily realized -6000.
    ledger
        .apply_fill(&fill("b1", "AAPL", Side::Buy, "100", "100", 1_000_000))
        .unwrap();
    ledger
        .apply_fill(&fill("s1", "AAPL", Side::Sell, "100", "40", 2_000_000))
        .unwrap();

    let ctx = ledger.risk_context();
    assert_eq!(ctx.daily_realized_pnl, d("-6000"));

    let decision = engine.evaluate(&buy_intent("MSFT", "10", "50"), &ctx);
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("daily_loss_limit_exceeded"));
    assert!(engine.is_frozen());

    // The freeze outlives the losing day: a healthy context is still denied.
    let fresh = Ledger::new(d("100000")).risk_context();
    let decision = engine.evaluate(&buy_intent("MSFT", "10", "50"), &fresh);
    assert_eq!(decision.reason.as_deref(), Some("system_frozen"));

    engine.reset_freeze();
    assert!(engine.evaluate(&buy_intent("MSFT", "10", "50"), &fresh).allowed);
}

#[test]
fn test_freeze_survives_checkpoint_and_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();

    let journal = Journal::open(dir.path().join("fill_wal.jsonl")).unwrap();
    let mut ledger = Ledger::new(d("100000")).with_journal(journal);
    let mut engine = RiskEngine::new(&RiskConfig::default());

    ledger
        .apply_fill(&fill("b1", "AAPL", Side::Buy, "100", "100", 1_000_000))
        .unwrap();
    ledger
        .apply_fill(&fill("s1", "AAPL", Side::Sell, "100", "40", 2_000_000))
        .unwrap();
    let decision = engine.evaluate(&buy_intent("MSFT", "1", "50"), &ledger.risk_context());
    assert!(!decision.allowed);
    assert!(engine.is_frozen());

    checkpoint(&mut ledger, &engine, &snapshots).unwrap();
    drop(ledger);

    // Restart.
    let journal = Journal::open(dir.path().join("fill_wal.jsonl")).unwrap();
    let mut recovered = recover(journal, &snapshots, d("100000"), &RiskConfig::default()).unwrap();
    assert!(recovered.risk.is_frozen());
    assert_eq!(
        recovered.risk.freeze_reason(),
        Some("daily_loss_limit_exceeded")
    );

    let ctx = recovered.ledger.risk_context();
    let decision = recovered.risk.evaluate(&buy_intent("MSFT", "1", "50"), &ctx);
    assert_eq!(decision.reason.as_deref(), Some("system_frozen"));

    // Operator intervention is the only way back to Active.
    recovered.risk.reset_freeze();
    assert!(!recovered.risk.is_frozen());
}

#[test]
fn test_drawdown_bands_scale_intent_from_marked_ledger() {
    let config = RiskConfig {
        drawdown_bands_enabled: true,
        ..RiskConfig::default()
    };
    let mut ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&config);

    ledger
        .apply_fill(&fill("b1", "AAPL", Side::Buy, "100", "100", 1_000_000))
        .unwrap();
    // Establish the high-water mark at par.
    assert!(engine
        .evaluate_portfolio(&ledger.risk_context())
        .allowed);

    // Mark down to 30: equity 93000, 7% off the peak.
    ledger.mark(&Symbol::new("AAPL"), d("30"));
    let ctx = ledger.risk_context();
    assert_eq!(ctx.equity, d("93000"));

    let decision = engine.evaluate(&buy_intent("MSFT", "10", "50"), &ctx);
    assert!(decision.allowed);
    assert_eq!(decision.adjusted_qty, Some(d("7")));
    assert!(!engine.is_frozen());
}

#[test]
fn test_drawdown_hard_stop_freezes_from_marked_ledger() {
    let mut ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&RiskConfig::default());

    ledger
        .apply_fill(&fill("b1", "AAPL", Side::Buy, "100", "500", 1_000_000))
        .unwrap();
    assert!(engine
        .evaluate_portfolio(&ledger.risk_context())
        .allowed);

    // Mark 500 -> 100: equity 60000, 40% off the peak, past the 20% stop.
    ledger.mark(&Symbol::new("AAPL"), d("100"));
    let decision = engine.evaluate_portfolio(&ledger.risk_context());
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("max_drawdown_exceeded"));
    assert!(engine.is_frozen());
}

#[test]
fn test_exposure_caps_use_live_positions() {
    let config = RiskConfig {
        max_symbol_exposure_pct: d("0.1"),
        ..RiskConfig::default()
    };
    let mut ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&config);

    ledger
        .apply_fill(&fill("b1", "AAPL", Side::Buy, "80", "100", 1_000_000))
        .unwrap();
    let ctx = ledger.risk_context();
    assert_eq!(ctx.exposure_for(&Symbol::new("AAPL")), d("8000"));

    // 8000 held + 3000 candidate > 10% of ~100000.
    let decision = engine.evaluate(&buy_intent("AAPL", "30", "100"), &ctx);
    assert!(!decision.allowed);
    assert_eq!(
        decision.reason.as_deref(),
        Some("max_symbol_exposure_exceeded")
    );

    // A different symbol under its own cap is fine.
    let decision = engine.evaluate(&buy_intent("MSFT", "30", "100"), &ctx);
    assert!(decision.allowed);
}

#[test]
fn test_heat_rejects_volatile_candidate() {
    let config = RiskConfig {
        max_portfolio_heat: d("0.05"),
        vol_proxies: [(Symbol::new("TSLA"), d("0.8"))].into_iter().collect(),
        ..RiskConfig::default()
    };
    let ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&config);

    // 100 * 100 * 0.8 = 8000 heat > 5% of 100000.
    let decision = engine.evaluate(&buy_intent("TSLA", "100", "100"), &ledger.risk_context());
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("portfolio_heat_exceeded"));

    // The same notional in a default-vol symbol passes.
    let decision = engine.evaluate(&buy_intent("AAPL", "100", "100"), &ledger.risk_context());
    assert!(decision.allowed);
}

#[test]
fn test_correlation_blocks_against_held_book() {
    let config = RiskConfig {
        correlations: vec![(Symbol::new("AAPL"), Symbol::new("MSFT"), d("0.9"))],
        ..RiskConfig::default()
    };
    let mut ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&config);

    ledger
        .apply_fill(&fill("b1", "MSFT", Side::Buy, "10", "100", 1_000_000))
        .unwrap();
    let ctx = ledger.risk_context();

    let decision = engine.evaluate(&buy_intent("AAPL", "10", "100"), &ctx);
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("correlated_exposure"));

    let decision = engine.evaluate(&buy_intent("NVDA", "10", "100"), &ctx);
    assert!(decision.allowed);
}

#[test]
fn test_denials_never_mutate_the_ledger() {
    let mut ledger = Ledger::new(d("100000"));
    let mut engine = RiskEngine::new(&RiskConfig {
        trading_enabled: false,
        ..RiskConfig::default()
    });

    let before = ledger.compute_state().unwrap();
    let decision = engine.evaluate(&buy_intent("AAPL", "10", "100"), &ledger.risk_context());
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("trading_disabled"));
    assert_eq!(ledger.compute_state().unwrap(), before);
}
