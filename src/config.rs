use crate::domain::{Decimal, Symbol};
use rust_decimal::Decimal as RustDecimal;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Top-level configuration for the accounting/risk core.
#[derive(Debug, Clone)]
pub struct Config {
    pub starting_cash: Decimal,
    /// Directory holding the journal and snapshot files.
    pub data_dir: PathBuf,
    /// Checkpoint every N applied fills (0 disables).
    pub snapshot_every: u64,
    /// SQLite path for the event store, when that path is in use.
    pub database_path: Option<String>,
    pub risk: RiskConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let data_dir = env_map
            .get("DATA_DIR")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATA_DIR".to_string()))?;

        let starting_cash = parse_decimal(&env_map, "STARTING_CASH", dec(100_000, 0))?;
        let snapshot_every = parse_u64(&env_map, "SNAPSHOT_EVERY", 100)?;
        let database_path = env_map.get("DATABASE_PATH").cloned();
        let risk = RiskConfig::from_env_map(&env_map)?;

        Ok(Config {
            starting_cash,
            data_dir: PathBuf::from(data_dir),
            snapshot_every,
            database_path,
            risk,
        })
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("fill_wal.jsonl")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }
}

/// Risk rule limits and per-rule enable switches.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub trading_enabled: bool,

    pub exposure_enabled: bool,
    /// Max total notional as a fraction of equity.
    pub max_total_exposure_pct: Decimal,
    /// Max per-symbol notional as a fraction of equity.
    pub max_symbol_exposure_pct: Decimal,

    pub drawdown_enabled: bool,
    pub max_drawdown_pct: Decimal,
    /// Banded size scaling instead of a hard drawdown cutoff.
    pub drawdown_bands_enabled: bool,

    pub daily_loss_enabled: bool,
    /// Daily realized loss limit as a fraction of equity.
    pub daily_loss_limit_pct: Decimal,

    pub heat_enabled: bool,
    /// Max aggregate notional-times-volatility, as a fraction of equity.
    pub max_portfolio_heat: Decimal,
    pub vol_proxies: BTreeMap<Symbol, Decimal>,
    pub default_vol_proxy: Decimal,

    pub correlation_enabled: bool,
    pub correlation_threshold: Decimal,
    pub correlations: Vec<(Symbol, Symbol, Decimal)>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            trading_enabled: true,
            exposure_enabled: true,
            max_total_exposure_pct: dec(1, 0),
            max_symbol_exposure_pct: dec(25, 2),
            drawdown_enabled: true,
            max_drawdown_pct: dec(2, 1),
            drawdown_bands_enabled: false,
            daily_loss_enabled: true,
            daily_loss_limit_pct: dec(5, 2),
            heat_enabled: true,
            max_portfolio_heat: dec(5, 1),
            vol_proxies: BTreeMap::new(),
            default_vol_proxy: dec(2, 1),
            correlation_enabled: true,
            correlation_threshold: dec(8, 1),
            correlations: Vec::new(),
        }
    }
}

impl RiskConfig {
    pub fn from_env_map(env_map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = RiskConfig::default();

        Ok(RiskConfig {
            trading_enabled: parse_bool(env_map, "TRADING_ENABLED", defaults.trading_enabled)?,
            exposure_enabled: parse_bool(
                env_map,
                "EXPOSURE_RULE_ENABLED",
                defaults.exposure_enabled,
            )?,
            max_total_exposure_pct: parse_decimal(
                env_map,
                "MAX_TOTAL_EXPOSURE_PCT",
                defaults.max_total_exposure_pct,
            )?,
            max_symbol_exposure_pct: parse_decimal(
                env_map,
                "MAX_SYMBOL_EXPOSURE_PCT",
                defaults.max_symbol_exposure_pct,
            )?,
            drawdown_enabled: parse_bool(
                env_map,
                "DRAWDOWN_RULE_ENABLED",
                defaults.drawdown_enabled,
            )?,
            max_drawdown_pct: parse_decimal(
                env_map,
                "MAX_DRAWDOWN_PCT",
                defaults.max_drawdown_pct,
            )?,
            drawdown_bands_enabled: parse_bool(
                env_map,
                "DRAWDOWN_BANDS_ENABLED",
                defaults.drawdown_bands_enabled,
            )?,
            daily_loss_enabled: parse_bool(
                env_map,
                "DAILY_LOSS_RULE_ENABLED",
                defaults.daily_loss_enabled,
            )?,
            daily_loss_limit_pct: parse_decimal(
                env_map,
                "DAILY_LOSS_LIMIT_PCT",
                defaults.daily_loss_limit_pct,
            )?,
            heat_enabled: parse_bool(env_map, "HEAT_RULE_ENABLED", defaults.heat_enabled)?,
            max_portfolio_heat: parse_decimal(
                env_map,
                "MAX_PORTFOLIO_HEAT",
                defaults.max_portfolio_heat,
            )?,
            vol_proxies: parse_vol_proxies(env_map)?,
            default_vol_proxy: parse_decimal(
                env_map,
                "DEFAULT_VOL_PROXY",
                defaults.default_vol_proxy,
            )?,
            correlation_enabled: parse_bool(
                env_map,
                "CORRELATION_RULE_ENABLED",
                defaults.correlation_enabled,
            )?,
            correlation_threshold: parse_decimal(
                env_map,
                "CORRELATION_THRESHOLD",
                defaults.correlation_threshold,
            )?,
            correlations: parse_correlations(env_map)?,
        })
    }
}

/// Decimal from (mantissa, scale), e.g. `dec(5, 2)` == 0.05.
fn dec(mantissa: i64, scale: u32) -> Decimal {
    Decimal::new(RustDecimal::new(mantissa, scale))
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => Decimal::from_str_canonical(raw).map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
        }),
    }
}

fn parse_bool(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.as_str()) {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be true or false, got {}", other),
        )),
    }
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
        }),
    }
}

/// `VOL_PROXIES="AAPL:0.3,TSLA:0.8"`
fn parse_vol_proxies(
    env_map: &HashMap<String, String>,
) -> Result<BTreeMap<Symbol, Decimal>, ConfigError> {
    let mut proxies = BTreeMap::new();
    let Some(raw) = env_map.get("VOL_PROXIES") else {
        return Ok(proxies);
    };

    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let mut parts = entry.trim().splitn(2, ':');
        let (Some(symbol), Some(vol)) = (parts.next(), parts.next()) else {
            return Err(ConfigError::InvalidValue(
                "VOL_PROXIES".to_string(),
                format!("expected SYMBOL:VOL, got {}", entry),
            ));
        };
        let vol = Decimal::from_str_canonical(vol).map_err(|_| {
            ConfigError::InvalidValue(
                "VOL_PROXIES".to_string(),
                format!("invalid volatility for {}", symbol),
            )
        })?;
        proxies.insert(Symbol::new(symbol), vol);
    }
    Ok(proxies)
}

/// `CORRELATIONS="AAPL:MSFT:0.9,ES:NQ:0.85"`
fn parse_correlations(
    env_map: &HashMap<String, String>,
) -> Result<Vec<(Symbol, Symbol, Decimal)>, ConfigError> {
    let mut pairs = Vec::new();
    let Some(raw) = env_map.get("CORRELATIONS") else {
        return Ok(pairs);
    };

    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let parts: Vec<&str> = entry.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(ConfigError::InvalidValue(
                "CORRELATIONS".to_string(),
                format!("expected A:B:RHO, got {}", entry),
            ));
        }
        let rho = Decimal::from_str_canonical(parts[2]).map_err(|_| {
            ConfigError::InvalidValue(
                "CORRELATIONS".to_string(),
                format!("invalid correlation for {}:{}", parts[0], parts[1]),
            )
        })?;
        pairs.push((Symbol::new(parts[0]), Symbol::new(parts[1]), rho));
    }
    Ok(pairs)
}
