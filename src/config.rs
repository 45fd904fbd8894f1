// =============================================================================
// Runtime configuration — environment-driven, with hot-reloadable overlay
// =============================================================================
//
// Two layers, matching the teacher's split between startup wiring (env vars,
// read once in main) and operational tuning (a JSON file that can be edited
// and reloaded without a restart):
//
//   Config           — read once at startup from the process environment.
//                       Venue credentials, account mode, and every numeric
//                       guardrail the engine is allowed to run with.
//   RuntimeOverlay    — the subset of Config's numeric guardrails that ops
//                       may retune live; persisted to `runtime_config.json`
//                       with the teacher's atomic write-then-rename pattern.
//
// `Config::from_env` never panics on a missing non-critical variable — it
// falls back to the documented default and logs the substitution, matching
// `RuntimeConfig::load`'s fallback-with-warning behaviour.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{AccountMode, TradingMode};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            warn!(key, raw = %raw, "failed to parse env var, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    match env::var(key) {
        Ok(raw) => raw.parse::<Decimal>().unwrap_or_else(|_| {
            warn!(key, raw = %raw, "failed to parse decimal env var, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_or(key, default)
}

/// Static configuration read once at process startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: TradingMode,
    pub account_mode: AccountMode,
    pub enable_live_trading: bool,

    pub initial_balance: Decimal,

    pub leverage_default: u32,
    pub leverage_min: u32,
    pub leverage_max: u32,

    pub stop_loss_roi: Decimal,
    pub take_profit_roi: Decimal,

    pub break_even_activation: Decimal,
    pub break_even_buffer: Decimal,

    pub trailing_activation: Decimal,
    pub trailing_distance: Decimal,
    pub trailing_step: Decimal,

    pub max_open_positions: u32,
    pub max_position_size_usd: Decimal,
    pub max_daily_drawdown: Decimal,
    pub max_consecutive_losses: u32,
    pub max_hourly_trades: u32,

    pub burst_rate_limit_ms: u64,
    pub loss_cooldown_ms: u64,

    pub signal_min_score: f64,
    pub signal_strong_score: f64,
    pub signal_extreme_score: f64,
    pub signal_min_confidence: f64,
    pub signal_min_indicators: u32,
    pub signal_cooldown_ms: u64,

    pub mtf_enabled: bool,
    pub mtf_ltf_timeframes: Vec<String>,
    pub mtf_htf_timeframes: Vec<String>,

    pub symbols: Vec<String>,

    pub venue_api_key: String,
    pub venue_api_secret: String,
}

impl Config {
    /// Build configuration from the process environment.
    ///
    /// SAFETY: regardless of what the operator sets, trading mode and
    /// account mode are forced to the safe defaults (Paused / Demo) by the
    /// supervisor at startup unless `ENABLE_LIVE_TRADING=true` *and*
    /// `MODE=live` are both set explicitly — see `Supervisor::new`.
    pub fn from_env() -> Result<Self> {
        let symbols = env::var("AURORA_SYMBOLS")
            .map(|s| s.split(',').map(|p| p.trim().to_uppercase()).collect())
            .unwrap_or_else(|_| {
                vec![
                    "BTCUSDT".to_string(),
                    "ETHUSDT".to_string(),
                    "SOLUSDT".to_string(),
                    "BNBUSDT".to_string(),
                    "XRPUSDT".to_string(),
                ]
            });

        let mtf_ltf_timeframes = env::var("MTF_LTF_TIMEFRAMES")
            .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["5m".to_string(), "15m".to_string()]);

        let mtf_htf_timeframes = env::var("MTF_HTF_TIMEFRAMES")
            .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["1h".to_string(), "4h".to_string()]);

        let mode = match env::var("MODE").as_deref() {
            Ok("live") => TradingMode::Live,
            Ok("killed") => TradingMode::Killed,
            _ => TradingMode::Paused,
        };

        let account_mode = match env::var("ACCOUNT_MODE").as_deref() {
            Ok("live") => AccountMode::Live,
            _ => AccountMode::Demo,
        };

        let cfg = Self {
            mode,
            account_mode,
            enable_live_trading: env_bool("ENABLE_LIVE_TRADING", false),

            initial_balance: env_decimal("INITIAL_BALANCE", Decimal::new(1000, 0)),

            leverage_default: env_or("LEVERAGE_DEFAULT", 3),
            leverage_min: env_or("LEVERAGE_MIN", 1),
            leverage_max: env_or("LEVERAGE_MAX", 10),

            stop_loss_roi: env_decimal("STOP_LOSS_ROI", Decimal::new(-15, 1)),
            take_profit_roi: env_decimal("TAKE_PROFIT_ROI", Decimal::new(30, 1)),

            break_even_activation: env_decimal("BREAK_EVEN_ACTIVATION", Decimal::new(10, 1)),
            break_even_buffer: env_decimal("BREAK_EVEN_BUFFER", Decimal::new(5, 2)),

            trailing_activation: env_decimal("TRAILING_ACTIVATION", Decimal::new(15, 1)),
            trailing_distance: env_decimal("TRAILING_DISTANCE", Decimal::new(8, 1)),
            trailing_step: env_decimal("TRAILING_STEP", Decimal::new(2, 1)),

            max_open_positions: env_or("MAX_OPEN_POSITIONS", 3),
            max_position_size_usd: env_decimal("MAX_POSITION_SIZE_USD", Decimal::new(500, 0)),
            max_daily_drawdown: env_decimal("MAX_DAILY_DRAWDOWN", Decimal::new(3, 0)),
            max_consecutive_losses: env_or("MAX_CONSECUTIVE_LOSSES", 5),
            max_hourly_trades: env_or("MAX_HOURLY_TRADES", 12),

            burst_rate_limit_ms: env_or("BURST_RATE_LIMIT_MS", 2_000),
            loss_cooldown_ms: env_or("LOSS_COOLDOWN_MS", 300_000),

            signal_min_score: env_or("SIGNAL_MIN_SCORE", 0.15),
            signal_strong_score: env_or("SIGNAL_STRONG_SCORE", 0.45),
            signal_extreme_score: env_or("SIGNAL_EXTREME_SCORE", 0.70),
            signal_min_confidence: env_or("SIGNAL_MIN_CONFIDENCE", 0.40),
            signal_min_indicators: env_or("SIGNAL_MIN_INDICATORS", 3),
            signal_cooldown_ms: env_or("SIGNAL_COOLDOWN_MS", 60_000),

            mtf_enabled: env_bool("MTF_ENABLED", true),
            mtf_ltf_timeframes,
            mtf_htf_timeframes,

            symbols,

            venue_api_key: env::var("BINANCE_API_KEY").unwrap_or_default(),
            venue_api_secret: env::var("BINANCE_API_SECRET").unwrap_or_default(),
        };

        info!(
            symbols = ?cfg.symbols,
            mode = %cfg.mode,
            account_mode = %cfg.account_mode,
            live_trading_enabled = cfg.enable_live_trading,
            "configuration loaded from environment"
        );

        Ok(cfg)
    }
}

/// Operational guardrails that ops may retune without a restart. Mirrors a
/// subset of `Config`'s numeric fields; persisted as JSON with an atomic
/// write-then-rename, exactly as the teacher's `runtime_config.rs` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeOverlay {
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: u32,
    #[serde(default = "default_max_daily_drawdown")]
    pub max_daily_drawdown: Decimal,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_signal_min_score")]
    pub signal_min_score: f64,
}

fn default_max_open_positions() -> u32 {
    3
}
fn default_max_daily_drawdown() -> Decimal {
    Decimal::new(3, 0)
}
fn default_max_consecutive_losses() -> u32 {
    5
}
fn default_signal_min_score() -> f64 {
    0.15
}

impl Default for RuntimeOverlay {
    fn default() -> Self {
        Self {
            max_open_positions: default_max_open_positions(),
            max_daily_drawdown: default_max_daily_drawdown(),
            max_consecutive_losses: default_max_consecutive_losses(),
            signal_min_score: default_signal_min_score(),
        }
    }
}

impl RuntimeOverlay {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "failed to parse runtime overlay, using defaults");
                Self::default()
            }),
            Err(_) => {
                info!(path = %path.display(), "no runtime overlay found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self).context("serialising runtime overlay")?;
        std::fs::write(&tmp, body).context("writing runtime overlay tmp file")?;
        std::fs::rename(&tmp, path).context("renaming runtime overlay into place")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_overlay_matches_documented_defaults() {
        let overlay = RuntimeOverlay::default();
        assert_eq!(overlay.max_open_positions, 3);
        assert_eq!(overlay.max_consecutive_losses, 5);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let overlay: RuntimeOverlay = serde_json::from_str(r#"{"max_open_positions": 7}"#).unwrap();
        assert_eq!(overlay.max_open_positions, 7);
        assert_eq!(overlay.max_consecutive_losses, 5);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let overlay = RuntimeOverlay::load("/tmp/aurora-nonexistent-overlay-test.json");
        assert_eq!(overlay.max_open_positions, 3);
    }
}
