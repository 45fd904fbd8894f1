// =============================================================================
// SafetyLayer — operational guardrails around the account breakers
// =============================================================================
//
// `risk::breakers::RiskEngine` and `risk::agent::RiskAgent` answer "is this
// one proposed trade safe". `SafetyLayer` sits a layer above them and answers
// "is the engine, as a whole, in a state where it should be submitting
// anything right now" — burst pacing, an hourly cap, a post-loss cooldown,
// a per-feature kill switch with a rolling outcome window, and the
// emergency-stop latch that the drawdown breaker trips into. Modeled on the
// same `parking_lot::RwLock`-guarded `Inner` + snapshot-struct shape as
// `RiskEngine`, generalized to track more than one feature.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

/// A named subsystem the kill switch can disable independently — e.g. a
/// single misbehaving symbol's entries, without halting the whole engine.
pub type FeatureKey = String;

const OUTCOME_WINDOW: usize = 20;
const KILL_FAILURE_RATE: f64 = 0.6;
const KILL_MIN_SAMPLES: usize = 5;

struct FeatureState {
    outcomes: VecDeque<bool>,
    killed: bool,
    killed_reason: Option<String>,
}

impl FeatureState {
    fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
            killed: false,
            killed_reason: None,
        }
    }

    fn record(&mut self, success: bool) {
        self.outcomes.push_back(success);
        while self.outcomes.len() > OUTCOME_WINDOW {
            self.outcomes.pop_front();
        }
        if self.outcomes.len() >= KILL_MIN_SAMPLES {
            let failures = self.outcomes.iter().filter(|&&ok| !ok).count();
            let rate = failures as f64 / self.outcomes.len() as f64;
            if rate >= KILL_FAILURE_RATE && !self.killed {
                self.killed = true;
                self.killed_reason = Some(format!(
                    "failure rate {:.0}% over last {} outcomes",
                    rate * 100.0,
                    self.outcomes.len()
                ));
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatus {
    pub emergency_stop: bool,
    pub emergency_stop_reason: Option<String>,
    pub live_trading_enabled: bool,
    pub hourly_trade_count: u32,
    pub hourly_trade_limit: u32,
    pub in_cooldown: bool,
    pub cooldown_remaining_ms: u64,
    pub killed_features: Vec<String>,
}

pub struct SafetyConfig {
    pub burst_rate_limit: Duration,
    pub hourly_trade_limit: u32,
    pub loss_cooldown: Duration,
    pub live_trading_enabled: bool,
}

struct Inner {
    last_trade_at: Option<Instant>,
    hourly_trades: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    emergency_stop: bool,
    emergency_stop_reason: Option<String>,
    features: HashMap<FeatureKey, FeatureState>,
}

/// Guards engine-wide trading pace and availability, independent of any
/// single trade's risk math.
pub struct SafetyLayer {
    cfg: SafetyConfig,
    inner: RwLock<Inner>,
}

impl SafetyLayer {
    pub fn new(cfg: SafetyConfig) -> Self {
        Self {
            cfg,
            inner: RwLock::new(Inner {
                last_trade_at: None,
                hourly_trades: VecDeque::new(),
                cooldown_until: None,
                emergency_stop: false,
                emergency_stop_reason: None,
                features: HashMap::new(),
            }),
        }
    }

    /// Check whether a new order may be submitted right now, for the given
    /// feature. Does not itself record anything — call `record_submission`
    /// once the order is actually sent.
    pub fn check(&self, feature: &str) -> Result<(), String> {
        let inner = self.inner.read();

        if inner.emergency_stop {
            return Err(inner
                .emergency_stop_reason
                .clone()
                .unwrap_or_else(|| "emergency stop active".to_string()));
        }

        if !self.cfg.live_trading_enabled {
            // Paper mode is always allowed to "submit" (simulated fills);
            // only live order submission is gated by the flag elsewhere.
        }

        if let Some(until) = inner.cooldown_until {
            if Instant::now() < until {
                return Err(format!(
                    "loss cooldown active for another {}ms",
                    until.saturating_duration_since(Instant::now()).as_millis()
                ));
            }
        }

        if let Some(last) = inner.last_trade_at {
            let elapsed = last.elapsed();
            if elapsed < self.cfg.burst_rate_limit {
                return Err(format!(
                    "burst limit: last trade {}ms ago, minimum spacing {}ms",
                    elapsed.as_millis(),
                    self.cfg.burst_rate_limit.as_millis()
                ));
            }
        }

        let recent_hour = inner
            .hourly_trades
            .iter()
            .filter(|t| t.elapsed() < Duration::from_secs(3600))
            .count();
        if recent_hour as u32 >= self.cfg.hourly_trade_limit {
            return Err(format!(
                "hourly trade cap reached ({}/{})",
                recent_hour, self.cfg.hourly_trade_limit
            ));
        }

        if let Some(state) = inner.features.get(feature) {
            if state.killed {
                return Err(state
                    .killed_reason
                    .clone()
                    .unwrap_or_else(|| format!("feature {feature} killed")));
            }
        }

        Ok(())
    }

    /// Record that an order was actually submitted, for pacing purposes.
    pub fn record_submission(&self) {
        let mut inner = self.inner.write();
        let now = Instant::now();
        inner.last_trade_at = Some(now);
        inner.hourly_trades.push_back(now);
        while inner
            .hourly_trades
            .front()
            .map(|t| t.elapsed() > Duration::from_secs(3600))
            .unwrap_or(false)
        {
            inner.hourly_trades.pop_front();
        }
    }

    /// Record the realized outcome of a closed position for a feature's
    /// rolling kill-switch window, and start a loss cooldown if it lost.
    pub fn record_outcome(&self, feature: &str, profitable: bool) {
        let mut inner = self.inner.write();
        if !profitable {
            inner.cooldown_until = Some(Instant::now() + self.cfg.loss_cooldown);
        }
        inner
            .features
            .entry(feature.to_string())
            .or_insert_with(FeatureState::new)
            .record(profitable);
    }

    /// Trip the emergency stop latch — blocks all new entries until
    /// `clear_emergency_stop` is called explicitly (never automatically).
    pub fn trigger_emergency_stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "emergency stop triggered");
        let mut inner = self.inner.write();
        inner.emergency_stop = true;
        inner.emergency_stop_reason = Some(reason);
    }

    pub fn clear_emergency_stop(&self) {
        let mut inner = self.inner.write();
        inner.emergency_stop = false;
        inner.emergency_stop_reason = None;
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.inner.read().emergency_stop
    }

    pub fn clear_feature_kill(&self, feature: &str) {
        if let Some(state) = self.inner.write().features.get_mut(feature) {
            state.killed = false;
            state.killed_reason = None;
            state.outcomes.clear();
        }
    }

    pub fn status(&self) -> SafetyStatus {
        let inner = self.inner.read();
        let recent_hour = inner
            .hourly_trades
            .iter()
            .filter(|t| t.elapsed() < Duration::from_secs(3600))
            .count() as u32;
        let cooldown_remaining_ms = inner
            .cooldown_until
            .map(|u| u.saturating_duration_since(Instant::now()).as_millis() as u64)
            .unwrap_or(0);

        SafetyStatus {
            emergency_stop: inner.emergency_stop,
            emergency_stop_reason: inner.emergency_stop_reason.clone(),
            live_trading_enabled: self.cfg.live_trading_enabled,
            hourly_trade_count: recent_hour,
            hourly_trade_limit: self.cfg.hourly_trade_limit,
            in_cooldown: cooldown_remaining_ms > 0,
            cooldown_remaining_ms,
            killed_features: inner
                .features
                .iter()
                .filter(|(_, s)| s.killed)
                .map(|(k, _)| k.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> SafetyLayer {
        SafetyLayer::new(SafetyConfig {
            burst_rate_limit: Duration::from_millis(50),
            hourly_trade_limit: 3,
            loss_cooldown: Duration::from_millis(50),
            live_trading_enabled: false,
        })
    }

    #[test]
    fn allows_first_trade() {
        assert!(layer().check("BTCUSDT").is_ok());
    }

    #[test]
    fn blocks_burst_submission() {
        let l = layer();
        l.record_submission();
        assert!(l.check("BTCUSDT").is_err());
    }

    #[test]
    fn blocks_after_hourly_cap() {
        let l = layer();
        for _ in 0..3 {
            l.record_submission();
            std::thread::sleep(Duration::from_millis(60));
        }
        assert!(l.check("BTCUSDT").unwrap_err().contains("hourly"));
    }

    #[test]
    fn loss_triggers_cooldown() {
        let l = layer();
        l.record_outcome("BTCUSDT", false);
        assert!(l.check("BTCUSDT").unwrap_err().contains("cooldown"));
    }

    #[test]
    fn repeated_losses_kill_the_feature() {
        let l = layer();
        for _ in 0..5 {
            l.record_outcome("BTCUSDT", false);
        }
        assert!(l.status().killed_features.contains(&"BTCUSDT".to_string()));
    }

    #[test]
    fn emergency_stop_blocks_everything_until_cleared() {
        let l = layer();
        l.trigger_emergency_stop("daily drawdown exceeded");
        assert!(l.check("BTCUSDT").is_err());
        l.clear_emergency_stop();
        assert!(l.check("BTCUSDT").is_ok());
    }
}
