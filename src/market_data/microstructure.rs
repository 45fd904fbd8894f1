// =============================================================================
// MicrostructureSnapshot — order-book + recent-trade state fed to the
// SignalGenerator and Executor
// =============================================================================
//
// An immutable value assembled on demand from `OrderBookManager` and
// `TradeStreamProcessor`. Per spec.md §3: stale snapshots (either side older
// than `max_age`) are treated as absent, never as a neutral reading — a
// caller that gets `None` back must skip the microstructure contribution
// entirely rather than score the gap as zero.

use std::time::Duration;

use serde::Serialize;

use crate::futures_intel::funding_rate::FundingState;
use crate::market_data::orderbook::OrderBookManager;
use crate::market_data::trade_stream::TradeStreamProcessor;

#[derive(Debug, Clone, Serialize)]
pub struct MicrostructureSnapshot {
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread_bps: f64,
    pub depth_imbalance: f64,
    pub buy_sell_ratio: f64,
    pub funding_rate: Option<f64>,
    /// Contrarian signal in [-1.0, +1.0] from `funding_rate::FundingState`,
    /// carried separately from the raw rate so `score_contribution` doesn't
    /// need to re-derive the thresholds.
    pub funding_signal: Option<f64>,
    pub last_trade_age_ms: u64,
}

impl MicrostructureSnapshot {
    /// `cap` is the generator's configured microstructure weight — imbalance
    /// and buy/sell skew each drive up to half the cap, funding contributes
    /// the remaining fifth as a contrarian bias.
    pub fn score_contribution(&self, cap: f64) -> f64 {
        let imbalance_term = self.depth_imbalance * cap * 0.5;
        let flow_term = (self.buy_sell_ratio - 0.5) * 2.0 * cap * 0.3;
        let funding_term = self.funding_signal.unwrap_or(0.0) * cap * 0.2;
        (imbalance_term + flow_term + funding_term).clamp(-cap, cap)
    }
}

/// Build a microstructure snapshot for `symbol`, or `None` if either the
/// order book or the trade stream has gone stale (older than `max_age`).
pub fn build_snapshot(
    orderbook: &OrderBookManager,
    trades: &TradeStreamProcessor,
    funding: Option<&FundingState>,
    symbol: &str,
    max_age: Duration,
) -> Option<MicrostructureSnapshot> {
    let book = orderbook.get_fresh(symbol, max_age)?;
    let trade_age = trades.last_trade_age()?;
    if trade_age > max_age {
        return None;
    }

    Some(MicrostructureSnapshot {
        symbol: symbol.to_string(),
        best_bid: book.best_bid,
        best_ask: book.best_ask,
        spread_bps: book.spread_bps,
        depth_imbalance: book.imbalance,
        buy_sell_ratio: trades.buy_volume_ratio(),
        funding_rate: funding.map(|f| f.rate),
        funding_signal: funding.map(|f| f.signal),
        last_trade_age_ms: trade_age.as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_orderbook_yields_no_snapshot() {
        let ob = OrderBookManager::new();
        let trades = TradeStreamProcessor::new("BTCUSDT");
        trades.process_trade(100.0, 1.0, false);
        // No orderbook update at all => get_fresh returns None.
        assert!(build_snapshot(&ob, &trades, None, "BTCUSDT", Duration::from_secs(5)).is_none());
    }

    #[test]
    fn fresh_inputs_produce_a_snapshot() {
        let ob = OrderBookManager::new();
        ob.update("BTCUSDT", 100.0, 100.2, 10.0, 8.0, 1);
        let trades = TradeStreamProcessor::new("BTCUSDT");
        trades.process_trade(100.1, 1.0, false);
        let snap = build_snapshot(&ob, &trades, None, "BTCUSDT", Duration::from_secs(5));
        assert!(snap.is_some());
        let snap = snap.unwrap();
        assert!(snap.depth_imbalance > 0.0);
    }

    #[test]
    fn score_contribution_is_clamped_to_cap() {
        let snap = MicrostructureSnapshot {
            symbol: "BTCUSDT".to_string(),
            best_bid: 100.0,
            best_ask: 100.1,
            spread_bps: 10.0,
            depth_imbalance: 1.0,
            buy_sell_ratio: 1.0,
            funding_rate: None,
            funding_signal: Some(1.0),
            last_trade_age_ms: 0,
        };
        let cap = 20.0;
        assert!(snap.score_contribution(cap) <= cap);
        assert!(snap.score_contribution(cap) >= -cap);
    }

    #[test]
    fn funding_signal_shifts_contribution_toward_its_bias() {
        let base = MicrostructureSnapshot {
            symbol: "BTCUSDT".to_string(),
            best_bid: 100.0,
            best_ask: 100.1,
            spread_bps: 10.0,
            depth_imbalance: 0.0,
            buy_sell_ratio: 0.5,
            funding_rate: Some(-0.0006),
            funding_signal: Some(0.9),
            last_trade_age_ms: 0,
        };
        assert!(base.score_contribution(20.0) > 0.0);
    }
}
