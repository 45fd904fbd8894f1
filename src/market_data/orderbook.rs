// =============================================================================
// Order Book Manager — Real-time orderbook aggregation
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

/// Manages orderbook state for multiple symbols.
pub struct OrderBookManager {
    books: RwLock<HashMap<String, OrderBookState>>,
}

/// A single price/quantity level, best-to-worst ordered within its side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub quantity: f64,
}

/// Orderbook state for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookState {
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub spread_bps: f64,
    pub imbalance: f64,
    pub last_update_id: u64,
    /// Bid levels, best (highest price) first.
    #[serde(default)]
    pub bids: Vec<Level>,
    /// Ask levels, best (lowest price) first.
    #[serde(default)]
    pub asks: Vec<Level>,
    /// When this snapshot was last refreshed — used to reject stale reads.
    #[serde(skip, default = "Instant::now")]
    pub observed_at: Instant,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Update the orderbook state for a symbol from aggregate top-of-book and
    /// total depth only (legacy path, kept for callers that do not have
    /// per-level data).
    pub fn update(
        &self,
        symbol: &str,
        best_bid: f64,
        best_ask: f64,
        bid_depth: f64,
        ask_depth: f64,
        update_id: u64,
    ) {
        self.update_levels(symbol, vec![], vec![], best_bid, best_ask, bid_depth, ask_depth, update_id);
    }

    /// Update the orderbook state for a symbol with full per-level depth.
    /// `bids`/`asks` must already be sorted best-first by the caller (the
    /// venue sends them pre-sorted).
    #[allow(clippy::too_many_arguments)]
    pub fn update_levels(
        &self,
        symbol: &str,
        bids: Vec<Level>,
        asks: Vec<Level>,
        best_bid: f64,
        best_ask: f64,
        bid_depth: f64,
        ask_depth: f64,
        update_id: u64,
    ) {
        let mid = (best_bid + best_ask) / 2.0;
        let spread_bps = if mid > 0.0 {
            ((best_ask - best_bid) / mid) * 10_000.0
        } else {
            0.0
        };

        let total_depth = bid_depth + ask_depth;
        let imbalance = if total_depth > 0.0 {
            (bid_depth - ask_depth) / total_depth
        } else {
            0.0
        };

        let state = OrderBookState {
            symbol: symbol.to_string(),
            best_bid,
            best_ask,
            bid_depth,
            ask_depth,
            spread_bps,
            imbalance,
            last_update_id: update_id,
            bids,
            asks,
            observed_at: Instant::now(),
        };

        self.books.write().insert(symbol.to_string(), state);
    }

    /// Get the current orderbook state for a symbol.
    pub fn get(&self, symbol: &str) -> Option<OrderBookState> {
        self.books.read().get(symbol).cloned()
    }

    /// Get the current orderbook state only if it was observed within
    /// `max_age`. Stale snapshots are treated as absent, not neutral, per
    /// the microstructure freshness-bound requirement.
    pub fn get_fresh(&self, symbol: &str, max_age: std::time::Duration) -> Option<OrderBookState> {
        let books = self.books.read();
        let state = books.get(symbol)?;
        if state.observed_at.elapsed() > max_age {
            return None;
        }
        Some(state.clone())
    }

    /// The Nth bid level (0-indexed from best), falling back to the best
    /// bid when fewer levels are available. `None` when no book exists.
    pub fn nth_bid(&self, symbol: &str, n: usize) -> Option<f64> {
        let books = self.books.read();
        let state = books.get(symbol)?;
        if let Some(level) = state.bids.get(n) {
            return Some(level.price);
        }
        if state.best_bid > 0.0 {
            return Some(state.best_bid);
        }
        None
    }

    /// The Nth ask level (0-indexed from best), symmetric to [`nth_bid`].
    pub fn nth_ask(&self, symbol: &str, n: usize) -> Option<f64> {
        let books = self.books.read();
        let state = books.get(symbol)?;
        if let Some(level) = state.asks.get(n) {
            return Some(level.price);
        }
        if state.best_ask > 0.0 {
            return Some(state.best_ask);
        }
        None
    }

    /// Get the spread in basis points for a symbol.
    pub fn spread_bps(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).map(|s| s.spread_bps)
    }

    /// Get the orderbook imbalance for a symbol (-1 to +1).
    pub fn imbalance(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).map(|s| s.imbalance)
    }

    /// Get all tracked symbols.
    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }
}

impl Default for OrderBookManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Depth WebSocket stream
// ---------------------------------------------------------------------------

/// Connect to the Binance partial depth WebSocket stream for a single symbol
/// and feed orderbook updates into `manager`.
///
/// Uses the `@depth20@100ms` stream which provides the top 20 levels of the
/// orderbook at 100ms update intervals.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller (main.rs) can handle reconnection.
pub async fn run_depth_stream(
    symbol: &str,
    manager: &Arc<OrderBookManager>,
) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@depth20@100ms");
    info!(url = %url, symbol = %symbol, "connecting to depth WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to depth WebSocket")?;

    info!(symbol = %symbol, "depth WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_depth_message(symbol, &text) {
                        Ok(parsed) => {
                            manager.update_levels(
                                symbol,
                                parsed.bids,
                                parsed.asks,
                                parsed.best_bid,
                                parsed.best_ask,
                                parsed.bid_depth,
                                parsed.ask_depth,
                                parsed.update_id,
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse depth message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "depth WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "depth WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

struct ParsedDepth {
    best_bid: f64,
    best_ask: f64,
    bid_depth: f64,
    ask_depth: f64,
    update_id: u64,
    bids: Vec<Level>,
    asks: Vec<Level>,
}

/// Parse a Binance partial-depth message.
///
/// Expected shape:
/// ```json
/// {
///   "lastUpdateId": 12345,
///   "bids": [["37000.00", "1.5"], ...],
///   "asks": [["37001.00", "1.2"], ...]
/// }
/// ```
fn parse_depth_message(_symbol: &str, text: &str) -> Result<ParsedDepth> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse depth JSON")?;

    let update_id = root["lastUpdateId"]
        .as_u64()
        .context("missing field lastUpdateId")?;

    let raw_bids = root["bids"].as_array().context("missing field bids")?;
    let raw_asks = root["asks"].as_array().context("missing field asks")?;

    let parse_levels = |raw: &[serde_json::Value]| -> Vec<Level> {
        raw.iter()
            .filter_map(|entry| {
                let price: f64 = entry.get(0)?.as_str()?.parse().ok()?;
                let quantity: f64 = entry.get(1)?.as_str()?.parse().ok()?;
                Some(Level { price, quantity })
            })
            .collect()
    };

    let bids = parse_levels(raw_bids);
    let asks = parse_levels(raw_asks);

    let best_bid = bids.first().map(|l| l.price).unwrap_or(0.0);
    let best_ask = asks.first().map(|l| l.price).unwrap_or(0.0);
    let bid_depth: f64 = bids.iter().map(|l| l.quantity).sum();
    let ask_depth: f64 = asks.iter().map(|l| l.quantity).sum();

    Ok(ParsedDepth {
        best_bid,
        best_ask,
        bid_depth,
        ask_depth,
        update_id,
        bids,
        asks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nth_bid_falls_back_to_best_when_levels_absent() {
        let mgr = OrderBookManager::new();
        mgr.update("BTCUSDT", 100.0, 101.0, 5.0, 5.0, 1);
        assert_eq!(mgr.nth_bid("BTCUSDT", 9), Some(100.0));
        assert_eq!(mgr.nth_ask("BTCUSDT", 9), Some(101.0));
    }

    #[test]
    fn nth_bid_picks_the_configured_depth_level() {
        let mgr = OrderBookManager::new();
        let bids: Vec<Level> = (0..20)
            .map(|i| Level { price: 100.0 - i as f64 * 0.1, quantity: 1.0 })
            .collect();
        let asks: Vec<Level> = (0..20)
            .map(|i| Level { price: 101.0 + i as f64 * 0.1, quantity: 1.0 })
            .collect();
        mgr.update_levels("BTCUSDT", bids, asks, 100.0, 101.0, 20.0, 20.0, 1);
        assert_eq!(mgr.nth_bid("BTCUSDT", 9), Some(100.0 - 0.9));
        assert_eq!(mgr.nth_ask("BTCUSDT", 9), Some(101.0 + 0.9));
    }

    #[test]
    fn fresh_snapshot_is_returned_within_bound() {
        let mgr = OrderBookManager::new();
        mgr.update("BTCUSDT", 100.0, 101.0, 5.0, 5.0, 1);
        assert!(mgr.get_fresh("BTCUSDT", std::time::Duration::from_secs(5)).is_some());
    }

    #[test]
    fn missing_symbol_has_no_fresh_snapshot() {
        let mgr = OrderBookManager::new();
        assert!(mgr.get_fresh("ETHUSDT", std::time::Duration::from_secs(5)).is_none());
    }
}
