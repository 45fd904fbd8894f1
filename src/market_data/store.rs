// =============================================================================
// MarketStore — unified facade over candles, order book, and trade flow
// =============================================================================
//
// `CandleBuffer`, `OrderBookManager`, and the per-symbol `TradeStreamProcessor`
// registry each guard their own state independently. `MarketStore` wraps the
// same shared handles behind one type so a consumer that needs a consistent
// read across all three (the microstructure snapshot) gets it from a single
// call instead of composing three separate locks itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::candle_buffer::{Candle, CandleBuffer, CandleKey};
use super::microstructure::{build_snapshot, MicrostructureSnapshot};
use super::orderbook::OrderBookManager;
use super::trade_stream::TradeStreamProcessor;

/// Facade over the three market-data subsystems. Cheap to clone (every field
/// is an `Arc`); intended to be built once in `AppState` and shared.
pub struct MarketStore {
    candles: Arc<CandleBuffer>,
    orderbook: Arc<OrderBookManager>,
    trade_processors: RwLock<HashMap<String, Arc<TradeStreamProcessor>>>,
}

impl MarketStore {
    /// Wrap already-constructed candle and order book handles. Trade
    /// processors are registered afterwards via [`register_trade_processor`].
    pub fn new(candles: Arc<CandleBuffer>, orderbook: Arc<OrderBookManager>) -> Self {
        Self {
            candles,
            orderbook,
            trade_processors: RwLock::new(HashMap::new()),
        }
    }

    /// Shared handle to the underlying candle ring buffer, for callers that
    /// still need the wider `CandleBuffer` surface directly.
    pub fn candles(&self) -> &Arc<CandleBuffer> {
        &self.candles
    }

    /// Shared handle to the underlying order book manager.
    pub fn orderbook(&self) -> &Arc<OrderBookManager> {
        &self.orderbook
    }

    /// Register (or replace) the trade processor used for a symbol's
    /// microstructure reads.
    pub fn register_trade_processor(&self, symbol: &str, processor: Arc<TradeStreamProcessor>) {
        self.trade_processors.write().insert(symbol.to_string(), processor);
    }

    /// Look up a symbol's registered trade processor, if any.
    pub fn trade_processor(&self, symbol: &str) -> Option<Arc<TradeStreamProcessor>> {
        self.trade_processors.read().get(symbol).cloned()
    }

    /// Ingest a closed candle. Delegates to `CandleBuffer::update`, which
    /// already drops zero-OHLC rows and appends to the ring, trimming the
    /// oldest entry once the configured depth is exceeded.
    pub fn append_candle(&self, key: CandleKey, candle: Candle) {
        self.candles.update(key, candle);
    }

    /// Update (or start) the in-progress candle for a key. Distinct from
    /// [`append_candle`] at the call site even though both dispatch into the
    /// same `CandleBuffer::update` — the buffer itself decides whether to
    /// replace the in-progress entry or push a new one based on
    /// `Candle::is_closed`.
    pub fn update_last_candle(&self, key: CandleKey, candle: Candle) {
        self.candles.update(key, candle);
    }

    /// Most recent `count` closed candles for a key, oldest first.
    pub fn tail(&self, key: &CandleKey, count: usize) -> Vec<Candle> {
        self.candles.get_closed(key, count)
    }

    /// Most recent `count` close prices for a key, oldest first.
    pub fn closes(&self, key: &CandleKey, count: usize) -> Vec<f64> {
        self.candles.get_closes(key, count)
    }

    /// A consistent read across the order book and trade flow for `symbol`:
    /// book depth, spread, and recent taker flow as of one instant, or
    /// `None` if either side is missing or stale past `max_age`.
    pub fn snapshot(&self, symbol: &str, max_age: Duration) -> Option<MicrostructureSnapshot> {
        let processor = self.trade_processor(symbol)?;
        build_snapshot(&self.orderbook, &processor, None, symbol, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(open_time: i64, close: f64, is_closed: bool) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 200.0,
            trades_count: 50,
            taker_buy_volume: 60.0,
            taker_buy_quote_volume: 120.0,
            is_closed,
        }
    }

    fn key(symbol: &str, interval: &str) -> CandleKey {
        CandleKey {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
        }
    }

    #[test]
    fn append_and_tail_round_trip() {
        let store = MarketStore::new(Arc::new(CandleBuffer::new(10)), Arc::new(OrderBookManager::new()));
        let k = key("BTCUSDT", "1m");
        store.append_candle(k.clone(), sample_candle(0, 100.0, true));
        store.append_candle(k.clone(), sample_candle(60_000, 101.0, true));

        let tail = store.tail(&k, 10);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].close, 101.0);
    }

    #[test]
    fn update_last_candle_replaces_in_progress() {
        let store = MarketStore::new(Arc::new(CandleBuffer::new(10)), Arc::new(OrderBookManager::new()));
        let k = key("ETHUSDT", "5m");
        store.update_last_candle(k.clone(), sample_candle(0, 50.0, false));
        store.update_last_candle(k.clone(), sample_candle(0, 51.0, false));
        assert_eq!(store.candles().count(&k), 1);
        assert!(store.tail(&k, 10).is_empty());
    }

    #[test]
    fn zero_ohlc_candle_dropped_through_facade() {
        let store = MarketStore::new(Arc::new(CandleBuffer::new(10)), Arc::new(OrderBookManager::new()));
        let k = key("BTCUSDT", "1m");
        let zero = Candle {
            open_time: 0,
            close_time: 59_999,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            quote_volume: 0.0,
            trades_count: 0,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        };
        store.append_candle(k.clone(), zero);
        assert_eq!(store.candles().count(&k), 0);
    }

    #[test]
    fn snapshot_is_none_without_registered_trade_processor() {
        let store = MarketStore::new(Arc::new(CandleBuffer::new(10)), Arc::new(OrderBookManager::new()));
        assert!(store.snapshot("BTCUSDT", Duration::from_secs(10)).is_none());
    }
}
