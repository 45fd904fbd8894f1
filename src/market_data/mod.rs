pub mod candle_buffer;
pub mod microstructure;
pub mod orderbook;
pub mod store;
pub mod trade_stream;

// Re-export the Candle struct for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle_buffer::{Candle, CandleBuffer, CandleKey};
pub use microstructure::{build_snapshot as build_microstructure_snapshot, MicrostructureSnapshot};
pub use orderbook::OrderBookManager;
pub use store::MarketStore;
pub use trade_stream::TradeStreamProcessor;
