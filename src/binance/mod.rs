// =============================================================================
// Binance SPOT REST client
// =============================================================================

pub mod client;

pub use client::BinanceClient;
