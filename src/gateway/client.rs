// =============================================================================
// Gateway — signed venue client wrapped in rate limiting and a circuit breaker
// =============================================================================
//
// Generalizes `binance::client::BinanceClient` (HMAC signing, recv-window,
// endpoint methods) by wrapping every call through a `TokenBucket` pre-flight
// check and a `CircuitBreaker` so a string of venue failures stops hammering
// it instead of retrying into a wall. Kept as a thin wrapper, not a
// reimplementation — `BinanceClient` still owns signing and transport;
// `Gateway` owns admission control and failure classification into
// `EngineError`.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::binance::client::BinanceClient;
use crate::errors::EngineError;
use crate::gateway::circuit_breaker::CircuitBreaker;
use crate::gateway::token_bucket::TokenBucket;
use crate::market_data::Candle;

/// A single order leg as the executor builds it: entry, reduce-only stop, or
/// reduce-only take-profit.
pub struct OrderRequest {
    pub symbol: String,
    pub side: &'static str,
    pub order_type: &'static str,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
    pub client_order_id: String,
}

pub struct Gateway {
    client: Arc<BinanceClient>,
    weight_bucket: TokenBucket,
    order_bucket: TokenBucket,
    breaker: CircuitBreaker,
}

impl Gateway {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self {
            client,
            // 1200 request-weight/min, refilled continuously.
            weight_bucket: TokenBucket::new(1200, 1200.0 / 60.0),
            // 10 orders/10s.
            order_bucket: TokenBucket::new(10, 1.0),
            breaker: CircuitBreaker::new(5, Duration::from_secs(30)),
        }
    }

    fn guard(&self, operation: &str) -> Result<(), EngineError> {
        if !self.breaker.allow() {
            return Err(EngineError::BreakerOpen { operation: operation.to_string() });
        }
        Ok(())
    }

    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>, EngineError> {
        self.guard("get_klines")?;
        self.weight_bucket.acquire(2).await;
        match self.client.get_klines(symbol, interval, limit).await {
            Ok(candles) => {
                self.breaker.record_success();
                Ok(candles)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(EngineError::Transient { operation: "get_klines".to_string(), source: e })
            }
        }
    }

    pub async fn get_balance(&self, asset: &str) -> Result<f64, EngineError> {
        self.guard("get_balance")?;
        self.weight_bucket.acquire(10).await;
        match self.client.get_balance(asset).await {
            Ok(balance) => {
                self.breaker.record_success();
                Ok(balance)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(EngineError::Transient { operation: "get_balance".to_string(), source: e })
            }
        }
    }

    /// Submit a single order leg. `request.client_order_id` must already be
    /// deterministic — the gateway does not generate or mutate it, so
    /// transport-level retries against the same id stay idempotent.
    pub async fn place_order(&self, request: &OrderRequest) -> Result<serde_json::Value, EngineError> {
        self.guard("place_order")?;
        if !self.order_bucket.try_acquire(1) {
            return Err(EngineError::RateLimited { operation: "place_order".to_string() });
        }
        self.weight_bucket.acquire(1).await;

        let price_f64 = request.price.and_then(|p| p.to_f64());
        let result = self
            .client
            .place_order(
                &request.symbol,
                request.side,
                request.order_type,
                request.quantity.to_f64().unwrap_or(0.0),
                price_f64,
                Some("GTC"),
                Some(&request.client_order_id),
            )
            .await;

        match result {
            Ok(body) => {
                self.breaker.record_success();
                Ok(body)
            }
            Err(e) => {
                self.breaker.record_failure();
                let msg = e.to_string();
                if msg.contains("400") || msg.contains("rejected") {
                    warn!(symbol = %request.symbol, error = %msg, "order rejected by venue");
                    Err(EngineError::Rejected { operation: "place_order".to_string(), reason: msg })
                } else {
                    Err(EngineError::Transient { operation: "place_order".to_string(), source: e })
                }
            }
        }
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), EngineError> {
        self.guard("cancel_order")?;
        self.weight_bucket.acquire(1).await;
        match self.client.cancel_order(symbol, order_id).await {
            Ok(_) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(EngineError::Transient { operation: "cancel_order".to_string(), source: e })
            }
        }
    }

    pub fn breaker_state(&self) -> crate::gateway::circuit_breaker::BreakerState {
        self.breaker.state()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").field("breaker_state", &self.breaker.state()).finish()
    }
}
