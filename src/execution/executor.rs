// =============================================================================
// Executor — turns an authorized trade proposal into venue order legs
// =============================================================================
//
// Generalizes the teacher's `ExecutionEngine` (risk pre-check, demo/live
// dispatch, single market-ish fill, open a position) into a three-leg
// sequence routed through `Gateway` instead of `BinanceClient` directly:
// entry at a depth-aware price, then a reduce-only stop and a reduce-only
// take-profit once the entry confirms. A failure placing either protective
// leg triggers a compensating cancel of the entry rather than leaving a
// naked position on the book. Every leg's client order id is derived
// deterministically (`audit::deterministic_client_order_id`) and checked
// against an `IdempotencyStore` before it is sent, so a retried proposal
// never double-submits.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{deterministic_client_order_id, AuditEventKind, AuditLog, IdempotencyStore};
use crate::gateway::{Gateway, OrderRequest};
use crate::market_data::OrderBookManager;
use crate::position_engine::PositionManager;
use crate::safety::SafetyLayer;
use crate::types::Side;

/// Depth level used for entry pricing — the 9th resting level rather than
/// top-of-book, trading a little price for a materially better fill
/// probability on thin books.
const ENTRY_DEPTH_LEVEL: usize = 9;

#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub leverage: u32,
    pub margin: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub reference_price: Decimal,
    pub max_slippage_pct: Decimal,
    pub signal_fingerprint: String,
    /// "signal archetype in the current regime" fingerprint (e.g.
    /// `bullish_cross@trending`) the safety layer's kill switch is keyed by.
    pub feature_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionResult {
    Placed { position_id: String, entry_order: serde_json::Value },
    Simulated { position_id: String },
    Rejected(String),
    Error(String),
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placed { position_id, .. } => write!(f, "Placed(position={position_id})"),
            Self::Simulated { position_id } => write!(f, "Simulated(position={position_id})"),
            Self::Rejected(reason) => write!(f, "Rejected({reason})"),
            Self::Error(err) => write!(f, "Error({err})"),
        }
    }
}

pub struct Executor {
    gateway: Arc<Gateway>,
    position_manager: Arc<PositionManager>,
    orderbook: Arc<OrderBookManager>,
    safety: Arc<SafetyLayer>,
    audit: Arc<AuditLog>,
    idempotency: Arc<IdempotencyStore>,
    live_trading_enabled: bool,
}

impl Executor {
    pub fn new(
        gateway: Arc<Gateway>,
        position_manager: Arc<PositionManager>,
        orderbook: Arc<OrderBookManager>,
        safety: Arc<SafetyLayer>,
        audit: Arc<AuditLog>,
        idempotency: Arc<IdempotencyStore>,
        live_trading_enabled: bool,
    ) -> Self {
        Self {
            gateway,
            position_manager,
            orderbook,
            safety,
            audit,
            idempotency,
            live_trading_enabled,
        }
    }

    /// Depth-aware entry price: the Nth bid for a long (buying up through the
    /// resting bids) or the Nth ask for a short (selling down through the
    /// resting asks), falling back to the intent's reference price if the
    /// book has no resting levels.
    fn entry_price(&self, intent: &OrderIntent) -> Decimal {
        let from_book = match intent.side {
            Side::Long => self.orderbook.nth_bid(&intent.symbol, ENTRY_DEPTH_LEVEL),
            Side::Short => self.orderbook.nth_ask(&intent.symbol, ENTRY_DEPTH_LEVEL),
        };
        from_book
            .and_then(Decimal::from_f64_safe)
            .unwrap_or(intent.reference_price)
    }

    fn slippage_ok(&self, intent: &OrderIntent, candidate: Decimal) -> bool {
        if intent.reference_price <= Decimal::ZERO {
            return true;
        }
        let drift_pct = ((candidate - intent.reference_price) / intent.reference_price * Decimal::ONE_HUNDRED).abs();
        drift_pct <= intent.max_slippage_pct
    }

    pub async fn execute(&self, intent: OrderIntent) -> ExecutionResult {
        if let Err(reason) = self.safety.check(&intent.feature_key) {
            self.audit.record(AuditEventKind::GateBlocked {
                instrument: intent.symbol.clone(),
                gate: "safety_layer".to_string(),
                reason: reason.clone(),
            });
            return ExecutionResult::Rejected(reason);
        }

        let entry_price = self.entry_price(&intent);
        if !self.slippage_ok(&intent, entry_price) {
            let reason = format!(
                "entry price {entry_price} drifts beyond {}% of reference {}",
                intent.max_slippage_pct, intent.reference_price
            );
            self.audit.record(AuditEventKind::GateBlocked {
                instrument: intent.symbol.clone(),
                gate: "slippage_cap".to_string(),
                reason: reason.clone(),
            });
            return ExecutionResult::Rejected(reason);
        }

        let entry_client_id =
            deterministic_client_order_id(&intent.symbol, intent.side, &intent.signal_fingerprint, "entry");
        if !self.idempotency.record_if_new(&entry_client_id) {
            warn!(symbol = %intent.symbol, client_order_id = %entry_client_id, "duplicate entry submission suppressed");
            return ExecutionResult::Rejected("duplicate submission".to_string());
        }

        if !self.live_trading_enabled {
            return self.execute_demo(&intent, entry_price);
        }

        self.execute_live(&intent, entry_price, &entry_client_id).await
    }

    fn execute_demo(&self, intent: &OrderIntent, entry_price: Decimal) -> ExecutionResult {
        let position_id = self.position_manager.open_position(
            &intent.symbol,
            intent.side,
            entry_price,
            intent.quantity,
            intent.leverage,
            intent.margin,
            intent.stop_loss,
            intent.take_profit,
            &intent.feature_key,
        );
        self.safety.record_submission();
        self.audit.record(AuditEventKind::PositionOpened {
            position_id: position_id.clone(),
            instrument: intent.symbol.clone(),
            side: format!("{}", intent.side),
        });
        info!(symbol = %intent.symbol, position_id = %position_id, price = %entry_price, "demo position opened");
        ExecutionResult::Simulated { position_id }
    }

    async fn execute_live(&self, intent: &OrderIntent, entry_price: Decimal, entry_client_id: &str) -> ExecutionResult {
        let side_str: &'static str = match intent.side {
            Side::Long => "BUY",
            Side::Short => "SELL",
        };
        let opposite_str: &'static str = match intent.side {
            Side::Long => "SELL",
            Side::Short => "BUY",
        };

        let entry_request = OrderRequest {
            symbol: intent.symbol.clone(),
            side: side_str,
            order_type: "LIMIT",
            quantity: intent.quantity,
            price: Some(entry_price),
            stop_price: None,
            reduce_only: false,
            client_order_id: entry_client_id.to_string(),
        };

        let entry_order = match self.gateway.place_order(&entry_request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(symbol = %intent.symbol, error = %e, "entry order placement failed");
                return ExecutionResult::Error(format!("entry placement failed: {e}"));
            }
        };
        self.safety.record_submission();
        self.audit.record(AuditEventKind::OrderSubmitted {
            instrument: intent.symbol.clone(),
            client_order_id: entry_client_id.to_string(),
            side: side_str.to_string(),
        });

        let stop_client_id =
            deterministic_client_order_id(&intent.symbol, intent.side, &intent.signal_fingerprint, "stop_loss");
        let stop_request = OrderRequest {
            symbol: intent.symbol.clone(),
            side: opposite_str,
            order_type: "STOP_MARKET",
            quantity: intent.quantity,
            price: None,
            stop_price: Some(intent.stop_loss),
            reduce_only: true,
            client_order_id: stop_client_id,
        };

        if let Err(e) = self.gateway.place_order(&stop_request).await {
            warn!(symbol = %intent.symbol, error = %e, "stop-loss placement failed, cancelling entry");
            self.compensate(&intent.symbol, &entry_order);
            return ExecutionResult::Error(format!("stop-loss placement failed, entry cancelled: {e}"));
        }

        let tp_client_id =
            deterministic_client_order_id(&intent.symbol, intent.side, &intent.signal_fingerprint, "take_profit");
        let tp_request = OrderRequest {
            symbol: intent.symbol.clone(),
            side: opposite_str,
            order_type: "TAKE_PROFIT_MARKET",
            quantity: intent.quantity,
            price: None,
            stop_price: Some(intent.take_profit),
            reduce_only: true,
            client_order_id: tp_client_id,
        };

        if let Err(e) = self.gateway.place_order(&tp_request).await {
            warn!(symbol = %intent.symbol, error = %e, "take-profit placement failed, cancelling entry");
            self.compensate(&intent.symbol, &entry_order);
            return ExecutionResult::Error(format!("take-profit placement failed, entry cancelled: {e}"));
        }

        let position_id = self.position_manager.open_position(
            &intent.symbol,
            intent.side,
            entry_price,
            intent.quantity,
            intent.leverage,
            intent.margin,
            intent.stop_loss,
            intent.take_profit,
            &intent.feature_key,
        );
        self.audit.record(AuditEventKind::PositionOpened {
            position_id: position_id.clone(),
            instrument: intent.symbol.clone(),
            side: format!("{}", intent.side),
        });

        info!(symbol = %intent.symbol, position_id = %position_id, "live position opened with protective legs");
        ExecutionResult::Placed { position_id, entry_order }
    }

    /// Best-effort cancel of an entry order whose protective legs failed to
    /// place. A failure here is logged, not retried — leaving a naked entry
    /// is bad, but looping on a cancel that keeps failing is worse.
    fn compensate(&self, symbol: &str, entry_order: &serde_json::Value) {
        let Some(order_id) = entry_order.get("orderId").and_then(|v| v.as_u64()) else {
            warn!(symbol, "no orderId in entry response, cannot compensate");
            return;
        };
        let gateway = self.gateway.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            if let Err(e) = gateway.cancel_order(&symbol, order_id).await {
                warn!(symbol = %symbol, order_id, error = %e, "compensating cancel failed");
            }
        });
    }
}

trait DecimalFromF64Safe {
    fn from_f64_safe(v: f64) -> Option<Decimal>;
}

impl DecimalFromF64Safe for Decimal {
    fn from_f64_safe(v: f64) -> Option<Decimal> {
        Decimal::try_from(v).ok()
    }
}
