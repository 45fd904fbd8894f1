// =============================================================================
// RiskAgent — composable pre-trade gate stack
// =============================================================================
//
// Wraps the four account-level circuit breakers in `breakers::RiskEngine`
// (daily loss, consecutive losses, max drawdown, trade limit) with the
// per-trade gates a single proposal must also clear: position size, open
// position count, leverage band, aggregate exposure, and liquidation buffer.
// Each gate runs in order and the stack short-circuits on the first block —
// callers get back exactly which gate stopped the trade, for the decision
// envelope's audit trail.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::warn;

use crate::risk::breakers::RiskEngine;
use crate::types::Side;

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Allow,
    Blocked { gate: &'static str, reason: String },
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allow)
    }
}

pub struct RiskAgentLimits {
    pub max_open_positions: u32,
    pub leverage_min: u32,
    pub leverage_max: u32,
    pub max_position_size_usd: Decimal,
    pub max_total_exposure_usd: Decimal,
    pub liquidation_buffer_pct: Decimal,
}

pub struct RiskAgent {
    pub breakers: Arc<RiskEngine>,
    limits: RiskAgentLimits,
}

/// Everything the gate stack needs to judge a single proposed trade.
pub struct TradeProposal {
    pub open_position_count: u32,
    pub notional_usd: Decimal,
    pub leverage: u32,
    pub existing_exposure_usd: Decimal,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub liquidation_price: Decimal,
    pub side: Side,
    /// Minimum ROI the take-profit must clear, from
    /// `sizing::break_even_roi`, so a trade cannot be authorized whose
    /// target would not even cover its own round-trip fees.
    pub break_even_roi_pct: Decimal,
}

impl RiskAgent {
    pub fn new(breakers: Arc<RiskEngine>, limits: RiskAgentLimits) -> Self {
        Self { breakers, limits }
    }

    /// Run the full gate stack. Account-level breakers run first since they
    /// are cheapest and most likely to be the actual reason a trade is
    /// blocked during a bad day.
    pub fn evaluate(&self, proposal: &TradeProposal) -> RiskDecision {
        let (ok, reason) = self.breakers.can_trade();
        if !ok {
            return RiskDecision::Blocked {
                gate: "account_breaker",
                reason: reason.unwrap_or_else(|| "breaker tripped".to_string()),
            };
        }

        if proposal.open_position_count >= self.limits.max_open_positions {
            return RiskDecision::Blocked {
                gate: "max_open_positions",
                reason: format!(
                    "{} open positions at limit {}",
                    proposal.open_position_count, self.limits.max_open_positions
                ),
            };
        }

        if proposal.leverage < self.limits.leverage_min || proposal.leverage > self.limits.leverage_max {
            return RiskDecision::Blocked {
                gate: "leverage_band",
                reason: format!(
                    "leverage {} outside [{}, {}]",
                    proposal.leverage, self.limits.leverage_min, self.limits.leverage_max
                ),
            };
        }

        if proposal.notional_usd > self.limits.max_position_size_usd {
            return RiskDecision::Blocked {
                gate: "position_size",
                reason: format!(
                    "notional {} exceeds max {}",
                    proposal.notional_usd, self.limits.max_position_size_usd
                ),
            };
        }

        let projected_exposure = proposal.existing_exposure_usd + proposal.notional_usd;
        if projected_exposure > self.limits.max_total_exposure_usd {
            return RiskDecision::Blocked {
                gate: "total_exposure",
                reason: format!(
                    "projected exposure {} exceeds max {}",
                    projected_exposure, self.limits.max_total_exposure_usd
                ),
            };
        }

        if let Some(reason) = self.liquidation_buffer_violation(proposal) {
            return RiskDecision::Blocked {
                gate: "liquidation_buffer",
                reason,
            };
        }

        if let Some(reason) = self.break_even_violation(proposal) {
            return RiskDecision::Blocked {
                gate: "break_even",
                reason,
            };
        }

        RiskDecision::Allow
    }

    /// Gate 8: the take-profit ROI must clear the break-even ROI (fees +
    /// buffer) given the proposal's leverage, or the trade cannot profit
    /// even on a clean hit of its own target.
    fn break_even_violation(&self, proposal: &TradeProposal) -> Option<String> {
        if proposal.entry_price <= Decimal::ZERO || proposal.leverage == 0 {
            return Some("entry price or leverage non-positive".to_string());
        }
        let price_move_pct = match proposal.side {
            Side::Long => (proposal.take_profit_price - proposal.entry_price) / proposal.entry_price,
            Side::Short => (proposal.entry_price - proposal.take_profit_price) / proposal.entry_price,
        } * Decimal::ONE_HUNDRED;
        let tp_roi = price_move_pct * Decimal::from(proposal.leverage);
        if tp_roi < proposal.break_even_roi_pct {
            return Some(format!(
                "take-profit ROI {tp_roi} below break-even requirement {}",
                proposal.break_even_roi_pct
            ));
        }
        None
    }

    /// The stop loss must sit at least `liquidation_buffer_pct` of entry
    /// price away from the liquidation price, on the safe side. A stop that
    /// would fire after liquidation already would is worse than no stop.
    fn liquidation_buffer_violation(&self, proposal: &TradeProposal) -> Option<String> {
        if proposal.entry_price <= Decimal::ZERO {
            return Some("entry price non-positive".to_string());
        }
        let buffer_abs = proposal.entry_price * self.limits.liquidation_buffer_pct / Decimal::ONE_HUNDRED;
        let distance = match proposal.side {
            Side::Long => proposal.stop_loss_price - proposal.liquidation_price,
            Side::Short => proposal.liquidation_price - proposal.stop_loss_price,
        };
        if distance < buffer_abs {
            warn!(
                distance = %distance,
                required = %buffer_abs,
                "stop loss too close to liquidation price"
            );
            Some(format!(
                "stop loss within {} of liquidation (required buffer {})",
                distance, buffer_abs
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> RiskAgent {
        RiskAgent::new(
            Arc::new(RiskEngine::new(1000.0, 0.03, 5, 0.05, 50)),
            RiskAgentLimits {
                max_open_positions: 3,
                leverage_min: 1,
                leverage_max: 10,
                max_position_size_usd: Decimal::new(500, 0),
                max_total_exposure_usd: Decimal::new(1500, 0),
                liquidation_buffer_pct: Decimal::new(2, 0),
            },
        )
    }

    fn base_proposal() -> TradeProposal {
        TradeProposal {
            open_position_count: 0,
            notional_usd: Decimal::new(200, 0),
            leverage: 3,
            existing_exposure_usd: Decimal::ZERO,
            entry_price: Decimal::new(100, 0),
            stop_loss_price: Decimal::new(95, 0),
            take_profit_price: Decimal::new(110, 0),
            liquidation_price: Decimal::new(90, 0),
            side: Side::Long,
            break_even_roi_pct: Decimal::new(5, 1),
        }
    }

    #[test]
    fn allows_a_well_formed_proposal() {
        assert_eq!(agent().evaluate(&base_proposal()), RiskDecision::Allow);
    }

    #[test]
    fn blocks_on_max_open_positions() {
        let mut proposal = base_proposal();
        proposal.open_position_count = 3;
        let decision = agent().evaluate(&proposal);
        assert!(matches!(decision, RiskDecision::Blocked { gate: "max_open_positions", .. }));
    }

    #[test]
    fn blocks_on_leverage_band() {
        let mut proposal = base_proposal();
        proposal.leverage = 50;
        let decision = agent().evaluate(&proposal);
        assert!(matches!(decision, RiskDecision::Blocked { gate: "leverage_band", .. }));
    }

    #[test]
    fn blocks_on_position_size() {
        let mut proposal = base_proposal();
        proposal.notional_usd = Decimal::new(999, 0);
        let decision = agent().evaluate(&proposal);
        assert!(matches!(decision, RiskDecision::Blocked { gate: "position_size", .. }));
    }

    #[test]
    fn blocks_on_total_exposure() {
        let mut proposal = base_proposal();
        proposal.existing_exposure_usd = Decimal::new(1400, 0);
        let decision = agent().evaluate(&proposal);
        assert!(matches!(decision, RiskDecision::Blocked { gate: "total_exposure", .. }));
    }

    #[test]
    fn blocks_when_stop_too_close_to_liquidation() {
        let mut proposal = base_proposal();
        proposal.stop_loss_price = Decimal::new(91, 0); // within 2% of entry from liquidation
        let decision = agent().evaluate(&proposal);
        assert!(matches!(decision, RiskDecision::Blocked { gate: "liquidation_buffer", .. }));
    }

    #[test]
    fn blocks_when_take_profit_roi_below_break_even() {
        let mut proposal = base_proposal();
        proposal.take_profit_price = Decimal::new(1001, 1); // 100.1, ~0.3% ROI at 3x
        proposal.break_even_roi_pct = Decimal::new(5, 0); // require 5%
        let decision = agent().evaluate(&proposal);
        assert!(matches!(decision, RiskDecision::Blocked { gate: "break_even", .. }));
    }

    #[test]
    fn breaker_trip_blocks_before_per_trade_gates() {
        let a = agent();
        a.breakers.kill();
        let decision = a.evaluate(&base_proposal());
        assert!(matches!(decision, RiskDecision::Blocked { gate: "account_breaker", .. }));
    }
}
