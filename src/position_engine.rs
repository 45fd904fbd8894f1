// =============================================================================
// Position Engine — per-instrument position lifecycle state machine
// =============================================================================
//
// State machine:
//
//           submit                fill                tick
//   Pending ─────────▶ Submitted ──────▶ Open ──────┐
//      │                 │ cancel              │ tick │
//      │                 ▼                     ▼      │
//      └──────────────▶ Failed            Adjusting ──┘
//                                             │ exit trigger
//                                             ▼
//                                          Closing ──▶ Closed
//
// On every price tick: recompute unrealized P&L/ROI, track high-water ROI,
// activate break-even once ROI clears the activation threshold (moving the
// stop to entry plus a fee-aware buffer, only if that is a favorable move),
// then activate staircase trailing once break-even is active and ROI clears
// the trailing threshold. Trailing commits a new stop only when it is
// strictly more favorable than the current one — the never-untrail
// invariant. Thread-safety: all mutable state is behind `parking_lot::RwLock`,
// matching the teacher's `open`/`closed` list split.
// =============================================================================

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::Side;

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Pending,
    Submitted,
    Open,
    Adjusting,
    Closing,
    Closed,
    Failed,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Submitted => "Submitted",
            Self::Open => "Open",
            Self::Adjusting => "Adjusting",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// Tunable lifecycle parameters. Values are read from the environment table
/// (`BREAK_EVEN_*`, `TRAILING_*`) via `Config`, not hard-coded here.
#[derive(Debug, Clone)]
pub struct PositionConfig {
    pub break_even_activation_roi: Decimal,
    pub break_even_buffer_pct: Decimal,
    pub fee_rate_pct: Decimal,
    pub trailing_activation_roi: Decimal,
    pub trailing_distance_pct: Decimal,
    pub trailing_step_pct: Decimal,
    pub reversal_score_threshold: f64,
}

/// A single tracked position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub margin: Decimal,
    pub notional: Decimal,
    #[serde(default)]
    pub current_price: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub roi_pct: Decimal,
    #[serde(default)]
    pub high_water_roi: Decimal,
    pub initial_stop: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    #[serde(default)]
    pub break_even_activated: bool,
    #[serde(default)]
    pub trailing_activated: bool,
    pub state: PositionState,
    pub opened_at: String,
    #[serde(default)]
    pub closed_at: Option<String>,
    #[serde(default)]
    pub close_reason: Option<String>,
    #[serde(default)]
    pub realized_pnl: Decimal,
    /// "signal archetype in the current regime" fingerprint the position
    /// was opened under — carried through to the safety layer's per-feature
    /// kill switch on close.
    #[serde(default)]
    pub feature_key: String,
}

impl Position {
    fn is_long(&self) -> bool {
        self.side == Side::Long
    }
}

/// Returned by `check_exits` for a position that should leave the book.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    pub position_id: String,
    pub reason: &'static str,
    pub exit_price: Decimal,
}

// ---------------------------------------------------------------------------
// Position Manager
// ---------------------------------------------------------------------------

pub struct PositionManager {
    open: RwLock<Vec<Position>>,
    closed: RwLock<Vec<Position>>,
    cfg: PositionConfig,
}

impl PositionManager {
    pub fn new(cfg: PositionConfig) -> Self {
        Self {
            open: RwLock::new(Vec::new()),
            closed: RwLock::new(Vec::new()),
            cfg,
        }
    }

    // -------------------------------------------------------------------------
    // Pending -> Submitted -> Open
    // -------------------------------------------------------------------------

    /// Register a position that has just been filled by the executor. The
    /// caller is responsible for the Pending/Submitted legs against the
    /// venue; by the time a position reaches the manager it is Open.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &self,
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        leverage: u32,
        margin: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        feature_key: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let notional = entry_price * quantity;

        let pos = Position {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            quantity,
            leverage,
            margin,
            notional,
            current_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            roi_pct: Decimal::ZERO,
            high_water_roi: Decimal::ZERO,
            initial_stop: stop_loss,
            stop_loss,
            take_profit,
            break_even_activated: false,
            trailing_activated: false,
            state: PositionState::Open,
            opened_at: now,
            closed_at: None,
            close_reason: None,
            realized_pnl: Decimal::ZERO,
            feature_key: feature_key.to_string(),
        };

        info!(
            id = %id, symbol, side = %side, entry_price = %entry_price,
            quantity = %quantity, leverage, stop_loss = %stop_loss, take_profit = %take_profit,
            "position opened"
        );

        self.open.write().push(pos);
        id
    }

    // -------------------------------------------------------------------------
    // Tick — recompute ROI, break-even, staircase trailing
    // -------------------------------------------------------------------------

    /// Feed a new price for every open position on `symbol`. Mutates ROI,
    /// high-water mark, break-even, and trailing state in place.
    pub fn update_price(&self, symbol: &str, current_price: Decimal) {
        let mut positions = self.open.write();
        for pos in positions.iter_mut().filter(|p| p.symbol == symbol) {
            pos.current_price = current_price;
            self.recompute_roi(pos);
            self.maybe_activate_break_even(pos);
            self.maybe_advance_trailing(pos);
        }
    }

    fn recompute_roi(&self, pos: &mut Position) {
        let sign = if pos.is_long() { Decimal::ONE } else { -Decimal::ONE };
        pos.unrealized_pnl = sign * (pos.current_price - pos.entry_price) * pos.quantity;
        pos.roi_pct = if pos.entry_price > Decimal::ZERO && pos.margin > Decimal::ZERO {
            sign * (pos.current_price - pos.entry_price) / pos.entry_price * Decimal::from(pos.leverage) * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        if pos.roi_pct > pos.high_water_roi {
            pos.high_water_roi = pos.roi_pct;
        }
    }

    /// Step 3 of the per-tick sequence: activate break-even once ROI clears
    /// the activation threshold, moving the stop to
    /// `entry * (1 ± (breakEvenBuffer + 2*fee_rate))`, only if favorable.
    fn maybe_activate_break_even(&self, pos: &mut Position) {
        if pos.break_even_activated || pos.roi_pct < self.cfg.break_even_activation_roi {
            return;
        }
        let offset_pct = self.cfg.break_even_buffer_pct + Decimal::TWO * self.cfg.fee_rate_pct;
        let sign = if pos.is_long() { Decimal::ONE } else { -Decimal::ONE };
        let candidate = pos.entry_price * (Decimal::ONE + sign * offset_pct / Decimal::ONE_HUNDRED);

        let favorable = if pos.is_long() {
            candidate > pos.stop_loss
        } else {
            candidate < pos.stop_loss
        };
        if favorable {
            info!(id = %pos.id, old_stop = %pos.stop_loss, new_stop = %candidate, "break-even activated");
            pos.stop_loss = candidate;
            pos.break_even_activated = true;
            pos.state = PositionState::Adjusting;
        }
    }

    /// Steps 4-5: once break-even is active and ROI clears the trailing
    /// threshold, compute a staircase-snapped trailing stop and commit it
    /// only if strictly more favorable than the current stop.
    fn maybe_advance_trailing(&self, pos: &mut Position) {
        if !pos.break_even_activated || pos.roi_pct < self.cfg.trailing_activation_roi {
            return;
        }
        pos.trailing_activated = true;

        let sign = if pos.is_long() { Decimal::ONE } else { -Decimal::ONE };
        let leverage = Decimal::from(pos.leverage.max(1));
        let distance_pct = self.cfg.trailing_distance_pct / leverage / Decimal::ONE_HUNDRED;
        let raw_stop = pos.current_price * (Decimal::ONE - sign * distance_pct);
        let snapped = self.snap_to_step(raw_stop, pos.entry_price);

        let more_favorable = if pos.is_long() {
            snapped > pos.stop_loss
        } else {
            snapped < pos.stop_loss
        };
        if more_favorable {
            debug!(id = %pos.id, old_stop = %pos.stop_loss, new_stop = %snapped, "trailing stop advanced");
            pos.stop_loss = snapped;
            pos.state = PositionState::Adjusting;
        }
    }

    /// Snap a raw stop price to the nearest multiple of `trailingStep`
    /// percent of entry price — the staircase grid.
    fn snap_to_step(&self, raw: Decimal, entry_price: Decimal) -> Decimal {
        if self.cfg.trailing_step_pct <= Decimal::ZERO || entry_price <= Decimal::ZERO {
            return raw;
        }
        let step = entry_price * self.cfg.trailing_step_pct / Decimal::ONE_HUNDRED;
        if step <= Decimal::ZERO {
            return raw;
        }
        (raw / step).round() * step
    }

    // -------------------------------------------------------------------------
    // Exit triggers
    // -------------------------------------------------------------------------

    /// Evaluate stop/take-profit triggers against the high/low of the latest
    /// bar (falls back to `current_price` for both when unavailable). Does
    /// not mutate state — callers move matched positions to `Closing` via
    /// `close_position` once the executor confirms the exit order filled.
    pub fn check_exits(&self, symbol: &str, high: Decimal, low: Decimal) -> Vec<ExitSignal> {
        let positions = self.open.read();
        let mut exits = Vec::new();
        for pos in positions.iter().filter(|p| p.symbol == symbol) {
            if pos.is_long() {
                if low <= pos.stop_loss {
                    exits.push(ExitSignal { position_id: pos.id.clone(), reason: "stop_loss", exit_price: pos.stop_loss });
                    continue;
                }
                if high >= pos.take_profit {
                    exits.push(ExitSignal { position_id: pos.id.clone(), reason: "take_profit", exit_price: pos.take_profit });
                    continue;
                }
            } else {
                if high >= pos.stop_loss {
                    exits.push(ExitSignal { position_id: pos.id.clone(), reason: "stop_loss", exit_price: pos.stop_loss });
                    continue;
                }
                if low <= pos.take_profit {
                    exits.push(ExitSignal { position_id: pos.id.clone(), reason: "take_profit", exit_price: pos.take_profit });
                    continue;
                }
            }
        }
        exits
    }

    /// A strong opposite-direction signal can force an exit ahead of stop/TP
    /// when its magnitude clears `reversal_score_threshold`.
    pub fn reversal_exit(&self, symbol: &str, opposite_side: Side, score_magnitude: f64) -> Vec<ExitSignal> {
        if score_magnitude < self.cfg.reversal_score_threshold {
            return Vec::new();
        }
        let positions = self.open.read();
        positions
            .iter()
            .filter(|p| p.symbol == symbol && p.side != opposite_side)
            .map(|p| ExitSignal { position_id: p.id.clone(), reason: "reversal", exit_price: p.current_price })
            .collect()
    }

    /// SafetyLayer emergency close — always honored regardless of stop/TP
    /// distance, at the current market price.
    pub fn emergency_exits(&self, symbol: &str) -> Vec<ExitSignal> {
        let positions = self.open.read();
        positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| ExitSignal { position_id: p.id.clone(), reason: "emergency", exit_price: p.current_price })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    pub fn close_position(&self, id: &str, reason: &str, close_price: Decimal) -> Option<(Decimal, String)> {
        let mut open = self.open.write();
        let idx = open.iter().position(|p| p.id == id)?;
        let mut pos = open.remove(idx);

        let sign = if pos.is_long() { Decimal::ONE } else { -Decimal::ONE };
        let final_pnl = sign * (close_price - pos.entry_price) * pos.quantity;
        pos.realized_pnl += final_pnl;
        pos.current_price = close_price;
        pos.unrealized_pnl = Decimal::ZERO;
        pos.state = PositionState::Closed;
        pos.closed_at = Some(Utc::now().to_rfc3339());
        pos.close_reason = Some(reason.to_string());

        let total_pnl = pos.realized_pnl;
        let feature_key = pos.feature_key.clone();
        info!(id, reason, close_price = %close_price, realized_pnl = %total_pnl, "position closed");

        if pos.stop_loss.is_sign_negative() {
            warn!(id, "closed position carried a negative stop price, check sizing inputs");
        }

        self.closed.write().push(pos);
        Some((total_pnl, feature_key))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn get_open_positions(&self) -> Vec<Position> {
        self.open.read().clone()
    }

    pub fn get_open_positions_for(&self, symbol: &str) -> Vec<Position> {
        self.open.read().iter().filter(|p| p.symbol == symbol).cloned().collect()
    }

    pub fn get_closed_positions(&self, count: usize) -> Vec<Position> {
        let closed = self.closed.read();
        closed.iter().rev().take(count).cloned().collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.read().len()
    }

    pub fn total_exposure(&self) -> Decimal {
        self.open.read().iter().map(|p| p.notional).sum()
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager")
            .field("open_positions", &self.open.read().len())
            .field("closed_positions", &self.closed.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PositionConfig {
        PositionConfig {
            break_even_activation_roi: Decimal::new(20, 0),
            break_even_buffer_pct: Decimal::new(5, 1),
            fee_rate_pct: Decimal::new(4, 2),
            trailing_activation_roi: Decimal::new(30, 0),
            trailing_distance_pct: Decimal::new(10, 1),
            trailing_step_pct: Decimal::new(2, 1),
            reversal_score_threshold: 0.9,
        }
    }

    fn open_long(mgr: &PositionManager) -> String {
        mgr.open_position(
            "BTCUSDT",
            Side::Long,
            Decimal::new(100, 0),
            Decimal::new(1, 0),
            5,
            Decimal::new(20, 0),
            Decimal::new(90, 0),
            Decimal::new(130, 0),
            "bullish_cross@trending",
        )
    }

    #[test]
    fn roi_tracks_price_move_with_leverage() {
        let mgr = PositionManager::new(cfg());
        open_long(&mgr);
        mgr.update_price("BTCUSDT", Decimal::new(104, 0));
        let pos = &mgr.get_open_positions()[0];
        // (104-100)/100 * 5 * 100 = 20%
        assert_eq!(pos.roi_pct, Decimal::new(20, 0));
    }

    #[test]
    fn break_even_moves_stop_above_initial_once_roi_clears_activation() {
        let mgr = PositionManager::new(cfg());
        open_long(&mgr);
        mgr.update_price("BTCUSDT", Decimal::new(104, 0)); // ROI = 20%, activation threshold
        let pos = &mgr.get_open_positions()[0];
        assert!(pos.break_even_activated);
        assert!(pos.stop_loss > Decimal::new(90, 0));
    }

    #[test]
    fn trailing_never_untrails_through_a_pullback() {
        let mgr = PositionManager::new(cfg());
        open_long(&mgr);

        mgr.update_price("BTCUSDT", Decimal::new(108, 0)); // ROI=40%, trailing active
        let stop_after_rise = mgr.get_open_positions()[0].stop_loss;

        mgr.update_price("BTCUSDT", Decimal::new(104, 0)); // pullback
        let stop_after_pullback = mgr.get_open_positions()[0].stop_loss;
        assert!(stop_after_pullback >= stop_after_rise);

        mgr.update_price("BTCUSDT", Decimal::new(115, 0)); // new high
        let stop_after_new_high = mgr.get_open_positions()[0].stop_loss;
        assert!(stop_after_new_high >= stop_after_pullback);
    }

    #[test]
    fn check_exits_triggers_stop_loss_on_low() {
        let mgr = PositionManager::new(cfg());
        open_long(&mgr);
        let exits = mgr.check_exits("BTCUSDT", Decimal::new(101, 0), Decimal::new(89, 0));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, "stop_loss");
    }

    #[test]
    fn check_exits_triggers_take_profit_on_high() {
        let mgr = PositionManager::new(cfg());
        open_long(&mgr);
        let exits = mgr.check_exits("BTCUSDT", Decimal::new(131, 0), Decimal::new(99, 0));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, "take_profit");
    }

    #[test]
    fn emergency_exits_always_fire_regardless_of_distance() {
        let mgr = PositionManager::new(cfg());
        open_long(&mgr);
        let exits = mgr.emergency_exits("BTCUSDT");
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, "emergency");
    }

    #[test]
    fn close_position_records_realized_pnl_and_moves_to_closed_list() {
        let mgr = PositionManager::new(cfg());
        let id = open_long(&mgr);
        let (pnl, feature_key) = mgr.close_position(&id, "stop_loss", Decimal::new(90, 0)).unwrap();
        assert!(pnl < Decimal::ZERO);
        assert_eq!(feature_key, "bullish_cross@trending");
        assert_eq!(mgr.open_count(), 0);
        assert_eq!(mgr.get_closed_positions(1).len(), 1);
    }

    #[test]
    fn short_side_break_even_moves_stop_below_initial() {
        let mgr = PositionManager::new(cfg());
        mgr.open_position(
            "ETHUSDT",
            Side::Short,
            Decimal::new(100, 0),
            Decimal::new(1, 0),
            5,
            Decimal::new(20, 0),
            Decimal::new(110, 0),
            Decimal::new(70, 0),
            "bearish_cross@trending",
        );
        mgr.update_price("ETHUSDT", Decimal::new(96, 0)); // ROI = (100-96)/100*5*100=20%
        let pos = &mgr.get_open_positions()[0];
        assert!(pos.break_even_activated);
        assert!(pos.stop_loss < Decimal::new(110, 0));
    }
}
