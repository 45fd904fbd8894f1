// =============================================================================
// Risk math — sizing, stops, targets, liquidation, break-even
// =============================================================================
//
// Pure functions operating on `Decimal` so price/size/ROI math never picks up
// the rounding error f64 would introduce across a long-running position.
// Every function takes exactly the inputs it needs and returns `None` on a
// degenerate input (zero price, zero leverage) rather than dividing by zero.

use rust_decimal::Decimal;

use crate::types::Side;

/// Position notional size from account balance, a risk-budget percentage,
/// and leverage: `size = balance * budget_pct / 100 * leverage / entry_price`.
pub fn position_size(
    balance: Decimal,
    budget_pct: Decimal,
    leverage: u32,
    entry_price: Decimal,
) -> Option<Decimal> {
    if entry_price <= Decimal::ZERO || leverage == 0 {
        return None;
    }
    let margin = balance * budget_pct / Decimal::ONE_HUNDRED;
    Some(margin * Decimal::from(leverage) / entry_price)
}

/// Stop-loss price from entry price, ROI threshold (e.g. -15% == -0.15 as a
/// percent, i.e. `Decimal::new(-15,0)`), leverage, and side. ROI on margin
/// translates to a price move of `roi_pct / leverage`.
pub fn stop_loss_price(entry_price: Decimal, stop_loss_roi: Decimal, leverage: u32, side: Side) -> Option<Decimal> {
    if entry_price <= Decimal::ZERO || leverage == 0 {
        return None;
    }
    let price_move_pct = stop_loss_roi / Decimal::from(leverage);
    let factor = Decimal::ONE + price_move_pct / Decimal::ONE_HUNDRED * Decimal::from(side.sign() as i64);
    Some(entry_price * factor)
}

/// Take-profit price, symmetric to `stop_loss_price` but with a positive ROI.
pub fn take_profit_price(entry_price: Decimal, take_profit_roi: Decimal, leverage: u32, side: Side) -> Option<Decimal> {
    if entry_price <= Decimal::ZERO || leverage == 0 {
        return None;
    }
    let price_move_pct = take_profit_roi / Decimal::from(leverage);
    let factor = Decimal::ONE + price_move_pct / Decimal::ONE_HUNDRED * Decimal::from(side.sign() as i64);
    Some(entry_price * factor)
}

/// Approximate liquidation price for an isolated-margin position ignoring
/// funding and fees: `entry * (1 -/+ 1/leverage)` — long liquidates below
/// entry, short liquidates above.
pub fn liquidation_price(entry_price: Decimal, leverage: u32, side: Side) -> Option<Decimal> {
    if entry_price <= Decimal::ZERO || leverage == 0 {
        return None;
    }
    let maintenance = Decimal::ONE / Decimal::from(leverage);
    let factor = Decimal::ONE - maintenance * Decimal::from(side.sign() as i64);
    Some(entry_price * factor)
}

/// Minimum ROI at which break-even activation should trigger: the activation
/// threshold plus enough buffer to clear round-trip fees twice over.
pub fn break_even_roi(activation_roi: Decimal, buffer_pct: Decimal, fee_rate_pct: Decimal) -> Decimal {
    activation_roi + buffer_pct + Decimal::TWO * fee_rate_pct
}

/// Suggested leverage from an ATR% read: higher volatility gets a lower
/// leverage so a fixed ROI stop maps to a fixed, affordable adverse-price
/// move. Clamped to `[min, max]`.
pub fn leverage_from_atr(atr_pct: f64, min: u32, max: u32, default: u32) -> u32 {
    if atr_pct <= 0.0 || !atr_pct.is_finite() {
        return default;
    }
    // Target roughly a 1.0% adverse move to consume the whole stop budget.
    let suggested = (1.0 / atr_pct).round() as i64;
    suggested.clamp(min as i64, max as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_size_scales_with_leverage() {
        let size_1x = position_size(Decimal::new(1000, 0), Decimal::new(2, 0), 1, Decimal::new(100, 0)).unwrap();
        let size_5x = position_size(Decimal::new(1000, 0), Decimal::new(2, 0), 5, Decimal::new(100, 0)).unwrap();
        assert_eq!(size_5x, size_1x * Decimal::new(5, 0));
    }

    #[test]
    fn position_size_zero_price_is_none() {
        assert!(position_size(Decimal::new(1000, 0), Decimal::new(2, 0), 1, Decimal::ZERO).is_none());
    }

    #[test]
    fn stop_loss_below_entry_for_long() {
        let sl = stop_loss_price(Decimal::new(100, 0), Decimal::new(-15, 1), 3, Side::Long).unwrap();
        assert!(sl < Decimal::new(100, 0));
    }

    #[test]
    fn stop_loss_above_entry_for_short() {
        let sl = stop_loss_price(Decimal::new(100, 0), Decimal::new(-15, 1), 3, Side::Short).unwrap();
        assert!(sl > Decimal::new(100, 0));
    }

    #[test]
    fn liquidation_price_long_below_entry() {
        let liq = liquidation_price(Decimal::new(100, 0), 10, Side::Long).unwrap();
        assert!(liq < Decimal::new(100, 0));
        assert_eq!(liq, Decimal::new(90, 0));
    }

    #[test]
    fn liquidation_price_short_above_entry() {
        let liq = liquidation_price(Decimal::new(100, 0), 10, Side::Short).unwrap();
        assert_eq!(liq, Decimal::new(110, 0));
    }

    #[test]
    fn leverage_from_atr_clamped_to_bounds() {
        assert_eq!(leverage_from_atr(0.01, 1, 10, 3), 10);
        assert_eq!(leverage_from_atr(10.0, 1, 10, 3), 1);
        assert_eq!(leverage_from_atr(0.0, 1, 10, 3), 3);
    }

    #[test]
    fn break_even_roi_includes_double_fee_buffer() {
        let roi = break_even_roi(Decimal::new(10, 1), Decimal::new(5, 2), Decimal::new(4, 2));
        assert_eq!(roi, Decimal::new(10, 1) + Decimal::new(5, 2) + Decimal::new(8, 2));
    }
}
