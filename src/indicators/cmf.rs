// =============================================================================
// Chaikin Money Flow (CMF)
// =============================================================================
//
//   moneyFlowMultiplier = ((close - low) - (high - close)) / (high - low)
//   moneyFlowVolume     = moneyFlowMultiplier * volume
//   CMF = sum(moneyFlowVolume, period) / sum(volume, period)
//
// CMF > 0.1  => accumulation pressure.
// CMF < -0.1 => distribution pressure.

use crate::indicators::events::{Direction, SignalEvent, SignalEventKind};
use crate::market_data::Candle;

pub fn calculate_cmf(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let mut mfv_sum = 0.0_f64;
    let mut vol_sum = 0.0_f64;

    for c in window {
        let range = c.high - c.low;
        let mf_mult = if range.abs() < f64::EPSILON {
            0.0
        } else {
            ((c.close - c.low) - (c.high - c.close)) / range
        };
        mfv_sum += mf_mult * c.volume;
        vol_sum += c.volume;
    }

    if vol_sum.abs() < f64::EPSILON {
        return None;
    }

    let cmf = mfv_sum / vol_sum;
    if cmf.is_finite() {
        Some(cmf)
    } else {
        None
    }
}

pub fn cmf_events(value: f64) -> Vec<SignalEvent> {
    let mut events = Vec::new();
    if value > 0.1 {
        events.push(SignalEvent::new(
            SignalEventKind::AccumulationPressure { value },
            Direction::Bullish,
            ((value - 0.1) / 0.4).clamp(0.0, 1.0),
        ));
    } else if value < -0.1 {
        events.push(SignalEvent::new(
            SignalEventKind::DistributionPressure { value },
            Direction::Bearish,
            ((-value - 0.1) / 0.4).clamp(0.0, 1.0),
        ));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: 1,
            taker_buy_volume: volume / 2.0,
            taker_buy_quote_volume: volume * close / 2.0,
            is_closed: true,
        }
    }

    #[test]
    fn cmf_insufficient_data() {
        let candles = vec![candle(10.0, 9.0, 9.5, 100.0); 5];
        assert!(calculate_cmf(&candles, 20).is_none());
    }

    #[test]
    fn cmf_zero_volume_is_none() {
        let candles = vec![candle(10.0, 9.0, 9.5, 0.0); 20];
        assert!(calculate_cmf(&candles, 20).is_none());
    }

    #[test]
    fn cmf_closes_near_high_is_positive() {
        let candles = vec![candle(10.0, 9.0, 9.95, 100.0); 20];
        let cmf = calculate_cmf(&candles, 20).unwrap();
        assert!(cmf > 0.0);
    }

    #[test]
    fn cmf_closes_near_low_is_negative() {
        let candles = vec![candle(10.0, 9.0, 9.05, 100.0); 20];
        let cmf = calculate_cmf(&candles, 20).unwrap();
        assert!(cmf < 0.0);
    }

    #[test]
    fn cmf_flat_range_contributes_zero() {
        let candles = vec![candle(10.0, 10.0, 10.0, 100.0); 20];
        let cmf = calculate_cmf(&candles, 20).unwrap();
        assert!(cmf.abs() < 1e-9);
    }

    #[test]
    fn accumulation_event_emitted() {
        let events = cmf_events(0.3);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::AccumulationPressure { .. })));
    }

    #[test]
    fn distribution_event_emitted() {
        let events = cmf_events(-0.3);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::DistributionPressure { .. })));
    }
}
