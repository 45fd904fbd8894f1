// =============================================================================
// Williams %R
// =============================================================================
//
// Williams %R measures where the current close sits relative to the high/low
// range of the last `period` bars, inverted onto a [-100, 0] scale:
//
//   %R = (highestHigh - close) / (highestHigh - lowestLow) * -100
//
// -80 or below => oversold. -20 or above => overbought.

use crate::indicators::events::{Direction, SignalEvent, SignalEventKind};
use crate::market_data::Candle;

pub fn calculate_williams_r(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let highest = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let close = window.last()?.close;

    let span = highest - lowest;
    let value = if span.abs() < f64::EPSILON {
        -50.0
    } else {
        (highest - close) / span * -100.0
    };

    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

pub fn williams_r_events(value: f64) -> Vec<SignalEvent> {
    let mut events = Vec::new();
    if value >= -20.0 {
        events.push(SignalEvent::new(
            SignalEventKind::Overbought { value },
            Direction::Bearish,
            ((value + 20.0) / 20.0).clamp(0.0, 1.0),
        ));
    } else if value <= -80.0 {
        events.push(SignalEvent::new(
            SignalEventKind::Oversold { value },
            Direction::Bullish,
            ((-80.0 - value) / 20.0).clamp(0.0, 1.0),
        ));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            quote_volume: 1.0,
            trades_count: 1,
            taker_buy_volume: 0.5,
            taker_buy_quote_volume: 0.5,
            is_closed: true,
        }
    }

    #[test]
    fn williams_r_period_zero() {
        let candles = vec![candle(10.0, 5.0, 7.0); 20];
        assert!(calculate_williams_r(&candles, 0).is_none());
    }

    #[test]
    fn williams_r_insufficient_data() {
        let candles = vec![candle(10.0, 5.0, 7.0); 5];
        assert!(calculate_williams_r(&candles, 14).is_none());
    }

    #[test]
    fn williams_r_at_high_is_zero() {
        let mut candles = vec![candle(100.0, 90.0, 95.0); 13];
        candles.push(candle(100.0, 90.0, 100.0));
        let r = calculate_williams_r(&candles, 14).unwrap();
        assert!((r - 0.0).abs() < 1e-9);
    }

    #[test]
    fn williams_r_at_low_is_minus_100() {
        let mut candles = vec![candle(100.0, 90.0, 95.0); 13];
        candles.push(candle(100.0, 90.0, 90.0));
        let r = calculate_williams_r(&candles, 14).unwrap();
        assert!((r + 100.0).abs() < 1e-9);
    }

    #[test]
    fn williams_r_flat_range_neutral() {
        let candles = vec![candle(100.0, 100.0, 100.0); 14];
        let r = calculate_williams_r(&candles, 14).unwrap();
        assert!((r + 50.0).abs() < 1e-9);
    }

    #[test]
    fn williams_r_range_bounds() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + (i as f64).sin() * 5.0;
                candle(base + 2.0, base - 2.0, base)
            })
            .collect();
        let r = calculate_williams_r(&candles, 14).unwrap();
        assert!((-100.0..=0.0).contains(&r));
    }

    #[test]
    fn overbought_event() {
        let events = williams_r_events(-10.0);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::Overbought { .. })));
    }

    #[test]
    fn oversold_event() {
        let events = williams_r_events(-90.0);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::Oversold { .. })));
    }

    #[test]
    fn neutral_no_event() {
        let events = williams_r_events(-50.0);
        assert!(events.is_empty());
    }
}
