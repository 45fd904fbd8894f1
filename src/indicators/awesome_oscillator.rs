// =============================================================================
// Awesome Oscillator (AO)
// =============================================================================
//
//   median_price = (high + low) / 2
//   AO = SMA(median_price, 5) - SMA(median_price, 34)
//
// Zero-line crosses and "twin peaks" (not implemented here — left to the
// signal generator's momentum-buildup composite) are the classic AO signals.

use crate::indicators::events::{Direction, SignalEvent, SignalEventKind};
use crate::market_data::Candle;

pub fn calculate_ao(candles: &[Candle], fast_period: usize, slow_period: usize) -> Option<f64> {
    if fast_period == 0 || slow_period == 0 || fast_period >= slow_period {
        return None;
    }
    if candles.len() < slow_period {
        return None;
    }

    let median: Vec<f64> = candles.iter().map(|c| (c.high + c.low) / 2.0).collect();
    let fast_sma = median[median.len() - fast_period..].iter().sum::<f64>() / fast_period as f64;
    let slow_sma = median[median.len() - slow_period..].iter().sum::<f64>() / slow_period as f64;

    let ao = fast_sma - slow_sma;
    if ao.is_finite() {
        Some(ao)
    } else {
        None
    }
}

/// AO series (needed to detect the zero-line cross, since that requires the
/// previous value as well as the current one).
pub fn calculate_ao_series(candles: &[Candle], fast_period: usize, slow_period: usize) -> Vec<f64> {
    if fast_period == 0 || slow_period == 0 || fast_period >= slow_period || candles.len() < slow_period {
        return Vec::new();
    }
    let median: Vec<f64> = candles.iter().map(|c| (c.high + c.low) / 2.0).collect();
    let mut out = Vec::with_capacity(median.len() - slow_period + 1);
    for end in slow_period..=median.len() {
        let fast_sma = median[end - fast_period..end].iter().sum::<f64>() / fast_period as f64;
        let slow_sma = median[end - slow_period..end].iter().sum::<f64>() / slow_period as f64;
        out.push(fast_sma - slow_sma);
    }
    out
}

pub fn ao_events(series: &[f64]) -> Vec<SignalEvent> {
    let mut events = Vec::new();
    if series.len() < 2 {
        return events;
    }
    let prev = series[series.len() - 2];
    let cur = *series.last().unwrap();

    if prev <= 0.0 && cur > 0.0 {
        events.push(SignalEvent::new(
            SignalEventKind::BullishCross { value: cur },
            Direction::Bullish,
            0.5,
        ));
    } else if prev >= 0.0 && cur < 0.0 {
        events.push(SignalEvent::new(
            SignalEventKind::BearishCross { value: cur },
            Direction::Bearish,
            0.5,
        ));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1.0,
            quote_volume: 1.0,
            trades_count: 1,
            taker_buy_volume: 0.5,
            taker_buy_quote_volume: 0.5,
            is_closed: true,
        }
    }

    #[test]
    fn ao_insufficient_data() {
        let candles = vec![candle(10.0, 9.0); 10];
        assert!(calculate_ao(&candles, 5, 34).is_none());
    }

    #[test]
    fn ao_fast_must_be_less_than_slow() {
        let candles = vec![candle(10.0, 9.0); 40];
        assert!(calculate_ao(&candles, 34, 5).is_none());
    }

    #[test]
    fn ao_flat_market_is_zero() {
        let candles = vec![candle(10.0, 9.0); 40];
        let ao = calculate_ao(&candles, 5, 34).unwrap();
        assert!(ao.abs() < 1e-9);
    }

    #[test]
    fn ao_rising_midpoints_positive() {
        let candles: Vec<Candle> = (0..40).map(|i| {
            let base = 100.0 + i as f64;
            candle(base + 1.0, base - 1.0)
        }).collect();
        let ao = calculate_ao(&candles, 5, 34).unwrap();
        assert!(ao > 0.0);
    }

    #[test]
    fn bullish_cross_detected() {
        let series = vec![-1.0, -0.5, 0.5];
        let events = ao_events(&series);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::BullishCross { .. })));
    }
}
