// =============================================================================
// KDJ — Stochastic-derived oscillator with a third "J" line
// =============================================================================
//
//   RSV = (close - lowestLow) / (highestHigh - lowestLow) * 100
//   K_t = (2/3) * K_{t-1} + (1/3) * RSV    (seeded at 50.0)
//   D_t = (2/3) * D_{t-1} + (1/3) * K_t    (seeded at 50.0)
//   J   = 3*K - 2*D
//
// J can swing outside [0, 100] — that overshoot is itself a momentum signal:
// J > 100 flags an overbought extreme, J < 0 an oversold extreme.

use crate::indicators::events::{Direction, SignalEvent, SignalEventKind};
use crate::market_data::Candle;

#[derive(Debug, Clone, Copy)]
pub struct KdjResult {
    pub k: f64,
    pub d: f64,
    pub j: f64,
}

pub fn calculate_kdj(candles: &[Candle], rsv_period: usize) -> Option<KdjResult> {
    if rsv_period == 0 || candles.len() < rsv_period {
        return None;
    }

    let mut k = 50.0_f64;
    let mut d = 50.0_f64;

    for window in candles.windows(rsv_period) {
        let highest = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let close = window.last().unwrap().close;
        let span = highest - lowest;
        let rsv = if span.abs() < f64::EPSILON {
            50.0
        } else {
            (close - lowest) / span * 100.0
        };
        k = (2.0 / 3.0) * k + (1.0 / 3.0) * rsv;
        d = (2.0 / 3.0) * d + (1.0 / 3.0) * k;
        if !k.is_finite() || !d.is_finite() {
            return None;
        }
    }

    let j = 3.0 * k - 2.0 * d;
    if !j.is_finite() {
        return None;
    }

    Some(KdjResult { k, d, j })
}

pub fn kdj_events(result: &KdjResult) -> Vec<SignalEvent> {
    let mut events = Vec::new();
    if result.j > 100.0 {
        events.push(SignalEvent::new(
            SignalEventKind::Overbought { value: result.j },
            Direction::Bearish,
            ((result.j - 100.0) / 50.0).clamp(0.0, 1.0),
        ));
    } else if result.j < 0.0 {
        events.push(SignalEvent::new(
            SignalEventKind::Oversold { value: result.j },
            Direction::Bullish,
            ((-result.j) / 50.0).clamp(0.0, 1.0),
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
    fn kdj_insufficient_data() {
        let candles = vec![candle(10.0, 5.0, 7.0); 5];
        assert!(calculate_kdj(&candles, 9).is_none());
    }

    #[test]
    fn kdj_flat_converges_near_50() {
        let candles = vec![candle(100.0, 100.0, 100.0); 30];
        let result = calculate_kdj(&candles, 9).unwrap();
        assert!((result.k - 50.0).abs() < 1e-6);
        assert!((result.d - 50.0).abs() < 1e-6);
        assert!((result.j - 50.0).abs() < 1e-6);
    }

    #[test]
    fn kdj_strong_uptrend_pushes_j_high() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base + 1.0, base - 1.0, base + 0.9)
            })
            .collect();
        let result = calculate_kdj(&candles, 9).unwrap();
        assert!(result.j > result.k, "J should overshoot K in a strong trend");
    }

    #[test]
    fn overbought_extreme_event() {
        let events = kdj_events(&KdjResult { k: 90.0, d: 80.0, j: 110.0 });
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::Overbought { .. })));
    }

    #[test]
    fn oversold_extreme_event() {
        let events = kdj_events(&KdjResult { k: 10.0, d: 20.0, j: -10.0 });
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::Oversold { .. })));
    }
}
