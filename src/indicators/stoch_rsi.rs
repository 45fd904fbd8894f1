// =============================================================================
// Stochastic RSI (StochRSI)
// =============================================================================
//
// StochRSI applies the Stochastic Oscillator formula to RSI values instead of
// price, producing a more sensitive oscillator than raw RSI:
//
//   StochRSI = (RSI - min(RSI, rsiPeriod)) / (max(RSI, rsiPeriod) - min(RSI, rsiPeriod))
//   %K = SMA(StochRSI, kSmooth) * 100
//   %D = SMA(%K, dSmooth)
//
// Default parameters: rsiPeriod=21, stochPeriod=9, kSmooth=3, dSmooth=3.
// =============================================================================

use crate::indicators::events::{Direction, SignalEvent, SignalEventKind};
use crate::indicators::rsi::calculate_rsi;

#[derive(Debug, Clone, Copy)]
pub struct StochRsiResult {
    pub k: f64,
    pub d: f64,
}

/// Compute the most recent StochRSI %K/%D pair.
///
/// Returns `None` when there isn't enough data to fill the RSI, stochastic,
/// and both smoothing windows.
pub fn calculate_stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> Option<StochRsiResult> {
    if rsi_period == 0 || stoch_period == 0 || k_smooth == 0 || d_smooth == 0 {
        return None;
    }

    let rsi_series = calculate_rsi(closes, rsi_period);
    if rsi_series.len() < stoch_period + k_smooth + d_smooth {
        return None;
    }

    // Raw StochRSI over a rolling window of `stoch_period` RSI values.
    let mut raw = Vec::with_capacity(rsi_series.len() - stoch_period + 1);
    for window in rsi_series.windows(stoch_period) {
        let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = hi - lo;
        let cur = *window.last().unwrap();
        let value = if span.abs() < f64::EPSILON {
            50.0
        } else {
            (cur - lo) / span * 100.0
        };
        if !value.is_finite() {
            return None;
        }
        raw.push(value);
    }

    if raw.len() < k_smooth + d_smooth {
        return None;
    }

    let k_series = sma_series(&raw, k_smooth)?;
    let d_series = sma_series(&k_series, d_smooth)?;

    Some(StochRsiResult {
        k: *k_series.last()?,
        d: *d_series.last()?,
    })
}

fn sma_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if values.len() < period {
        return None;
    }
    let mut out = Vec::with_capacity(values.len() - period + 1);
    for window in values.windows(period) {
        let avg = window.iter().sum::<f64>() / period as f64;
        if !avg.is_finite() {
            return None;
        }
        out.push(avg);
    }
    Some(out)
}

/// Emit signal events for a StochRSI reading: overbought/oversold thresholds
/// at 80/20, and a %K/%D cross when the two lines are within a tight band.
pub fn stoch_rsi_events(result: &StochRsiResult) -> Vec<SignalEvent> {
    let mut events = Vec::new();

    if result.k >= 80.0 {
        events.push(SignalEvent::new(
            SignalEventKind::Overbought { value: result.k },
            Direction::Bearish,
            ((result.k - 80.0) / 20.0).clamp(0.0, 1.0),
        ));
    } else if result.k <= 20.0 {
        events.push(SignalEvent::new(
            SignalEventKind::Oversold { value: result.k },
            Direction::Bullish,
            ((20.0 - result.k) / 20.0).clamp(0.0, 1.0),
        ));
    }

    let spread = result.k - result.d;
    if spread.abs() > 1.0 {
        let direction = if spread > 0.0 { Direction::Bullish } else { Direction::Bearish };
        let kind = if spread > 0.0 {
            SignalEventKind::BullishCross { value: result.k }
        } else {
            SignalEventKind::BearishCross { value: result.k }
        };
        events.push(SignalEvent::new(kind, direction, (spread.abs() / 50.0).clamp(0.0, 1.0)));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stoch_rsi_insufficient_data() {
        let closes = vec![1.0; 10];
        assert!(calculate_stoch_rsi(&closes, 21, 9, 3, 3).is_none());
    }

    #[test]
    fn stoch_rsi_period_zero() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert!(calculate_stoch_rsi(&closes, 0, 9, 3, 3).is_none());
    }

    #[test]
    fn stoch_rsi_uptrend_high() {
        let closes: Vec<f64> = (1..=150).map(|x| x as f64).collect();
        let result = calculate_stoch_rsi(&closes, 21, 9, 3, 3).unwrap();
        assert!((0.0..=100.0).contains(&result.k));
        assert!((0.0..=100.0).contains(&result.d));
    }

    #[test]
    fn stoch_rsi_flat_market_midrange() {
        let closes = vec![100.0; 150];
        let result = calculate_stoch_rsi(&closes, 21, 9, 3, 3).unwrap();
        // No movement at all => RSI pinned at 50 => StochRSI span is zero => 50.
        assert!((result.k - 50.0).abs() < 1e-6);
    }

    #[test]
    fn overbought_event_emitted() {
        let events = stoch_rsi_events(&StochRsiResult { k: 95.0, d: 40.0 });
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::Overbought { .. })));
    }

    #[test]
    fn oversold_event_emitted() {
        let events = stoch_rsi_events(&StochRsiResult { k: 5.0, d: 50.0 });
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::Oversold { .. })));
    }
}
