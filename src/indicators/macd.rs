// =============================================================================
// MACD — Moving Average Convergence Divergence
// =============================================================================
//
//   MACD line   = EMA(fast) - EMA(slow)
//   Signal line = EMA(MACD line, signalPeriod)
//   Histogram   = MACD line - Signal line
//
// Default: 12/26/9.

use crate::indicators::ema::calculate_ema;
use crate::indicators::events::{Direction, SignalEvent, SignalEventKind};

#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    pub prev_histogram: f64,
}

pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return None;
    }

    let fast = calculate_ema(closes, fast_period);
    let slow = calculate_ema(closes, slow_period);
    if fast.is_empty() || slow.is_empty() {
        return None;
    }

    // Align the two series on their tails (slow EMA starts later).
    let offset = slow_period - fast_period;
    if fast.len() <= offset {
        return None;
    }
    let aligned_fast = &fast[offset..];
    let len = aligned_fast.len().min(slow.len());
    if len == 0 {
        return None;
    }

    let macd_line: Vec<f64> = aligned_fast[aligned_fast.len() - len..]
        .iter()
        .zip(&slow[slow.len() - len..])
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < signal_period {
        return None;
    }

    let signal_line = calculate_ema(&macd_line, signal_period);
    if signal_line.is_empty() {
        return None;
    }

    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;
    let histogram = macd - signal;

    let prev_histogram = if macd_line.len() >= 2 && signal_line.len() >= 2 {
        macd_line[macd_line.len() - 2] - signal_line[signal_line.len() - 2]
    } else {
        histogram
    };

    if !macd.is_finite() || !signal.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd,
        signal,
        histogram,
        prev_histogram,
    })
}

pub fn macd_events(result: &MacdResult) -> Vec<SignalEvent> {
    let mut events = Vec::new();

    // Zero-line cross of the histogram = signal-line cross of MACD.
    if result.prev_histogram <= 0.0 && result.histogram > 0.0 {
        events.push(SignalEvent::new(
            SignalEventKind::BullishCross { value: result.histogram },
            Direction::Bullish,
            (result.histogram.abs() / (result.macd.abs().max(1e-9))).clamp(0.0, 1.0),
        ));
    } else if result.prev_histogram >= 0.0 && result.histogram < 0.0 {
        events.push(SignalEvent::new(
            SignalEventKind::BearishCross { value: result.histogram },
            Direction::Bearish,
            (result.histogram.abs() / (result.macd.abs().max(1e-9))).clamp(0.0, 1.0),
        ));
    }

    let momentum_building = (result.histogram.abs() > result.prev_histogram.abs())
        && result.histogram.signum() == result.prev_histogram.signum();
    if momentum_building {
        let direction = if result.histogram > 0.0 { Direction::Bullish } else { Direction::Bearish };
        events.push(SignalEvent::new(
            SignalEventKind::MomentumBuildup { value: result.histogram },
            direction,
            0.4,
        ));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_insufficient_data() {
        let closes = vec![1.0; 10];
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
    }

    #[test]
    fn macd_fast_must_be_less_than_slow() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 26, 12, 9).is_none());
    }

    #[test]
    fn macd_uptrend_is_positive() {
        let closes: Vec<f64> = (1..=200).map(|x| x as f64).collect();
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd > 0.0, "rising prices should yield positive MACD");
    }

    #[test]
    fn macd_downtrend_is_negative() {
        let closes: Vec<f64> = (1..=200).rev().map(|x| x as f64).collect();
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd < 0.0, "falling prices should yield negative MACD");
    }

    #[test]
    fn macd_flat_is_near_zero() {
        let closes = vec![100.0; 200];
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd.abs() < 1e-6);
        assert!(result.histogram.abs() < 1e-6);
    }

    #[test]
    fn bullish_cross_event_on_histogram_sign_flip() {
        let result = MacdResult { macd: 1.0, signal: 0.5, histogram: 0.5, prev_histogram: -0.2 };
        let events = macd_events(&result);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::BullishCross { .. })));
    }

    #[test]
    fn bearish_cross_event_on_histogram_sign_flip() {
        let result = MacdResult { macd: -1.0, signal: -0.5, histogram: -0.5, prev_histogram: 0.2 };
        let events = macd_events(&result);
        assert!(events.iter().any(|e| matches!(e.kind, SignalEventKind::BearishCross { .. })));
    }
}
