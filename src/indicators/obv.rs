// =============================================================================
// On-Balance Volume (OBV)
// =============================================================================
//
//   OBV_t = OBV_{t-1} + volume_t   if close_t > close_{t-1}
//         = OBV_{t-1} - volume_t   if close_t < close_{t-1}
//         = OBV_{t-1}              if close_t == close_{t-1}
//
// OBV itself is a cumulative, unbounded running total — it's only meaningful
// relative to its own moving averages (WMA20 for trend, SMA20 as a baseline)
// or as a divergence check against price.

use crate::market_data::Candle;

pub fn calculate_obv_series(candles: &[Candle]) -> Vec<f64> {
    if candles.is_empty() {
        return Vec::new();
    }
    let mut obv = 0.0_f64;
    let mut out = Vec::with_capacity(candles.len());
    out.push(obv);
    for w in candles.windows(2) {
        if w[1].close > w[0].close {
            obv += w[1].volume;
        } else if w[1].close < w[0].close {
            obv -= w[1].volume;
        }
        out.push(obv);
    }
    out
}

/// Weighted moving average, weights linear 1..=period (most recent heaviest).
pub fn wma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let denom = (period * (period + 1) / 2) as f64;
    let weighted: f64 = window
        .iter()
        .enumerate()
        .map(|(i, v)| v * (i + 1) as f64)
        .sum();
    let result = weighted / denom;
    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let avg = values[values.len() - period..].iter().sum::<f64>() / period as f64;
    if avg.is_finite() {
        Some(avg)
    } else {
        None
    }
}

/// Returns `(obv, obv_wma20, obv_sma20)`. Divergence between OBV and its
/// WMA — OBV crossing above/below its own trend average — is the signal the
/// generator looks at, analogous to a MACD-style cross but on volume flow.
pub fn calculate_obv(candles: &[Candle]) -> Option<(f64, f64, f64)> {
    let series = calculate_obv_series(candles);
    if series.len() < 20 {
        return None;
    }
    let obv = *series.last()?;
    let obv_wma20 = wma(&series, 20)?;
    let obv_sma20 = sma(&series, 20)?;
    Some((obv, obv_wma20, obv_sma20))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high: close,
            low: close,
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
    fn obv_empty_input() {
        assert!(calculate_obv_series(&[]).is_empty());
    }

    #[test]
    fn obv_accumulates_on_rising_close() {
        let candles = vec![candle(10.0, 100.0), candle(11.0, 50.0), candle(12.0, 30.0)];
        let series = calculate_obv_series(&candles);
        assert_eq!(series, vec![0.0, 50.0, 80.0]);
    }

    #[test]
    fn obv_subtracts_on_falling_close() {
        let candles = vec![candle(10.0, 100.0), candle(9.0, 50.0)];
        let series = calculate_obv_series(&candles);
        assert_eq!(series, vec![0.0, -50.0]);
    }

    #[test]
    fn obv_unchanged_on_flat_close() {
        let candles = vec![candle(10.0, 100.0), candle(10.0, 50.0)];
        let series = calculate_obv_series(&candles);
        assert_eq!(series, vec![0.0, 0.0]);
    }

    #[test]
    fn wma_weights_recent_more_heavily() {
        let values = vec![1.0, 2.0, 3.0];
        let w = wma(&values, 3).unwrap();
        // (1*1 + 2*2 + 3*3) / 6 = 14/6
        assert!((w - 14.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn wma_insufficient_data() {
        assert!(wma(&[1.0, 2.0], 3).is_none());
    }

    #[test]
    fn calculate_obv_requires_20_candles() {
        let candles: Vec<Candle> = (0..15).map(|i| candle(100.0 + i as f64, 10.0)).collect();
        assert!(calculate_obv(&candles).is_none());
    }
}
