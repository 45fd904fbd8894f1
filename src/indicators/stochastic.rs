// =============================================================================
// Stochastic Oscillator (%K / %D)
// =============================================================================
//
//   %K = (close - lowestLow) / (highestHigh - lowestLow) * 100
//   %D = SMA(%K, dSmooth)
//
// Default: 14-period %K, 3-period smoothing, 3-period %D.

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

pub fn calculate_stochastic(
    candles: &[Candle],
    k_period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> Option<StochasticResult> {
    if k_period == 0 || k_smooth == 0 || d_smooth == 0 {
        return None;
    }
    if candles.len() < k_period + k_smooth + d_smooth {
        return None;
    }

    let mut raw_k = Vec::with_capacity(candles.len() - k_period + 1);
    for window in candles.windows(k_period) {
        let highest = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let close = window.last().unwrap().close;
        let span = highest - lowest;
        let k = if span.abs() < f64::EPSILON {
            50.0
        } else {
            (close - lowest) / span * 100.0
        };
        if !k.is_finite() {
            return None;
        }
        raw_k.push(k);
    }

    let smoothed_k = sma(&raw_k, k_smooth)?;
    let d_series = sma(&smoothed_k, d_smooth)?;

    Some(StochasticResult {
        k: *smoothed_k.last()?,
        d: *d_series.last()?,
    })
}

fn sma(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if values.len() < period {
        return None;
    }
    Some(
        values
            .windows(period)
            .map(|w| w.iter().sum::<f64>() / period as f64)
            .collect(),
    )
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
    fn stochastic_insufficient_data() {
        let candles = vec![candle(10.0, 5.0, 7.0); 10];
        assert!(calculate_stochastic(&candles, 14, 3, 3).is_none());
    }

    #[test]
    fn stochastic_range_bounds() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).sin() * 10.0;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let result = calculate_stochastic(&candles, 14, 3, 3).unwrap();
        assert!((0.0..=100.0).contains(&result.k));
        assert!((0.0..=100.0).contains(&result.d));
    }

    #[test]
    fn stochastic_flat_is_neutral() {
        let candles = vec![candle(100.0, 100.0, 100.0); 25];
        let result = calculate_stochastic(&candles, 14, 3, 3).unwrap();
        assert!((result.k - 50.0).abs() < 1e-9);
    }
}
