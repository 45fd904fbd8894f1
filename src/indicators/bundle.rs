// =============================================================================
// IndicatorBundle — the complete per-evaluation indicator snapshot
// =============================================================================
//
// `compute_bundle` is the IndicatorEngine's single entry point: pure, takes a
// slice of closed candles, and returns every indicator family the signal
// generator needs plus the SignalEvents each one emitted. A short candle tail
// never aborts the whole bundle — each indicator degrades to `None`/neutral
// independently, matching the per-function `Option` convention every
// indicator module already uses.

use serde::Serialize;

use crate::indicators::adx::calculate_adx;
use crate::indicators::atr::{calculate_atr, calculate_atr_pct};
use crate::indicators::awesome_oscillator::{ao_events, calculate_ao_series};
use crate::indicators::bollinger::{bollinger_events, calculate_bollinger, BollingerResult};
use crate::indicators::cmf::{calculate_cmf, cmf_events};
use crate::indicators::ema::{calculate_ema, ema_trend_events};
use crate::indicators::events::SignalEvent;
use crate::indicators::kdj::{calculate_kdj, kdj_events, KdjResult};
use crate::indicators::macd::{calculate_macd, macd_events, MacdResult};
use crate::indicators::obv::calculate_obv;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::stoch_rsi::{calculate_stoch_rsi, stoch_rsi_events, StochRsiResult};
use crate::indicators::stochastic::{calculate_stochastic, StochasticResult};
use crate::indicators::williams_r::{calculate_williams_r, williams_r_events};
use crate::market_data::Candle;

/// Tunable periods for every indicator in the bundle. Defaults match the
/// values named throughout the indicator modules (RSI14, StochRSI 21/9/3/3,
/// Williams %R14, Stochastic 14/3/3, KDJ9, MACD 12/26/9, Bollinger 20/2,
/// EMA 9/21/50/200, AO 5/34, OBV+WMA/SMA20, CMF20, ADX14, ATR14).
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub stoch_rsi_period: usize,
    pub stoch_rsi_stoch_period: usize,
    pub stoch_rsi_k_smooth: usize,
    pub stoch_rsi_d_smooth: usize,
    pub williams_r_period: usize,
    pub stochastic_k_period: usize,
    pub stochastic_k_smooth: usize,
    pub stochastic_d_smooth: usize,
    pub kdj_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
    pub ema_periods: [usize; 4],
    pub ao_fast: usize,
    pub ao_slow: usize,
    pub cmf_period: usize,
    pub adx_period: usize,
    pub atr_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            stoch_rsi_period: 21,
            stoch_rsi_stoch_period: 9,
            stoch_rsi_k_smooth: 3,
            stoch_rsi_d_smooth: 3,
            williams_r_period: 14,
            stochastic_k_period: 14,
            stochastic_k_smooth: 3,
            stochastic_d_smooth: 3,
            kdj_period: 9,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std: 2.0,
            ema_periods: [9, 21, 50, 200],
            ao_fast: 5,
            ao_slow: 34,
            cmf_period: 20,
            adx_period: 14,
            atr_period: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct EmaStack {
    pub ema9: Option<f64>,
    pub ema21: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
}

/// Every indicator family computed for one evaluation, each carrying its raw
/// scalar(s) plus the SignalEvents it emitted.
#[derive(Debug, Clone, Default)]
pub struct IndicatorBundle {
    pub rsi: Option<f64>,
    pub stoch_rsi: Option<StochRsiResult>,
    pub williams_r: Option<f64>,
    pub stochastic: Option<StochasticResult>,
    pub kdj: Option<KdjResult>,
    pub macd: Option<MacdResult>,
    pub bollinger: Option<BollingerResult>,
    pub ema: EmaStack,
    pub ao: Option<f64>,
    pub obv: Option<(f64, f64, f64)>,
    pub cmf: Option<f64>,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
    pub atr_pct: Option<f64>,
    pub events: Vec<SignalEvent>,
}

/// Compute the full indicator bundle for a slice of closed candles (oldest
/// first). Pure — no I/O, no shared state.
pub fn compute_bundle(candles: &[Candle], cfg: &IndicatorConfig) -> IndicatorBundle {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut bundle = IndicatorBundle::default();
    let mut events = Vec::new();

    if let Some(rsi) = calculate_rsi(&closes, cfg.rsi_period).last().copied() {
        bundle.rsi = Some(rsi);
        if rsi >= 70.0 {
            events.push(SignalEvent::new(
                crate::indicators::events::SignalEventKind::Overbought { value: rsi },
                crate::indicators::events::Direction::Bearish,
                ((rsi - 70.0) / 30.0).clamp(0.0, 1.0),
            ));
        } else if rsi <= 30.0 {
            events.push(SignalEvent::new(
                crate::indicators::events::SignalEventKind::Oversold { value: rsi },
                crate::indicators::events::Direction::Bullish,
                ((30.0 - rsi) / 30.0).clamp(0.0, 1.0),
            ));
        }
    }

    if let Some(sr) = calculate_stoch_rsi(
        &closes,
        cfg.stoch_rsi_period,
        cfg.stoch_rsi_stoch_period,
        cfg.stoch_rsi_k_smooth,
        cfg.stoch_rsi_d_smooth,
    ) {
        events.extend(stoch_rsi_events(&sr));
        bundle.stoch_rsi = Some(sr);
    }

    if let Some(wr) = calculate_williams_r(candles, cfg.williams_r_period) {
        events.extend(williams_r_events(wr));
        bundle.williams_r = Some(wr);
    }

    bundle.stochastic = calculate_stochastic(
        candles,
        cfg.stochastic_k_period,
        cfg.stochastic_k_smooth,
        cfg.stochastic_d_smooth,
    );

    if let Some(kdj) = calculate_kdj(candles, cfg.kdj_period) {
        events.extend(kdj_events(&kdj));
        bundle.kdj = Some(kdj);
    }

    if let Some(macd) = calculate_macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal) {
        events.extend(macd_events(&macd));
        bundle.macd = Some(macd);
    }

    if let Some(bb) = calculate_bollinger(&closes, cfg.bollinger_period, cfg.bollinger_std) {
        if let Some(&last_close) = closes.last() {
            events.extend(bollinger_events(&bb, last_close));
        }
        bundle.bollinger = Some(bb);
    }

    bundle.ema = EmaStack {
        ema9: calculate_ema(&closes, cfg.ema_periods[0]).last().copied(),
        ema21: calculate_ema(&closes, cfg.ema_periods[1]).last().copied(),
        ema50: calculate_ema(&closes, cfg.ema_periods[2]).last().copied(),
        ema200: calculate_ema(&closes, cfg.ema_periods[3]).last().copied(),
    };
    events.extend(ema_trend_events(&closes));

    let ao_series = calculate_ao_series(candles, cfg.ao_fast, cfg.ao_slow);
    if let Some(&ao) = ao_series.last() {
        events.extend(crate::indicators::awesome_oscillator::ao_events(&ao_series));
        bundle.ao = Some(ao);
    }

    bundle.obv = calculate_obv(candles);

    if let Some(cmf) = calculate_cmf(candles, cfg.cmf_period) {
        events.extend(cmf_events(cmf));
        bundle.cmf = Some(cmf);
    }

    bundle.adx = calculate_adx(candles, cfg.adx_period);
    bundle.atr = calculate_atr(candles, cfg.atr_period);
    bundle.atr_pct = calculate_atr_pct(candles, cfg.atr_period);

    bundle.events = events;
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize) -> Candle {
        let base = 100.0 + i as f64;
        Candle {
            open_time: i as i64 * 60_000,
            close_time: i as i64 * 60_000 + 59_999,
            open: base,
            high: base + 1.0,
            low: base - 1.0,
            close: base + 0.5,
            volume: 10.0,
            quote_volume: 1000.0,
            trades_count: 5,
            taker_buy_volume: 5.0,
            taker_buy_quote_volume: 500.0,
            is_closed: true,
        }
    }

    #[test]
    fn short_candle_tail_degrades_gracefully() {
        let candles: Vec<Candle> = (0..10).map(candle).collect();
        let bundle = compute_bundle(&candles, &IndicatorConfig::default());
        assert!(bundle.rsi.is_none());
        assert!(bundle.ema.ema9.is_none());
        assert!(bundle.events.is_empty());
    }

    #[test]
    fn full_history_populates_every_family() {
        let candles: Vec<Candle> = (0..250).map(candle).collect();
        let bundle = compute_bundle(&candles, &IndicatorConfig::default());
        assert!(bundle.rsi.is_some());
        assert!(bundle.stoch_rsi.is_some());
        assert!(bundle.williams_r.is_some());
        assert!(bundle.stochastic.is_some());
        assert!(bundle.kdj.is_some());
        assert!(bundle.macd.is_some());
        assert!(bundle.bollinger.is_some());
        assert!(bundle.ema.ema200.is_some());
        assert!(bundle.ao.is_some());
        assert!(bundle.obv.is_some());
        assert!(bundle.cmf.is_some());
        assert!(bundle.adx.is_some());
        assert!(bundle.atr.is_some());
    }
}
