// =============================================================================
// Screener — periodic batch scan over tradable instruments
// =============================================================================
//
// Generalizes the teacher's per-symbol `tokio::spawn` strategy loop in
// `main.rs` into a single cancellable batch task: every cycle it walks the
// configured symbol list, runs the indicator bundle + signal generator for
// each, ranks the results by `|score|`, and publishes the top candidates for
// the rest of the pipeline (RiskAgent -> Executor) to act on. Instrument list
// and higher-timeframe cache are only refreshed every few cycles since they
// change far more slowly than price does.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::indicators::bundle::{compute_bundle, IndicatorBundle, IndicatorConfig};
use crate::market_data::{CandleKey, MarketStore, MicrostructureSnapshot};
use crate::regime::RegimeDetector;
use crate::signals::generator::{generate, CompositeSignal, GeneratorConfig, TimeframeRole};

/// How many scan cycles pass between instrument-list and HTF-cache refreshes.
const INSTRUMENT_REFRESH_CYCLES: u64 = 20;
const HTF_REFRESH_CYCLES: u64 = 5;

pub struct ScreenerConfig {
    pub cycle_interval: Duration,
    pub ltf_interval: String,
    pub htf_interval: String,
    pub candle_lookback: usize,
    pub top_n: usize,
    pub indicator_config: IndicatorConfig,
    pub generator_config: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerCycleStats {
    pub cycle: u64,
    pub scanned: usize,
    pub candidates_emitted: usize,
    pub duration_ms: u64,
}

/// One instrument's screening dependencies, bundled so the cycle body reads
/// as a loop over homogeneous inputs instead of juggling three maps.
pub struct ScreenerInputs {
    pub market_store: Arc<MarketStore>,
    pub regime_detector: Arc<RwLock<RegimeDetector>>,
}

pub struct Screener {
    cfg: ScreenerConfig,
    cycle_count: AtomicU64,
    stopping: AtomicBool,
    last_stats: RwLock<Option<ScreenerCycleStats>>,
    htf_cache: RwLock<std::collections::HashMap<String, IndicatorBundle>>,
    symbols: RwLock<Vec<String>>,
}

impl Screener {
    pub fn new(cfg: ScreenerConfig, initial_symbols: Vec<String>) -> Self {
        Self {
            cfg,
            cycle_count: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            last_stats: RwLock::new(None),
            htf_cache: RwLock::new(std::collections::HashMap::new()),
            symbols: RwLock::new(initial_symbols),
        }
    }

    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn last_stats(&self) -> Option<ScreenerCycleStats> {
        self.last_stats.read().clone()
    }

    /// Run the screener loop until `request_stop` is called. Any in-flight
    /// cycle finishes (batch-draining) rather than being cut off mid-symbol.
    pub async fn run(
        self: &Arc<Self>,
        inputs: &ScreenerInputs,
        refresh_symbols: impl Fn() -> Vec<String>,
        mut on_candidates: impl FnMut(Vec<CompositeSignal>),
    ) {
        let mut interval = tokio::time::interval(self.cfg.cycle_interval);
        loop {
            interval.tick().await;
            if self.is_stopping() {
                info!("screener stop requested, draining final cycle");
                self.run_cycle(inputs, &refresh_symbols, &mut on_candidates);
                info!("screener stopped");
                return;
            }
            self.run_cycle(inputs, &refresh_symbols, &mut on_candidates);
        }
    }

    fn run_cycle(
        &self,
        inputs: &ScreenerInputs,
        refresh_symbols: &impl Fn() -> Vec<String>,
        on_candidates: &mut impl FnMut(Vec<CompositeSignal>),
    ) {
        let started = std::time::Instant::now();
        let cycle = self.cycle_count.fetch_add(1, Ordering::SeqCst);

        if cycle % INSTRUMENT_REFRESH_CYCLES == 0 {
            let fresh = refresh_symbols();
            if !fresh.is_empty() {
                *self.symbols.write() = fresh;
            }
        }
        let refresh_htf = cycle % HTF_REFRESH_CYCLES == 0;

        let symbols = self.symbols.read().clone();
        let regime = inputs.regime_detector.read().current_regime().map(|r| r.regime);

        let mut signals = Vec::new();
        for symbol in &symbols {
            let ltf_key = CandleKey {
                symbol: symbol.clone(),
                interval: self.cfg.ltf_interval.clone(),
            };
            let ltf_candles = inputs.market_store.tail(&ltf_key, self.cfg.candle_lookback);
            if ltf_candles.len() < 20 {
                continue;
            }
            let ltf_bundle = compute_bundle(&ltf_candles, &self.cfg.indicator_config);

            if refresh_htf {
                let htf_key = CandleKey {
                    symbol: symbol.clone(),
                    interval: self.cfg.htf_interval.clone(),
                };
                let htf_candles = inputs.market_store.tail(&htf_key, self.cfg.candle_lookback);
                if htf_candles.len() >= 20 {
                    self.htf_cache
                        .write()
                        .insert(symbol.clone(), compute_bundle(&htf_candles, &self.cfg.indicator_config));
                }
            }

            let htf_cache = self.htf_cache.read();
            let htf_bundle = htf_cache.get(symbol);
            let other_timeframes: Vec<(TimeframeRole, &IndicatorBundle)> =
                htf_bundle.into_iter().map(|b| (TimeframeRole::Htf, b)).collect();

            let micro_contribution = inputs
                .market_store
                .snapshot(symbol, Duration::from_secs(10))
                .map(|snap: MicrostructureSnapshot| snap.score_contribution(self.cfg.generator_config.total_cap * 0.2))
                .unwrap_or(0.0);

            let composite = generate(
                symbol,
                &self.cfg.ltf_interval,
                &ltf_bundle,
                micro_contribution,
                &other_timeframes,
                regime,
                None,
                0.0,
                &self.cfg.generator_config,
                chrono::Utc::now().timestamp_millis(),
            );

            if composite.authorized {
                signals.push(composite);
            }
        }

        signals.sort_by(|a, b| b.score.abs().partial_cmp(&a.score.abs()).unwrap_or(std::cmp::Ordering::Equal));
        signals.truncate(self.cfg.top_n);

        let stats = ScreenerCycleStats {
            cycle,
            scanned: symbols.len(),
            candidates_emitted: signals.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        debug!(?stats, "screener cycle complete");
        *self.last_stats.write() = Some(stats);

        on_candidates(signals);
    }
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5),
            ltf_interval: "5m".to_string(),
            htf_interval: "1h".to_string(),
            candle_lookback: 200,
            top_n: 5,
            indicator_config: IndicatorConfig::default(),
            generator_config: GeneratorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_symbol_list_produces_no_candidates() {
        let screener = Arc::new(Screener::new(ScreenerConfig::default(), vec![]));
        let inputs = ScreenerInputs {
            market_store: Arc::new(MarketStore::new(
                Arc::new(crate::market_data::CandleBuffer::new(500)),
                Arc::new(crate::market_data::OrderBookManager::new()),
            )),
            regime_detector: Arc::new(RwLock::new(RegimeDetector::default())),
        };
        let mut seen = None;
        screener.run_cycle(&inputs, &|| vec![], &mut |candidates| seen = Some(candidates.len()));
        assert_eq!(seen, Some(0));
    }
}
