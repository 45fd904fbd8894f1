// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the core technical indicators used
// by the trading engine.  Every public function returns `Option<T>` so callers
// are forced to handle insufficient-data and numerical-edge-case scenarios.
//
// `bundle::compute_bundle` is the IndicatorEngine entry point that runs every
// indicator below and collects the SignalEvents they emit.

pub mod adx;
pub mod atr;
pub mod awesome_oscillator;
pub mod bollinger;
pub mod bundle;
pub mod cmf;
pub mod ema;
pub mod events;
pub mod kdj;
pub mod macd;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod stoch_rsi;
pub mod stochastic;
pub mod williams_r;

pub use bundle::{compute_bundle, IndicatorBundle, IndicatorConfig};
pub use events::{Direction, SignalEvent, SignalEventKind};
