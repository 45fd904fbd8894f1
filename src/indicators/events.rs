// =============================================================================
// SignalEvent — tagged-union output of every indicator
// =============================================================================
//
// Each indicator module emits zero or more `SignalEvent`s alongside its raw
// scalar(s). A discriminated enum rather than a loose string/float map keeps
// the SignalGenerator's per-type multiplier table exhaustive: adding a new
// `SignalEventKind` variant is a compile error everywhere a match isn't
// updated, instead of a silently-ignored key at runtime.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }
}

/// The kind of condition an indicator observed. Each variant carries the
/// scalar payload needed to re-derive the observation without looking back at
/// raw candles (e.g. the RSI value that triggered an Overbought event).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalEventKind {
    Overbought { value: f64 },
    Oversold { value: f64 },
    BullishCross { value: f64 },
    BearishCross { value: f64 },
    TrendAligned { value: f64 },
    TrendConflicted { value: f64 },
    Expansion { value: f64 },
    Compression { value: f64 },
    Divergence { value: f64 },
    MomentumBuildup { value: f64 },
    AccumulationPressure { value: f64 },
    DistributionPressure { value: f64 },
}

/// One observation emitted by an indicator: what was observed, which way it
/// leans, and how strongly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalEvent {
    pub kind: SignalEventKind,
    pub direction: Direction,
    /// Observation strength in `[0.0, 1.0]`, independent of the per-type
    /// multiplier the SignalGenerator applies.
    pub strength: f64,
}

impl SignalEvent {
    pub fn new(kind: SignalEventKind, direction: Direction, strength: f64) -> Self {
        Self {
            kind,
            direction,
            strength: strength.clamp(0.0, 1.0),
        }
    }

    /// Relative weight this event *type* carries in composite scoring,
    /// independent of its instance strength. Overbought/Oversold and cross
    /// events are the most decisive; compression/expansion are context.
    pub fn type_multiplier(&self) -> f64 {
        match self.kind {
            SignalEventKind::Overbought { .. } | SignalEventKind::Oversold { .. } => 1.0,
            SignalEventKind::BullishCross { .. } | SignalEventKind::BearishCross { .. } => 0.9,
            SignalEventKind::TrendAligned { .. } => 0.8,
            SignalEventKind::TrendConflicted { .. } => 0.6,
            SignalEventKind::Divergence { .. } => 0.85,
            SignalEventKind::MomentumBuildup { .. } => 0.5,
            SignalEventKind::AccumulationPressure { .. }
            | SignalEventKind::DistributionPressure { .. } => 0.7,
            SignalEventKind::Expansion { .. } | SignalEventKind::Compression { .. } => 0.3,
        }
    }

    /// Stable snake_case archetype label, independent of the `Debug` repr —
    /// used to key per-signal-archetype state (e.g. the safety layer's
    /// feature kill switch) so it survives field changes to the payload.
    pub fn archetype(&self) -> &'static str {
        match self.kind {
            SignalEventKind::Overbought { .. } => "overbought",
            SignalEventKind::Oversold { .. } => "oversold",
            SignalEventKind::BullishCross { .. } => "bullish_cross",
            SignalEventKind::BearishCross { .. } => "bearish_cross",
            SignalEventKind::TrendAligned { .. } => "trend_aligned",
            SignalEventKind::TrendConflicted { .. } => "trend_conflicted",
            SignalEventKind::Expansion { .. } => "expansion",
            SignalEventKind::Compression { .. } => "compression",
            SignalEventKind::Divergence { .. } => "divergence",
            SignalEventKind::MomentumBuildup { .. } => "momentum_buildup",
            SignalEventKind::AccumulationPressure { .. } => "accumulation_pressure",
            SignalEventKind::DistributionPressure { .. } => "distribution_pressure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_clamped_to_unit_interval() {
        let ev = SignalEvent::new(SignalEventKind::Overbought { value: 90.0 }, Direction::Bearish, 3.0);
        assert_eq!(ev.strength, 1.0);
        let ev = SignalEvent::new(SignalEventKind::Overbought { value: 90.0 }, Direction::Bearish, -3.0);
        assert_eq!(ev.strength, 0.0);
    }

    #[test]
    fn overbought_outweighs_compression() {
        let ob = SignalEvent::new(SignalEventKind::Overbought { value: 80.0 }, Direction::Bearish, 0.5);
        let comp = SignalEvent::new(SignalEventKind::Compression { value: 1.0 }, Direction::Neutral, 0.5);
        assert!(ob.type_multiplier() > comp.type_multiplier());
    }

    #[test]
    fn archetype_label_is_stable_snake_case() {
        let ev = SignalEvent::new(SignalEventKind::BullishCross { value: 0.0 }, Direction::Bullish, 0.8);
        assert_eq!(ev.archetype(), "bullish_cross");
    }
}
