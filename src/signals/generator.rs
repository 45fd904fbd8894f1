// =============================================================================
// SignalGenerator — composite scoring, classification, MTF convergence, regime bias
// =============================================================================
//
// Generalizes `weighted_score::WeightedScorer` (flat list of named
// `SignalInput`s reduced to a single score via regime-specific weight maps)
// into a generator that consumes the tagged `SignalEvent`s an
// `IndicatorBundle` emits directly, so no hand-maintained name/weight table
// has to track the indicator set — each event already carries its own
// `type_multiplier()`. Kept the same shape: a score, a textual decision, and
// a per-contributor breakdown, now wrapped in the richer `CompositeSignal`
// spec.md's indicator-score-breakdown/confidence/convergence/authorization
// fields call for.

use std::collections::HashMap;

use serde::Serialize;

use crate::indicators::bundle::IndicatorBundle;
use crate::indicators::events::{Direction, SignalEvent};
use crate::regime::MarketRegime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalSide {
    Long,
    Short,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassificationTier {
    Extreme,
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConvergenceQuality {
    A,
    B,
    C,
    D,
}

/// Which side of the primary timeframe an auxiliary bundle sits on, so
/// convergence scoring can tier its additive bonus separately for
/// lower-timeframe confirmation vs. higher-timeframe conviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeframeRole {
    Ltf,
    Htf,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Per-event-source contribution cap before the type/strength multipliers.
    pub indicator_weight_cap: f64,
    pub total_cap: f64,
    pub dead_zone: f64,
    pub weak_threshold: f64,
    pub strong_threshold: f64,
    pub extreme_threshold: f64,
    pub min_score: f64,
    pub min_confidence: f64,
    pub min_agreeing_indicators: usize,
    pub min_confluence_pct: f64,
    pub require_threshold_cross: bool,
    pub max_daily_drawdown_pct: f64,
    /// Additive convergence bonus per aligned lower-timeframe bundle.
    pub ltf_aligned_bonus: f64,
    /// Additive convergence bonus per aligned higher-timeframe bundle —
    /// weighted heavier than the LTF tier since HTF agreement carries more
    /// conviction.
    pub htf_aligned_bonus: f64,
    /// Additive penalty per conflicting auxiliary timeframe, regardless of
    /// role, applied alongside (not instead of) the multiplicative factor.
    pub conflict_penalty: f64,
    /// Smaller additive bonus when an HTF bundle has an event moving toward
    /// (but not yet in) its extreme strength tier, same direction as the
    /// primary side.
    pub pending_extreme_bonus: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            indicator_weight_cap: 10.0,
            total_cap: 100.0,
            dead_zone: 8.0,
            weak_threshold: 8.0,
            strong_threshold: 35.0,
            extreme_threshold: 60.0,
            min_score: 20.0,
            min_confidence: 55.0,
            min_agreeing_indicators: 3,
            min_confluence_pct: 55.0,
            require_threshold_cross: false,
            max_daily_drawdown_pct: 100.0,
            ltf_aligned_bonus: 3.0,
            htf_aligned_bonus: 5.0,
            conflict_penalty: 4.0,
            pending_extreme_bonus: 2.5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeSignal {
    pub instrument: String,
    pub timeframe: String,
    pub score: f64,
    pub classification: Option<ClassificationTier>,
    pub side: SignalSide,
    pub confidence: f64,
    pub indicator_score_breakdown: HashMap<String, f64>,
    pub microstructure_contribution: f64,
    pub agreeing_count: usize,
    pub opposing_count: usize,
    pub block_reasons: Vec<String>,
    pub authorized: bool,
    pub convergence_quality: Option<ConvergenceQuality>,
    pub aligned_timeframes: usize,
    /// Additive bonus from aligned auxiliary timeframes, tiered LTF vs HTF,
    /// plus any pending-extreme bonus — applied before the multiplicative
    /// convergence factor.
    pub convergence_bonus: f64,
    /// Additive penalty from conflicting auxiliary timeframes, applied
    /// alongside (not instead of) the multiplicative convergence factor.
    pub convergence_penalty: f64,
    pub regime_tag: Option<String>,
    pub timestamp_ms: i64,
    /// Fingerprint of "signal archetype in the current regime" (e.g.
    /// `bullish_cross@trending`), used to key the safety layer's
    /// per-feature kill switch independently of instrument or timeframe.
    pub feature_key: String,
}

/// Strength multiplier tiers per spec.md §4.4: very_strong/extreme >= 1.2,
/// strong 1.0, moderate 0.6-0.7, weak 0.3-0.5.
fn strength_multiplier(strength: f64) -> f64 {
    if strength >= 0.85 {
        1.2
    } else if strength >= 0.6 {
        1.0
    } else if strength >= 0.3 {
        0.65
    } else {
        0.4
    }
}

fn event_sign(event: &SignalEvent) -> f64 {
    match event.direction {
        Direction::Bullish => 1.0,
        Direction::Bearish => -1.0,
        Direction::Neutral => 0.0,
    }
}

fn side_sign(side: SignalSide) -> f64 {
    match side {
        SignalSide::Long => 1.0,
        SignalSide::Short => -1.0,
        SignalSide::None => 0.0,
    }
}

/// Strength band an event sits in once it has cleared the "strong" tier but
/// hasn't yet reached the "extreme" tier cutoff used by [`strength_multiplier`]
/// — i.e. moving toward an extreme without having reached it.
const PENDING_EXTREME_BAND: std::ops::Range<f64> = 0.75..0.85;

/// Sum one bundle's events into a clamped per-indicator contribution total
/// plus the raw per-event breakdown keyed by event kind name. Also tracks the
/// archetype of the single largest-magnitude contributor, which becomes the
/// signal half of the per-feature kill-switch key.
fn score_bundle(bundle: &IndicatorBundle, cap: f64) -> (f64, HashMap<String, f64>, usize, usize, Option<&'static str>) {
    let mut breakdown: HashMap<String, f64> = HashMap::new();
    let mut agreeing = 0usize;
    let mut opposing = 0usize;
    let mut net = 0.0f64;
    let mut dominant: Option<(&'static str, f64)> = None;

    for event in &bundle.events {
        let sign = event_sign(event);
        if sign == 0.0 {
            continue;
        }
        let contribution = (sign * cap * event.type_multiplier() * strength_multiplier(event.strength))
            .clamp(-cap, cap);
        net += contribution;
        *breakdown.entry(event_label(event)).or_insert(0.0) += contribution;
        if contribution.abs() > dominant.map(|(_, m)| m).unwrap_or(0.0) {
            dominant = Some((event.archetype(), contribution.abs()));
        }
        if sign > 0.0 {
            agreeing += 1;
        } else {
            opposing += 1;
        }
    }

    (net, breakdown, agreeing, opposing, dominant.map(|(label, _)| label))
}

fn event_label(event: &SignalEvent) -> String {
    format!("{:?}", event.kind)
}

fn classify(score: f64, cfg: &GeneratorConfig) -> (SignalSide, Option<ClassificationTier>) {
    let magnitude = score.abs();
    if magnitude < cfg.dead_zone {
        return (SignalSide::None, None);
    }
    let side = if score > 0.0 { SignalSide::Long } else { SignalSide::Short };
    let tier = if magnitude >= cfg.extreme_threshold {
        ClassificationTier::Extreme
    } else if magnitude >= cfg.strong_threshold {
        ClassificationTier::Strong
    } else if magnitude >= cfg.weak_threshold {
        ClassificationTier::Moderate
    } else {
        ClassificationTier::Weak
    };
    (side, Some(tier))
}

fn regime_tag_for(regime: Option<MarketRegime>, side: SignalSide) -> (Option<String>, f64) {
    let Some(regime) = regime else { return (None, 1.0) };
    let tag = regime.to_string();
    let factor = match (regime, side) {
        (MarketRegime::Trending, SignalSide::Long) | (MarketRegime::Trending, SignalSide::Short) => 1.15,
        (MarketRegime::Volatile, _) => 0.85,
        (MarketRegime::Squeeze, _) => 0.9,
        (MarketRegime::Ranging, _) | (MarketRegime::Dead, _) => 0.75,
    };
    (Some(tag), factor)
}

/// Multi-timeframe convergence quality per spec.md §4.4: A all aligned, B
/// all-but-one no conflicts, C majority aligned, D isolated.
fn convergence_quality(aligned: usize, conflicting: usize, total_other: usize) -> Option<ConvergenceQuality> {
    if total_other == 0 {
        return None;
    }
    Some(if aligned == total_other {
        ConvergenceQuality::A
    } else if aligned == total_other - 1 && conflicting == 0 {
        ConvergenceQuality::B
    } else if aligned * 2 > total_other {
        ConvergenceQuality::C
    } else {
        ConvergenceQuality::D
    })
}

fn convergence_factor(quality: Option<ConvergenceQuality>) -> f64 {
    match quality {
        Some(ConvergenceQuality::A) => 1.4,
        Some(ConvergenceQuality::B) => 1.2,
        Some(ConvergenceQuality::C) => 1.0,
        Some(ConvergenceQuality::D) => 0.7,
        None => 1.0,
    }
}

/// Generate a composite signal for one instrument/timeframe.
///
/// `other_timeframes` supplies bundles for convergence scoring (both LTF and
/// HTF), labeled aligned/conflicting relative to the primary side.
#[allow(clippy::too_many_arguments)]
pub fn generate(
    instrument: &str,
    timeframe: &str,
    primary: &IndicatorBundle,
    microstructure_contribution: f64,
    other_timeframes: &[(TimeframeRole, &IndicatorBundle)],
    regime: Option<MarketRegime>,
    prior_score: Option<f64>,
    daily_drawdown_pct: f64,
    cfg: &GeneratorConfig,
    timestamp_ms: i64,
) -> CompositeSignal {
    let (indicator_net, breakdown, agreeing, opposing, dominant_archetype) =
        score_bundle(primary, cfg.indicator_weight_cap);

    let mut score = (indicator_net + microstructure_contribution.clamp(-cfg.total_cap * 0.2, cfg.total_cap * 0.2))
        .clamp(-cfg.total_cap, cfg.total_cap);

    let (provisional_side, _) = classify(score, cfg);

    let mut aligned = 0usize;
    let mut conflicting = 0usize;
    let mut convergence_bonus = 0.0f64;
    let mut convergence_penalty = 0.0f64;
    for (role, other) in other_timeframes {
        let (other_net, ..) = score_bundle(other, cfg.indicator_weight_cap);
        let other_side = if other_net > cfg.dead_zone {
            SignalSide::Long
        } else if other_net < -cfg.dead_zone {
            SignalSide::Short
        } else {
            SignalSide::None
        };
        match (provisional_side, other_side) {
            (SignalSide::None, _) | (_, SignalSide::None) => {}
            (a, b) if a == b => {
                aligned += 1;
                convergence_bonus += match role {
                    TimeframeRole::Ltf => cfg.ltf_aligned_bonus,
                    TimeframeRole::Htf => cfg.htf_aligned_bonus,
                };
            }
            _ => {
                conflicting += 1;
                convergence_penalty += cfg.conflict_penalty;
            }
        }

        if *role == TimeframeRole::Htf && provisional_side != SignalSide::None {
            let approaching_extreme = other.events.iter().any(|e| {
                event_sign(e) == side_sign(provisional_side) && PENDING_EXTREME_BAND.contains(&e.strength)
            });
            if approaching_extreme {
                convergence_bonus += cfg.pending_extreme_bonus;
            }
        }
    }
    let quality = convergence_quality(aligned, conflicting, other_timeframes.len());
    score = (score + convergence_bonus - convergence_penalty).clamp(-cfg.total_cap, cfg.total_cap);
    score = (score * convergence_factor(quality)).clamp(-cfg.total_cap, cfg.total_cap);

    let (regime_tag, regime_factor) = regime_tag_for(regime, provisional_side);
    score = (score * regime_factor).clamp(-cfg.total_cap, cfg.total_cap);

    let (side, classification) = classify(score, cfg);

    let total_fired = agreeing + opposing;
    let confluence_pct = if total_fired > 0 {
        (agreeing.max(opposing) as f64 / total_fired as f64) * 100.0
    } else {
        0.0
    };

    let mut confidence = 50.0f64;
    if total_fired > 0 {
        confidence += 30.0 * (agreeing.max(opposing) as f64 / total_fired as f64);
    }
    confidence += 20.0 * (score.abs() / cfg.total_cap).min(1.0);
    confidence -= 4.0 * opposing.min(agreeing) as f64;
    if let Some(atr_pct) = primary.atr_pct {
        if atr_pct > 4.0 {
            confidence -= 10.0;
        }
    }
    let confidence = confidence.clamp(0.0, 100.0);

    let mut block_reasons = Vec::new();
    if classification.is_none() {
        block_reasons.push("dead_zone".to_string());
    }
    if score.abs() < cfg.min_score {
        block_reasons.push("min_score".to_string());
    }
    if cfg.require_threshold_cross {
        if let Some(prior) = prior_score {
            let crossed = (prior.abs() < cfg.min_score) != (score.abs() < cfg.min_score);
            if !crossed {
                block_reasons.push("threshold_cross".to_string());
            }
        }
    }
    if confidence < cfg.min_confidence {
        block_reasons.push("min_confidence".to_string());
    }
    if agreeing.max(opposing) < cfg.min_agreeing_indicators {
        block_reasons.push("min_agreeing_indicators".to_string());
    }
    if confluence_pct < cfg.min_confluence_pct {
        block_reasons.push("min_confluence_pct".to_string());
    }
    if daily_drawdown_pct >= cfg.max_daily_drawdown_pct {
        block_reasons.push("drawdown_cap".to_string());
    }

    let feature_key = format!(
        "{}@{}",
        dominant_archetype.unwrap_or("composite"),
        regime_tag.as_deref().unwrap_or("unknown").to_lowercase()
    );

    CompositeSignal {
        instrument: instrument.to_string(),
        timeframe: timeframe.to_string(),
        score,
        classification,
        side,
        confidence,
        indicator_score_breakdown: breakdown,
        microstructure_contribution,
        agreeing_count: agreeing,
        opposing_count: opposing,
        authorized: block_reasons.is_empty(),
        block_reasons,
        convergence_quality: quality,
        aligned_timeframes: aligned,
        convergence_bonus,
        convergence_penalty,
        regime_tag,
        timestamp_ms,
        feature_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::events::SignalEventKind;

    fn bundle_with(events: Vec<SignalEvent>) -> IndicatorBundle {
        let mut bundle = IndicatorBundle::default();
        bundle.events = events;
        bundle
    }

    #[test]
    fn all_bullish_events_score_positive_and_classify_long() {
        let events = vec![
            SignalEvent::new(SignalEventKind::Oversold { value: 20.0 }, Direction::Bullish, 0.9),
            SignalEvent::new(SignalEventKind::BullishCross { value: 0.0 }, Direction::Bullish, 0.8),
            SignalEvent::new(SignalEventKind::TrendAligned { value: 0.1 }, Direction::Bullish, 0.7),
        ];
        let bundle = bundle_with(events);
        let signal = generate("BTCUSDT", "5m", &bundle, 0.0, &[], None, None, 0.0, &GeneratorConfig::default(), 0);
        assert!(signal.score > 0.0);
        assert_eq!(signal.side, SignalSide::Long);
    }

    #[test]
    fn empty_bundle_lands_in_dead_zone() {
        let bundle = bundle_with(vec![]);
        let signal = generate("BTCUSDT", "5m", &bundle, 0.0, &[], None, None, 0.0, &GeneratorConfig::default(), 0);
        assert_eq!(signal.side, SignalSide::None);
        assert!(!signal.authorized);
        assert!(signal.block_reasons.contains(&"dead_zone".to_string()));
    }

    #[test]
    fn score_never_exceeds_total_cap() {
        let events: Vec<SignalEvent> = (0..20)
            .map(|_| SignalEvent::new(SignalEventKind::Divergence { value: 1.0 }, Direction::Bullish, 1.0))
            .collect();
        let bundle = bundle_with(events);
        let signal = generate("BTCUSDT", "5m", &bundle, 0.0, &[], None, None, 0.0, &GeneratorConfig::default(), 0);
        assert!(signal.score.abs() <= GeneratorConfig::default().total_cap);
    }

    #[test]
    fn aligned_other_timeframe_yields_grade_a_and_boosts_score() {
        let primary_events = vec![SignalEvent::new(SignalEventKind::BullishCross { value: 0.0 }, Direction::Bullish, 0.9)];
        let primary = bundle_with(primary_events.clone());
        let other = bundle_with(primary_events);
        let cfg = GeneratorConfig::default();
        let solo = generate("BTCUSDT", "5m", &primary, 0.0, &[], None, None, 0.0, &cfg, 0);
        let converged = generate(
            "BTCUSDT",
            "5m",
            &primary,
            0.0,
            &[(TimeframeRole::Htf, &other)],
            None,
            None,
            0.0,
            &cfg,
            0,
        );
        assert_eq!(converged.convergence_quality, Some(ConvergenceQuality::A));
        assert!(converged.score.abs() >= solo.score.abs());
        assert!(converged.convergence_bonus > 0.0);
        assert_eq!(converged.convergence_penalty, 0.0);
    }

    #[test]
    fn conflicting_htf_adds_penalty_and_lowers_quality() {
        let primary_events = vec![SignalEvent::new(SignalEventKind::BullishCross { value: 0.0 }, Direction::Bullish, 0.9)];
        let conflicting_events = vec![SignalEvent::new(SignalEventKind::BearishCross { value: 0.0 }, Direction::Bearish, 0.9)];
        let primary = bundle_with(primary_events);
        let other = bundle_with(conflicting_events);
        let cfg = GeneratorConfig::default();
        let signal = generate(
            "BTCUSDT",
            "5m",
            &primary,
            0.0,
            &[(TimeframeRole::Htf, &other)],
            None,
            None,
            0.0,
            &cfg,
            0,
        );
        assert_eq!(signal.convergence_quality, Some(ConvergenceQuality::D));
        assert_eq!(signal.convergence_penalty, cfg.conflict_penalty);
        assert_eq!(signal.convergence_bonus, 0.0);
    }

    #[test]
    fn htf_event_approaching_extreme_adds_pending_extreme_bonus() {
        let primary_events = vec![SignalEvent::new(SignalEventKind::BullishCross { value: 0.0 }, Direction::Bullish, 0.9)];
        let htf_aligned = vec![
            SignalEvent::new(SignalEventKind::TrendAligned { value: 0.1 }, Direction::Bullish, 0.6),
            SignalEvent::new(SignalEventKind::Oversold { value: 22.0 }, Direction::Bullish, 0.8),
        ];
        let primary = bundle_with(primary_events);
        let other = bundle_with(htf_aligned);
        let cfg = GeneratorConfig::default();
        let signal = generate(
            "BTCUSDT",
            "5m",
            &primary,
            0.0,
            &[(TimeframeRole::Htf, &other)],
            None,
            None,
            0.0,
            &cfg,
            0,
        );
        assert_eq!(signal.convergence_bonus, cfg.htf_aligned_bonus + cfg.pending_extreme_bonus);
    }

    #[test]
    fn disagreeing_indicators_block_on_confluence() {
        let events = vec![
            SignalEvent::new(SignalEventKind::Oversold { value: 20.0 }, Direction::Bullish, 0.9),
            SignalEvent::new(SignalEventKind::Overbought { value: 80.0 }, Direction::Bearish, 0.9),
        ];
        let bundle = bundle_with(events);
        let signal = generate("BTCUSDT", "5m", &bundle, 0.0, &[], None, None, 0.0, &GeneratorConfig::default(), 0);
        assert!(!signal.authorized);
    }

    #[test]
    fn drawdown_cap_blocks_even_a_strong_signal() {
        let events = vec![
            SignalEvent::new(SignalEventKind::Oversold { value: 10.0 }, Direction::Bullish, 1.0),
            SignalEvent::new(SignalEventKind::BullishCross { value: 0.0 }, Direction::Bullish, 1.0),
            SignalEvent::new(SignalEventKind::TrendAligned { value: 0.2 }, Direction::Bullish, 1.0),
        ];
        let bundle = bundle_with(events);
        let mut cfg = GeneratorConfig::default();
        cfg.max_daily_drawdown_pct = 2.0;
        let signal = generate("BTCUSDT", "5m", &bundle, 0.0, &[], None, None, 5.0, &cfg, 0);
        assert!(signal.block_reasons.contains(&"drawdown_cap".to_string()));
    }
}
