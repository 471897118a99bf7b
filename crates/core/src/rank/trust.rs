//! # Trust Scoring
//!
//! Pure composite scoring over five trust components. Scoring is a
//! deterministic function of its input signals; no I/O, no clock reads,
//! so identical result sets always rank identically.

use chrono::{DateTime, Utc};

use crate::models::TrustBreakdown;

// Composite weights, summing to 1.0
const W_SOURCE: f64 = 0.25;
const W_METADATA: f64 = 0.25;
const W_AVAILABILITY: f64 = 0.20;
const W_RECOMMENDATION: f64 = 0.15;
const W_PREFERENCE: f64 = 0.15;

/// Raw signals one scored item is judged on. Callers fill what they know;
/// every default is the neutral midpoint so missing signals neither sink
/// nor inflate an item.
#[derive(Debug, Clone)]
pub struct TrustSignals {
    /// Provider uptime over the trailing window, [0, 1]
    pub source_uptime: f64,
    /// How recently the provider's catalog was synced, [0, 1]
    pub source_freshness: f64,
    /// Historical accuracy of this provider's records, [0, 1]
    pub source_historical: f64,
    /// Whether the record came from an official catalog feed
    pub source_official: bool,

    /// Share of expected metadata fields present, [0, 1]
    pub metadata_completeness: f64,
    /// Agreement across sources reporting this item, [0, 1]
    pub metadata_consistency: f64,
    /// Age of the metadata record, [0, 1] where 1 is current
    pub metadata_freshness: f64,

    /// Availability confirmed by a live check this run
    pub availability_confirmed: bool,
    /// When availability was last verified, if ever
    pub availability_checked_at: Option<DateTime<Utc>>,
    /// Share of the user's platforms the item is available on, [0, 1]
    pub platform_coverage: f64,

    /// Relevance reported by the producing agent, [0, 1]
    pub relevance: f64,
    /// Personalization strength behind the item, [0, 1]
    pub personalization: f64,
    /// Fraction of producing agents that agree on this item, [0, 1]
    pub cross_source_agreement: f64,

    /// Match against stated user preferences, [0, 1]
    pub preference_match: f64,
    /// How much interaction history backs the preference signal, [0, 1]
    pub history_depth: f64,

    /// Reference time for recency terms; the pipeline timestamp, not `now`
    pub reference_time: DateTime<Utc>,
}

impl TrustSignals {
    /// Neutral baseline: every component lands at 0.5
    pub fn neutral(reference_time: DateTime<Utc>) -> Self {
        Self {
            source_uptime: 0.5,
            source_freshness: 0.5,
            source_historical: 0.5,
            source_official: false,
            metadata_completeness: 0.5,
            metadata_consistency: 0.5,
            metadata_freshness: 0.5,
            availability_confirmed: false,
            availability_checked_at: None,
            platform_coverage: 0.5,
            relevance: 0.5,
            personalization: 0.5,
            cross_source_agreement: 0.5,
            preference_match: 0.5,
            history_depth: 0.5,
            reference_time,
        }
    }
}

/// Score one item. Every component and the composite are clamped to [0, 1].
pub fn score(signals: &TrustSignals) -> TrustBreakdown {
    let source_reliability = clamp(
        0.3 * signals.source_uptime
            + 0.3 * signals.source_freshness
            + 0.3 * signals.source_historical
            + 0.1 * if signals.source_official { 1.0 } else { 0.0 },
    );

    let metadata_accuracy = clamp(
        0.5 * signals.metadata_completeness
            + 0.3 * signals.metadata_consistency
            + 0.2 * signals.metadata_freshness,
    );

    let availability_confidence = clamp(
        0.6 * if signals.availability_confirmed { 1.0 } else { 0.0 }
            + 0.25 * check_recency(signals)
            + 0.15 * signals.platform_coverage,
    );

    let recommendation_quality = clamp(
        0.5 * signals.relevance
            + 0.3 * signals.personalization
            + 0.2 * signals.cross_source_agreement,
    );

    let preference_confidence =
        clamp(0.6 * signals.preference_match + 0.4 * signals.history_depth);

    let composite = clamp(
        W_SOURCE * source_reliability
            + W_METADATA * metadata_accuracy
            + W_AVAILABILITY * availability_confidence
            + W_RECOMMENDATION * recommendation_quality
            + W_PREFERENCE * preference_confidence,
    );

    TrustBreakdown {
        source_reliability,
        metadata_accuracy,
        availability_confidence,
        recommendation_quality,
        preference_confidence,
        composite,
    }
}

/// 1.0 for a check made this run, decaying to 0 over a day
fn check_recency(signals: &TrustSignals) -> f64 {
    match signals.availability_checked_at {
        Some(checked_at) => {
            let age_secs = (signals.reference_time - checked_at).num_seconds().max(0) as f64;
            clamp(1.0 - age_secs / 86_400.0)
        }
        None => 0.0,
    }
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let signals = TrustSignals::neutral(reference());
        assert_eq!(score(&signals).composite, score(&signals).composite);
    }

    #[test]
    fn test_all_components_clamped_to_unit_interval() {
        let mut signals = TrustSignals::neutral(reference());
        signals.source_uptime = 9.0;
        signals.relevance = -3.0;
        let breakdown = score(&signals);
        for component in [
            breakdown.source_reliability,
            breakdown.metadata_accuracy,
            breakdown.availability_confidence,
            breakdown.recommendation_quality,
            breakdown.preference_confidence,
            breakdown.composite,
        ] {
            assert!((0.0..=1.0).contains(&component), "component {component} out of range");
        }
    }

    #[test]
    fn test_confirmed_availability_beats_unchecked() {
        let reference = reference();
        let mut confirmed = TrustSignals::neutral(reference);
        confirmed.availability_confirmed = true;
        confirmed.availability_checked_at = Some(reference);
        let unchecked = TrustSignals::neutral(reference);

        assert!(
            score(&confirmed).availability_confidence
                > score(&unchecked).availability_confidence
        );
        assert!(score(&confirmed).composite > score(&unchecked).composite);
    }

    #[test]
    fn test_composite_is_the_declared_weighted_sum() {
        let mut signals = TrustSignals::neutral(reference());
        signals.relevance = 0.9;
        signals.metadata_completeness = 0.75;
        let b = score(&signals);
        let expected = 0.25 * b.source_reliability
            + 0.25 * b.metadata_accuracy
            + 0.20 * b.availability_confidence
            + 0.15 * b.recommendation_quality
            + 0.15 * b.preference_confidence;
        assert!((b.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_signals_score_one() {
        let reference = reference();
        let signals = TrustSignals {
            source_uptime: 1.0,
            source_freshness: 1.0,
            source_historical: 1.0,
            source_official: true,
            metadata_completeness: 1.0,
            metadata_consistency: 1.0,
            metadata_freshness: 1.0,
            availability_confirmed: true,
            availability_checked_at: Some(reference),
            platform_coverage: 1.0,
            relevance: 1.0,
            personalization: 1.0,
            cross_source_agreement: 1.0,
            preference_match: 1.0,
            history_depth: 1.0,
            reference_time: reference,
        };
        let breakdown = score(&signals);
        assert!((breakdown.composite - 1.0).abs() < 1e-9);
    }
}
