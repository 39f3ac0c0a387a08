//! Divergence reversal: W-bottoms and M-tops
//!
//! A W-bottom is a second price low at or below the first while the second %b low
//! sits higher than the first. An M-top mirrors it at the highs.

use serde::{Deserialize, Serialize};

use super::helpers::{last_high_pair, last_low_pair, surge_bonus, tail, Confidence, SwingPair};
use super::{BBSignal, GeneratorId, SignalContext, SignalGenerator, SignalPattern};
use crate::{trend::TrendAnalyzer, AnalysisError, Direction, Period, Result};

impl_with_defaults!(DivergenceReversal);

const BASE_CONFIDENCE: f64 = 60.0;
const VOLUME_CAP: f64 = 20.0;
const MAGNITUDE_PER_UNIT: f64 = 50.0;
const MAGNITUDE_CAP: f64 = 15.0;
const TREND_CONTEXT_BONUS: f64 = 10.0;
const CONFIRMATION_BONUS: f64 = 5.0;

/// %b divergence at a double bottom or double top
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceReversal {
    /// Observations searched for swings
    pub lookback: Period,
    /// Minimum observations between the two swings
    pub min_separation: Period,
    /// Maximum observations between the second swing and the latest
    pub max_signal_age: Period,
}

impl Default for DivergenceReversal {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(30),
            min_separation: Period::new_const(super::helpers::MIN_EXTREMA_SEPARATION),
            max_signal_age: Period::new_const(5),
        }
    }
}

impl DivergenceReversal {
    pub fn validate(&self) -> Result<()> {
        if self.lookback.get() < self.min_separation.get() + 3 {
            return Err(AnalysisError::InvalidConfig(
                "divergence.lookback must leave room for two separated swings".into(),
            ));
        }
        Ok(())
    }

    fn build(
        &self,
        ctx: &SignalContext<'_>,
        pair: &SwingPair,
        direction: Direction,
        window: &[crate::BandObservation],
    ) -> Option<BBSignal> {
        let latest = window.last()?;

        let volume_ratio = ctx.latest_volume_ratio();
        let volume_bonus = surge_bonus(volume_ratio, VOLUME_CAP, VOLUME_CAP);
        let pattern_bonus = (pair.percent_b_gap() * MAGNITUDE_PER_UNIT).min(MAGNITUDE_CAP);

        // Reversal patterns need a prior move to reverse.
        let prior_trend = TrendAnalyzer::new(*ctx.trend)
            .analyze(&window[..=pair.first])
            .map(|r| r.state.direction());
        let trend_bonus = if prior_trend == Some(direction.opposite()) {
            TREND_CONTEXT_BONUS
        } else {
            0.0
        };

        let moved_off_swing = match direction {
            Direction::Bullish => latest.percent_b > pair.second_percent_b,
            _ => latest.percent_b < pair.second_percent_b,
        };
        let confirmation_bonus = if moved_off_swing {
            CONFIRMATION_BONUS
        } else {
            0.0
        };

        let confidence = Confidence::new(
            BASE_CONFIDENCE,
            volume_bonus,
            pattern_bonus,
            trend_bonus,
            confirmation_bonus,
        );

        let (pattern, target, stop) = match direction {
            Direction::Bullish => (SignalPattern::WBottom, latest.upper_band, latest.lower_band),
            _ => (SignalPattern::MTop, latest.lower_band, latest.upper_band),
        };

        Some(
            BBSignal::at_latest(ctx, latest, pattern, confidence)
                .with_volume(volume_ratio)
                .with_levels(target, stop),
        )
    }
}

impl SignalGenerator for DivergenceReversal {
    fn id(&self) -> GeneratorId {
        GeneratorId("divergence_reversal")
    }

    fn min_observations(&self) -> usize {
        self.min_separation.get() + 3
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> Option<BBSignal> {
        let window = tail(ctx.observations, self.lookback.get());
        let last = window.len().checked_sub(1)?;
        let min_sep = self.min_separation.get();
        let fresh = |p: &SwingPair| last - p.second <= self.max_signal_age.get();

        let bottom = last_low_pair(window, min_sep)
            .filter(|p| p.is_bullish_divergence() && fresh(p));
        let top = last_high_pair(window, min_sep)
            .filter(|p| p.is_bearish_divergence() && fresh(p));

        // Both present: the more recent second swing wins.
        let (pair, direction) = match (bottom, top) {
            (Some(b), Some(t)) if t.second > b.second => (t, Direction::Bearish),
            (Some(b), _) => (b, Direction::Bullish),
            (None, Some(t)) => (t, Direction::Bearish),
            (None, None) => return None,
        };

        self.build(ctx, &pair, direction, window)
    }

    fn validate_config(&self) -> Result<()> {
        self.validate()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{TrendConfig, VolatilityThresholds},
        signals::{SignalType, VolumeProfile},
        BandObservation,
    };
    use chrono::NaiveDate;

    fn series(pbs: &[f64], closes: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        pbs.iter()
            .zip(closes)
            .enumerate()
            .map(|(i, (&pb, &close))| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close,
                upper_band: close + 4.0,
                middle_band: close + 2.0,
                lower_band: close - 2.0,
                percent_b: pb,
                bandwidth: 6.0,
                bandwidth_percentile: 50.0,
            })
            .collect()
    }

    fn evaluate(
        observations: &[BandObservation],
        volume: Option<VolumeProfile<'_>>,
    ) -> Option<BBSignal> {
        let thresholds = VolatilityThresholds::default();
        let trend = TrendConfig::default();
        let ctx = SignalContext {
            symbol: "W",
            observations,
            volume,
            volatility: &thresholds,
            trend: &trend,
        };
        DivergenceReversal::default().evaluate(&ctx)
    }

    const W_PB: [f64; 12] = [0.5, 0.3, 0.1, -0.1, 0.15, 0.35, 0.5, 0.4, 0.2, 0.1, 0.25, 0.4];
    const W_CLOSE: [f64; 12] = [
        100.0, 98.0, 96.0, 94.0, 96.0, 98.0, 99.0, 97.0, 95.0, 93.0, 95.0, 97.0,
    ];

    #[test]
    fn test_w_bottom() {
        let obs = series(&W_PB, &W_CLOSE);
        let signal = evaluate(&obs, None).unwrap();
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(signal.pattern, SignalPattern::WBottom);
        assert_eq!(signal.confidence.base, 60.0);
        assert!((signal.confidence.pattern_bonus - 10.0).abs() < 1e-9);
        assert_eq!(signal.confidence.trend_bonus, 10.0);
        assert_eq!(signal.confidence.confirmation_bonus, 5.0);
        assert!((signal.confidence.total - 85.0).abs() < 1e-9);
        assert_eq!(signal.target, Some(obs[11].upper_band));
        assert_eq!(signal.stop, Some(obs[11].lower_band));
        assert!(!signal.volume_confirmed);
    }

    #[test]
    fn test_w_bottom_volume_surge() {
        let obs = series(&W_PB, &W_CLOSE);
        let volumes = [1_000.0, 1_000.0, 2_000.0];
        let signal = evaluate(&obs, Some(VolumeProfile::new(&volumes, 1_000.0))).unwrap();
        assert_eq!(signal.confidence.volume_bonus, 20.0);
        assert!(signal.volume_confirmed);
        assert_eq!(signal.volume_ratio, Some(2.0));
        assert_eq!(signal.confidence.total, 100.0);
    }

    #[test]
    fn test_higher_price_low_is_not_divergence() {
        let mut closes = W_CLOSE;
        closes[9] = 95.5;
        assert!(evaluate(&series(&W_PB, &closes), None).is_none());
    }

    #[test]
    fn test_m_top() {
        let pbs: Vec<f64> = W_PB.iter().map(|pb| 1.0 - pb).collect();
        let closes: Vec<f64> = W_CLOSE.iter().map(|c| 200.0 - c).collect();
        let signal = evaluate(&series(&pbs, &closes), None).unwrap();
        assert_eq!(signal.signal_type, SignalType::Sell);
        assert_eq!(signal.pattern, SignalPattern::MTop);
        assert!(signal.confidence.total >= 60.0);
    }

    #[test]
    fn test_stale_swing_ignored() {
        let mut pbs = W_PB.to_vec();
        let mut closes = W_CLOSE.to_vec();
        for i in 0..6 {
            pbs.push(0.45 + 0.05 * i as f64);
            closes.push(98.0 + i as f64);
        }
        assert!(evaluate(&series(&pbs, &closes), None).is_none());
    }
}
