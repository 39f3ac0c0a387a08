//! Mean reversion after a band breach
//!
//! %b closed outside a band within the breach window and has since recovered part
//! of the way back toward the middle band.

use serde::{Deserialize, Serialize};

use super::helpers::{Confidence, VOLUME_SURGE_RATIO};
use super::{BBSignal, GeneratorId, SignalContext, SignalGenerator, SignalPattern};
use crate::{
    trend::{BandSide, TrendAnalyzer},
    AnalysisError, Period, Ratio, Result,
};

impl_with_defaults!(MeanReversion);

const BASE_CONFIDENCE: f64 = 55.0;
const EXTREMITY_PER_UNIT: f64 = 50.0;
const EXTREMITY_CAP: f64 = 20.0;
const CLIMAX_VOLUME_BONUS: f64 = 10.0;
const BAND_WALK_PENALTY: f64 = -10.0;
const NO_WALK_BONUS: f64 = 5.0;
const BACK_INSIDE_BONUS: f64 = 5.0;

/// Recovery from an oversold or overbought breach
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversion {
    /// Observations before the latest searched for a breach
    pub breach_lookback: Period,
    /// %b recovered from the extreme before a signal fires
    pub min_recovery: Ratio,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self {
            breach_lookback: Period::new_const(5),
            min_recovery: Ratio::new_const(0.1),
        }
    }
}

impl MeanReversion {
    pub fn validate(&self) -> Result<()> {
        if self.min_recovery.get() >= 0.5 {
            return Err(AnalysisError::InvalidConfig(
                "mean_reversion.min_recovery must be below 0.5".into(),
            ));
        }
        Ok(())
    }
}

/// Band breach found in the breach window
#[derive(Debug, Clone, Copy)]
struct Breach {
    index: usize,
    percent_b: f64,
    oversold: bool,
}

impl Breach {
    /// %b distance beyond the breached band
    fn depth(&self) -> f64 {
        if self.oversold {
            -self.percent_b
        } else {
            self.percent_b - 1.0
        }
    }
}

impl SignalGenerator for MeanReversion {
    fn id(&self) -> GeneratorId {
        GeneratorId("mean_reversion")
    }

    fn min_observations(&self) -> usize {
        2
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> Option<BBSignal> {
        let observations = ctx.observations;
        let n = observations.len();
        if n < 2 {
            return None;
        }
        let latest = &observations[n - 1];
        let previous = &observations[n - 2];
        let pb = latest.percent_b;
        let recovery = self.min_recovery.get();

        let start = (n - 1).saturating_sub(self.breach_lookback.get());
        let window = observations[start..n - 1].iter().enumerate();
        let lowest = window
            .clone()
            .min_by(|a, b| a.1.percent_b.total_cmp(&b.1.percent_b))
            .map(|(i, o)| (start + i, o.percent_b));
        let highest = window
            .max_by(|a, b| a.1.percent_b.total_cmp(&b.1.percent_b))
            .map(|(i, o)| (start + i, o.percent_b));

        let oversold = lowest
            .filter(|&(_, low)| {
                low < 0.0 && pb >= low + recovery && pb < 0.5 && pb > previous.percent_b
            })
            .map(|(index, percent_b)| Breach {
                index,
                percent_b,
                oversold: true,
            });
        let overbought = highest
            .filter(|&(_, high)| {
                high > 1.0 && pb <= high - recovery && pb > 0.5 && pb < previous.percent_b
            })
            .map(|(index, percent_b)| Breach {
                index,
                percent_b,
                oversold: false,
            });

        // Both present: the more recent extreme wins.
        let breach = match (oversold, overbought) {
            (Some(o), Some(b)) if b.index > o.index => b,
            (Some(o), _) => o,
            (None, Some(b)) => b,
            (None, None) => return None,
        };

        let pattern_bonus = (breach.depth() * EXTREMITY_PER_UNIT).min(EXTREMITY_CAP);

        let climax = ctx
            .volume_ratio_at(n - 1 - breach.index)
            .is_some_and(|r| r >= VOLUME_SURGE_RATIO);
        let volume_bonus = if climax { CLIMAX_VOLUME_BONUS } else { 0.0 };

        // Walking the breached band means the move is trending, not stretched.
        let breached_side = if breach.oversold {
            BandSide::Lower
        } else {
            BandSide::Upper
        };
        let walking = TrendAnalyzer::new(*ctx.trend).band_walking(observations);
        let trend_bonus = if walking == Some(breached_side) {
            BAND_WALK_PENALTY
        } else {
            NO_WALK_BONUS
        };

        let confirmation_bonus = if (0.0..=1.0).contains(&pb) {
            BACK_INSIDE_BONUS
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
        let half = latest.half_width();
        let (pattern, stop) = if breach.oversold {
            (SignalPattern::OversoldReversion, latest.lower_band - 0.5 * half)
        } else {
            (SignalPattern::OverboughtReversion, latest.upper_band + 0.5 * half)
        };

        Some(
            BBSignal::at_latest(ctx, latest, pattern, confidence)
                .with_volume(ctx.latest_volume_ratio())
                .with_levels(latest.middle_band, stop),
        )
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

    const OVERSOLD: [f64; 9] = [0.5, 0.45, 0.4, 0.35, 0.3, -0.2, 0.05, 0.2, 0.3];

    fn series(pbs: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        pbs.iter()
            .enumerate()
            .map(|(i, &pb)| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close: 96.0 + 8.0 * pb,
                upper_band: 104.0,
                middle_band: 100.0,
                lower_band: 96.0,
                percent_b: pb,
                bandwidth: 8.0,
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
            symbol: "MR",
            observations,
            volume,
            volatility: &thresholds,
            trend: &trend,
        };
        MeanReversion::default().evaluate(&ctx)
    }

    #[test]
    fn test_oversold_recovery() {
        let signal = evaluate(&series(&OVERSOLD), None).unwrap();
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(signal.pattern, SignalPattern::OversoldReversion);
        assert!((signal.confidence.pattern_bonus - 10.0).abs() < 1e-9);
        assert_eq!(signal.confidence.trend_bonus, 5.0);
        assert_eq!(signal.confidence.confirmation_bonus, 5.0);
        assert!((signal.confidence.total - 75.0).abs() < 1e-9);
        assert_eq!(signal.target, Some(100.0));
        assert_eq!(signal.stop, Some(94.0));
    }

    #[test]
    fn test_climax_volume_at_extreme() {
        let volumes = [
            1_000.0, 1_000.0, 1_000.0, 1_000.0, 1_000.0, 3_000.0, 1_200.0, 1_000.0, 900.0,
        ];
        let signal =
            evaluate(&series(&OVERSOLD), Some(VolumeProfile::new(&volumes, 1_000.0))).unwrap();
        assert_eq!(signal.confidence.volume_bonus, 10.0);
        assert!(!signal.volume_confirmed);
    }

    #[test]
    fn test_lower_band_walk_penalized() {
        let pbs = [0.5, 0.4, 0.3, 0.2, 0.1, -0.2, -0.1, 0.1, 0.25];
        let signal = evaluate(&series(&pbs), None).unwrap();
        assert_eq!(signal.confidence.trend_bonus, -10.0);
        assert!((signal.confidence.total - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_overbought_mirror() {
        let pbs: Vec<f64> = OVERSOLD.iter().map(|pb| 1.0 - pb).collect();
        let signal = evaluate(&series(&pbs), None).unwrap();
        assert_eq!(signal.signal_type, SignalType::Sell);
        assert_eq!(signal.pattern, SignalPattern::OverboughtReversion);
        assert_eq!(signal.stop, Some(106.0));
    }

    #[test]
    fn test_requires_improvement() {
        let pbs = [0.5, 0.45, 0.4, 0.35, 0.3, -0.2, 0.05, 0.2, 0.15];
        assert!(evaluate(&series(&pbs), None).is_none());
    }

    #[test]
    fn test_stale_breach_ignored() {
        let pbs = [0.5, -0.2, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3];
        assert!(evaluate(&series(&pbs), None).is_none());
    }
}
