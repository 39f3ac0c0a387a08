//! Squeeze breakout and headfake
//!
//! A breakout needs several squeeze observations shortly before the latest,
//! expanding bandwidth, and %b beyond a trigger level. A headfake (a band break out
//! of a squeeze that reverses through the middle band) takes precedence and trades
//! against the initial break at a higher base confidence.

use serde::{Deserialize, Serialize};

use super::helpers::{surge_bonus, Confidence};
use super::{BBSignal, GeneratorId, SignalContext, SignalGenerator, SignalPattern};
use crate::{
    volatility::{Headfake, VolatilityClassifier, VolatilityState},
    AnalysisError, BandObservation, Direction, Period, Ratio, Result,
};

impl_with_defaults!(SqueezeBreakout);

const BREAKOUT_BASE: f64 = 55.0;
const HEADFAKE_BASE: f64 = 65.0;
const VOLUME_CAP: f64 = 20.0;
const SQUEEZE_BAR_BONUS: f64 = 1.5;
const SQUEEZE_BONUS_CAP: f64 = 15.0;
const EXPANSION_PER_UNIT: f64 = 20.0;
const EXPANSION_CAP: f64 = 10.0;
const BAND_CLOSE_BONUS: f64 = 10.0;

/// Breakout from a volatility squeeze
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqueezeBreakout {
    /// Observations before the latest searched for squeeze bars
    pub squeeze_lookback: Period,
    pub min_squeeze_bars: Period,
    /// %b above which an expansion counts as an upside breakout
    pub upper_trigger: Ratio,
    /// %b below which an expansion counts as a downside breakout
    pub lower_trigger: Ratio,
    /// Maximum observations since a headfake reversal for it to be reported
    pub max_headfake_age: Period,
}

impl Default for SqueezeBreakout {
    fn default() -> Self {
        Self {
            squeeze_lookback: Period::new_const(15),
            min_squeeze_bars: Period::new_const(3),
            upper_trigger: Ratio::new_const(0.7),
            lower_trigger: Ratio::new_const(0.3),
            max_headfake_age: Period::new_const(5),
        }
    }
}

impl SqueezeBreakout {
    pub fn validate(&self) -> Result<()> {
        if self.min_squeeze_bars > self.squeeze_lookback {
            return Err(AnalysisError::InvalidConfig(
                "squeeze_breakout.min_squeeze_bars must not exceed squeeze_lookback".into(),
            ));
        }
        if self.lower_trigger.get() >= self.upper_trigger.get() {
            return Err(AnalysisError::InvalidConfig(
                "squeeze_breakout.lower_trigger must be below upper_trigger".into(),
            ));
        }
        Ok(())
    }

    fn headfake_signal(
        &self,
        ctx: &SignalContext<'_>,
        latest: &BandObservation,
        headfake: &Headfake,
    ) -> BBSignal {
        let direction = headfake.trade_direction();
        let volume_ratio = ctx.latest_volume_ratio();
        let volume_bonus = surge_bonus(volume_ratio, VOLUME_CAP, VOLUME_CAP);

        // Deeper false breaks trap more traders.
        let overshoot = match headfake.initial_direction {
            Direction::Bullish => headfake.break_percent_b - 1.0,
            _ => -headfake.break_percent_b,
        };
        let pattern_bonus = (overshoot * 50.0).clamp(0.0, 10.0);

        let trend_bonus = match headfake.bars_to_reversal {
            0..=3 => 10.0,
            4..=6 => 5.0,
            _ => 0.0,
        };

        let confirmed = match direction {
            Direction::Bullish => latest.percent_b > self.upper_trigger.get(),
            _ => latest.percent_b < self.lower_trigger.get(),
        };
        let confirmation_bonus = if confirmed { BAND_CLOSE_BONUS } else { 0.0 };

        let confidence = Confidence::new(
            HEADFAKE_BASE,
            volume_bonus,
            pattern_bonus,
            trend_bonus,
            confirmation_bonus,
        );
        let (pattern, target, stop) = match direction {
            Direction::Bullish => (
                SignalPattern::BullishHeadfake,
                latest.upper_band,
                latest.lower_band,
            ),
            _ => (
                SignalPattern::BearishHeadfake,
                latest.lower_band,
                latest.upper_band,
            ),
        };

        BBSignal::at_latest(ctx, latest, pattern, confidence)
            .with_volume(volume_ratio)
            .with_levels(target, stop)
    }
}

impl SignalGenerator for SqueezeBreakout {
    fn id(&self) -> GeneratorId {
        GeneratorId("squeeze_breakout")
    }

    fn min_observations(&self) -> usize {
        self.min_squeeze_bars.get() + 1
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> Option<BBSignal> {
        let observations = ctx.observations;
        let n = observations.len();
        let latest = observations.last()?;
        let classifier = VolatilityClassifier::new(*ctx.volatility);

        if let Some(headfake) = classifier.detect_headfake(observations) {
            if headfake.bars_since_reversal <= self.max_headfake_age.get() {
                return Some(self.headfake_signal(ctx, latest, &headfake));
            }
        }

        if n < 2 {
            return None;
        }
        let previous = &observations[n - 2];
        let start = (n - 1).saturating_sub(self.squeeze_lookback.get());
        let squeeze_bars = observations[start..n - 1]
            .iter()
            .filter(|o| classifier.classify(o.bandwidth_percentile) == VolatilityState::Squeeze)
            .count();
        if squeeze_bars < self.min_squeeze_bars.get() {
            return None;
        }
        if latest.bandwidth <= previous.bandwidth {
            return None;
        }

        let direction = if latest.percent_b > self.upper_trigger.get() {
            Direction::Bullish
        } else if latest.percent_b < self.lower_trigger.get() {
            Direction::Bearish
        } else {
            return None;
        };

        let volume_ratio = ctx.latest_volume_ratio();
        let volume_bonus = surge_bonus(volume_ratio, VOLUME_CAP, VOLUME_CAP);
        let pattern_bonus = (squeeze_bars as f64 * SQUEEZE_BAR_BONUS).min(SQUEEZE_BONUS_CAP);
        let trend_bonus = if previous.bandwidth > 0.0 {
            ((latest.bandwidth / previous.bandwidth - 1.0) * EXPANSION_PER_UNIT).min(EXPANSION_CAP)
        } else {
            EXPANSION_CAP
        };
        let closed_outside = match direction {
            Direction::Bullish => latest.percent_b > 1.0,
            _ => latest.percent_b < 0.0,
        };
        let confirmation_bonus = if closed_outside { BAND_CLOSE_BONUS } else { 0.0 };

        let confidence = Confidence::new(
            BREAKOUT_BASE,
            volume_bonus,
            pattern_bonus,
            trend_bonus,
            confirmation_bonus,
        );

        // Measured move of one band half-width beyond the breakout band.
        let half = latest.half_width();
        let (pattern, target) = match direction {
            Direction::Bullish => (SignalPattern::SqueezeBreakoutUp, latest.upper_band + half),
            _ => (SignalPattern::SqueezeBreakoutDown, latest.lower_band - half),
        };

        Some(
            BBSignal::at_latest(ctx, latest, pattern, confidence)
                .with_volume(volume_ratio)
                .with_levels(target, latest.middle_band),
        )
    }

    fn validate_config(&self) -> Result<()> {
        self.validate()
    }
}

// ============================================================
// TESTS
// ============================================================
