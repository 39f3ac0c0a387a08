//! Pullback continuation
//!
//! An established trend whose %b has pulled back into the middle zone from the
//! trend side. The same setup detection drives the pullback scanners.

use serde::{Deserialize, Serialize};

use super::helpers::{tail, Confidence, VOLUME_SURGE_RATIO};
use super::{BBSignal, GeneratorId, SignalContext, SignalGenerator, SignalPattern};
use crate::{AnalysisError, BandObservation, Direction, Period, Ratio, Result};

impl_with_defaults!(PullbackContinuation);

const BASE_CONFIDENCE: f64 = 55.0;
const DECLINING_VOLUME_BONUS: f64 = 10.0;
const HEAVY_VOLUME_PENALTY: f64 = -5.0;
const SHALLOW_DEPTH: f64 = 0.3;
const MODERATE_DEPTH: f64 = 0.5;
const SLOW_VELOCITY: f64 = 0.1;
const TREND_SHARE_CAP: f64 = 15.0;
const TOUCH_BONUS_MIN: usize = 3;
/// Velocity at which the velocity component of setup quality reaches zero
const VELOCITY_SCALE: f64 = 0.5;

/// Retracement to the middle band inside a trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullbackContinuation {
    /// Observations that establish the trend
    pub lookback: Period,
    /// Share of the lookback on the trend side of 0.5
    pub min_trend_share: Ratio,
    /// Observations before the latest that must contain the departure point
    pub arrival_window: Period,
    pub zone_low: Ratio,
    pub zone_high: Ratio,
    /// %b counted as a band touch (mirrored for downtrends)
    pub touch_level: Ratio,
    pub min_touches: usize,
}

impl Default for PullbackContinuation {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            min_trend_share: Ratio::new_const(0.6),
            arrival_window: Period::new_const(5),
            zone_low: Ratio::new_const(0.4),
            zone_high: Ratio::new_const(0.6),
            touch_level: Ratio::new_const(0.95),
            min_touches: 0,
        }
    }
}

impl PullbackContinuation {
    pub fn validate(&self) -> Result<()> {
        let (low, high) = (self.zone_low.get(), self.zone_high.get());
        if !(low < high && low <= 0.5 && 0.5 <= high) {
            return Err(AnalysisError::InvalidConfig(
                "pullback zone must satisfy zone_low < zone_high and contain 0.5".into(),
            ));
        }
        if self.touch_level.get() <= high {
            return Err(AnalysisError::InvalidConfig(
                "pullback.touch_level must lie above zone_high".into(),
            ));
        }
        if self.arrival_window >= self.lookback {
            return Err(AnalysisError::InvalidConfig(
                "pullback.arrival_window must be shorter than lookback".into(),
            ));
        }
        if self.min_touches > self.lookback.get() {
            return Err(AnalysisError::InvalidConfig(
                "pullback.min_touches must not exceed lookback".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// SETUP DETECTION
// ============================================================

/// A detected pullback inside a trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PullbackSetup {
    pub direction: Direction,
    /// Share of the lookback on the trend side of 0.5
    pub trend_share: f64,
    /// Band touches on the trend side within the lookback
    pub touches: usize,
    /// Most extreme %b in the arrival window
    pub peak_percent_b: f64,
    /// %b retraced from the peak
    pub depth: f64,
    pub bars_since_peak: usize,
    /// Depth per observation
    pub velocity: f64,
    pub percent_b: f64,
}

impl PullbackSetup {
    /// 0..=100: trend share 40%, shallowness 30%, slowness 15%, touches 15%.
    pub fn quality(&self) -> f64 {
        let shallow = (1.0 - self.depth).clamp(0.0, 1.0);
        let slow = (1.0 - self.velocity / VELOCITY_SCALE).clamp(0.0, 1.0);
        let touches = (self.touches.min(TOUCH_BONUS_MIN) as f64) / TOUCH_BONUS_MIN as f64;
        (self.trend_share * 40.0 + shallow * 30.0 + slow * 15.0 + touches * 15.0).clamp(0.0, 100.0)
    }
}

/// Pullback in `direction` ending at the latest observation.
pub fn find_pullback(
    observations: &[BandObservation],
    direction: Direction,
    params: &PullbackContinuation,
) -> Option<PullbackSetup> {
    let n = observations.len();
    if n < 2 || direction == Direction::Neutral {
        return None;
    }
    let bullish = direction.is_bullish();
    let latest = &observations[n - 1];
    let pb = latest.percent_b;
    if !(params.zone_low.get()..=params.zone_high.get()).contains(&pb) {
        return None;
    }

    let window = tail(observations, params.lookback.get());
    let on_trend_side = window
        .iter()
        .filter(|o| if bullish { o.percent_b > 0.5 } else { o.percent_b < 0.5 })
        .count();
    let trend_share = on_trend_side as f64 / window.len() as f64;
    if trend_share < params.min_trend_share.get() {
        return None;
    }

    let arrival_start = (n - 1).saturating_sub(params.arrival_window.get());
    let (peak_index, peak) = observations[arrival_start..n - 1]
        .iter()
        .enumerate()
        .map(|(i, o)| (arrival_start + i, o.percent_b))
        .reduce(|best, cur| {
            let better = if bullish { cur.1 > best.1 } else { cur.1 < best.1 };
            if better {
                cur
            } else {
                best
            }
        })?;
    let departed = if bullish {
        peak > params.zone_high.get()
    } else {
        peak < params.zone_low.get()
    };
    if !departed {
        return None;
    }

    let touch = params.touch_level.get();
    let touches = window
        .iter()
        .filter(|o| {
            if bullish {
                o.percent_b >= touch
            } else {
                o.percent_b <= 1.0 - touch
            }
        })
        .count();
    if touches < params.min_touches {
        return None;
    }

    let bars_since_peak = n - 1 - peak_index;
    let depth = (peak - pb).abs();
    Some(PullbackSetup {
        direction,
        trend_share,
        touches,
        peak_percent_b: peak,
        depth,
        bars_since_peak,
        velocity: depth / bars_since_peak as f64,
        percent_b: pb,
    })
}

// ============================================================
// GENERATOR
// ============================================================

impl SignalGenerator for PullbackContinuation {
    fn id(&self) -> GeneratorId {
        GeneratorId("pullback_continuation")
    }

    fn min_observations(&self) -> usize {
        self.arrival_window.get() + 1
    }

    fn evaluate(&self, ctx: &SignalContext<'_>) -> Option<BBSignal> {
        let observations = ctx.observations;
        let latest = observations.last()?;

        let bull = find_pullback(observations, Direction::Bullish, self);
        let bear = find_pullback(observations, Direction::Bearish, self);
        let setup = match (bull, bear) {
            (Some(b), Some(s)) if s.quality() > b.quality() => s,
            (Some(b), _) => b,
            (None, Some(s)) => s,
            (None, None) => return None,
        };
        let bullish = setup.direction.is_bullish();

        let volume_ratio = ctx.latest_volume_ratio();
        let declining = ctx
            .volume
            .is_some_and(|v| v.is_declining(self.arrival_window.get() + 1));
        let volume_bonus = if declining {
            DECLINING_VOLUME_BONUS
        } else if volume_ratio.is_some_and(|r| r > VOLUME_SURGE_RATIO) {
            HEAVY_VOLUME_PENALTY
        } else {
            0.0
        };

        let mut pattern_bonus = if setup.depth <= SHALLOW_DEPTH {
            10.0
        } else if setup.depth <= MODERATE_DEPTH {
            5.0
        } else {
            0.0
        };
        if setup.velocity <= SLOW_VELOCITY {
            pattern_bonus += 5.0;
        }

        let min_share = self.min_trend_share.get();
        let share_scale = if min_share < 1.0 {
            ((setup.trend_share - min_share) / (1.0 - min_share)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let mut trend_bonus = share_scale * TREND_SHARE_CAP;
        if setup.touches >= TOUCH_BONUS_MIN {
            trend_bonus += 5.0;
        }

        // Turning back in the trend direction.
        let turned = observations.len() >= 2 && {
            let previous = observations[observations.len() - 2].percent_b;
            if bullish {
                latest.percent_b > previous
            } else {
                latest.percent_b < previous
            }
        };
        let confirmation_bonus = if turned { 5.0 } else { 0.0 };

        let confidence = Confidence::new(
            BASE_CONFIDENCE,
            volume_bonus,
            pattern_bonus,
            trend_bonus,
            confirmation_bonus,
        );
        let (pattern, target, stop) = if bullish {
            (SignalPattern::BullishPullback, latest.upper_band, latest.lower_band)
        } else {
            (SignalPattern::BearishPullback, latest.lower_band, latest.upper_band)
        };

        Some(
            BBSignal::at_latest(ctx, latest, pattern, confidence)
                .with_volume(volume_ratio)
                .with_levels(target, stop),
        )
    }

    fn validate_config(&self) -> Result<()> {
        self.validate()
    }
}

// ============================================================
// TESTS
// ============================================================
