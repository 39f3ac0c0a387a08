//! Shared helpers for signal generation
//!
//! Swing detection over %b, the confidence model and volume measurements used by
//! every generator (and by the rating service's pattern score).

use serde::{Deserialize, Serialize};

use crate::BandObservation;

// ============================================================
// THRESHOLDS
// ============================================================

/// Minimum distance between the two extrema of a divergence
pub const MIN_EXTREMA_SEPARATION: usize = 3;
/// Volume ratio (latest / average) counted as a confirming surge
pub const VOLUME_SURGE_RATIO: f64 = 1.5;
/// Confidence bounds
pub const CONFIDENCE_MIN: f64 = 0.0;
pub const CONFIDENCE_MAX: f64 = 100.0;

// ============================================================
// CONFIDENCE MODEL
// ============================================================

/// Additive confidence breakdown, `total` clamped to 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub base: f64,
    pub volume_bonus: f64,
    pub pattern_bonus: f64,
    pub trend_bonus: f64,
    pub confirmation_bonus: f64,
    pub total: f64,
}

impl Confidence {
    pub fn new(
        base: f64,
        volume_bonus: f64,
        pattern_bonus: f64,
        trend_bonus: f64,
        confirmation_bonus: f64,
    ) -> Self {
        let total = (base + volume_bonus + pattern_bonus + trend_bonus + confirmation_bonus)
            .clamp(CONFIDENCE_MIN, CONFIDENCE_MAX);
        Self {
            base,
            volume_bonus,
            pattern_bonus,
            trend_bonus,
            confirmation_bonus,
            total,
        }
    }
}

// ============================================================
// VOLUME
// ============================================================

/// Recent volume samples aligned with the tail of the observations
/// (last sample = latest observation) plus an average-volume baseline.
#[derive(Debug, Clone, Copy)]
pub struct VolumeProfile<'a> {
    pub recent: &'a [f64],
    pub average: f64,
}

impl<'a> VolumeProfile<'a> {
    pub fn new(recent: &'a [f64], average: f64) -> Self {
        Self { recent, average }
    }

    /// Volume `offset` observations before the latest.
    #[inline]
    pub fn at(&self, offset: usize) -> Option<f64> {
        let n = self.recent.len();
        (offset < n).then(|| self.recent[n - 1 - offset])
    }

    /// Volume at `offset` relative to the baseline. `None` without a usable baseline.
    #[inline]
    pub fn ratio_at(&self, offset: usize) -> Option<f64> {
        if self.average.is_nan() || self.average <= 0.0 {
            return None;
        }
        self.at(offset).map(|v| v / self.average)
    }

    #[inline]
    pub fn latest_ratio(&self) -> Option<f64> {
        self.ratio_at(0)
    }

    /// Falling least-squares trend over the trailing `window` samples.
    pub fn is_declining(&self, window: usize) -> bool {
        let start = self.recent.len().saturating_sub(window);
        let tail = &self.recent[start..];
        tail.len() >= 2 && crate::trend::linear_slope(tail) < 0.0
    }
}

/// Bonus for a volume surge: scales from 0 at 1x the baseline to `cap` at
/// `1 + cap / per_unit` times the baseline.
#[inline]
pub fn surge_bonus(ratio: Option<f64>, per_unit: f64, cap: f64) -> f64 {
    match ratio {
        Some(r) if r > 1.0 => ((r - 1.0) * per_unit).min(cap),
        _ => 0.0,
    }
}

// ============================================================
// SWING DETECTION
// ============================================================

/// Indices of local %b minima (strictly below the left neighbour, not above the right).
pub fn local_minima(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] < values[i - 1] && values[i] <= values[i + 1])
        .collect()
}

/// Indices of local %b maxima (strictly above the left neighbour, not below the right).
pub fn local_maxima(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] >= values[i + 1])
        .collect()
}

/// The two most recent extrema, provided they are at least `min_separation` apart.
pub fn last_pair(indices: &[usize], min_separation: usize) -> Option<(usize, usize)> {
    match indices {
        [.., first, second] if first + min_separation <= *second => Some((*first, *second)),
        _ => None,
    }
}

/// A pair of swings in %b and price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPair {
    /// Index of the first swing within the analyzed slice
    pub first: usize,
    /// Index of the second swing within the analyzed slice
    pub second: usize,
    pub first_percent_b: f64,
    pub second_percent_b: f64,
    pub first_close: f64,
    pub second_close: f64,
}

impl SwingPair {
    fn from_indices(observations: &[BandObservation], (first, second): (usize, usize)) -> Self {
        Self {
            first,
            second,
            first_percent_b: observations[first].percent_b,
            second_percent_b: observations[second].percent_b,
            first_close: observations[first].close,
            second_close: observations[second].close,
        }
    }

    /// Second %b low higher while price made an equal or lower low.
    #[inline]
    pub fn is_bullish_divergence(&self) -> bool {
        self.second_percent_b > self.first_percent_b && self.second_close <= self.first_close
    }

    /// Second %b high lower while price made an equal or higher high.
    #[inline]
    pub fn is_bearish_divergence(&self) -> bool {
        self.second_percent_b < self.first_percent_b && self.second_close >= self.first_close
    }

    #[inline]
    pub fn percent_b_gap(&self) -> f64 {
        (self.second_percent_b - self.first_percent_b).abs()
    }
}

/// Latest pair of %b lows in `observations`.
pub fn last_low_pair(observations: &[BandObservation], min_separation: usize) -> Option<SwingPair> {
    let pbs: Vec<f64> = observations.iter().map(|o| o.percent_b).collect();
    last_pair(&local_minima(&pbs), min_separation)
        .map(|pair| SwingPair::from_indices(observations, pair))
}

/// Latest pair of %b highs in `observations`.
pub fn last_high_pair(
    observations: &[BandObservation],
    min_separation: usize,
) -> Option<SwingPair> {
    let pbs: Vec<f64> = observations.iter().map(|o| o.percent_b).collect();
    last_pair(&local_maxima(&pbs), min_separation)
        .map(|pair| SwingPair::from_indices(observations, pair))
}

/// Trailing `window` observations.
#[inline]
pub fn tail(observations: &[BandObservation], window: usize) -> &[BandObservation] {
    &observations[observations.len().saturating_sub(window)..]
}

// ============================================================
// TESTS
// ============================================================
