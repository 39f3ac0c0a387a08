//! Trend analyzer
//!
//! Classifies the trailing %b history into a [`TrendState`], measures its strength
//! and duration, detects band walking and reports the %b momentum slope.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    bands::{mean, population_std_dev},
    config::TrendConfig,
    BandObservation, Direction,
};

/// %b at or above which an observation touches the upper band for walking purposes
const WALK_UPPER: f64 = 0.9;
/// %b at or below which an observation touches the lower band for walking purposes
const WALK_LOWER: f64 = 0.1;

/// Trend classification of the %b window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendState {
    StrongUptrend,
    Uptrend,
    Neutral,
    Downtrend,
    StrongDowntrend,
}

impl TrendState {
    #[inline]
    pub fn direction(self) -> Direction {
        match self {
            TrendState::StrongUptrend | TrendState::Uptrend => Direction::Bullish,
            TrendState::Neutral => Direction::Neutral,
            TrendState::Downtrend | TrendState::StrongDowntrend => Direction::Bearish,
        }
    }

    #[inline]
    pub fn is_up(self) -> bool {
        self.direction().is_bullish()
    }

    #[inline]
    pub fn is_down(self) -> bool {
        self.direction().is_bearish()
    }

    #[inline]
    pub fn is_strong(self) -> bool {
        matches!(self, TrendState::StrongUptrend | TrendState::StrongDowntrend)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrendState::StrongUptrend => "strong_uptrend",
            TrendState::Uptrend => "uptrend",
            TrendState::Neutral => "neutral",
            TrendState::Downtrend => "downtrend",
            TrendState::StrongDowntrend => "strong_downtrend",
        }
    }
}

impl std::fmt::Display for TrendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Band being walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandSide {
    Upper,
    Lower,
}

/// Trend classification of the latest observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReading {
    pub date: NaiveDate,
    pub state: TrendState,
    /// 0..=100
    pub strength: f64,
    pub days_in_trend: usize,
    /// `Some(side)` while price walks a band
    pub band_walking: Option<BandSide>,
    pub average_percent_b: f64,
    /// Least-squares %b slope per observation over the slope window
    pub slope: f64,
}

impl TrendReading {
    #[inline]
    pub fn is_band_walking(&self) -> bool {
        self.band_walking.is_some()
    }
}

/// Least-squares slope of `values` against their index. Zero for fewer than two values.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// %b slope over the trailing `window` observations
pub fn percent_b_slope(observations: &[BandObservation], window: usize) -> f64 {
    let start = observations.len().saturating_sub(window);
    let values: Vec<f64> = observations[start..].iter().map(|o| o.percent_b).collect();
    linear_slope(&values)
}

// ============================================================
// ANALYZER
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendAnalyzer {
    pub config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Analyze the trailing window. Uses fewer observations when the history is short.
    pub fn analyze(&self, observations: &[BandObservation]) -> Option<TrendReading> {
        let latest = observations.last()?;
        let start = observations.len().saturating_sub(self.config.lookback.get());
        let window: Vec<f64> = observations[start..].iter().map(|o| o.percent_b).collect();

        let average = mean(&window);
        let state = self.classify(&window, average);

        Some(TrendReading {
            date: latest.date,
            state,
            strength: self.strength(&window, average, state),
            days_in_trend: self.days_in_trend(observations, state),
            band_walking: self.band_walking(observations),
            average_percent_b: average,
            slope: percent_b_slope(observations, self.config.slope_window.get()),
        })
    }

    fn classify(&self, window: &[f64], average: f64) -> TrendState {
        let c = &self.config;
        let min_days = c.min_trend_days.get();
        let above = window.iter().filter(|&&pb| pb > c.strong_upper.get()).count();
        let below = window.iter().filter(|&&pb| pb < c.strong_lower.get()).count();

        if above >= min_days && above >= below {
            TrendState::StrongUptrend
        } else if below >= min_days {
            TrendState::StrongDowntrend
        } else if average > c.upper.get() {
            TrendState::Uptrend
        } else if average < c.lower.get() {
            TrendState::Downtrend
        } else {
            TrendState::Neutral
        }
    }

    /// 60% directional distance of the average from 0.5, 40% consistency.
    fn strength(&self, window: &[f64], average: f64, state: TrendState) -> f64 {
        let distance = match state.direction() {
            Direction::Bullish => ((average - 0.5) / 0.5).clamp(0.0, 1.0),
            Direction::Bearish => ((0.5 - average) / 0.5).clamp(0.0, 1.0),
            Direction::Neutral => 0.0,
        };
        let dispersion = population_std_dev(window, average);
        let consistency = 1.0 - (dispersion / 0.5).min(1.0);
        ((0.6 * distance + 0.4 * consistency) * 100.0).clamp(0.0, 100.0)
    }

    /// Consecutive trailing observations satisfying the state's %b threshold.
    pub fn days_in_trend(&self, observations: &[BandObservation], state: TrendState) -> usize {
        let c = &self.config;
        let holds = |pb: f64| match state {
            TrendState::StrongUptrend => pb > c.strong_upper.get(),
            TrendState::Uptrend => pb > c.upper.get(),
            TrendState::Neutral => (c.lower.get()..=c.upper.get()).contains(&pb),
            TrendState::Downtrend => pb < c.lower.get(),
            TrendState::StrongDowntrend => pb < c.strong_lower.get(),
        };
        observations
            .iter()
            .rev()
            .take_while(|o| holds(o.percent_b))
            .count()
    }

    /// Upper or lower band walk over the walking window.
    pub fn band_walking(&self, observations: &[BandObservation]) -> Option<BandSide> {
        let start = observations
            .len()
            .saturating_sub(self.config.walk_window.get());
        let recent = &observations[start..];
        let upper = recent.iter().filter(|o| o.percent_b >= WALK_UPPER).count();
        let lower = recent.iter().filter(|o| o.percent_b <= WALK_LOWER).count();
        let min = self.config.walk_min_touches.get();

        if upper >= min && upper >= lower {
            Some(BandSide::Upper)
        } else if lower >= min {
            Some(BandSide::Lower)
        } else {
            None
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn series(percent_bs: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        percent_bs
            .iter()
            .enumerate()
            .map(|(i, &pb)| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close: 100.0,
                upper_band: 102.0,
                middle_band: 100.0,
                lower_band: 98.0,
                percent_b: pb,
                bandwidth: 4.0,
                bandwidth_percentile: 50.0,
            })
            .collect()
    }

    #[test]
    fn test_slope() {
        assert!((linear_slope(&[0.1, 0.2, 0.3, 0.4, 0.5]) - 0.1).abs() < 1e-12);
        assert!((linear_slope(&[0.5, 0.4, 0.3]) + 0.1).abs() < 1e-12);
        assert_eq!(linear_slope(&[0.5]), 0.0);
        assert_eq!(linear_slope(&[]), 0.0);
    }

    #[test]
    fn test_strong_uptrend() {
        let mut pbs = vec![0.6; 14];
        pbs.extend([0.85, 0.9, 0.95, 0.85, 0.9, 0.92]);
        let reading = TrendAnalyzer::default().analyze(&series(&pbs)).unwrap();
        assert_eq!(reading.state, TrendState::StrongUptrend);
        assert_eq!(reading.days_in_trend, 6);
        assert_eq!(reading.band_walking, Some(BandSide::Upper));
        assert!(reading.strength > 0.0 && reading.strength <= 100.0);
    }

    #[test]
    fn test_strong_downtrend() {
        let mut pbs = vec![0.4; 15];
        pbs.extend([0.1, 0.05, 0.15, 0.0, 0.08]);
        let reading = TrendAnalyzer::default().analyze(&series(&pbs)).unwrap();
        assert_eq!(reading.state, TrendState::StrongDowntrend);
        assert_eq!(reading.band_walking, Some(BandSide::Lower));
        assert!(reading.state.is_down());
    }

    #[test]
    fn test_plain_uptrend_and_downtrend() {
        let up = TrendAnalyzer::default().analyze(&series(&[0.7; 20])).unwrap();
        assert_eq!(up.state, TrendState::Uptrend);
        assert_eq!(up.days_in_trend, 20);
        // constant window: full consistency, distance 0.4
        assert!((up.strength - (0.6 * 0.4 + 0.4) * 100.0).abs() < 1e-9);

        let down = TrendAnalyzer::default().analyze(&series(&[0.3; 20])).unwrap();
        assert_eq!(down.state, TrendState::Downtrend);
        assert!(down.band_walking.is_none());
    }

    #[test]
    fn test_neutral() {
        let reading = TrendAnalyzer::default().analyze(&series(&[0.5; 25])).unwrap();
        assert_eq!(reading.state, TrendState::Neutral);
        assert_eq!(reading.days_in_trend, 25);
        assert!((reading.strength - 40.0).abs() < 1e-9);
        assert_eq!(reading.slope, 0.0);
    }

    #[test]
    fn test_short_history_uses_available_window() {
        let reading = TrendAnalyzer::default().analyze(&series(&[0.7, 0.75])).unwrap();
        assert_eq!(reading.state, TrendState::Uptrend);
        assert!(TrendAnalyzer::default().analyze(&[]).is_none());
    }

    #[test]
    fn test_momentum_slope_uses_last_five() {
        let reading = TrendAnalyzer::default()
            .analyze(&series(&[0.9, 0.9, 0.9, 0.1, 0.2, 0.3, 0.4, 0.5]))
            .unwrap();
        assert!((reading.slope - 0.1).abs() < 1e-12);
    }
}
