//! Volatility classifier
//!
//! Maps bandwidth percentiles to a [`VolatilityState`], tracks how long the state
//! has held, and detects squeeze releases and headfakes.
//!
//! Observation slices are ascending (oldest first); "latest" is the last element
//! and durations are counted walking backward from it.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{config::VolatilityThresholds, BandObservation, Direction};

/// Observations before a break searched for squeeze context
const HEADFAKE_SQUEEZE_CONTEXT: usize = 5;

// ============================================================
// STATE
// ============================================================

/// Volatility regime derived from the bandwidth percentile, ordered calmest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VolatilityState {
    Squeeze,
    Low,
    Normal,
    High,
    Bulge,
}

impl VolatilityState {
    /// Classify a percentile. Precedence: squeeze, low, bulge, high, normal.
    pub fn from_percentile(percentile: f64, thresholds: &VolatilityThresholds) -> Self {
        if percentile <= thresholds.squeeze.get() {
            VolatilityState::Squeeze
        } else if percentile <= thresholds.low.get() {
            VolatilityState::Low
        } else if percentile >= thresholds.bulge.get() {
            VolatilityState::Bulge
        } else if percentile >= thresholds.high.get() {
            VolatilityState::High
        } else {
            VolatilityState::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VolatilityState::Squeeze => "squeeze",
            VolatilityState::Low => "low",
            VolatilityState::Normal => "normal",
            VolatilityState::High => "high",
            VolatilityState::Bulge => "bulge",
        }
    }

    #[inline]
    pub fn is_compressed(self) -> bool {
        matches!(self, VolatilityState::Squeeze | VolatilityState::Low)
    }

    #[inline]
    pub fn is_expanded(self) -> bool {
        matches!(self, VolatilityState::High | VolatilityState::Bulge)
    }
}

impl std::fmt::Display for VolatilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the latest observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReading {
    pub date: NaiveDate,
    pub state: VolatilityState,
    pub bandwidth: f64,
    pub bandwidth_percentile: f64,
    /// Consecutive observations (latest included) in `state`
    pub days_in_state: usize,
    /// Depth into the state's percentile zone, 0..=100
    pub intensity: f64,
    /// Expected excursion from the middle band, percent of price
    pub expected_move: f64,
}

/// A squeeze that has started to release
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqueezeRelease {
    pub date: NaiveDate,
    pub direction: Direction,
    /// Squeeze observations among those preceding the latest
    pub squeeze_bars: usize,
    /// Bandwidth change between the two latest observations
    pub bandwidth_change: f64,
    pub percent_b: f64,
}

/// A band break out of a squeeze that reversed through the middle band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Headfake {
    /// Direction of the false break
    pub initial_direction: Direction,
    pub break_date: NaiveDate,
    pub reversal_date: NaiveDate,
    pub bars_to_reversal: usize,
    /// Observations after the reversal bar
    pub bars_since_reversal: usize,
    pub break_percent_b: f64,
    pub reversal_percent_b: f64,
}

impl Headfake {
    /// The direction the headfake points to after reversing
    #[inline]
    pub fn trade_direction(&self) -> Direction {
        self.initial_direction.opposite()
    }
}

/// Universe query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityHit {
    pub symbol: String,
    pub reading: VolatilityReading,
}

// ============================================================
// CLASSIFIER
// ============================================================

/// Retrospective classifier over observation history
#[derive(Debug, Clone, Copy, Default)]
pub struct VolatilityClassifier {
    pub thresholds: VolatilityThresholds,
}

impl VolatilityClassifier {
    pub fn new(thresholds: VolatilityThresholds) -> Self {
        Self { thresholds }
    }

    #[inline]
    pub fn classify(&self, percentile: f64) -> VolatilityState {
        VolatilityState::from_percentile(percentile, &self.thresholds)
    }

    /// Classify the latest observation with duration and intensity.
    pub fn read(&self, observations: &[BandObservation]) -> Option<VolatilityReading> {
        let latest = observations.last()?;
        let state = self.classify(latest.bandwidth_percentile);

        Some(VolatilityReading {
            date: latest.date,
            state,
            bandwidth: latest.bandwidth,
            bandwidth_percentile: latest.bandwidth_percentile,
            days_in_state: self.days_in_state(observations),
            intensity: self.intensity(latest.bandwidth_percentile, state),
            expected_move: latest.bandwidth / 2.0,
        })
    }

    /// Consecutive trailing observations sharing the latest observation's state.
    pub fn days_in_state(&self, observations: &[BandObservation]) -> usize {
        let Some(latest) = observations.last() else {
            return 0;
        };
        let state = self.classify(latest.bandwidth_percentile);
        observations
            .iter()
            .rev()
            .take_while(|o| self.classify(o.bandwidth_percentile) == state)
            .count()
    }

    /// Depth of `percentile` into the zone of `state`, 0..=100.
    pub fn intensity(&self, percentile: f64, state: VolatilityState) -> f64 {
        let t = &self.thresholds;
        let (s, l, h, b) = (t.squeeze.get(), t.low.get(), t.high.get(), t.bulge.get());

        let depth = |num: f64, den: f64| {
            if den > 0.0 {
                num / den * 100.0
            } else {
                100.0
            }
        };

        let raw = match state {
            VolatilityState::Squeeze => depth(s - percentile, s),
            VolatilityState::Low => depth(l - percentile, l - s),
            VolatilityState::Normal => {
                let centre = (l + h) / 2.0;
                depth((percentile - centre).abs(), (h - l) / 2.0)
            }
            VolatilityState::High => depth(percentile - h, b - h),
            VolatilityState::Bulge => depth(percentile - b, 100.0 - b),
        };
        raw.clamp(0.0, 100.0)
    }

    /// Bandwidth expanding out of a recent squeeze.
    pub fn detect_squeeze_release(
        &self,
        observations: &[BandObservation],
    ) -> Option<SqueezeRelease> {
        let n = observations.len();
        if n < 2 {
            return None;
        }
        let latest = &observations[n - 1];
        let previous = &observations[n - 2];

        let start = (n - 1).saturating_sub(self.thresholds.release_lookback.get());
        let squeeze_bars = observations[start..n - 1]
            .iter()
            .filter(|o| self.classify(o.bandwidth_percentile) == VolatilityState::Squeeze)
            .count();
        if squeeze_bars == 0 {
            return None;
        }
        if latest.bandwidth <= previous.bandwidth {
            return None;
        }

        let direction = if latest.percent_b > 0.5 {
            Direction::Bullish
        } else if latest.percent_b < 0.5 {
            Direction::Bearish
        } else {
            return None;
        };

        Some(SqueezeRelease {
            date: latest.date,
            direction,
            squeeze_bars,
            bandwidth_change: latest.bandwidth - previous.bandwidth,
            percent_b: latest.percent_b,
        })
    }

    /// First band break inside the headfake window that follows a squeeze and then
    /// crosses back through the middle band.
    pub fn detect_headfake(&self, observations: &[BandObservation]) -> Option<Headfake> {
        let n = observations.len();
        if n < 3 {
            return None;
        }
        let start = n.saturating_sub(self.thresholds.headfake_window.get());

        for i in start..n {
            let pb = observations[i].percent_b;
            let direction = if pb > 1.0 {
                Direction::Bullish
            } else if pb < 0.0 {
                Direction::Bearish
            } else {
                continue;
            };

            let context_start = i.saturating_sub(HEADFAKE_SQUEEZE_CONTEXT);
            let in_squeeze = observations[context_start..i]
                .iter()
                .any(|o| self.classify(o.bandwidth_percentile) == VolatilityState::Squeeze);
            if !in_squeeze {
                continue;
            }

            let reversal = (i + 1..n).find(|&j| {
                let pb = observations[j].percent_b;
                match direction {
                    Direction::Bullish => pb < 0.5,
                    _ => pb > 0.5,
                }
            })?;

            return Some(Headfake {
                initial_direction: direction,
                break_date: observations[i].date,
                reversal_date: observations[reversal].date,
                bars_to_reversal: reversal - i,
                bars_since_reversal: n - 1 - reversal,
                break_percent_b: pb,
                reversal_percent_b: observations[reversal].percent_b,
            });
        }

        None
    }

    // ===========================================
    // Universe queries
    // ===========================================

    /// Symbols currently in a squeeze, tightest (lowest percentile) first.
    pub fn find_squeezes<'a, I>(&self, instruments: I) -> Vec<VolatilityHit>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])>,
    {
        let mut hits = self.collect_state(instruments, VolatilityState::Squeeze);
        hits.sort_by(|a, b| {
            a.reading
                .bandwidth_percentile
                .total_cmp(&b.reading.bandwidth_percentile)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        hits
    }

    /// Symbols currently in a bulge, widest (highest percentile) first.
    pub fn find_bulges<'a, I>(&self, instruments: I) -> Vec<VolatilityHit>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])>,
    {
        let mut hits = self.collect_state(instruments, VolatilityState::Bulge);
        hits.sort_by(|a, b| {
            b.reading
                .bandwidth_percentile
                .total_cmp(&a.reading.bandwidth_percentile)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        hits
    }

    fn collect_state<'a, I>(&self, instruments: I, state: VolatilityState) -> Vec<VolatilityHit>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])>,
    {
        instruments
            .into_par_iter()
            .filter_map(|(symbol, observations)| {
                let reading = self.read(observations)?;
                (reading.state == state).then(|| VolatilityHit {
                    symbol: symbol.to_string(),
                    reading,
                })
            })
            .collect()
    }
}

// ============================================================
// INCREMENTAL TRACKER
// ============================================================

/// Incremental {state, count} tracker, updated once per new observation.
///
/// Equivalent to [`VolatilityClassifier::days_in_state`] evaluated after each push.
#[derive(Debug, Clone, Copy)]
pub struct StateTracker {
    thresholds: VolatilityThresholds,
    state: Option<VolatilityState>,
    count: usize,
}

impl StateTracker {
    pub fn new(thresholds: VolatilityThresholds) -> Self {
        Self {
            thresholds,
            state: None,
            count: 0,
        }
    }

    /// Feed the next observation, returning the state and its running duration.
    pub fn push(&mut self, observation: &BandObservation) -> (VolatilityState, usize) {
        let state =
            VolatilityState::from_percentile(observation.bandwidth_percentile, &self.thresholds);
        if self.state == Some(state) {
            self.count += 1;
        } else {
            self.state = Some(state);
            self.count = 1;
        }
        (state, self.count)
    }

    pub fn current(&self) -> Option<(VolatilityState, usize)> {
        self.state.map(|s| (s, self.count))
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.count = 0;
    }
}

// ============================================================
// TESTS
// ============================================================
