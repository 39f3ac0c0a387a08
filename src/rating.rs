//! Rating service
//!
//! Scores a symbol on four components and combines them into a weighted
//! composite:
//!
//! - **Squeeze**: how compressed volatility is, and for how long
//! - **Trend**: trend state shifted by trend strength
//! - **Momentum**: %b slope over two horizons
//! - **Pattern**: divergence, squeeze-bias and continuation precursors
//!
//! Ratings never fail loudly: a symbol with too little history comes back with
//! `success = false` and an error message so batches keep going.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    bands::calculate,
    config::{AnalysisConfig, BandConfig, RatingConfig},
    signals::helpers::{last_high_pair, last_low_pair, tail, MIN_EXTREMA_SEPARATION},
    trend::{percent_b_slope, TrendAnalyzer, TrendReading, TrendState},
    volatility::{VolatilityClassifier, VolatilityState},
    AnalysisError, BandObservation, OHLCV,
};

/// Percentile at or below which an observation counts toward squeeze duration
const SQUEEZE_DURATION_PERCENTILE: f64 = 10.0;
/// Observations checked for squeeze duration
const SQUEEZE_DURATION_WINDOW: usize = 20;
/// Observations searched for divergence precursors
const DIVERGENCE_WINDOW: usize = 30;
const MOMENTUM_SCALE: f64 = 1000.0;
const MOMENTUM_SIDE_BONUS: f64 = 10.0;

// ============================================================
// RECORDS
// ============================================================

/// Component scores, each 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScores {
    pub squeeze: f64,
    pub trend: f64,
    pub momentum: f64,
    pub pattern: f64,
    pub composite: f64,
}

/// Rating of one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBRating {
    pub symbol: String,
    /// Date of the latest observation
    pub date: Option<NaiveDate>,
    pub success: bool,
    pub error: Option<String>,
    pub scores: Option<RatingScores>,
    pub volatility: Option<VolatilityState>,
    pub trend: Option<TrendState>,
    /// 1-based rank within a batch
    pub rank: Option<usize>,
    /// Batch percentile, 100 for the top rank
    pub percentile: Option<f64>,
}

impl BBRating {
    pub fn failed(symbol: &str, error: &AnalysisError) -> Self {
        Self {
            symbol: symbol.to_string(),
            date: None,
            success: false,
            error: Some(error.to_string()),
            scores: None,
            volatility: None,
            trend: None,
            rank: None,
            percentile: None,
        }
    }

    #[inline]
    pub fn composite(&self) -> Option<f64> {
        self.scores.map(|s| s.composite)
    }
}

/// Rank successful ratings by composite (descending, ties by symbol).
///
/// The slice is reordered: ranked ratings first, failed ratings after them
/// in symbol order with no rank or percentile.
pub fn rank_ratings(ratings: &mut [BBRating]) {
    ratings.sort_by(|a, b| match (a.composite(), b.composite()) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.symbol.cmp(&b.symbol)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.symbol.cmp(&b.symbol),
    });

    let total = ratings.iter().filter(|r| r.success).count();
    for (i, rating) in ratings.iter_mut().enumerate() {
        if rating.success {
            let rank = i + 1;
            rating.rank = Some(rank);
            rating.percentile = Some((total - rank + 1) as f64 / total as f64 * 100.0);
        } else {
            rating.rank = None;
            rating.percentile = None;
        }
    }
}

// ============================================================
// SERVICE
// ============================================================

/// Composite scorer
#[derive(Debug, Clone, Copy)]
pub struct RatingService {
    bands: BandConfig,
    classifier: VolatilityClassifier,
    analyzer: TrendAnalyzer,
    config: RatingConfig,
}

impl RatingService {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            bands: config.bands,
            classifier: VolatilityClassifier::new(config.volatility),
            analyzer: TrendAnalyzer::new(config.trend),
            config: config.rating,
        }
    }

    /// Compute bands from price history and rate the result.
    pub fn rate<T: OHLCV>(&self, symbol: &str, bars: &[T]) -> BBRating {
        let need = self.config.min_history.get();
        if bars.len() < need {
            let error = AnalysisError::InsufficientData {
                need,
                got: bars.len(),
            };
            debug!(symbol, %error, "rating skipped");
            return BBRating::failed(symbol, &error);
        }

        match calculate(bars, &self.bands) {
            Ok(observations) => self.rate_observations(symbol, &observations),
            Err(error) => {
                debug!(symbol, %error, "rating skipped");
                BBRating::failed(symbol, &error)
            }
        }
    }

    /// Rate precomputed band observations.
    pub fn rate_observations(&self, symbol: &str, observations: &[BandObservation]) -> BBRating {
        let (Some(latest), Some(volatility), Some(trend)) = (
            observations.last(),
            self.classifier.read(observations),
            self.analyzer.analyze(observations),
        ) else {
            return BBRating::failed(symbol, &AnalysisError::InsufficientData { need: 1, got: 0 });
        };

        let squeeze = self.squeeze_score(observations);
        let trend_score = self.trend_score(&trend);
        let momentum = self.momentum_score(observations);
        let pattern = self.pattern_score(observations, volatility.state, &trend);
        let composite = self.composite(squeeze, trend_score, momentum, pattern);

        debug!(
            symbol,
            squeeze,
            trend = trend_score,
            momentum,
            pattern,
            composite,
            "rated symbol"
        );

        BBRating {
            symbol: symbol.to_string(),
            date: Some(latest.date),
            success: true,
            error: None,
            scores: Some(RatingScores {
                squeeze,
                trend: trend_score,
                momentum,
                pattern,
                composite,
            }),
            volatility: Some(volatility.state),
            trend: Some(trend.state),
            rank: None,
            percentile: None,
        }
    }

    /// Higher for tighter, longer squeezes; lower as volatility expands.
    pub fn squeeze_score(&self, observations: &[BandObservation]) -> f64 {
        let Some(latest) = observations.last() else {
            return 50.0;
        };
        let p = latest.bandwidth_percentile;
        let state = self.classifier.classify(p);
        let t = &self.classifier.thresholds;
        let (s, l, h, b) = (t.squeeze.get(), t.low.get(), t.high.get(), t.bulge.get());

        // Linear interpolation from `from` at `lo` to `to` at `hi`.
        let lerp = |from: f64, to: f64, lo: f64, hi: f64| {
            if hi > lo {
                from + (to - from) * ((p - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                from
            }
        };

        let score = match state {
            VolatilityState::Squeeze => {
                let tightness = self.classifier.intensity(p, state) / 100.0 * 30.0;
                let recent = tail(observations, SQUEEZE_DURATION_WINDOW);
                let tight_bars = recent
                    .iter()
                    .filter(|o| o.bandwidth_percentile <= SQUEEZE_DURATION_PERCENTILE)
                    .count();
                let duration = (2.0 * tight_bars as f64).min(20.0);
                70.0 + tightness + duration
            }
            VolatilityState::Low => lerp(70.0, 50.0, s, l),
            VolatilityState::Normal => 50.0,
            VolatilityState::High => lerp(40.0, 30.0, h, b),
            VolatilityState::Bulge => lerp(30.0, 20.0, b, 100.0),
        };
        score.clamp(0.0, 100.0)
    }

    pub fn trend_score(&self, reading: &TrendReading) -> f64 {
        let s = reading.strength;
        let score = match reading.state {
            TrendState::StrongUptrend => 80.0 + 0.2 * s,
            TrendState::Uptrend => 60.0 + 0.2 * s,
            TrendState::Neutral => 50.0,
            TrendState::Downtrend => 40.0 - 0.2 * s,
            TrendState::StrongDowntrend => 20.0 - 0.2 * s,
        };
        score.clamp(0.0, 100.0)
    }

    /// Blend of the 5- and 10-observation %b slopes, nudged when price sits on the
    /// side of the middle band the slope points to.
    pub fn momentum_score(&self, observations: &[BandObservation]) -> f64 {
        let Some(latest) = observations.last() else {
            return 50.0;
        };
        let slope =
            0.6 * percent_b_slope(observations, 5) + 0.4 * percent_b_slope(observations, 10);
        let mut score = 50.0 + MOMENTUM_SCALE * slope;
        if slope > 0.0 && latest.close > latest.middle_band {
            score += MOMENTUM_SIDE_BONUS;
        } else if slope < 0.0 && latest.close < latest.middle_band {
            score -= MOMENTUM_SIDE_BONUS;
        }
        score.clamp(0.0, 100.0)
    }

    pub fn pattern_score(
        &self,
        observations: &[BandObservation],
        volatility: VolatilityState,
        trend: &TrendReading,
    ) -> f64 {
        let Some(latest) = observations.last() else {
            return 50.0;
        };
        let window = tail(observations, DIVERGENCE_WINDOW);
        let mut score: f64 = 50.0;

        if last_low_pair(window, MIN_EXTREMA_SEPARATION).is_some_and(|p| p.is_bullish_divergence())
        {
            score += 20.0;
        }
        if last_high_pair(window, MIN_EXTREMA_SEPARATION).is_some_and(|p| p.is_bearish_divergence())
        {
            score -= 15.0;
        }
        if volatility == VolatilityState::Squeeze && latest.percent_b > 0.5 {
            score += 15.0;
        }
        if trend.state.is_up() && trend.slope > 0.0 {
            score += 10.0;
        }
        score.clamp(0.0, 100.0)
    }

    pub fn composite(&self, squeeze: f64, trend: f64, momentum: f64, pattern: f64) -> f64 {
        let w = &self.config.weights;
        let score = w.squeeze.get() * squeeze
            + w.trend.get() * trend
            + w.momentum.get() * momentum
            + w.pattern.get() * pattern;
        score.clamp(0.0, 100.0)
    }
}

impl Default for RatingService {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

// ============================================================
// TESTS
// ============================================================
