//! Band calculator
//!
//! Turns an ascending OHLCV sequence into [`BandObservation`]s:
//!
//! - `middle = SMA(close, period)`
//! - `upper/lower = middle ± k * σ` (σ = sample standard deviation over the same window)
//! - `%b = (close - lower) / (upper - lower)`, 0.5 when the bands collapse
//! - `bandwidth = (upper - lower) / middle * 100`, 0 when the middle band is zero
//! - `bandwidth_percentile` = share of the trailing lookback window (current value
//!   included) strictly below the current bandwidth, 50.0 until the window fills
//!
//! Unusable points (see [`OHLCVExt::is_usable`]) are skipped, never interpolated.

use chrono::NaiveDate;

use crate::{config::BandConfig, AnalysisError, BandObservation, OHLCVExt, Result, OHLCV};

/// Percentile reported before the lookback window has filled.
pub const DEFAULT_PERCENTILE: f64 = 50.0;

// ============================================================
// WINDOW MATH
// ============================================================

#[inline]
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). Zero for fewer than two values.
#[inline]
pub(crate) fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Population standard deviation. Zero for an empty slice.
#[inline]
pub(crate) fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Percent of `window` strictly below `current`.
///
/// Returns [`DEFAULT_PERCENTILE`] when `window` holds fewer than `lookback` values.
pub fn percentile_rank(window: &[f64], current: f64, lookback: usize) -> f64 {
    if window.len() < lookback || window.is_empty() {
        return DEFAULT_PERCENTILE;
    }
    let below = window.iter().filter(|&&b| b < current).count();
    below as f64 / window.len() as f64 * 100.0
}

/// Band values for a single closing window. The last element is the current close.
///
/// Statistics are taken on deviations from the first close so a constant window
/// yields `middle == close` and `σ == 0` exactly, whatever the price.
fn band_values(window: &[f64], k: f64) -> (f64, f64, f64, f64, f64) {
    let close = window[window.len() - 1];
    let anchor = window[0];
    let deviations: Vec<f64> = window.iter().map(|v| v - anchor).collect();
    let offset = mean(&deviations);
    let middle = anchor + offset;
    let sigma = sample_std_dev(&deviations, offset);
    let upper = middle + k * sigma;
    let lower = middle - k * sigma;

    let spread = upper - lower;
    let percent_b = if spread > 0.0 {
        (close - lower) / spread
    } else {
        0.5
    };
    let bandwidth = if middle != 0.0 {
        spread / middle * 100.0
    } else {
        0.0
    };

    (upper, middle, lower, percent_b, bandwidth)
}

// ============================================================
// BATCH CALCULATION
// ============================================================

/// Compute band observations for a full price history.
///
/// Returns one observation per usable point once at least `period` usable points
/// (the point itself included) are available. Fails with
/// [`AnalysisError::InsufficientData`] when the whole input has fewer usable points
/// than `period`.
pub fn calculate<T: OHLCV>(bars: &[T], config: &BandConfig) -> Result<Vec<BandObservation>> {
    let period = config.period.get();
    let lookback = config.bandwidth_lookback.get();
    let k = config.std_dev_multiplier;

    let usable: Vec<(NaiveDate, f64)> = bars
        .iter()
        .filter(|b| b.is_usable())
        .map(|b| (b.date(), b.close()))
        .collect();

    if usable.len() < period {
        return Err(AnalysisError::InsufficientData {
            need: period,
            got: usable.len(),
        });
    }

    let closes: Vec<f64> = usable.iter().map(|&(_, c)| c).collect();
    let mut bandwidths: Vec<f64> = Vec::with_capacity(closes.len() + 1 - period);
    let mut observations = Vec::with_capacity(closes.len() + 1 - period);

    for end in period..=closes.len() {
        let window = &closes[end - period..end];
        let (upper, middle, lower, percent_b, bandwidth) = band_values(window, k);
        bandwidths.push(bandwidth);

        let start = bandwidths.len().saturating_sub(lookback);
        let bandwidth_percentile = percentile_rank(&bandwidths[start..], bandwidth, lookback);

        let (date, close) = usable[end - 1];
        observations.push(BandObservation {
            date,
            close,
            upper_band: upper,
            middle_band: middle,
            lower_band: lower,
            percent_b,
            bandwidth,
            bandwidth_percentile,
        });
    }

    Ok(observations)
}

// ============================================================
// INCREMENTAL (live quote)
// ============================================================

/// Compute one observation from trailing history plus a new close.
///
/// The band window is the last `period - 1` of `trailing_closes` followed by `close`.
/// The percentile window is the last `lookback - 1` of `prior_bandwidths` followed by
/// the new bandwidth; with fewer priors it reports the default 50.0.
pub fn calculate_next(
    trailing_closes: &[f64],
    date: NaiveDate,
    close: f64,
    prior_bandwidths: &[f64],
    config: &BandConfig,
) -> Result<BandObservation> {
    let period = config.period.get();
    let lookback = config.bandwidth_lookback.get();

    if !close.is_finite() || close <= 0.0 {
        return Err(AnalysisError::InvalidValue("close must be finite and > 0"));
    }
    let need = period - 1;
    if trailing_closes.len() < need {
        return Err(AnalysisError::InsufficientData {
            need,
            got: trailing_closes.len(),
        });
    }

    let mut window = Vec::with_capacity(period);
    window.extend_from_slice(&trailing_closes[trailing_closes.len() - need..]);
    window.push(close);
    let (upper, middle, lower, percent_b, bandwidth) =
        band_values(&window, config.std_dev_multiplier);

    let keep = prior_bandwidths.len().min(lookback - 1);
    let mut bw_window = Vec::with_capacity(keep + 1);
    bw_window.extend_from_slice(&prior_bandwidths[prior_bandwidths.len() - keep..]);
    bw_window.push(bandwidth);

    Ok(BandObservation {
        date,
        close,
        upper_band: upper,
        middle_band: middle,
        lower_band: lower,
        percent_b,
        bandwidth,
        bandwidth_percentile: percentile_rank(&bw_window, bandwidth, lookback),
    })
}

// ============================================================
// TESTS
// ============================================================
