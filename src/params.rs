//! Parameter metadata for analysis configuration
//!
//! Describes every tunable knob of the band, volatility, trend and rating
//! sections, enabling:
//! - Grid search over thresholds
//! - Parameter documentation
//! - Overrides from flat `section.name` maps
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use bbscan::config::AnalysisConfig;
//!
//! for (section, param) in AnalysisConfig::param_meta() {
//!   println!("{section}.{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let params = HashMap::from([("bands.period", 10.0), ("volatility.squeeze", 3.0)]);
//! let config = AnalysisConfig::with_params(&params).unwrap();
//! assert_eq!(config.bands.period.get(), 10);
//! ```

use std::collections::HashMap;

use crate::{
  config::{AnalysisConfig, BandConfig, RatingWeights, TrendConfig, VolatilityThresholds},
  AnalysisError, Percentile, Period, Ratio, Result,
};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Percentile value (0.0..=100.0)
  Percentile,
  /// Unconstrained finite value
  Float,
}

/// Metadata for a single configuration parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name within its section (e.g., "period")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn percentile(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Percentile, default, range, description }
  }

  pub const fn float(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Float, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 {
      return vec![min];
    }
    let count = ((max - min) / step + 1e-9).floor() as usize;
    (0..=count).map(|i| min + step * i as f64).collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(AnalysisError::InvalidValue("Parameter must be finite"));
    }
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period if value < 1.0 || value.fract() != 0.0 => {
        Err(AnalysisError::InvalidValue("Period must be a positive integer"))
      },
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Percentile => Percentile::new(value).map(|_| ()),
      _ => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED SECTIONS
// ============================================================

/// Configuration section that can be built from a flat parameter map
pub trait Parameterized: Sized {
  /// Section prefix used in qualified names (e.g., "bands")
  fn section() -> &'static str;

  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates the section from a HashMap keyed by unqualified name.
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

const BAND_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("period", 20.0, (10.0, 50.0, 5.0), "Observations in the moving average"),
  ParamMeta::float(
    "std_dev_multiplier",
    2.0,
    (1.0, 3.0, 0.5),
    "Band offset in standard deviations",
  ),
  ParamMeta::period(
    "bandwidth_lookback",
    126.0,
    (63.0, 252.0, 21.0),
    "Observations in the bandwidth percentile window",
  ),
];

const VOLATILITY_PARAMS: &[ParamMeta] = &[
  ParamMeta::percentile(
    "squeeze",
    5.0,
    (1.0, 10.0, 1.0),
    "Percentile at or below which bandwidth is a squeeze",
  ),
  ParamMeta::percentile("low", 25.0, (15.0, 35.0, 5.0), "Upper percentile of low volatility"),
  ParamMeta::percentile("high", 75.0, (65.0, 85.0, 5.0), "Lower percentile of high volatility"),
  ParamMeta::percentile(
    "bulge",
    95.0,
    (90.0, 99.0, 1.0),
    "Percentile at or above which bandwidth is a bulge",
  ),
  ParamMeta::period(
    "release_lookback",
    5.0,
    (3.0, 10.0, 1.0),
    "Observations searched for a squeeze before a release",
  ),
  ParamMeta::period(
    "headfake_window",
    15.0,
    (10.0, 20.0, 1.0),
    "Observations searched for a headfake",
  ),
];

const TREND_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("lookback", 20.0, (10.0, 40.0, 5.0), "Observations in the trend window"),
  ParamMeta::period(
    "min_trend_days",
    5.0,
    (3.0, 10.0, 1.0),
    "Extreme observations required for a strong trend",
  ),
  ParamMeta::ratio("strong_upper", 0.8, (0.75, 0.9, 0.05), "%b counted toward a strong uptrend"),
  ParamMeta::ratio(
    "upper",
    0.6,
    (0.55, 0.7, 0.05),
    "Average %b above which the window is an uptrend",
  ),
  ParamMeta::ratio(
    "lower",
    0.4,
    (0.3, 0.45, 0.05),
    "Average %b below which the window is a downtrend",
  ),
  ParamMeta::ratio("strong_lower", 0.2, (0.1, 0.25, 0.05), "%b counted toward a strong downtrend"),
  ParamMeta::period("walk_window", 10.0, (5.0, 20.0, 5.0), "Observations checked for band walking"),
  ParamMeta::period("walk_min_touches", 3.0, (2.0, 5.0, 1.0), "Band touches that make a walk"),
  ParamMeta::period("slope_window", 5.0, (3.0, 10.0, 1.0), "Observations in the %b slope"),
];

const RATING_WEIGHT_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("squeeze", 0.25, (0.0, 1.0, 0.05), "Weight of the squeeze score"),
  ParamMeta::ratio("trend", 0.35, (0.0, 1.0, 0.05), "Weight of the trend score"),
  ParamMeta::ratio("momentum", 0.20, (0.0, 1.0, 0.05), "Weight of the momentum score"),
  ParamMeta::ratio("pattern", 0.20, (0.0, 1.0, 0.05), "Weight of the pattern score"),
];

impl Parameterized for BandConfig {
  fn section() -> &'static str {
    "bands"
  }

  fn param_meta() -> &'static [ParamMeta] {
    BAND_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      period: get_period(params, "period", 20)?,
      std_dev_multiplier: get_float(params, "std_dev_multiplier", 2.0),
      bandwidth_lookback: get_period(params, "bandwidth_lookback", 126)?,
    })
  }
}

impl Parameterized for VolatilityThresholds {
  fn section() -> &'static str {
    "volatility"
  }

  fn param_meta() -> &'static [ParamMeta] {
    VOLATILITY_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      squeeze: get_percentile(params, "squeeze", 5.0)?,
      low: get_percentile(params, "low", 25.0)?,
      high: get_percentile(params, "high", 75.0)?,
      bulge: get_percentile(params, "bulge", 95.0)?,
      release_lookback: get_period(params, "release_lookback", 5)?,
      headfake_window: get_period(params, "headfake_window", 15)?,
    })
  }
}

impl Parameterized for TrendConfig {
  fn section() -> &'static str {
    "trend"
  }

  fn param_meta() -> &'static [ParamMeta] {
    TREND_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      lookback: get_period(params, "lookback", 20)?,
      min_trend_days: get_period(params, "min_trend_days", 5)?,
      strong_upper: get_ratio(params, "strong_upper", 0.8)?,
      upper: get_ratio(params, "upper", 0.6)?,
      lower: get_ratio(params, "lower", 0.4)?,
      strong_lower: get_ratio(params, "strong_lower", 0.2)?,
      walk_window: get_period(params, "walk_window", 10)?,
      walk_min_touches: get_period(params, "walk_min_touches", 3)?,
      slope_window: get_period(params, "slope_window", 5)?,
    })
  }
}

impl Parameterized for RatingWeights {
  fn section() -> &'static str {
    "rating.weights"
  }

  fn param_meta() -> &'static [ParamMeta] {
    RATING_WEIGHT_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      squeeze: get_ratio(params, "squeeze", 0.25)?,
      trend: get_ratio(params, "trend", 0.35)?,
      momentum: get_ratio(params, "momentum", 0.20)?,
      pattern: get_ratio(params, "pattern", 0.20)?,
    })
  }
}

// ============================================================
// WHOLE CONFIGURATION
// ============================================================

fn section_meta(section: &str) -> Option<&'static [ParamMeta]> {
  match section {
    s if s == BandConfig::section() => Some(BandConfig::param_meta()),
    s if s == VolatilityThresholds::section() => Some(VolatilityThresholds::param_meta()),
    s if s == TrendConfig::section() => Some(TrendConfig::param_meta()),
    s if s == RatingWeights::section() => Some(RatingWeights::param_meta()),
    _ => None,
  }
}

/// Unqualified overrides for `section`, if any were given
fn section_params<'a>(
  qualified: &HashMap<&'a str, f64>,
  section: &str,
) -> Option<HashMap<&'a str, f64>> {
  let scoped: HashMap<&str, f64> = qualified
    .iter()
    .filter_map(|(key, &value)| {
      let (s, name) = (*key).rsplit_once('.')?;
      (s == section).then_some((name, value))
    })
    .collect();
  (!scoped.is_empty()).then_some(scoped)
}

impl AnalysisConfig {
  /// Every tunable parameter with its section prefix
  pub fn param_meta() -> Vec<(&'static str, &'static ParamMeta)> {
    fn tag<P: Parameterized>() -> impl Iterator<Item = (&'static str, &'static ParamMeta)> {
      P::param_meta().iter().map(|m| (P::section(), m))
    }
    tag::<BandConfig>()
      .chain(tag::<VolatilityThresholds>())
      .chain(tag::<TrendConfig>())
      .chain(tag::<RatingWeights>())
      .collect()
  }

  /// Default configuration with `section.name` overrides applied and validated.
  ///
  /// Unknown names and out-of-range values are rejected.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for (&key, &value) in params {
      let meta = key
        .rsplit_once('.')
        .and_then(|(section, name)| section_meta(section)?.iter().find(|m| m.name == name))
        .ok_or_else(|| AnalysisError::InvalidConfig(format!("unknown parameter {key}")))?;
      meta.validate(value)?;
    }

    let mut config = AnalysisConfig::default();
    if let Some(p) = section_params(params, BandConfig::section()) {
      config.bands = BandConfig::with_params(&p)?;
    }
    if let Some(p) = section_params(params, VolatilityThresholds::section()) {
      config.volatility = VolatilityThresholds::with_params(&p)?;
    }
    if let Some(p) = section_params(params, TrendConfig::section()) {
      config.trend = TrendConfig::with_params(&p)?;
    }
    if let Some(p) = section_params(params, RatingWeights::section()) {
      config.rating.weights = RatingWeights::with_params(&p)?;
    }
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

/// Helper to get a Percentile from params with default fallback
pub fn get_percentile(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Percentile> {
  let value = params.get(key).copied().unwrap_or(default);
  Percentile::new(value)
}

#[inline]
pub fn get_float(params: &HashMap<&str, f64>, key: &str, default: f64) -> f64 {
  params.get(key).copied().unwrap_or(default)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_constructors() {
    let meta = ParamMeta::percentile("squeeze", 5.0, (1.0, 10.0, 1.0), "Test");
    assert_eq!(meta.name, "squeeze");
    assert_eq!(meta.param_type, ParamType::Percentile);
    assert_eq!(meta.default, 5.0);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < 1e-12);
    assert!((grid[1] - 0.5).abs() < 1e-12);
    assert!((grid[2] - 0.7).abs() < 1e-12);

    let lookback = &BAND_PARAMS[2];
    assert!(lookback.generate_grid().contains(&126.0));
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("test", 14.0, (10.0, 20.0, 2.0), "Test");

    assert!(meta.validate(14.0).is_ok());
    assert!(meta.validate(8.0).is_err());
    assert!(meta.validate(12.5).is_err());
    assert!(meta.validate(f64::NAN).is_err());
  }

  #[test]
  fn test_defaults_match_config_defaults() {
    let empty = HashMap::new();
    assert_eq!(BandConfig::with_params(&empty).unwrap(), BandConfig::default());
    assert_eq!(
      VolatilityThresholds::with_params(&empty).unwrap(),
      VolatilityThresholds::default()
    );
    assert_eq!(TrendConfig::with_params(&empty).unwrap(), TrendConfig::default());
    assert_eq!(RatingWeights::with_params(&empty).unwrap(), RatingWeights::default());

    for (section, meta) in AnalysisConfig::param_meta() {
      assert!(meta.validate(meta.default).is_ok(), "{section}.{} default out of range", meta.name);
    }
  }

  #[test]
  fn test_config_overrides() {
    let params = HashMap::from([
      ("bands.period", 10.0),
      ("trend.min_trend_days", 4.0),
      ("rating.weights.trend", 0.30),
      ("rating.weights.pattern", 0.25),
    ]);
    let config = AnalysisConfig::with_params(&params).unwrap();
    assert_eq!(config.bands.period.get(), 10);
    assert_eq!(config.bands.bandwidth_lookback.get(), 126);
    assert_eq!(config.trend.min_trend_days.get(), 4);
    assert!((config.rating.weights.pattern.get() - 0.25).abs() < 1e-12);
    assert_eq!(config.volatility, VolatilityThresholds::default());
  }

  #[test]
  fn test_unknown_parameter_rejected() {
    let params = HashMap::from([("bands.width", 3.0)]);
    assert!(matches!(
      AnalysisConfig::with_params(&params),
      Err(AnalysisError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_inconsistent_overrides_rejected() {
    // weights no longer sum to 1
    let params = HashMap::from([("rating.weights.trend", 0.5)]);
    assert!(AnalysisConfig::with_params(&params).is_err());
  }

  #[test]
  fn test_get_helpers() {
    let params = HashMap::from([("key1", 0.8), ("key2", 20.0)]);

    assert!((get_ratio(&params, "key1", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "missing", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    assert_eq!(get_period(&params, "key2", 14).unwrap().get(), 20);
    assert_eq!(get_percentile(&params, "missing", 5.0).unwrap().get(), 5.0);
    assert!(get_percentile(&params, "key2", 5.0).is_ok());
  }
}
