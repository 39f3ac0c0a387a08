//! Analysis configuration
//!
//! Every component takes its configuration explicitly, per call or per engine.
//! Nothing here is shared mutably, so concurrent scans with different thresholds
//! never observe each other's settings.
//!
//! # Example
//!
//! ```rust
//! use bbscan::config::AnalysisConfig;
//!
//! let config = AnalysisConfig::from_toml_str(
//!     r#"
//!     [bands]
//!     period = 10
//!     bandwidth_lookback = 60
//!
//!     [volatility]
//!     squeeze = 3.0
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.bands.period.get(), 10);
//! assert_eq!(config.bands.std_dev_multiplier, 2.0);
//! assert_eq!(config.volatility.squeeze.get(), 3.0);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    scanners::{
        BulgeScanParams, PullbackScanParams, ReversionScanParams, SqueezeScanParams,
        TrendScanParams,
    },
    signals::{DivergenceReversal, MeanReversion, PullbackContinuation, SqueezeBreakout},
    AnalysisError, Percentile, Period, Ratio, Result,
};

fn invalid(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidConfig(msg.into())
}

// ============================================================
// BANDS
// ============================================================

/// Band calculator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub period: Period,
    pub std_dev_multiplier: f64,
    /// Observations in the bandwidth percentile window
    pub bandwidth_lookback: Period,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            period: Period::new_const(20),
            std_dev_multiplier: 2.0,
            bandwidth_lookback: Period::new_const(126),
        }
    }
}

impl BandConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period.get() < 2 {
            return Err(invalid("bands.period must be >= 2"));
        }
        if !self.std_dev_multiplier.is_finite() || self.std_dev_multiplier <= 0.0 {
            return Err(invalid("bands.std_dev_multiplier must be finite and > 0"));
        }
        Ok(())
    }
}

// ============================================================
// VOLATILITY
// ============================================================

/// Percentile thresholds for volatility classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityThresholds {
    pub squeeze: Percentile,
    pub low: Percentile,
    pub high: Percentile,
    pub bulge: Percentile,
    /// Observations before the latest searched for a squeeze when detecting a release
    pub release_lookback: Period,
    /// Observations searched for a headfake (10..=20)
    pub headfake_window: Period,
}

impl Default for VolatilityThresholds {
    fn default() -> Self {
        Self {
            squeeze: Percentile::new_const(5.0),
            low: Percentile::new_const(25.0),
            high: Percentile::new_const(75.0),
            bulge: Percentile::new_const(95.0),
            release_lookback: Period::new_const(5),
            headfake_window: Period::new_const(15),
        }
    }
}

impl VolatilityThresholds {
    pub const HEADFAKE_WINDOW_MIN: usize = 10;
    pub const HEADFAKE_WINDOW_MAX: usize = 20;

    pub fn validate(&self) -> Result<()> {
        let (s, l, h, b) = (
            self.squeeze.get(),
            self.low.get(),
            self.high.get(),
            self.bulge.get(),
        );
        if !(s <= l && l < h && h <= b) {
            return Err(invalid(format!(
                "volatility thresholds must satisfy squeeze <= low < high <= bulge, got {s}/{l}/{h}/{b}"
            )));
        }
        let window = self.headfake_window.get();
        if !(Self::HEADFAKE_WINDOW_MIN..=Self::HEADFAKE_WINDOW_MAX).contains(&window) {
            return Err(invalid(format!(
                "volatility.headfake_window must be within [10, 20], got {window}"
            )));
        }
        Ok(())
    }
}

// ============================================================
// TREND
// ============================================================

/// Trend analyzer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub lookback: Period,
    pub min_trend_days: Period,
    /// %b above which an observation counts toward a strong uptrend
    pub strong_upper: Ratio,
    /// Average %b above which the window is an uptrend
    pub upper: Ratio,
    /// Average %b below which the window is a downtrend
    pub lower: Ratio,
    /// %b below which an observation counts toward a strong downtrend
    pub strong_lower: Ratio,
    pub walk_window: Period,
    pub walk_min_touches: Period,
    pub slope_window: Period,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            min_trend_days: Period::new_const(5),
            strong_upper: Ratio::new_const(0.8),
            upper: Ratio::new_const(0.6),
            lower: Ratio::new_const(0.4),
            strong_lower: Ratio::new_const(0.2),
            walk_window: Period::new_const(10),
            walk_min_touches: Period::new_const(3),
            slope_window: Period::new_const(5),
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> Result<()> {
        let ordered = self.strong_lower.get() < self.lower.get()
            && self.lower.get() <= 0.5
            && 0.5 <= self.upper.get()
            && self.upper.get() < self.strong_upper.get();
        if !ordered {
            return Err(invalid(
                "trend thresholds must satisfy strong_lower < lower <= 0.5 <= upper < strong_upper",
            ));
        }
        if self.min_trend_days > self.lookback {
            return Err(invalid("trend.min_trend_days must not exceed trend.lookback"));
        }
        if self.walk_min_touches > self.walk_window {
            return Err(invalid(
                "trend.walk_min_touches must not exceed trend.walk_window",
            ));
        }
        if self.slope_window.get() < 2 {
            return Err(invalid("trend.slope_window must be >= 2"));
        }
        Ok(())
    }
}

// ============================================================
// RATING
// ============================================================

/// Composite score weights (must sum to 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingWeights {
    pub squeeze: Ratio,
    pub trend: Ratio,
    pub momentum: Ratio,
    pub pattern: Ratio,
}

impl Default for RatingWeights {
    fn default() -> Self {
        Self {
            squeeze: Ratio::new_const(0.25),
            trend: Ratio::new_const(0.35),
            momentum: Ratio::new_const(0.20),
            pattern: Ratio::new_const(0.20),
        }
    }
}

impl RatingWeights {
    pub fn validate(&self) -> Result<()> {
        let sum =
            self.squeeze.get() + self.trend.get() + self.momentum.get() + self.pattern.get();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(invalid(format!("rating weights must sum to 1, got {sum}")));
        }
        Ok(())
    }
}

/// Rating service settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub weights: RatingWeights,
    /// Minimum price points before a symbol is rated
    pub min_history: Period,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            weights: RatingWeights::default(),
            min_history: Period::new_const(20),
        }
    }
}

// ============================================================
// SIGNALS
// ============================================================

/// Signal generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Signals with a lower total confidence are dropped
    pub min_confidence: f64,
    pub divergence: DivergenceReversal,
    pub squeeze_breakout: SqueezeBreakout,
    pub pullback: PullbackContinuation,
    pub mean_reversion: MeanReversion,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            divergence: DivergenceReversal::default(),
            squeeze_breakout: SqueezeBreakout::default(),
            pullback: PullbackContinuation::default(),
            mean_reversion: MeanReversion::default(),
        }
    }
}

// ============================================================
// SCANNERS
// ============================================================

/// Per-scanner thresholds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerThresholds {
    pub squeeze: SqueezeScanParams,
    pub bulge: BulgeScanParams,
    pub trend: TrendScanParams,
    pub pullback: PullbackScanParams,
    pub reversion: ReversionScanParams,
}

// ============================================================
// ROOT
// ============================================================

/// Complete configuration for a [`BandEngine`](crate::engine::BandEngine)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub bands: BandConfig,
    pub volatility: VolatilityThresholds,
    pub trend: TrendConfig,
    pub rating: RatingConfig,
    pub signals: SignalConfig,
    pub scanners: ScannerThresholds,
}

impl AnalysisConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| invalid(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| invalid(format!("serialize config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.bands.validate()?;
        self.volatility.validate()?;
        self.trend.validate()?;
        self.rating.weights.validate()?;
        if !(0.0..=100.0).contains(&self.signals.min_confidence) {
            return Err(invalid("signals.min_confidence must be within [0, 100]"));
        }
        self.signals.divergence.validate()?;
        self.signals.squeeze_breakout.validate()?;
        self.signals.pullback.validate()?;
        self.signals.mean_reversion.validate()?;
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_toml_roundtrip_preserves_overrides() {
        let mut config = AnalysisConfig::default();
        config.bands.bandwidth_lookback = Period::new_const(60);
        config.trend.min_trend_days = Period::new_const(4);
        let text = config.to_toml_string().unwrap();
        assert_eq!(AnalysisConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_zero_period_rejected_on_parse() {
        let err = AnalysisConfig::from_toml_str("[bands]\nperiod = 0\n").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn test_threshold_order_enforced() {
        let mut thresholds = VolatilityThresholds::default();
        thresholds.low = Percentile::new_const(80.0);
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_headfake_window_bounds() {
        let mut thresholds = VolatilityThresholds::default();
        thresholds.headfake_window = Period::new_const(9);
        assert!(thresholds.validate().is_err());
        thresholds.headfake_window = Period::new_const(20);
        assert!(thresholds.validate().is_ok());
        thresholds.headfake_window = Period::new_const(21);
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut weights = RatingWeights::default();
        weights.pattern = Ratio::new_const(0.5);
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_band_config_rejects_single_point_window() {
        let config = BandConfig {
            period: Period::new_const(1),
            ..BandConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
