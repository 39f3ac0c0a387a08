//! # BBSCAN - Bollinger Band analytics
//!
//! Band computation, volatility regimes, trend states, composite ratings,
//! trade signals and universe scanning for tradable symbols.
//!
//! ## Quick Start
//!
//! ```rust
//! use bbscan::prelude::*;
//! use chrono::NaiveDate;
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let bars: Vec<PricePoint> = (0..60)
//!     .map(|i| {
//!         let c = 100.0 + (i as f64 * 0.3).sin() * 2.0;
//!         PricePoint::new(start + chrono::Days::new(i), c, c + 1.0, c - 1.0, c, 1_000.0)
//!     })
//!     .collect();
//!
//! let engine = EngineBuilder::new().with_all_generators().build().unwrap();
//!
//! let observations = engine.compute(&bars);
//! assert_eq!(observations.len(), 41);
//!
//! let rating = engine.rate("DEMO", &bars);
//! assert!(rating.success);
//! ```

pub mod bands;
pub mod config;
pub mod engine;
pub mod params;
pub mod rating;
pub mod scanners;
pub mod signals;
pub mod trend;
pub mod volatility;

pub mod prelude {
    pub use crate::{
        // Band calculator
        bands::{calculate, calculate_next},
        // Configuration
        config::{
            AnalysisConfig, BandConfig, RatingWeights, ScannerThresholds, SignalConfig,
            TrendConfig, VolatilityThresholds,
        },
        // Orchestrator
        engine::{BandEngine, BatchOptions, EngineBuilder},
        // Parameters
        params::{get_percentile, get_period, get_ratio, ParamMeta, ParamType},
        // Rating
        rating::{rank_ratings, BBRating, RatingScores, RatingService},
        // Scanners
        scanners::{ScanResult, Scanner, ScannerKind},
        // Signals
        signals::{
            BBSignal, BuiltinGenerator, Confidence, GeneratorId, SignalContext, SignalGenerator,
            SignalPattern, SignalType, VolumeProfile,
        },
        // Trend
        trend::{BandSide, TrendAnalyzer, TrendReading, TrendState},
        // Volatility
        volatility::{StateTracker, VolatilityClassifier, VolatilityReading, VolatilityState},
        // Errors
        AnalysisError,
        // Types
        BandObservation,
        BandPosition,
        Direction,
        OHLCVExt,
        Percentile,
        Period,
        PricePoint,
        Ratio,
        Result,
        OHLCV,
    };
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur during band analysis
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} points, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Batch cancelled before symbol was analyzed")]
    Cancelled,

    #[error("Batch deadline exceeded before symbol was analyzed")]
    DeadlineExceeded,
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Percentile value in range 0.0..=100.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentile(f64);

impl Percentile {
    /// Create a new Percentile, validating the value is in [0.0, 100.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Percentile cannot be NaN or infinite",
            ));
        }
        if !(0.0..=100.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Percentile",
                value,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Percentile {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Percentile {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Percentile::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn date(&self) -> NaiveDate;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn date(&self) -> NaiveDate {
        (*self).date()
    }

    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Complete, positive prices and positive volume.
    #[inline]
    fn is_usable(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) || self.volume().is_nan() {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) || self.volume().is_infinite() {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if prices.iter().any(|&p| p <= 0.0) {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "non-positive price",
            });
        }
        if self.volume() <= 0.0 {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "non-positive volume",
            });
        }
        if self.high() < self.low() {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// A single daily price record as supplied by the data layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for PricePoint {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// DIRECTION
// ============================================================

/// Directional bias of a reading or signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }
}

// ============================================================
// BAND OBSERVATION - one per usable price point (Copy)
// ============================================================

/// Band values at a single date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandObservation {
    pub date: NaiveDate,
    pub close: f64,
    pub upper_band: f64,
    pub middle_band: f64,
    pub lower_band: f64,
    /// Position of close within the bands: 0 = lower, 1 = upper
    pub percent_b: f64,
    /// (upper - lower) / middle * 100
    pub bandwidth: f64,
    /// Share of the trailing lookback window strictly below the current bandwidth
    pub bandwidth_percentile: f64,
}

/// Where the close sits relative to the bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandPosition {
    AboveUpper,
    Inside,
    BelowLower,
}

impl BandObservation {
    /// Distance from the middle band to either outer band
    #[inline]
    pub fn half_width(&self) -> f64 {
        (self.upper_band - self.middle_band).max(0.0)
    }

    #[inline]
    pub fn position(&self) -> BandPosition {
        if self.percent_b > 1.0 {
            BandPosition::AboveUpper
        } else if self.percent_b < 0.0 {
            BandPosition::BelowLower
        } else {
            BandPosition::Inside
        }
    }

    #[inline]
    pub fn is_above_middle(&self) -> bool {
        self.percent_b > 0.5
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, n).unwrap()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_percentile_validation() {
        assert!(Percentile::new(0.0).is_ok());
        assert!(Percentile::new(100.0).is_ok());
        assert!(Percentile::new(-1.0).is_err());
        assert!(Percentile::new(100.5).is_err());
        assert!(Percentile::new(f64::NAN).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(126).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_period_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Period>("0").is_err());
        assert_eq!(serde_json::from_str::<Period>("20").unwrap().get(), 20);
    }

    #[test]
    fn test_price_point_usable() {
        let good = PricePoint::new(day(1), 10.0, 11.0, 9.0, 10.5, 100.0);
        assert!(good.is_usable());
        assert!((good.range() - 2.0).abs() < 1e-12);

        let zero_volume = PricePoint::new(day(1), 10.0, 11.0, 9.0, 10.5, 0.0);
        assert!(!zero_volume.is_usable());

        let zero_price = PricePoint::new(day(1), 10.0, 11.0, 9.0, 0.0, 100.0);
        assert!(!zero_price.is_usable());

        let nan = PricePoint::new(day(1), f64::NAN, 11.0, 9.0, 10.0, 100.0);
        assert!(matches!(
            nan.validate(),
            Err(AnalysisError::InvalidOHLCV { reason: "NaN in OHLCV", .. })
        ));

        let inverted = PricePoint::new(day(1), 10.0, 9.0, 11.0, 10.0, 100.0);
        assert!(!inverted.is_usable());
    }

    #[test]
    fn test_band_position() {
        let mut obs = BandObservation {
            date: day(2),
            close: 105.0,
            upper_band: 104.0,
            middle_band: 100.0,
            lower_band: 96.0,
            percent_b: 1.125,
            bandwidth: 8.0,
            bandwidth_percentile: 50.0,
        };
        assert_eq!(obs.position(), BandPosition::AboveUpper);
        assert!((obs.half_width() - 4.0).abs() < 1e-12);

        obs.percent_b = -0.2;
        assert_eq!(obs.position(), BandPosition::BelowLower);
        obs.percent_b = 0.5;
        assert_eq!(obs.position(), BandPosition::Inside);
        assert!(!obs.is_above_middle());
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Bullish.opposite(), Direction::Bearish);
        assert_eq!(Direction::Neutral.opposite(), Direction::Neutral);
    }
}
