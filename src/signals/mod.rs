//! Pattern / signal generators
//!
//! Four independent, side-effect-free generators evaluate a symbol's band history
//! and emit at most one [`BBSignal`] each:
//!
//! - **Divergence Reversal**: W-bottoms and M-tops confirmed by %b divergence
//! - **Squeeze Breakout**: expansion out of a squeeze, plus headfakes
//! - **Pullback Continuation**: retracements to the middle band inside a trend
//! - **Mean Reversion**: recoveries after a band breach
//!
//! All generators share the [`Confidence`] model. Targets and stops come from the
//! latest computed bands only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    config::{TrendConfig, VolatilityThresholds},
    BandObservation, Direction, Result,
};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple generator types.
macro_rules! impl_with_defaults {
  ($($generator:ty),* $(,)?) => {
    $(impl $generator {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod divergence;
pub mod mean_reversion;
pub mod pullback;
pub mod squeeze_breakout;

pub use divergence::DivergenceReversal;
pub use helpers::{Confidence, VolumeProfile};
pub use mean_reversion::MeanReversion;
pub use pullback::{PullbackContinuation, PullbackSetup};
pub use squeeze_breakout::SqueezeBreakout;

// ============================================================
// SIGNAL RECORD
// ============================================================

/// Trade action of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl SignalType {
    #[inline]
    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Bullish => SignalType::Buy,
            Direction::Bearish => SignalType::Sell,
            Direction::Neutral => SignalType::Hold,
        }
    }
}

/// Pattern that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalPattern {
    WBottom,
    MTop,
    SqueezeBreakoutUp,
    SqueezeBreakoutDown,
    /// False downside break reversed upward
    BullishHeadfake,
    /// False upside break reversed downward
    BearishHeadfake,
    BullishPullback,
    BearishPullback,
    OversoldReversion,
    OverboughtReversion,
}

impl SignalPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalPattern::WBottom => "w-bottom",
            SignalPattern::MTop => "m-top",
            SignalPattern::SqueezeBreakoutUp => "squeeze-breakout-up",
            SignalPattern::SqueezeBreakoutDown => "squeeze-breakout-down",
            SignalPattern::BullishHeadfake => "bullish-headfake",
            SignalPattern::BearishHeadfake => "bearish-headfake",
            SignalPattern::BullishPullback => "bullish-pullback",
            SignalPattern::BearishPullback => "bearish-pullback",
            SignalPattern::OversoldReversion => "oversold-reversion",
            SignalPattern::OverboughtReversion => "overbought-reversion",
        }
    }

    /// Direction this pattern trades in
    pub fn typical_direction(self) -> Direction {
        match self {
            SignalPattern::WBottom
            | SignalPattern::SqueezeBreakoutUp
            | SignalPattern::BullishHeadfake
            | SignalPattern::BullishPullback
            | SignalPattern::OversoldReversion => Direction::Bullish,
            SignalPattern::MTop
            | SignalPattern::SqueezeBreakoutDown
            | SignalPattern::BearishHeadfake
            | SignalPattern::BearishPullback
            | SignalPattern::OverboughtReversion => Direction::Bearish,
        }
    }
}

impl std::fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time trade signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBSignal {
    pub symbol: String,
    pub date: NaiveDate,
    pub signal_type: SignalType,
    pub pattern: SignalPattern,
    pub confidence: Confidence,
    pub price_at_signal: f64,
    pub percent_b: f64,
    pub bandwidth: f64,
    pub volume_confirmed: bool,
    pub volume_ratio: Option<f64>,
    pub target: Option<f64>,
    pub stop: Option<f64>,
}

impl BBSignal {
    /// Signal at the latest observation of `ctx`, direction taken from `pattern`.
    pub fn at_latest(
        ctx: &SignalContext<'_>,
        latest: &BandObservation,
        pattern: SignalPattern,
        confidence: Confidence,
    ) -> Self {
        Self {
            symbol: ctx.symbol.to_string(),
            date: latest.date,
            signal_type: SignalType::from_direction(pattern.typical_direction()),
            pattern,
            confidence,
            price_at_signal: latest.close,
            percent_b: latest.percent_b,
            bandwidth: latest.bandwidth,
            volume_confirmed: false,
            volume_ratio: None,
            target: None,
            stop: None,
        }
    }

    pub fn with_volume(mut self, ratio: Option<f64>) -> Self {
        self.volume_ratio = ratio;
        self.volume_confirmed = ratio.is_some_and(|r| r >= helpers::VOLUME_SURGE_RATIO);
        self
    }

    pub fn with_levels(mut self, target: f64, stop: f64) -> Self {
        self.target = Some(target);
        self.stop = Some(stop);
        self
    }

    #[inline]
    pub fn total_confidence(&self) -> f64 {
        self.confidence.total
    }
}

// ============================================================
// GENERATOR TRAIT
// ============================================================

/// Unique identifier for a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeneratorId(pub &'static str);

impl GeneratorId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Everything a generator may read for one symbol
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub symbol: &'a str,
    /// Ascending band history
    pub observations: &'a [BandObservation],
    pub volume: Option<VolumeProfile<'a>>,
    pub volatility: &'a VolatilityThresholds,
    pub trend: &'a TrendConfig,
}

impl<'a> SignalContext<'a> {
    #[inline]
    pub fn latest(&self) -> Option<&'a BandObservation> {
        self.observations.last()
    }

    /// Volume ratio `offset` observations before the latest
    #[inline]
    pub fn volume_ratio_at(&self, offset: usize) -> Option<f64> {
        self.volume.and_then(|v| v.ratio_at(offset))
    }

    #[inline]
    pub fn latest_volume_ratio(&self) -> Option<f64> {
        self.volume_ratio_at(0)
    }
}

/// Signal generator over a band history
pub trait SignalGenerator: Send + Sync {
    fn id(&self) -> GeneratorId;
    fn min_observations(&self) -> usize;
    fn evaluate(&self, ctx: &SignalContext<'_>) -> Option<BBSignal>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN GENERATORS - generated via macro
// ============================================================

/// Macro to generate BuiltinGenerator enum without boilerplate
macro_rules! define_builtin_generators {
    (
        $(
            $variant:ident($generator:ty)
        ),* $(,)?
    ) => {
        /// All builtin generators - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinGenerator {
            $($variant($generator)),*
        }

        impl BuiltinGenerator {
            #[inline]
            pub fn evaluate(&self, ctx: &SignalContext<'_>) -> Option<BBSignal> {
                match self {
                    $(Self::$variant(g) => {
                        if ctx.observations.len() < SignalGenerator::min_observations(g) {
                            return None;
                        }
                        SignalGenerator::evaluate(g, ctx)
                    }),*
                }
            }

            #[inline]
            pub fn id(&self) -> GeneratorId {
                match self {
                    $(Self::$variant(g) => SignalGenerator::id(g)),*
                }
            }

            #[inline]
            pub fn min_observations(&self) -> usize {
                match self {
                    $(Self::$variant(g) => SignalGenerator::min_observations(g)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(g) => SignalGenerator::validate_config(g)),*
                }
            }
        }
    };
}

define_builtin_generators! {
    DivergenceReversal(DivergenceReversal),
    SqueezeBreakout(SqueezeBreakout),
    PullbackContinuation(PullbackContinuation),
    MeanReversion(MeanReversion),
}

/// Run every generator, highest confidence first.
pub fn generate_all(generators: &[BuiltinGenerator], ctx: &SignalContext<'_>) -> Vec<BBSignal> {
    let mut signals: Vec<BBSignal> = generators.iter().filter_map(|g| g.evaluate(ctx)).collect();
    sort_by_confidence(&mut signals);
    signals
}

/// Descending confidence; ties keep pattern order stable.
pub fn sort_by_confidence(signals: &mut [BBSignal]) {
    signals.sort_by(|a, b| b.confidence.total.total_cmp(&a.confidence.total));
}

// ============================================================
// TESTS
// ============================================================
