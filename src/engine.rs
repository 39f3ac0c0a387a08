//! Band engine
//!
//! Composition root over the calculator, classifiers, rating service, signal
//! generators and scanners. Holds no numeric logic of its own: every method
//! delegates, and batch methods fan out one task per symbol on rayon.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::{
    bands::calculate,
    config::AnalysisConfig,
    rating::{rank_ratings, BBRating, RatingService},
    scanners::{run_scanner, scanner_for, ScanResult, Scanner, ScannerKind},
    signals::{
        generate_all, BBSignal, BuiltinGenerator, GeneratorId, SignalContext, VolumeProfile,
    },
    trend::{TrendAnalyzer, TrendReading},
    volatility::{VolatilityClassifier, VolatilityHit, VolatilityReading},
    AnalysisError, BandObservation, OHLCVExt, Result, OHLCV,
};

/// Usable bars averaged for the volume baseline
const VOLUME_BASELINE_BARS: usize = 20;

// ============================================================
// BATCH OPTIONS
// ============================================================

/// Cancellation and deadline for batch operations.
///
/// Checked when each symbol's task starts; symbols not started in time are
/// reported as failed.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub cancel: Option<Arc<AtomicBool>>,
    pub deadline: Option<Instant>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// `Err` once cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(AnalysisError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AnalysisError::DeadlineExceeded);
        }
        Ok(())
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Per-symbol and per-universe analysis
pub struct BandEngine {
    config: AnalysisConfig,
    generators: Vec<BuiltinGenerator>,
    scanners: HashMap<ScannerKind, Box<dyn Scanner>>,
    rating: RatingService,
    classifier: VolatilityClassifier,
    analyzer: TrendAnalyzer,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for BandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandEngine")
            .field("config", &self.config)
            .field("generators", &self.generators)
            .field("scanners", &self.scanners.len())
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

impl BandEngine {
    /// Engine with every generator and the default configuration.
    pub fn with_defaults() -> Result<Self> {
        EngineBuilder::new().with_all_generators().build()
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    #[inline]
    pub fn generators(&self) -> &[BuiltinGenerator] {
        &self.generators
    }

    // ===========================================
    // Per symbol
    // ===========================================

    /// Band observations, empty when history is too short.
    pub fn compute<T: OHLCV>(&self, bars: &[T]) -> Vec<BandObservation> {
        self.try_compute(bars).unwrap_or_else(|error| {
            trace!(%error, "no observations");
            Vec::new()
        })
    }

    /// Band observations, with the reason when none can be computed.
    #[inline]
    pub fn try_compute<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<BandObservation>> {
        calculate(bars, &self.config.bands)
    }

    #[inline]
    pub fn read_volatility(&self, observations: &[BandObservation]) -> Option<VolatilityReading> {
        self.classifier.read(observations)
    }

    #[inline]
    pub fn analyze_trend(&self, observations: &[BandObservation]) -> Option<TrendReading> {
        self.analyzer.analyze(observations)
    }

    #[inline]
    pub fn rate<T: OHLCV>(&self, symbol: &str, bars: &[T]) -> BBRating {
        self.rating.rate(symbol, bars)
    }

    /// Signals from price history, highest confidence first. Volume confirmation
    /// uses each bar's volume against the average of the preceding bars.
    pub fn generate_signals<T: OHLCV>(&self, symbol: &str, bars: &[T]) -> Vec<BBSignal> {
        let observations = self.compute(bars);
        if observations.is_empty() {
            return Vec::new();
        }

        let volumes: Vec<f64> = bars
            .iter()
            .filter(|b| b.is_usable())
            .map(|b| b.volume())
            .collect();
        let baseline = match volumes.split_last() {
            Some((_, prior)) if !prior.is_empty() => {
                let window = &prior[prior.len().saturating_sub(VOLUME_BASELINE_BARS)..];
                window.iter().sum::<f64>() / window.len() as f64
            }
            _ => f64::NAN,
        };

        self.evaluate_signals(
            symbol,
            &observations,
            Some(VolumeProfile::new(&volumes, baseline)),
        )
    }

    /// Signals over precomputed observations, highest confidence first.
    pub fn evaluate_signals(
        &self,
        symbol: &str,
        observations: &[BandObservation],
        volume: Option<VolumeProfile<'_>>,
    ) -> Vec<BBSignal> {
        let ctx = SignalContext {
            symbol,
            observations,
            volume,
            volatility: &self.config.volatility,
            trend: &self.config.trend,
        };
        let min_confidence = self.config.signals.min_confidence;
        let mut signals = generate_all(&self.generators, &ctx);
        signals.retain(|s| s.confidence.total >= min_confidence);

        debug!(symbol, count = signals.len(), "signals generated");
        signals
    }

    // ===========================================
    // Universe
    // ===========================================

    /// Run the configured scanner for `kind`.
    pub fn run_scan<'a, I>(&self, kind: ScannerKind, instruments: I) -> Vec<ScanResult>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])> + Send,
    {
        let Some(scanner) = self.scanners.get(&kind) else {
            return Vec::new();
        };
        self.run_scanner(scanner.as_ref(), instruments)
    }

    /// Run a caller-supplied scanner, e.g. one with per-call thresholds.
    pub fn run_scanner<'a, I>(&self, scanner: &dyn Scanner, instruments: I) -> Vec<ScanResult>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])> + Send,
    {
        let hits = self.install(|| run_scanner(scanner, instruments));
        debug!(scanner = %scanner.kind(), hits = hits.len(), "scan complete");
        hits
    }

    /// Rate every instrument and rank the successful ratings.
    pub fn rate_all<'a, T, I>(&self, instruments: I) -> BTreeMap<String, BBRating>
    where
        T: OHLCV + Sync + 'a,
        I: IntoParallelIterator<Item = (&'a str, &'a [T])> + Send,
    {
        self.rate_all_with(instruments, &BatchOptions::default())
    }

    /// [`rate_all`](Self::rate_all) with cancellation and a deadline. Symbols not
    /// started in time are failed with `Cancelled` or `DeadlineExceeded`.
    ///
    /// A symbol listed more than once is ranked once; the last entry wins.
    pub fn rate_all_with<'a, T, I>(
        &self,
        instruments: I,
        options: &BatchOptions,
    ) -> BTreeMap<String, BBRating>
    where
        T: OHLCV + Sync + 'a,
        I: IntoParallelIterator<Item = (&'a str, &'a [T])> + Send,
    {
        let rated: Vec<BBRating> = self.install(|| {
            instruments
                .into_par_iter()
                .map(|(symbol, bars)| match options.check() {
                    Ok(()) => self.rate(symbol, bars),
                    Err(error) => BBRating::failed(symbol, &error),
                })
                .collect()
        });

        let entries = rated.len();
        let unique: BTreeMap<String, BBRating> = rated
            .into_iter()
            .map(|rating| (rating.symbol.clone(), rating))
            .collect();
        let duplicates = entries - unique.len();

        let mut ratings: Vec<BBRating> = unique.into_values().collect();
        rank_ratings(&mut ratings);
        let failed = ratings.iter().filter(|r| !r.success).count();
        debug!(symbols = ratings.len(), failed, duplicates, "batch rating complete");

        ratings
            .into_iter()
            .map(|rating| (rating.symbol.clone(), rating))
            .collect()
    }

    /// Symbols currently in a squeeze, tightest first.
    pub fn find_squeezes<'a, I>(&self, instruments: I) -> Vec<VolatilityHit>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])> + Send,
    {
        self.install(|| self.classifier.find_squeezes(instruments))
    }

    /// Symbols currently in a bulge, widest first.
    pub fn find_bulges<'a, I>(&self, instruments: I) -> Vec<VolatilityHit>
    where
        I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])> + Send,
    {
        self.install(|| self.classifier.find_bulges(instruments))
    }

    fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for generator in &self.generators {
            generator.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`BandEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: AnalysisConfig,
    all_generators: bool,
    generators: Vec<BuiltinGenerator>,
    generator_filter: Option<Vec<GeneratorId>>,
    threads: Option<usize>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Add the four builtin generators, parameterized from the signal config
    pub fn with_all_generators(mut self) -> Self {
        self.all_generators = true;
        self
    }

    /// Add a generator with explicit parameters
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, generator: BuiltinGenerator) -> Self {
        self.generators.push(generator);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, generator: BuiltinGenerator) -> Result<Self> {
        generator.validate_config()?;
        self.generators.push(generator);
        Ok(self)
    }

    /// Drop signals below this total confidence
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.config.signals.min_confidence = confidence;
        self
    }

    /// Keep only these generators
    pub fn only_generators(mut self, ids: impl IntoIterator<Item = GeneratorId>) -> Self {
        self.generator_filter = Some(ids.into_iter().collect());
        self
    }

    /// Run batches on a dedicated pool of `n` threads instead of the global pool
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<BandEngine> {
        let config = self.config;

        let mut generators = Vec::with_capacity(self.generators.len() + 4);
        if self.all_generators {
            let s = &config.signals;
            generators.extend([
                BuiltinGenerator::DivergenceReversal(s.divergence),
                BuiltinGenerator::SqueezeBreakout(s.squeeze_breakout),
                BuiltinGenerator::PullbackContinuation(s.pullback),
                BuiltinGenerator::MeanReversion(s.mean_reversion),
            ]);
        }
        generators.extend(self.generators);
        if let Some(filter) = &self.generator_filter {
            generators.retain(|g| filter.contains(&g.id()));
        }

        let pool = match self.threads {
            None => None,
            Some(0) => {
                return Err(AnalysisError::InvalidConfig(
                    "engine threads must be > 0".into(),
                ))
            }
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| AnalysisError::InvalidConfig(format!("thread pool: {e}")))?,
            ),
        };

        let scanners = ScannerKind::ALL
            .into_iter()
            .map(|kind| (kind, scanner_for(kind, &config)))
            .collect();

        let engine = BandEngine {
            rating: RatingService::new(&config),
            classifier: VolatilityClassifier::new(config.volatility),
            analyzer: TrendAnalyzer::new(config.trend),
            generators,
            scanners,
            pool,
            config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{signals::MeanReversion, PricePoint};
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let date = start + chrono::Days::new(i as u64);
                PricePoint::new(date, c, c + 1.0, c - 1.0, c, 1_000.0)
            })
            .collect()
    }

    fn wave(n: usize, phase: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + ((i as f64 + phase) * 0.4).sin() * 3.0)
            .collect()
    }

    #[test]
    fn test_builder_defaults() {
        let engine = BandEngine::with_defaults().unwrap();
        assert_eq!(engine.generators().len(), 4);
        assert_eq!(engine.scanners.len(), ScannerKind::ALL.len());
    }

    #[test]
    fn test_only_generators() {
        let engine = EngineBuilder::new()
            .with_all_generators()
            .only_generators([GeneratorId("mean_reversion")])
            .build()
            .unwrap();
        assert_eq!(engine.generators().len(), 1);
        assert_eq!(engine.generators()[0].id().as_str(), "mean_reversion");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AnalysisConfig::default();
        config.volatility.headfake_window = crate::Period::new_const(25);
        assert!(EngineBuilder::new().config(config).build().is_err());
        assert!(EngineBuilder::new().min_confidence(120.0).build().is_err());
        assert!(EngineBuilder::new().threads(0).build().is_err());
    }

    #[test]
    fn test_add_checked_validates() {
        let bad = MeanReversion {
            min_recovery: crate::Ratio::new_const(0.8),
            ..MeanReversion::default()
        };
        assert!(EngineBuilder::new()
            .add_checked(BuiltinGenerator::MeanReversion(bad))
            .is_err());
    }

    #[test]
    fn test_compute_short_history_is_empty() {
        let engine = BandEngine::with_defaults().unwrap();
        assert!(engine.compute(&bars(&[100.0; 10])).is_empty());
        assert!(matches!(
            engine.try_compute(&bars(&[100.0; 10])),
            Err(AnalysisError::InsufficientData { need: 20, got: 10 })
        ));
        assert!(engine.generate_signals("X", &bars(&[100.0; 10])).is_empty());
    }

    #[test]
    fn test_min_confidence_filters_signals() {
        let engine = EngineBuilder::new()
            .with_all_generators()
            .min_confidence(100.0)
            .build()
            .unwrap();
        let signals = engine.generate_signals("W", &bars(&wave(80, 0.0)));
        assert!(signals.iter().all(|s| s.confidence.total >= 100.0));
    }

    #[test]
    fn test_rate_all_ranks() {
        let engine = EngineBuilder::new().threads(2).build().unwrap();
        let a = bars(&wave(60, 0.0));
        let b = bars(&wave(60, 2.0));
        let short = bars(&[100.0; 5]);
        let universe: Vec<(&str, &[PricePoint])> = vec![
            ("A", a.as_slice()),
            ("B", b.as_slice()),
            ("S", short.as_slice()),
        ];

        let ratings = engine.rate_all(universe);
        assert_eq!(ratings.len(), 3);
        assert!(!ratings["S"].success);
        assert_eq!(ratings["S"].rank, None);
        let mut ranks: Vec<_> = ["A", "B"].iter().filter_map(|s| ratings[*s].rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_symbol_ranked_once() {
        let engine = BandEngine::with_defaults().unwrap();
        let a = bars(&wave(60, 0.0));
        let b = bars(&wave(60, 2.0));
        let short = bars(&[100.0; 5]);
        let universe: Vec<(&str, &[PricePoint])> = vec![
            ("A", short.as_slice()),
            ("B", b.as_slice()),
            ("A", a.as_slice()),
        ];

        let ratings = engine.rate_all(universe);
        assert_eq!(ratings.len(), 2);
        assert!(ratings["A"].success);
        let mut ranks: Vec<_> = ratings.values().filter_map(|r| r.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2]);
        assert!(ratings.values().any(|r| r.percentile == Some(100.0)));
    }

    #[test]
    fn test_cancelled_batch_fails_every_symbol() {
        let engine = BandEngine::with_defaults().unwrap();
        let a = bars(&wave(60, 0.0));
        let universe: Vec<(&str, &[PricePoint])> = vec![("A", a.as_slice())];
        let flag = Arc::new(AtomicBool::new(true));

        let ratings = engine.rate_all_with(universe, &BatchOptions::new().with_cancel(flag));
        let rating = &ratings["A"];
        assert!(!rating.success);
        assert_eq!(rating.error, Some(AnalysisError::Cancelled.to_string()));
        assert_eq!(rating.rank, None);
    }

    #[test]
    fn test_expired_deadline() {
        let options = BatchOptions::new().with_deadline(Instant::now());
        assert_eq!(options.check(), Err(AnalysisError::DeadlineExceeded));
        assert_eq!(BatchOptions::new().check(), Ok(()));
    }
}
