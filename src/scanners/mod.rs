//! Universe scanners
//!
//! Stateless filters over a symbol -> observations map. Each scanner tests the
//! latest observation against a threshold, requires the condition to have held
//! for a minimum number of observations, and attaches a ranking metric.
//! Results are sorted by that metric, highest first.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{config::AnalysisConfig, BandObservation, Direction};

pub mod bulge;
pub mod pullback;
pub mod reversion;
pub mod squeeze;
pub mod trend;

pub use bulge::{BulgeHit, BulgeScanParams, BulgeScanner};
pub use pullback::{PullbackHit, PullbackScanParams, PullbackScanner};
pub use reversion::{ReversionHit, ReversionScanParams, ReversionScanner};
pub use squeeze::{SqueezeHit, SqueezeScanParams, SqueezeScanner};
pub use trend::{TrendHit, TrendPhase, TrendScanParams, TrendScanner};

// ============================================================
// KINDS & RESULTS
// ============================================================

/// Scanner lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    Squeeze,
    Bulge,
    TrendUp,
    TrendDown,
    PullbackBull,
    PullbackBear,
    ReversionOversold,
    ReversionOverbought,
}

impl ScannerKind {
    pub const ALL: [ScannerKind; 8] = [
        ScannerKind::Squeeze,
        ScannerKind::Bulge,
        ScannerKind::TrendUp,
        ScannerKind::TrendDown,
        ScannerKind::PullbackBull,
        ScannerKind::PullbackBear,
        ScannerKind::ReversionOversold,
        ScannerKind::ReversionOverbought,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScannerKind::Squeeze => "squeeze",
            ScannerKind::Bulge => "bulge",
            ScannerKind::TrendUp => "trend_up",
            ScannerKind::TrendDown => "trend_down",
            ScannerKind::PullbackBull => "pullback_bull",
            ScannerKind::PullbackBear => "pullback_bear",
            ScannerKind::ReversionOversold => "reversion_oversold",
            ScannerKind::ReversionOverbought => "reversion_overbought",
        }
    }
}

impl std::fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scanner hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scanner", rename_all = "snake_case")]
pub enum ScanResult {
    Squeeze(SqueezeHit),
    Bulge(BulgeHit),
    Trend(TrendHit),
    Pullback(PullbackHit),
    Reversion(ReversionHit),
}

impl ScanResult {
    pub fn symbol(&self) -> &str {
        match self {
            ScanResult::Squeeze(h) => &h.symbol,
            ScanResult::Bulge(h) => &h.symbol,
            ScanResult::Trend(h) => &h.symbol,
            ScanResult::Pullback(h) => &h.symbol,
            ScanResult::Reversion(h) => &h.symbol,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            ScanResult::Squeeze(h) => h.date,
            ScanResult::Bulge(h) => h.date,
            ScanResult::Trend(h) => h.date,
            ScanResult::Pullback(h) => h.date,
            ScanResult::Reversion(h) => h.date,
        }
    }

    /// Ranking metric of the producing scanner
    pub fn metric(&self) -> f64 {
        match self {
            ScanResult::Squeeze(h) => h.intensity,
            ScanResult::Bulge(h) => h.intensity,
            ScanResult::Trend(h) => h.strength,
            ScanResult::Pullback(h) => h.quality,
            ScanResult::Reversion(h) => h.extremity,
        }
    }
}

// ============================================================
// SCANNER TRAIT
// ============================================================

/// Filter over one symbol's band history
pub trait Scanner: Send + Sync {
    fn kind(&self) -> ScannerKind;

    /// Hit for the latest observation, if it qualifies.
    fn evaluate(&self, symbol: &str, observations: &[BandObservation]) -> Option<ScanResult>;
}

/// Scanner for `kind` configured from `config`.
pub fn scanner_for(kind: ScannerKind, config: &AnalysisConfig) -> Box<dyn Scanner> {
    let t = &config.scanners;
    match kind {
        ScannerKind::Squeeze => Box::new(SqueezeScanner::new(t.squeeze)),
        ScannerKind::Bulge => Box::new(BulgeScanner::new(t.bulge)),
        ScannerKind::TrendUp => {
            Box::new(TrendScanner::new(Direction::Bullish, t.trend, config.trend))
        }
        ScannerKind::TrendDown => {
            Box::new(TrendScanner::new(Direction::Bearish, t.trend, config.trend))
        }
        ScannerKind::PullbackBull => Box::new(PullbackScanner::new(Direction::Bullish, t.pullback)),
        ScannerKind::PullbackBear => Box::new(PullbackScanner::new(Direction::Bearish, t.pullback)),
        ScannerKind::ReversionOversold => {
            Box::new(ReversionScanner::new(Direction::Bullish, t.reversion))
        }
        ScannerKind::ReversionOverbought => {
            Box::new(ReversionScanner::new(Direction::Bearish, t.reversion))
        }
    }
}

/// Run `scanner` over every instrument in parallel, highest metric first
/// (ties by symbol).
pub fn run_scanner<'a, I>(scanner: &dyn Scanner, instruments: I) -> Vec<ScanResult>
where
    I: IntoParallelIterator<Item = (&'a str, &'a [BandObservation])>,
{
    let mut hits: Vec<ScanResult> = instruments
        .into_par_iter()
        .filter_map(|(symbol, observations)| scanner.evaluate(symbol, observations))
        .collect();
    hits.sort_by(|a, b| {
        b.metric()
            .total_cmp(&a.metric())
            .then_with(|| a.symbol().cmp(b.symbol()))
    });
    hits
}

/// Consecutive trailing observations satisfying `holds`.
pub(crate) fn trailing_run(
    observations: &[BandObservation],
    holds: impl Fn(&BandObservation) -> bool,
) -> usize {
    observations.iter().rev().take_while(|o| holds(o)).count()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(day: u64, percentile: f64) -> BandObservation {
        BandObservation {
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap() + chrono::Days::new(day),
            close: 100.0,
            upper_band: 102.0,
            middle_band: 100.0,
            lower_band: 98.0,
            percent_b: 0.5,
            bandwidth: 4.0,
            bandwidth_percentile: percentile,
        }
    }

    #[test]
    fn test_every_kind_has_a_scanner() {
        let config = AnalysisConfig::default();
        for kind in ScannerKind::ALL {
            assert_eq!(scanner_for(kind, &config).kind(), kind);
        }
    }

    #[test]
    fn test_run_scanner_sorted_by_metric() {
        let a: Vec<_> = (0..5).map(|i| obs(i, 4.0)).collect();
        let b: Vec<_> = (0..5).map(|i| obs(i, 1.0)).collect();
        let c: Vec<_> = (0..5).map(|i| obs(i, 1.0)).collect();
        let d: Vec<_> = (0..5).map(|i| obs(i, 50.0)).collect();
        let universe: Vec<(&str, &[BandObservation])> = vec![
            ("A", a.as_slice()),
            ("C", c.as_slice()),
            ("B", b.as_slice()),
            ("D", d.as_slice()),
        ];

        let scanner = scanner_for(ScannerKind::Squeeze, &AnalysisConfig::default());
        let hits = run_scanner(scanner.as_ref(), universe);
        let names: Vec<_> = hits.iter().map(|h| h.symbol()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
        assert!(hits[0].metric() >= hits[2].metric());
    }

    #[test]
    fn test_scan_result_serializes_tagged() {
        let a: Vec<_> = (0..5).map(|i| obs(i, 1.0)).collect();
        let scanner = scanner_for(ScannerKind::Squeeze, &AnalysisConfig::default());
        let hit = scanner.evaluate("A", &a).unwrap();
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["scanner"], "squeeze");
        assert_eq!(json["symbol"], "A");
    }

    #[test]
    fn test_trailing_run() {
        let series: Vec<_> = [50.0, 1.0, 2.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, &p)| obs(i as u64, p))
            .collect();
        assert_eq!(trailing_run(&series, |o| o.bandwidth_percentile < 5.0), 3);
        assert_eq!(trailing_run(&[], |_| true), 0);
    }
}
