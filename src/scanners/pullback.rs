//! Pullback scanners: trend retracements into the middle zone, ranked by setup
//! quality. The trend-share requirement of the setup is the duration filter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ScanResult, Scanner, ScannerKind};
use crate::{
    signals::{pullback::find_pullback, PullbackContinuation},
    BandObservation, Direction, Percentile,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullbackScanParams {
    pub setup: PullbackContinuation,
    pub min_quality: Percentile,
}

impl Default for PullbackScanParams {
    fn default() -> Self {
        Self {
            setup: PullbackContinuation::default(),
            min_quality: Percentile::new_const(50.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullbackHit {
    pub symbol: String,
    pub date: NaiveDate,
    pub direction: Direction,
    /// Setup quality, 0..=100
    pub quality: f64,
    pub trend_share: f64,
    pub depth: f64,
    pub velocity: f64,
    pub touches: usize,
    pub percent_b: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PullbackScanner {
    direction: Direction,
    params: PullbackScanParams,
}

impl PullbackScanner {
    pub fn new(direction: Direction, params: PullbackScanParams) -> Self {
        Self { direction, params }
    }
}

impl Scanner for PullbackScanner {
    fn kind(&self) -> ScannerKind {
        match self.direction {
            Direction::Bearish => ScannerKind::PullbackBear,
            _ => ScannerKind::PullbackBull,
        }
    }

    fn evaluate(&self, symbol: &str, observations: &[BandObservation]) -> Option<ScanResult> {
        let latest = observations.last()?;
        let setup = find_pullback(observations, self.direction, &self.params.setup)?;
        let quality = setup.quality();
        if quality < self.params.min_quality.get() {
            return None;
        }

        Some(ScanResult::Pullback(PullbackHit {
            symbol: symbol.to_string(),
            date: latest.date,
            direction: setup.direction,
            quality,
            trend_share: setup.trend_share,
            depth: setup.depth,
            velocity: setup.velocity,
            touches: setup.touches,
            percent_b: setup.percent_b,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(percent_bs: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        percent_bs
            .iter()
            .enumerate()
            .map(|(i, &pb)| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close: 100.0,
                upper_band: 104.0,
                middle_band: 100.0,
                lower_band: 96.0,
                percent_b: pb,
                bandwidth: 8.0,
                bandwidth_percentile: 50.0,
            })
            .collect()
    }

    #[test]
    fn test_bull_pullback_hit() {
        let mut pbs = vec![0.8; 16];
        pbs.extend([0.9, 0.75, 0.6, 0.5]);
        let scanner = PullbackScanner::new(Direction::Bullish, PullbackScanParams::default());
        let hit = scanner.evaluate("PB", &series(&pbs)).unwrap();
        let ScanResult::Pullback(hit) = hit else {
            panic!("expected pullback hit");
        };
        assert_eq!(hit.direction, Direction::Bullish);
        // the latest sits on 0.5, every earlier observation above it
        assert!((hit.trend_share - 0.95).abs() < 1e-12);
        assert_eq!(hit.touches, 0);
        assert!(hit.quality >= 50.0);

        let bear = PullbackScanner::new(Direction::Bearish, PullbackScanParams::default());
        assert_eq!(bear.kind(), ScannerKind::PullbackBear);
        assert!(bear.evaluate("PB", &series(&pbs)).is_none());
    }

    #[test]
    fn test_min_quality_filter() {
        let mut pbs = vec![0.8; 16];
        pbs.extend([0.9, 0.75, 0.6, 0.5]);
        let params = PullbackScanParams {
            min_quality: Percentile::new_const(100.0),
            ..PullbackScanParams::default()
        };
        let scanner = PullbackScanner::new(Direction::Bullish, params);
        assert!(scanner.evaluate("PB", &series(&pbs)).is_none());
    }
}
