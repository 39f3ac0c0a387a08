//! Trend scanners: established up or down trends, ranked by strength.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ScanResult, Scanner, ScannerKind};
use crate::{
    config::TrendConfig,
    trend::{BandSide, TrendAnalyzer, TrendState},
    BandObservation, Direction, Percentile, Period,
};

/// Trends younger than this are early
const EARLY_DAYS: usize = 10;
/// Trends younger than this (and not early) are established
const ESTABLISHED_DAYS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendScanParams {
    pub min_strength: Percentile,
    pub min_days: Period,
}

impl Default for TrendScanParams {
    fn default() -> Self {
        Self {
            min_strength: Percentile::new_const(50.0),
            min_days: Period::new_const(5),
        }
    }
}

/// Age of a trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendPhase {
    Early,
    Established,
    Mature,
}

impl TrendPhase {
    pub fn from_days(days: usize) -> Self {
        if days < EARLY_DAYS {
            TrendPhase::Early
        } else if days < ESTABLISHED_DAYS {
            TrendPhase::Established
        } else {
            TrendPhase::Mature
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendHit {
    pub symbol: String,
    pub date: NaiveDate,
    pub state: TrendState,
    pub strength: f64,
    pub days_in_trend: usize,
    pub phase: TrendPhase,
    pub band_walking: Option<BandSide>,
    pub slope: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendScanner {
    direction: Direction,
    params: TrendScanParams,
    analyzer: TrendAnalyzer,
}

impl TrendScanner {
    pub fn new(direction: Direction, params: TrendScanParams, trend: TrendConfig) -> Self {
        Self {
            direction,
            params,
            analyzer: TrendAnalyzer::new(trend),
        }
    }
}

impl Scanner for TrendScanner {
    fn kind(&self) -> ScannerKind {
        match self.direction {
            Direction::Bearish => ScannerKind::TrendDown,
            _ => ScannerKind::TrendUp,
        }
    }

    fn evaluate(&self, symbol: &str, observations: &[BandObservation]) -> Option<ScanResult> {
        let reading = self.analyzer.analyze(observations)?;
        if reading.state.direction() != self.direction {
            return None;
        }
        if reading.strength < self.params.min_strength.get()
            || reading.days_in_trend < self.params.min_days.get()
        {
            return None;
        }

        Some(ScanResult::Trend(TrendHit {
            symbol: symbol.to_string(),
            date: reading.date,
            state: reading.state,
            strength: reading.strength,
            days_in_trend: reading.days_in_trend,
            phase: TrendPhase::from_days(reading.days_in_trend),
            band_walking: reading.band_walking,
            slope: reading.slope,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(percent_bs: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        percent_bs
            .iter()
            .enumerate()
            .map(|(i, &pb)| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close: 100.0,
                upper_band: 102.0,
                middle_band: 100.0,
                lower_band: 98.0,
                percent_b: pb,
                bandwidth: 4.0,
                bandwidth_percentile: 50.0,
            })
            .collect()
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(TrendPhase::from_days(9), TrendPhase::Early);
        assert_eq!(TrendPhase::from_days(10), TrendPhase::Established);
        assert_eq!(TrendPhase::from_days(29), TrendPhase::Established);
        assert_eq!(TrendPhase::from_days(30), TrendPhase::Mature);
    }

    #[test]
    fn test_uptrend_hit() {
        let scanner = TrendScanner::new(
            Direction::Bullish,
            TrendScanParams::default(),
            TrendConfig::default(),
        );
        let hit = scanner.evaluate("UP", &series(&[0.7; 12])).unwrap();
        let ScanResult::Trend(hit) = hit else {
            panic!("expected trend hit");
        };
        assert_eq!(hit.state, TrendState::Uptrend);
        assert_eq!(hit.days_in_trend, 12);
        assert_eq!(hit.phase, TrendPhase::Established);
        assert!((hit.strength - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_filter() {
        let down = TrendScanner::new(
            Direction::Bearish,
            TrendScanParams::default(),
            TrendConfig::default(),
        );
        assert_eq!(down.kind(), ScannerKind::TrendDown);
        assert!(down.evaluate("UP", &series(&[0.7; 12])).is_none());
        assert!(down.evaluate("DN", &series(&[0.3; 12])).is_some());
    }

    #[test]
    fn test_young_trend_rejected() {
        let scanner = TrendScanner::new(
            Direction::Bullish,
            TrendScanParams::default(),
            TrendConfig::default(),
        );
        let mut pbs = vec![0.7; 15];
        pbs.push(0.55);
        pbs.extend([0.7, 0.7, 0.7]);
        // uptrend overall, but only 3 observations since the dip
        assert!(scanner.evaluate("YOUNG", &series(&pbs)).is_none());
    }
}
