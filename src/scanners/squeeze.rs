//! Squeeze scanner: bandwidth pinned at a historically low percentile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{trailing_run, ScanResult, Scanner, ScannerKind};
use crate::{BandObservation, Percentile, Period};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqueezeScanParams {
    pub max_percentile: Percentile,
    pub min_days: Period,
}

impl Default for SqueezeScanParams {
    fn default() -> Self {
        Self {
            max_percentile: Percentile::new_const(5.0),
            min_days: Period::new_const(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqueezeHit {
    pub symbol: String,
    pub date: NaiveDate,
    pub bandwidth: f64,
    pub bandwidth_percentile: f64,
    pub days_in_squeeze: usize,
    /// Depth below the threshold, 0..=100
    pub intensity: f64,
    pub percent_b: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqueezeScanner {
    pub params: SqueezeScanParams,
}

impl SqueezeScanner {
    pub fn new(params: SqueezeScanParams) -> Self {
        Self { params }
    }
}

impl Scanner for SqueezeScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::Squeeze
    }

    fn evaluate(&self, symbol: &str, observations: &[BandObservation]) -> Option<ScanResult> {
        let latest = observations.last()?;
        let max = self.params.max_percentile.get();
        let days = trailing_run(observations, |o| o.bandwidth_percentile <= max);
        if days < self.params.min_days.get() {
            return None;
        }

        let intensity = if max > 0.0 {
            ((max - latest.bandwidth_percentile) / max * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };

        Some(ScanResult::Squeeze(SqueezeHit {
            symbol: symbol.to_string(),
            date: latest.date,
            bandwidth: latest.bandwidth,
            bandwidth_percentile: latest.bandwidth_percentile,
            days_in_squeeze: days,
            intensity,
            percent_b: latest.percent_b,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(percentiles: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        percentiles
            .iter()
            .enumerate()
            .map(|(i, &p)| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close: 100.0,
                upper_band: 101.0,
                middle_band: 100.0,
                lower_band: 99.0,
                percent_b: 0.5,
                bandwidth: 2.0,
                bandwidth_percentile: p,
            })
            .collect()
    }

    #[test]
    fn test_squeeze_hit() {
        let hit = SqueezeScanner::default()
            .evaluate("SQ", &series(&[40.0, 4.0, 3.0, 2.5]))
            .unwrap();
        let ScanResult::Squeeze(hit) = hit else {
            panic!("expected squeeze hit");
        };
        assert_eq!(hit.days_in_squeeze, 3);
        assert!((hit.intensity - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_bar_noise_rejected() {
        assert!(SqueezeScanner::default()
            .evaluate("SQ", &series(&[40.0, 40.0, 1.0]))
            .is_none());
        assert!(SqueezeScanner::default().evaluate("SQ", &[]).is_none());
    }
}
