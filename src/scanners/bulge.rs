//! Bulge scanner: bandwidth at a historically high percentile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{trailing_run, ScanResult, Scanner, ScannerKind};
use crate::{BandObservation, Percentile, Period};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulgeScanParams {
    pub min_percentile: Percentile,
    pub min_days: Period,
}

impl Default for BulgeScanParams {
    fn default() -> Self {
        Self {
            min_percentile: Percentile::new_const(95.0),
            min_days: Period::new_const(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulgeHit {
    pub symbol: String,
    pub date: NaiveDate,
    pub bandwidth: f64,
    pub bandwidth_percentile: f64,
    pub days_in_bulge: usize,
    /// Height above the threshold, 0..=100
    pub intensity: f64,
    pub percent_b: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BulgeScanner {
    pub params: BulgeScanParams,
}

impl BulgeScanner {
    pub fn new(params: BulgeScanParams) -> Self {
        Self { params }
    }
}

impl Scanner for BulgeScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::Bulge
    }

    fn evaluate(&self, symbol: &str, observations: &[BandObservation]) -> Option<ScanResult> {
        let latest = observations.last()?;
        let min = self.params.min_percentile.get();
        let days = trailing_run(observations, |o| o.bandwidth_percentile >= min);
        if days < self.params.min_days.get() {
            return None;
        }

        let intensity = if min < 100.0 {
            ((latest.bandwidth_percentile - min) / (100.0 - min) * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };

        Some(ScanResult::Bulge(BulgeHit {
            symbol: symbol.to_string(),
            date: latest.date,
            bandwidth: latest.bandwidth,
            bandwidth_percentile: latest.bandwidth_percentile,
            days_in_bulge: days,
            intensity,
            percent_b: latest.percent_b,
        }))
    }
}
