//! Reversion scanners: %b stretched to a band for several observations, ranked
//! by how far past the threshold it sits. Risk/reward targets the middle band.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{trailing_run, ScanResult, Scanner, ScannerKind};
use crate::{BandObservation, Direction, Period, Ratio};

/// Stop distance beyond the band, in band half-widths
const STOP_HALF_WIDTHS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReversionScanParams {
    /// %b at or below which a symbol is oversold
    pub oversold: Ratio,
    /// %b at or above which a symbol is overbought
    pub overbought: Ratio,
    pub min_days: Period,
}

impl Default for ReversionScanParams {
    fn default() -> Self {
        Self {
            oversold: Ratio::new_const(0.05),
            overbought: Ratio::new_const(0.95),
            min_days: Period::new_const(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversionHit {
    pub symbol: String,
    pub date: NaiveDate,
    /// Expected reversion direction
    pub direction: Direction,
    pub percent_b: f64,
    pub days_extended: usize,
    /// %b distance past the threshold, in percentage points
    pub extremity: f64,
    pub target: f64,
    pub stop: f64,
    /// `None` when price already sits beyond the stop
    pub risk_reward: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReversionScanner {
    direction: Direction,
    params: ReversionScanParams,
}

impl ReversionScanner {
    /// `Bullish` scans oversold symbols, `Bearish` overbought ones.
    pub fn new(direction: Direction, params: ReversionScanParams) -> Self {
        Self { direction, params }
    }
}

impl Scanner for ReversionScanner {
    fn kind(&self) -> ScannerKind {
        match self.direction {
            Direction::Bearish => ScannerKind::ReversionOverbought,
            _ => ScannerKind::ReversionOversold,
        }
    }

    fn evaluate(&self, symbol: &str, observations: &[BandObservation]) -> Option<ScanResult> {
        let latest = observations.last()?;
        let oversold = !self.direction.is_bearish();
        let threshold = if oversold {
            self.params.oversold.get()
        } else {
            self.params.overbought.get()
        };
        let extended = |o: &BandObservation| {
            if oversold {
                o.percent_b <= threshold
            } else {
                o.percent_b >= threshold
            }
        };

        let days = trailing_run(observations, extended);
        if days < self.params.min_days.get() {
            return None;
        }

        let half = latest.half_width();
        let target = latest.middle_band;
        let (stop, reward, risk) = if oversold {
            let stop = latest.lower_band - STOP_HALF_WIDTHS * half;
            (stop, target - latest.close, latest.close - stop)
        } else {
            let stop = latest.upper_band + STOP_HALF_WIDTHS * half;
            (stop, latest.close - target, stop - latest.close)
        };

        Some(ScanResult::Reversion(ReversionHit {
            symbol: symbol.to_string(),
            date: latest.date,
            direction: if oversold {
                Direction::Bullish
            } else {
                Direction::Bearish
            },
            percent_b: latest.percent_b,
            days_extended: days,
            extremity: (latest.percent_b - threshold).abs() * 100.0,
            target,
            stop,
            risk_reward: (risk > 0.0).then(|| reward / risk),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(percent_bs: &[f64]) -> Vec<BandObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        percent_bs
            .iter()
            .enumerate()
            .map(|(i, &pb)| BandObservation {
                date: start + chrono::Days::new(i as u64),
                close: 96.0 + 8.0 * pb,
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
    fn test_oversold_hit() {
        let scanner = ReversionScanner::new(Direction::Bullish, ReversionScanParams::default());
        let hit = scanner
            .evaluate("OS", &series(&[0.5, 0.04, 0.0]))
            .unwrap();
        let ScanResult::Reversion(hit) = hit else {
            panic!("expected reversion hit");
        };
        assert_eq!(hit.direction, Direction::Bullish);
        assert_eq!(hit.days_extended, 2);
        assert!((hit.extremity - 5.0).abs() < 1e-9);
        assert_eq!(hit.target, 100.0);
        assert_eq!(hit.stop, 94.0);
        // reward 4 against risk 2
        assert!((hit.risk_reward.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_overbought_hit() {
        let scanner = ReversionScanner::new(Direction::Bearish, ReversionScanParams::default());
        assert_eq!(scanner.kind(), ScannerKind::ReversionOverbought);
        let hit = scanner.evaluate("OB", &series(&[0.97, 1.1])).unwrap();
        assert!((hit.metric() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_needs_duration() {
        let scanner = ReversionScanner::new(Direction::Bullish, ReversionScanParams::default());
        assert!(scanner.evaluate("OS", &series(&[0.5, 0.3, 0.01])).is_none());
    }

    #[test]
    fn test_beyond_stop_has_no_risk_reward() {
        let scanner = ReversionScanner::new(Direction::Bullish, ReversionScanParams::default());
        let hit = scanner.evaluate("OS", &series(&[-0.4, -0.5])).unwrap();
        let ScanResult::Reversion(hit) = hit else {
            panic!("expected reversion hit");
        };
        assert!(hit.risk_reward.is_none());
    }
}
