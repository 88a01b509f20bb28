//! Seasonal period detection
//!
//! Candidate lags are scored by the autocorrelation of the linearly
//! detrended series. A lag only qualifies when the history covers at least
//! two full cycles and its autocorrelation clears the significance floor.
//! Isolated spikes would otherwise swamp the autocorrelation, so detrended
//! values are clipped to a robust band around their median first.

use crate::stats::{autocorrelation, linear_fit, mad, median};

/// Clip band half-width in robust standard deviations
const CLIP_SIGMAS: f64 = 5.0;

/// Autocorrelation-based period detector
#[derive(Debug, Clone)]
pub struct PeriodDetector {
    candidates: Vec<usize>,
    floor: f64,
}

impl PeriodDetector {
    /// Create a new detector over the given candidate lags
    pub fn new(candidates: Vec<usize>, floor: f64) -> Self {
        Self { candidates, floor }
    }

    /// Strongest qualifying lag, or `None` when the evidence is inconclusive
    pub fn detect(&self, data: &[f64]) -> Option<usize> {
        let detrended = detrend(data);
        self.candidates
            .iter()
            .copied()
            .filter(|&lag| lag >= 2 && data.len() >= lag * 2)
            .map(|lag| (lag, autocorrelation(&detrended, lag)))
            .filter(|(_, acf)| *acf >= self.floor)
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(lag, _)| lag)
    }

    /// Autocorrelation of the detrended series at every candidate lag
    pub fn scores(&self, data: &[f64]) -> Vec<(usize, f64)> {
        let detrended = detrend(data);
        self.candidates
            .iter()
            .map(|&lag| (lag, autocorrelation(&detrended, lag)))
            .collect()
    }
}

impl Default for PeriodDetector {
    fn default() -> Self {
        Self::new(vec![7, 30], 0.3)
    }
}

fn detrend(data: &[f64]) -> Vec<f64> {
    let detrended: Vec<f64> = match linear_fit(data) {
        Some(fit) => data
            .iter()
            .enumerate()
            .map(|(t, v)| v - fit.at(t as f64))
            .collect(),
        None => data.to_vec(),
    };
    clip(detrended)
}

fn clip(values: Vec<f64>) -> Vec<f64> {
    let Some(center) = median(&values) else {
        return values;
    };
    let spread = mad(&values, center).unwrap_or(0.0) * 1.4826;
    if spread <= f64::EPSILON {
        return values;
    }
    let (lo, hi) = (center - CLIP_SIGMAS * spread, center + CLIP_SIGMAS * spread);
    values.into_iter().map(|v| v.clamp(lo, hi)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn weekly(n: usize, slope: f64) -> Vec<f64> {
        (0..n)
            .map(|t| 100.0 + slope * t as f64 + 20.0 * (2.0 * PI * t as f64 / 7.0).sin())
            .collect()
    }

    #[test]
    fn test_detects_weekly_under_trend() {
        let detector = PeriodDetector::default();
        assert_eq!(detector.detect(&weekly(120, 3.0)), Some(7));
    }

    #[test]
    fn test_detects_monthly() {
        let data: Vec<f64> = (0..150)
            .map(|t| 50.0 + 10.0 * (2.0 * PI * t as f64 / 30.0).cos())
            .collect();
        assert_eq!(PeriodDetector::default().detect(&data), Some(30));
    }

    #[test]
    fn test_requires_two_cycles() {
        let detector = PeriodDetector::new(vec![30], 0.3);
        let data: Vec<f64> = (0..45)
            .map(|t| (2.0 * PI * t as f64 / 30.0).sin())
            .collect();
        assert_eq!(detector.detect(&data), None);
    }

    #[test]
    fn test_pure_trend_is_inconclusive() {
        let data: Vec<f64> = (0..100).map(|t| t as f64 * 2.0).collect();
        assert_eq!(PeriodDetector::default().detect(&data), None);
    }

    #[test]
    fn test_single_spike_does_not_hide_period() {
        let mut data = weekly(400, 2.0);
        data[350] *= 20.0;
        assert_eq!(PeriodDetector::default().detect(&data), Some(7));
    }

    #[test]
    fn test_scores_cover_candidates() {
        let scores = PeriodDetector::default().scores(&weekly(70, 0.0));
        assert_eq!(scores.len(), 2);
        assert!(scores[0].1 > scores[1].1);
    }
}
