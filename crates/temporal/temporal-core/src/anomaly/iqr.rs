//! Quartile-fence detector

use temporal_api::AnomalyConfig;
use temporal_spi::{DetectionMethod, PointDetector, PointVerdict};

use super::{constant_window_verdict, SEVERITY_CEILING};
use crate::stats::quantile_sorted;

/// Flags values outside `[Q1 - k*IQR, Q3 + k*IQR]` of the reference window
#[derive(Debug, Clone)]
pub struct QuartileDetector {
    k: f64,
    min_points: usize,
    constant_tolerance: f64,
}

impl QuartileDetector {
    pub fn new(k: f64, min_points: usize, constant_tolerance: f64) -> Self {
        Self {
            k,
            min_points,
            constant_tolerance,
        }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self::new(config.iqr_k, config.min_points, config.constant_tolerance)
    }
}

impl PointDetector for QuartileDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::RangeBased
    }

    fn evaluate(&self, window: &[f64], value: f64) -> Option<PointVerdict> {
        if window.len() < self.min_points.max(1) {
            return None;
        }
        let mut sorted: Vec<f64> = window.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let q1 = quantile_sorted(&sorted, 0.25)?;
        let q3 = quantile_sorted(&sorted, 0.75)?;
        let center = quantile_sorted(&sorted, 0.5)?;
        let iqr = q3 - q1;

        if iqr <= f64::EPSILON * center.abs().max(1.0) {
            return Some(constant_window_verdict(center, value, self.constant_tolerance));
        }

        let lower = q1 - self.k * iqr;
        let upper = q3 + self.k * iqr;
        let past = if value > upper {
            value - upper
        } else if value < lower {
            lower - value
        } else {
            0.0
        };
        let fence = (self.k * iqr).max(f64::EPSILON);

        Some(PointVerdict {
            is_anomaly: past > 0.0,
            severity: (past / fence).min(SEVERITY_CEILING),
            score: (value - center) / iqr,
            center,
            lower,
            upper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> QuartileDetector {
        QuartileDetector::new(1.5, 4, 0.01)
    }

    #[test]
    fn test_fences() {
        let window = [1.0, 2.0, 3.0, 4.0, 5.0];
        let verdict = detector().evaluate(&window, 3.0).unwrap();
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.lower, 2.0 - 1.5 * 2.0);
        assert_eq!(verdict.upper, 4.0 + 1.5 * 2.0);
        assert_eq!(verdict.severity, 0.0);
    }

    #[test]
    fn test_far_value_is_flagged() {
        let window: Vec<f64> = (0..18).map(|i| 100.0 + (i % 5) as f64).collect();
        let verdict = detector().evaluate(&window, 1000.0).unwrap();
        assert!(verdict.is_anomaly);
        assert!(verdict.severity > 1.0);
        assert!(verdict.score > 0.0);
    }

    #[test]
    fn test_drop_is_flagged() {
        let window = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let verdict = detector().evaluate(&window, 0.0).unwrap();
        assert!(verdict.is_anomaly);
        assert!(verdict.score < 0.0);
    }

    #[test]
    fn test_small_window_is_skipped() {
        assert!(detector().evaluate(&[1.0, 2.0, 3.0], 100.0).is_none());
    }

    #[test]
    fn test_constant_window() {
        let window = [50.0; 10];
        assert!(!detector().evaluate(&window, 50.2).unwrap().is_anomaly);
        let flagged = detector().evaluate(&window, 80.0).unwrap();
        assert!(flagged.is_anomaly);
        assert_eq!(flagged.severity, SEVERITY_CEILING);
    }

    #[test]
    fn test_severity_is_capped() {
        let window = [1.0, 2.0, 3.0, 4.0];
        let verdict = detector().evaluate(&window, 1e9).unwrap();
        assert_eq!(verdict.severity, SEVERITY_CEILING);
    }
}
