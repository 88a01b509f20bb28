//! Modified z-score detector

use temporal_api::AnomalyConfig;
use temporal_spi::{DetectionMethod, PointDetector, PointVerdict};

use super::{constant_window_verdict, SEVERITY_CEILING};
use crate::stats::{mad, mean_abs_deviation, median};

/// Consistency constant relating MAD to the standard deviation of a normal
const MAD_SCALE: f64 = 0.6745;
/// Consistency constant relating mean absolute deviation to the standard deviation
const MEAN_AD_SCALE: f64 = 1.2533;

/// Flags values whose modified z-score `0.6745 * (x - median) / MAD` exceeds a threshold.
///
/// A zero MAD falls back to the mean absolute deviation; a window with
/// neither is treated as constant.
#[derive(Debug, Clone)]
pub struct RobustZDetector {
    threshold: f64,
    min_points: usize,
    constant_tolerance: f64,
}

impl RobustZDetector {
    pub fn new(threshold: f64, min_points: usize, constant_tolerance: f64) -> Self {
        Self {
            threshold,
            min_points,
            constant_tolerance,
        }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self::new(config.z_threshold, config.min_points, config.constant_tolerance)
    }
}

impl PointDetector for RobustZDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::DeviationBased
    }

    fn evaluate(&self, window: &[f64], value: f64) -> Option<PointVerdict> {
        if window.len() < self.min_points.max(1) {
            return None;
        }
        let center = median(window)?;
        let eps = f64::EPSILON * center.abs().max(1.0);

        // Spread expressed as one standard deviation
        let mad = mad(window, center)?;
        let sigma = if mad > eps {
            mad / MAD_SCALE
        } else {
            let mean_ad = mean_abs_deviation(window, center);
            if mean_ad <= eps {
                return Some(constant_window_verdict(center, value, self.constant_tolerance));
            }
            MEAN_AD_SCALE * mean_ad
        };

        let z = (value - center) / sigma;
        let excess = (z.abs() - self.threshold) / self.threshold;

        Some(PointVerdict {
            is_anomaly: z.abs() > self.threshold,
            severity: excess.clamp(0.0, SEVERITY_CEILING),
            score: z,
            center,
            lower: center - self.threshold * sigma,
            upper: center + self.threshold * sigma,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RobustZDetector {
        RobustZDetector::new(3.0, 4, 0.01)
    }

    #[test]
    fn test_z_score() {
        // median 3, MAD 1
        let window = [1.0, 2.0, 3.0, 4.0, 5.0];
        let verdict = detector().evaluate(&window, 3.0 + 1.0 / 0.6745).unwrap();
        assert!((verdict.score - 1.0).abs() < 1e-9);
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.severity, 0.0);
    }

    #[test]
    fn test_severity_past_threshold() {
        let window = [1.0, 2.0, 3.0, 4.0, 5.0];
        let verdict = detector().evaluate(&window, 3.0 + 6.0 / 0.6745).unwrap();
        assert!(verdict.is_anomaly);
        assert!((verdict.severity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_window_small_offset() {
        let window = [200.0; 12];
        let verdict = detector().evaluate(&window, 200.5).unwrap();
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.severity, 0.0);
    }

    #[test]
    fn test_constant_window_large_offset() {
        let window = [200.0; 12];
        let verdict = detector().evaluate(&window, 260.0).unwrap();
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.severity, SEVERITY_CEILING);
        assert!(verdict.score.is_finite());
    }

    #[test]
    fn test_zero_mad_uses_mean_deviation() {
        // More than half the window equals the median, so MAD is zero
        let window = [10.0, 10.0, 10.0, 10.0, 10.0, 12.0, 8.0];
        let verdict = detector().evaluate(&window, 30.0).unwrap();
        assert!(verdict.is_anomaly);
        assert!(verdict.score.is_finite());
        assert!(!detector().evaluate(&window, 11.0).unwrap().is_anomaly);
    }

    #[test]
    fn test_small_window_is_skipped() {
        assert!(detector().evaluate(&[1.0, 1.0], 9.0).is_none());
    }
}
