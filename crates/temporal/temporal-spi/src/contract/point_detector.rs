//! Trait for window-based outlier estimators

use crate::model::{DetectionMethod, PointVerdict};

/// Judges one value against a reference window.
///
/// Implementations are pure: the same window and value always give the same
/// verdict.
pub trait PointDetector: Send + Sync {
    fn method(&self) -> DetectionMethod;

    /// Evaluate `value` against `window`, which must not contain `value`'s own observation.
    ///
    /// Returns `None` when the window is too small to judge.
    fn evaluate(&self, window: &[f64], value: f64) -> Option<PointVerdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mock implementation: flags anything above the window maximum
    struct MaxDetector;

    impl PointDetector for MaxDetector {
        fn method(&self) -> DetectionMethod {
            DetectionMethod::RangeBased
        }

        fn evaluate(&self, window: &[f64], value: f64) -> Option<PointVerdict> {
            let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
            if window.is_empty() {
                return None;
            }
            Some(PointVerdict {
                is_anomaly: value > max,
                severity: if value > max { 1.0 } else { 0.0 },
                score: value - max,
                center: (max + min) / 2.0,
                lower: min,
                upper: max,
            })
        }
    }

    #[test]
    fn test_detector_trait_object() {
        let detectors: Vec<Box<dyn PointDetector>> = vec![Box::new(MaxDetector)];
        let verdict = detectors[0].evaluate(&[1.0, 2.0, 3.0], 5.0).unwrap();
        assert!(verdict.is_anomaly);
        assert!(detectors[0].evaluate(&[], 5.0).is_none());
    }
}
