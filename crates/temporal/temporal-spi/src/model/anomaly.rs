//! Anomaly records

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::SeriesKey;

/// Robust estimator that flagged the point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Quartile fences: [Q1 - k*IQR, Q3 + k*IQR]
    RangeBased,
    /// Modified z-score: 0.6745 * (x - median) / MAD
    DeviationBased,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionMethod::RangeBased => "range-based",
            DetectionMethod::DeviationBased => "deviation-based",
        })
    }
}

/// Aggregation level the detector ran at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLevel {
    /// Raw values against a trailing window of the same series
    Temporal,
    /// Decomposition residuals against a trailing window
    Residual,
    /// One unit against its siblings at the same timestamp
    Geographic,
    /// Coverage ratio of one unit against its peers
    CoverageRatio,
    /// Daily share of one age group against a trailing window of that share
    AgeGroupShare,
}

impl fmt::Display for DetectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionLevel::Temporal => "temporal",
            DetectionLevel::Residual => "residual",
            DetectionLevel::Geographic => "geographic",
            DetectionLevel::CoverageRatio => "coverage-ratio",
            DetectionLevel::AgeGroupShare => "age-group-share",
        })
    }
}

/// Outcome of evaluating one value against one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointVerdict {
    pub is_anomaly: bool,
    /// Distance past the threshold, normalized; 0 for inliers
    pub severity: f64,
    /// Raw statistic: modified z-score, or signed distance in IQR units
    pub score: f64,
    /// Window center (median)
    pub center: f64,
    pub lower: f64,
    pub upper: f64,
}

/// One flagged point from one detector.
///
/// Both detectors may flag the same point; each produces its own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Series the point belongs to; for cross-sectional levels, the flagged unit's series
    pub key: SeriesKey,
    pub level: DetectionLevel,
    pub method: DetectionMethod,
    /// Observation day; `None` for coverage findings, which have no single day
    pub timestamp: Option<NaiveDate>,
    pub severity: f64,
    pub score: f64,
    pub observed: f64,
    pub expected: f64,
    pub lower: f64,
    pub upper: f64,
}

impl AnomalyRecord {
    /// Observed value sits below the expected value
    pub fn is_drop(&self) -> bool {
        self.observed < self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DetectionMethod::RangeBased.to_string(), "range-based");
        assert_eq!(DetectionLevel::CoverageRatio.to_string(), "coverage-ratio");
        assert_eq!(DetectionLevel::AgeGroupShare.to_string(), "age-group-share");
    }

    #[test]
    fn test_method_order_is_stable() {
        let mut methods = vec![DetectionMethod::DeviationBased, DetectionMethod::RangeBased];
        methods.sort();
        assert_eq!(methods[0], DetectionMethod::RangeBased);
    }
}
