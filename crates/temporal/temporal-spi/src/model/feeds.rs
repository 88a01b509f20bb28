//! Read-only external feeds

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::GeoLevel;

/// Projected number of residents crossing an enrollment-relevant age boundary
/// in one unit during `[start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeCohortProjection {
    pub unit: String,
    pub level: GeoLevel,
    /// Metric the crossing feeds into; `None` applies to every metric of the unit
    #[serde(default)]
    pub metric: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub projected_count: f64,
    /// Usual crossing count for the region over a window of the same length.
    /// When absent the median across peer units is used.
    #[serde(default)]
    pub baseline_count: Option<f64>,
}

impl AgeCohortProjection {
    /// True when `[start, end]` intersects `[from, to]`
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start <= to && self.end >= from
    }

    /// Days of `[start, end]` inside `[from, to]` as a share of the projection span
    pub fn overlap_fraction(&self, from: NaiveDate, to: NaiveDate) -> f64 {
        if !self.overlaps(from, to) {
            return 0.0;
        }
        let span = (self.end - self.start).num_days() + 1;
        let lo = self.start.max(from);
        let hi = self.end.min(to);
        let shared = (hi - lo).num_days() + 1;
        shared as f64 / span.max(1) as f64
    }

    /// True when the projection is for `unit` and covers `metric`
    pub fn applies_to(&self, unit: &str, metric: &str) -> bool {
        self.unit == unit && self.metric.as_deref().map_or(true, |m| m == metric)
    }
}

/// Biometric vs demographic update counts for one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageIndex {
    pub unit: String,
    pub level: GeoLevel,
    pub biometric: f64,
    pub demographic: f64,
}

impl CoverageIndex {
    /// biometric / demographic; `None` without demographic activity
    pub fn ratio(&self) -> Option<f64> {
        (self.demographic > 0.0).then(|| self.biometric / self.demographic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        let c = CoverageIndex {
            unit: "PUNE".into(),
            level: GeoLevel::District,
            biometric: 30.0,
            demographic: 120.0,
        };
        assert_eq!(c.ratio(), Some(0.25));
        let empty = CoverageIndex {
            demographic: 0.0,
            ..c
        };
        assert_eq!(empty.ratio(), None);
    }

    #[test]
    fn test_overlaps() {
        let d = |m: u32, day: u32| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let p = AgeCohortProjection {
            unit: "MH".into(),
            level: GeoLevel::State,
            metric: None,
            start: d(3, 1),
            end: d(3, 31),
            projected_count: 1000.0,
            baseline_count: None,
        };
        assert!(p.overlaps(d(3, 15), d(4, 15)));
        assert!(!p.overlaps(d(4, 1), d(4, 30)));
        assert!((p.overlap_fraction(d(3, 17), d(4, 15)) - 15.0 / 31.0).abs() < 1e-12);
        assert_eq!(p.overlap_fraction(d(4, 1), d(4, 30)), 0.0);
        assert!(p.applies_to("MH", "enrolment"));
        assert!(!p.applies_to("KA", "enrolment"));
    }
}
