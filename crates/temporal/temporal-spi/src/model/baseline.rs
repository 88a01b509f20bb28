//! Reusable expected-level baseline derived from a decomposition

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::SeriesKey;

use super::{Decomposition, GenerationId};

/// Baseline of one series as of one generation.
///
/// Holds the last trend level and the final seasonal cycle so later stages
/// can ask for the expected value at any calendar day without touching the
/// full decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub key: SeriesKey,
    pub generation: GenerationId,
    /// Last day covered by the decomposition
    pub anchor: NaiveDate,
    pub trend_level: f64,
    pub slope: f64,
    pub period: Option<usize>,
    /// Seasonal values of the last full cycle; element `period - 1` is the anchor day
    pub seasonal_profile: Vec<f64>,
    pub residual_std: f64,
}

impl BaselineSnapshot {
    /// Build from a decomposition; `None` when the decomposition is empty
    pub fn from_decomposition(decomposition: &Decomposition, generation: GenerationId) -> Option<Self> {
        let anchor = *decomposition.timestamps.last()?;
        let trend_level = *decomposition.trend.last()?;
        let seasonal_profile = match decomposition.period {
            Some(period) if decomposition.has_seasonal() && decomposition.seasonal.len() >= period => {
                decomposition.seasonal[decomposition.seasonal.len() - period..].to_vec()
            }
            _ => Vec::new(),
        };
        Some(Self {
            key: decomposition.key.clone(),
            generation,
            anchor,
            trend_level,
            slope: decomposition.slope,
            period: decomposition.period.filter(|_| !seasonal_profile.is_empty()),
            seasonal_profile,
            residual_std: decomposition.residual_std,
        })
    }

    /// Seasonal offset for a calendar day, 0 without a seasonal profile
    pub fn seasonal_at(&self, timestamp: NaiveDate) -> f64 {
        let period = self.seasonal_profile.len();
        if period == 0 {
            return 0.0;
        }
        let offset = (timestamp - self.anchor).num_days();
        let idx = (offset + period as i64 - 1).rem_euclid(period as i64) as usize;
        self.seasonal_profile[idx]
    }

    /// Last trend level plus the seasonal offset for the day
    pub fn expected_at(&self, timestamp: NaiveDate) -> f64 {
        self.trend_level + self.seasonal_at(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecompositionMode, TrendDirection};
    use chrono::Duration;
    use series_spi::GeoLevel;

    fn decomposition() -> Decomposition {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let n = 21;
        Decomposition {
            key: SeriesKey::new("MH", GeoLevel::State, "enrolment"),
            mode: DecompositionMode::Robust,
            period: Some(7),
            timestamps: (0..n).map(|i| start + Duration::days(i)).collect(),
            observed: vec![0.0; n as usize],
            trend: (0..n).map(|i| 50.0 + i as f64).collect(),
            seasonal: (0..n).map(|i| (i % 7) as f64).collect(),
            residual: vec![0.0; n as usize],
            weights: vec![1.0; n as usize],
            slope: 1.0,
            direction: TrendDirection::Increasing,
            seasonal_amplitude: 6.0,
            residual_std: 0.0,
            filled_points: 0,
        }
    }

    #[test]
    fn test_profile_keeps_phase() {
        let d = decomposition();
        let b = BaselineSnapshot::from_decomposition(&d, GenerationId(1)).unwrap();
        assert_eq!(b.trend_level, 70.0);
        assert_eq!(b.seasonal_profile.len(), 7);
        // Day 20 has phase 6; the next day wraps back to phase 0
        assert_eq!(b.seasonal_at(b.anchor), 6.0);
        assert_eq!(b.seasonal_at(b.anchor + Duration::days(1)), 0.0);
        assert_eq!(b.seasonal_at(b.anchor + Duration::days(10)), 2.0);
        assert_eq!(b.expected_at(b.anchor + Duration::days(3)), 72.0);
    }

    #[test]
    fn test_simple_trend_has_flat_baseline() {
        let mut d = decomposition();
        d.mode = DecompositionMode::SimpleTrend;
        d.seasonal.clear();
        d.residual.clear();
        let b = BaselineSnapshot::from_decomposition(&d, GenerationId(1)).unwrap();
        assert_eq!(b.period, None);
        assert_eq!(b.expected_at(b.anchor + Duration::days(5)), 70.0);
    }
}
