//! Trend / seasonal / residual split of one series

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::SeriesKey;

/// Which decomposition path produced the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMode {
    /// Robust iterative loess with a detected seasonal period
    Robust,
    /// Linear regression only; seasonal and residual are empty
    SimpleTrend,
}

/// Sign of the trend slope after applying the stability dead-zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Decomposition of one series at one snapshot.
///
/// `trend`, `seasonal`, `residual` and `weights` are aligned index for index
/// with `timestamps`, which is the gap-filled calendar of the source series.
/// In simple-trend mode `seasonal` and `residual` are empty and `trend` holds
/// the regression line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub key: SeriesKey,
    pub mode: DecompositionMode,
    /// Seasonal period in days, if one was detected
    pub period: Option<usize>,
    pub timestamps: Vec<NaiveDate>,
    /// Observed values after gap filling
    pub observed: Vec<f64>,
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    /// Final robustness weight per point, 1.0 for an inlier and 0.0 for a rejected outlier
    pub weights: Vec<f64>,
    /// Slope of the trend component per day
    pub slope: f64,
    pub direction: TrendDirection,
    /// max - min of the seasonal component
    pub seasonal_amplitude: f64,
    /// Sample standard deviation of the residual component
    pub residual_std: f64,
    /// Number of calendar gaps filled by interpolation
    pub filled_points: usize,
}

impl Decomposition {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn has_seasonal(&self) -> bool {
        self.mode == DecompositionMode::Robust && !self.seasonal.is_empty()
    }

    /// Trend plus seasonal at index `i`; trend alone in simple-trend mode
    pub fn baseline_at(&self, i: usize) -> Option<f64> {
        let trend = *self.trend.get(i)?;
        let seasonal = self.seasonal.get(i).copied().unwrap_or(0.0);
        Some(trend + seasonal)
    }

    /// Index of a timestamp in the filled calendar
    pub fn index_of(&self, timestamp: NaiveDate) -> Option<usize> {
        self.timestamps.binary_search(&timestamp).ok()
    }

    /// Share of variance explained by the seasonal component, in [0, 1].
    ///
    /// `max(0, 1 - var(residual) / var(seasonal + residual))`; zero without a seasonal part.
    pub fn seasonal_strength(&self) -> f64 {
        if !self.has_seasonal() {
            return 0.0;
        }
        let detrended: Vec<f64> = self
            .seasonal
            .iter()
            .zip(&self.residual)
            .map(|(s, r)| s + r)
            .collect();
        let var_detrended = variance(&detrended);
        if var_detrended <= f64::EPSILON {
            return 0.0;
        }
        (1.0 - variance(&self.residual) / var_detrended).clamp(0.0, 1.0)
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}
