//! Forecast records

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::SeriesKey;

/// Seasonal part of a model order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonalOrder {
    /// Seasonal autoregressive order (0 or 1)
    pub p: usize,
    /// Seasonal differencing order (0 or 1)
    pub d: usize,
    pub period: usize,
}

/// Order of an autoregressive integrated moving-average model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal: Option<SeasonalOrder>,
}

impl ModelOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            seasonal: None,
        }
    }

    pub fn with_seasonal(mut self, p: usize, d: usize, period: usize) -> Self {
        self.seasonal = Some(SeasonalOrder { p, d, period });
        self
    }

    /// Number of estimated coefficients, excluding the intercept
    pub fn coefficient_count(&self) -> usize {
        self.p + self.q + self.seasonal.map_or(0, |s| s.p)
    }
}

impl fmt::Display for ModelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if let Some(s) = self.seasonal {
            write!(f, "({},{},0)[{}]", s.p, s.d, s.period)?;
        }
        Ok(())
    }
}

/// How the forecast was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Arima,
    SeasonalNaive,
    Drift,
}

/// Why a result is degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    InsufficientData,
    FitFailure,
    Timeout,
    /// The key was listed but the source holds no series for it
    MissingSeries,
    /// The source failed for another reason
    SourceError,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DegradedReason::InsufficientData => "insufficient data",
            DegradedReason::FitFailure => "fit failure",
            DegradedReason::Timeout => "timeout",
            DegradedReason::MissingSeries => "missing series",
            DegradedReason::SourceError => "source error",
        };
        f.write_str(text)
    }
}

/// Completion status of a stage result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ResultStatus {
    Complete,
    Degraded { reason: DegradedReason },
}

impl ResultStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ResultStatus::Degraded { .. })
    }
}

/// Accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percentage error over non-zero actuals, 0.0 when every actual is zero
    pub mape: f64,
}

/// One forecast step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: NaiveDate,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Forecast for one series over a horizon of days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub key: SeriesKey,
    pub horizon: usize,
    /// Last timestamp used for training
    pub training_cutoff: NaiveDate,
    pub points: Vec<ForecastPoint>,
    pub method: ForecastMethod,
    /// Selected order; `None` for naive fallbacks
    pub order: Option<ModelOrder>,
    /// Akaike information criterion of the selected fit
    pub aic: Option<f64>,
    pub confidence_level: f64,
    pub in_sample: ErrorMetrics,
    /// Error of the selected candidate on the hold-out suffix
    pub holdout: Option<ErrorMetrics>,
    pub status: ResultStatus,
}

impl ForecastResult {
    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Stale once the source has data past the training cutoff
    pub fn is_stale(&self, latest_timestamp: NaiveDate) -> bool {
        latest_timestamp > self.training_cutoff
    }

    /// Copy of this result cut to the first `horizon` steps
    pub fn truncated(&self, horizon: usize) -> Self {
        let mut result = self.clone();
        result.points.truncate(horizon);
        result.horizon = result.points.len();
        result
    }

    /// Forecast point for a calendar day, if within the horizon
    pub fn point_at(&self, timestamp: NaiveDate) -> Option<&ForecastPoint> {
        self.points.iter().find(|p| p.timestamp == timestamp)
    }

    /// Points whose timestamps fall in `[start, end]`
    pub fn points_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&ForecastPoint> {
        self.points
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp <= end)
            .collect()
    }
}
