//! Surge predictions and the inputs surge signals read

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::{Series, SeriesKey};

use super::{AgeCohortProjection, BaselineSnapshot, Decomposition, ForecastResult};

/// Independent evidence for a future surge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgeSignalKind {
    ForecastThreshold,
    AgeTransition,
    HistoricalPattern,
    TrendAcceleration,
}

impl SurgeSignalKind {
    pub const ALL: [SurgeSignalKind; 4] = [
        SurgeSignalKind::ForecastThreshold,
        SurgeSignalKind::AgeTransition,
        SurgeSignalKind::HistoricalPattern,
        SurgeSignalKind::TrendAcceleration,
    ];

    /// Forward-looking signals that outrank the others on ties
    pub fn is_leading(self) -> bool {
        matches!(
            self,
            SurgeSignalKind::ForecastThreshold | SurgeSignalKind::AgeTransition
        )
    }
}

impl fmt::Display for SurgeSignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SurgeSignalKind::ForecastThreshold => "forecast-threshold",
            SurgeSignalKind::AgeTransition => "age-transition",
            SurgeSignalKind::HistoricalPattern => "historical-pattern",
            SurgeSignalKind::TrendAcceleration => "trend-acceleration",
        })
    }
}

/// Inclusive range of future days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurgeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SurgeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

/// Result of one signal for one (unit, window)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SignalOutcome {
    /// The signal agrees a surge is coming
    Fired {
        /// Relative excess over baseline this signal alone implies
        implied_magnitude: f64,
        /// Earliest day the signal points at, if it can tell
        onset: Option<NaiveDate>,
    },
    /// Evaluated and found nothing
    Quiet,
    /// Inputs missing; excluded from the confidence denominator
    Unavailable,
}

impl SignalOutcome {
    pub fn fired(implied_magnitude: f64) -> Self {
        SignalOutcome::Fired {
            implied_magnitude,
            onset: None,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, SignalOutcome::Fired { .. })
    }

    pub fn is_evaluated(&self) -> bool {
        !matches!(self, SignalOutcome::Unavailable)
    }
}

/// Read-only inputs for evaluating signals on one (unit, window)
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub key: &'a SeriesKey,
    pub window: SurgeWindow,
    /// Last observed day of the series
    pub as_of: NaiveDate,
    pub series: &'a Series,
    pub decomposition: Option<&'a Decomposition>,
    pub baseline: Option<&'a BaselineSnapshot>,
    pub forecast: Option<&'a ForecastResult>,
    /// Projections for this unit overlapping the window
    pub age_projections: &'a [AgeCohortProjection],
    /// Median projected count across peer units, used when a projection has no own baseline
    pub regional_age_baseline: Option<f64>,
}

/// Where the reported magnitude came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum MagnitudeSource {
    Forecast,
    Signal { kind: SurgeSignalKind },
}

/// Predicted above-baseline demand in one future window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeRecord {
    pub key: SeriesKey,
    pub window: SurgeWindow,
    /// Relative excess over baseline, e.g. 0.6 for 60% above
    pub magnitude: f64,
    pub magnitude_source: MagnitudeSource,
    /// Expected total volume over the window
    pub expected_volume: f64,
    /// Baseline total volume over the window
    pub baseline_volume: f64,
    pub days_until_onset: u32,
    /// Fired signals / evaluated signals
    pub confidence: f64,
    /// Weighted agreement, used to break confidence ties
    pub weighted_support: f64,
    pub signals: BTreeSet<SurgeSignalKind>,
    pub degraded: bool,
}
