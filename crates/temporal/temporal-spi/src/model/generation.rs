//! One complete pipeline run

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::SeriesKey;

use super::{
    AnomalyRecord, BaselineSnapshot, Decomposition, DegradedReason, ForecastResult,
    InsightRecord, SurgeRecord,
};

/// Monotonic run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(pub u64);

impl GenerationId {
    pub fn next(self) -> Self {
        GenerationId(self.0 + 1)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How far the per-series stages got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SeriesStatus {
    Complete,
    Degraded { reasons: Vec<DegradedReason> },
    Skipped { reason: DegradedReason },
}

/// Per-series status plus the messages of any errors caught at the series boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesOutcome {
    pub key: SeriesKey,
    pub status: SeriesStatus,
    pub messages: Vec<String>,
}

/// Immutable output of one run against one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub id: GenerationId,
    /// Store version the run read
    pub snapshot_version: u64,
    /// Latest observation day across all series
    pub as_of: Option<NaiveDate>,
    pub decompositions: Vec<Decomposition>,
    pub baselines: Vec<BaselineSnapshot>,
    pub forecasts: Vec<ForecastResult>,
    pub anomalies: Vec<AnomalyRecord>,
    pub surges: Vec<SurgeRecord>,
    pub insights: Vec<InsightRecord>,
    pub outcomes: Vec<SeriesOutcome>,
}

impl Generation {
    pub fn decomposition(&self, key: &SeriesKey) -> Option<&Decomposition> {
        self.decompositions.iter().find(|d| &d.key == key)
    }

    pub fn forecast(&self, key: &SeriesKey) -> Option<&ForecastResult> {
        self.forecasts.iter().find(|f| &f.key == key)
    }

    pub fn baseline(&self, key: &SeriesKey) -> Option<&BaselineSnapshot> {
        self.baselines.iter().find(|b| &b.key == key)
    }

    pub fn outcome(&self, key: &SeriesKey) -> Option<&SeriesOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    pub fn anomalies_for<'a>(
        &'a self,
        key: &'a SeriesKey,
    ) -> impl Iterator<Item = &'a AnomalyRecord> + 'a {
        self.anomalies.iter().filter(move |a| &a.key == key)
    }

    /// Number of series that did not complete cleanly
    pub fn degraded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status != SeriesStatus::Complete)
            .count()
    }
}
