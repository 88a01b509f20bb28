//! Ranked, actionable insight records

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_spi::{GeoLevel, SeriesKey};

use super::{DetectionLevel, DetectionMethod, SurgeWindow};

/// Priority tier; `Critical` sorts first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 4] = [
        PriorityTier::Critical,
        PriorityTier::High,
        PriorityTier::Medium,
        PriorityTier::Low,
    ];

    /// True when `self` is at least as urgent as `other`
    pub fn at_least(self, other: PriorityTier) -> bool {
        self <= other
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PriorityTier::Critical => "critical",
            PriorityTier::High => "high",
            PriorityTier::Medium => "medium",
            PriorityTier::Low => "low",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    ResourceDeployment,
    TargetedCampaign,
    OperationalInvestigation,
    CapacityPlanning,
    Monitoring,
}

/// Service capacity needed to absorb an expected volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub expected_volume: f64,
    pub centers: u32,
    pub staff: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub summary: String,
    pub steps: Vec<String>,
    pub resources: Option<ResourceEstimate>,
    /// Days from now by which the action should start
    pub start_within_days: Option<u32>,
    pub duration_days: Option<u32>,
}

/// Upstream record an insight was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum SourceRef {
    Anomaly {
        key: SeriesKey,
        level: DetectionLevel,
        timestamp: Option<NaiveDate>,
        methods: Vec<DetectionMethod>,
    },
    Surge {
        key: SeriesKey,
        window: SurgeWindow,
    },
    Coverage {
        unit: String,
        level: GeoLevel,
    },
}

impl SourceRef {
    pub fn unit(&self) -> &str {
        match self {
            SourceRef::Anomaly { key, .. } | SourceRef::Surge { key, .. } => &key.unit,
            SourceRef::Coverage { unit, .. } => unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    /// Stable within a generation: `INS-<generation>-<seq>`
    pub id: String,
    pub rule_id: String,
    pub kind: InsightKind,
    pub tier: PriorityTier,
    pub score: f64,
    pub finding: String,
    pub sources: Vec<SourceRef>,
    pub action: RecommendedAction,
}

impl InsightRecord {
    /// True when any anomaly source points at the given day
    pub fn references_timestamp(&self, day: NaiveDate) -> bool {
        self.sources.iter().any(|s| {
            matches!(s, SourceRef::Anomaly { timestamp: Some(t), .. } if *t == day)
        })
    }
}
