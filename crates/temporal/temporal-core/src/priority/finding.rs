//! Findings: the unit of work the rule book is evaluated against

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use series_spi::{GeoLevel, SeriesKey};
use temporal_api::{FindingKind, RuleCondition};
use temporal_spi::{
    AnomalyRecord, CoverageIndex, DetectionLevel, DetectionMethod, SourceRef, SurgeRecord,
};

/// All records that flagged one point, merged
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyFinding {
    pub key: SeriesKey,
    pub level: DetectionLevel,
    pub timestamp: Option<NaiveDate>,
    pub methods: BTreeSet<DetectionMethod>,
    /// Largest severity across the merged records
    pub severity: f64,
    pub observed: f64,
    pub expected: f64,
}

/// Unit whose biometric share of updates is below the floor
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageFinding {
    pub unit: String,
    pub level: GeoLevel,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    Surge(SurgeRecord),
    Anomaly(AnomalyFinding),
    Coverage(CoverageFinding),
}

impl Finding {
    pub fn kind(&self) -> FindingKind {
        match self {
            Finding::Surge(_) => FindingKind::Surge,
            Finding::Anomaly(_) => FindingKind::Anomaly,
            Finding::Coverage(_) => FindingKind::Coverage,
        }
    }

    pub fn unit(&self) -> &str {
        match self {
            Finding::Surge(s) => &s.key.unit,
            Finding::Anomaly(a) => &a.key.unit,
            Finding::Coverage(c) => &c.unit,
        }
    }

    pub fn level(&self) -> GeoLevel {
        match self {
            Finding::Surge(s) => s.key.level,
            Finding::Anomaly(a) => a.key.level,
            Finding::Coverage(c) => c.level,
        }
    }

    pub fn metric(&self) -> &str {
        match self {
            Finding::Surge(s) => &s.key.metric,
            Finding::Anomaly(a) => &a.key.metric,
            Finding::Coverage(_) => "coverage",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Finding::Surge(s) if s.degraded)
    }

    /// Coverage ratio for coverage gaps and coverage-ratio anomalies
    pub fn coverage_ratio(&self) -> Option<f64> {
        match self {
            Finding::Coverage(c) => Some(c.ratio),
            Finding::Anomaly(a) if a.level == DetectionLevel::CoverageRatio => Some(a.observed),
            _ => None,
        }
    }

    pub fn source(&self) -> SourceRef {
        match self {
            Finding::Surge(s) => SourceRef::Surge {
                key: s.key.clone(),
                window: s.window,
            },
            Finding::Anomaly(a) => SourceRef::Anomaly {
                key: a.key.clone(),
                level: a.level,
                timestamp: a.timestamp,
                methods: a.methods.iter().copied().collect(),
            },
            Finding::Coverage(c) => SourceRef::Coverage {
                unit: c.unit.clone(),
                level: c.level,
            },
        }
    }

    /// Evaluate a rule condition against this finding
    pub fn matches(&self, condition: &RuleCondition) -> bool {
        use RuleCondition as C;

        match condition {
            C::Always => true,
            C::All { of } => of.iter().all(|c| self.matches(c)),
            C::Any { of } => of.iter().any(|c| self.matches(c)),
            C::Not { condition } => !self.matches(condition),
            C::FindingKind { is } => self.kind() == *is,
            C::Degraded => self.is_degraded(),
            C::CoverageRatioBelow { value } => {
                self.coverage_ratio().is_some_and(|r| r < *value)
            }

            C::SurgeConfidenceAtLeast { value } => {
                self.surge().is_some_and(|s| s.confidence >= *value)
            }
            C::DaysUntilOnsetAtMost { days } => {
                self.surge().is_some_and(|s| s.days_until_onset <= *days)
            }
            C::DaysUntilOnsetBetween { min, max } => self
                .surge()
                .is_some_and(|s| (*min..=*max).contains(&s.days_until_onset)),
            C::MagnitudeAtLeast { value } => self.surge().is_some_and(|s| s.magnitude >= *value),
            C::ExpectedVolumeAtLeast { value } => {
                self.surge().is_some_and(|s| s.expected_volume >= *value)
            }

            C::SeverityAtLeast { value } => self.anomaly().is_some_and(|a| a.severity >= *value),
            C::DetectedByBoth => self.anomaly().is_some_and(|a| a.methods.len() >= 2),
            C::DetectionLevel { level } => self.anomaly().is_some_and(|a| a.level == *level),
            C::ObservedBelowExpected => {
                self.anomaly().is_some_and(|a| a.observed < a.expected)
            }
            C::ObservedAtMost { value } => self.anomaly().is_some_and(|a| a.observed <= *value),
        }
    }

    fn surge(&self) -> Option<&SurgeRecord> {
        match self {
            Finding::Surge(s) => Some(s),
            _ => None,
        }
    }

    fn anomaly(&self) -> Option<&AnomalyFinding> {
        match self {
            Finding::Anomaly(a) => Some(a),
            _ => None,
        }
    }
}

/// Merge records that flag the same (key, level, timestamp)
pub fn merge_anomalies(records: &[AnomalyRecord]) -> Vec<AnomalyFinding> {
    let mut merged: BTreeMap<(SeriesKey, DetectionLevel, Option<NaiveDate>), AnomalyFinding> =
        BTreeMap::new();

    for record in records {
        let group = (record.key.clone(), record.level, record.timestamp);
        let finding = merged.entry(group).or_insert_with(|| AnomalyFinding {
            key: record.key.clone(),
            level: record.level,
            timestamp: record.timestamp,
            methods: BTreeSet::new(),
            severity: 0.0,
            observed: record.observed,
            expected: record.expected,
        });
        finding.methods.insert(record.method);
        finding.severity = finding.severity.max(record.severity);
    }

    merged.into_values().collect()
}

/// Units whose coverage ratio is below `floor`; units without demographic activity are ignored
pub fn coverage_gaps(indices: &[CoverageIndex], floor: f64) -> Vec<CoverageFinding> {
    let mut gaps: Vec<CoverageFinding> = indices
        .iter()
        .filter_map(|c| {
            let ratio = c.ratio()?;
            (ratio < floor).then(|| CoverageFinding {
                unit: c.unit.clone(),
                level: c.level,
                ratio,
            })
        })
        .collect();
    gaps.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.unit.cmp(&b.unit)));
    gaps
}
