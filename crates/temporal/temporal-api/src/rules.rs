//! Declarative priority rules
//!
//! A rule pairs a condition over one finding with a tier and an action
//! template. Rules are plain data so the whole book can be replaced from a
//! config file.

use serde::{Deserialize, Serialize};
use temporal_spi::{DetectionLevel, InsightKind, PriorityTier};

/// What a finding was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Surge,
    Anomaly,
    Coverage,
}

/// Predicate over one finding.
///
/// Predicates that do not apply to a finding's kind evaluate to false, so
/// `surge_confidence_at_least` never matches an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RuleCondition {
    Always,
    All { of: Vec<RuleCondition> },
    Any { of: Vec<RuleCondition> },
    Not { condition: Box<RuleCondition> },
    FindingKind { is: FindingKind },
    SurgeConfidenceAtLeast { value: f64 },
    DaysUntilOnsetAtMost { days: u32 },
    DaysUntilOnsetBetween { min: u32, max: u32 },
    MagnitudeAtLeast { value: f64 },
    ExpectedVolumeAtLeast { value: f64 },
    SeverityAtLeast { value: f64 },
    /// Both robust estimators flagged the point
    DetectedByBoth,
    DetectionLevel { level: DetectionLevel },
    ObservedBelowExpected,
    ObservedAtMost { value: f64 },
    CoverageRatioBelow { value: f64 },
    Degraded,
}

impl RuleCondition {
    pub fn all(of: Vec<RuleCondition>) -> Self {
        RuleCondition::All { of }
    }

    pub fn any(of: Vec<RuleCondition>) -> Self {
        RuleCondition::Any { of }
    }

    pub fn not(condition: RuleCondition) -> Self {
        RuleCondition::Not {
            condition: Box::new(condition),
        }
    }

    pub fn kind(is: FindingKind) -> Self {
        RuleCondition::FindingKind { is }
    }
}

/// Text and shape of the recommended action.
///
/// `finding` and `summary` accept the placeholders `{unit}`, `{level}`,
/// `{metric}`, `{days}`, `{date}`, `{volume}`, `{magnitude_pct}`,
/// `{confidence_pct}`, `{severity}`, `{ratio}`, `{centers}`, `{staff}` and
/// `{signals}`. Placeholders without a value for the finding are left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub finding: String,
    pub summary: String,
    #[serde(default)]
    pub steps: Vec<String>,
    /// Attach a center/staff estimate from the expected volume
    #[serde(default)]
    pub estimate_resources: bool,
    #[serde(default)]
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityRule {
    pub id: String,
    pub tier: PriorityTier,
    pub kind: InsightKind,
    pub when: RuleCondition,
    pub action: ActionTemplate,
}

fn template(finding: &str, summary: &str, steps: &[&str]) -> ActionTemplate {
    ActionTemplate {
        finding: finding.to_string(),
        summary: summary.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        estimate_resources: false,
        duration_days: None,
    }
}

/// Built-in rule book, most urgent tier first
pub fn default_rules() -> Vec<PriorityRule> {
    use FindingKind::*;
    use RuleCondition as C;

    vec![
        PriorityRule {
            id: "deploy-imminent-surge".into(),
            tier: PriorityTier::Critical,
            kind: InsightKind::ResourceDeployment,
            when: C::all(vec![
                C::kind(Surge),
                C::SurgeConfidenceAtLeast { value: 0.75 },
                C::DaysUntilOnsetAtMost { days: 30 },
                C::MagnitudeAtLeast { value: 0.3 },
            ]),
            action: ActionTemplate {
                estimate_resources: true,
                duration_days: Some(60),
                ..template(
                    "{metric} surge of {magnitude_pct}% expected in {unit} ({level}) in {days} days, confidence {confidence_pct}%",
                    "Deploy {centers} additional service centers and {staff} staff in {unit}",
                    &[
                        "Set up temporary enrollment centers",
                        "Deploy mobile enrollment units",
                        "Extend operating hours at existing centers",
                        "Pre-position biometric devices",
                    ],
                )
            },
        },
        PriorityRule {
            id: "investigate-zero-volume".into(),
            tier: PriorityTier::Critical,
            kind: InsightKind::OperationalInvestigation,
            when: C::all(vec![
                C::kind(Anomaly),
                C::DetectionLevel {
                    level: DetectionLevel::Temporal,
                },
                C::ObservedAtMost { value: 0.0 },
                C::ObservedBelowExpected,
            ]),
            action: ActionTemplate {
                duration_days: Some(7),
                ..template(
                    "No {metric} activity recorded in {unit} on {date}",
                    "Check center operations and data pipeline for {unit}",
                    &[
                        "Check center operational status",
                        "Verify data submission pipeline",
                        "Investigate technical issues",
                    ],
                )
            },
        },
        PriorityRule {
            id: "deploy-surge".into(),
            tier: PriorityTier::High,
            kind: InsightKind::ResourceDeployment,
            when: C::all(vec![
                C::kind(Surge),
                C::SurgeConfidenceAtLeast { value: 0.75 },
                C::DaysUntilOnsetAtMost { days: 45 },
            ]),
            action: ActionTemplate {
                estimate_resources: true,
                duration_days: Some(60),
                ..template(
                    "{metric} surge of {magnitude_pct}% likely in {unit} within {days} days",
                    "Prepare {centers} service centers and {staff} staff for {unit}",
                    &[
                        "Confirm surge with regional offices",
                        "Schedule additional staff",
                        "Pre-position biometric devices",
                    ],
                )
            },
        },
        PriorityRule {
            id: "investigate-severe-anomaly".into(),
            tier: PriorityTier::High,
            kind: InsightKind::OperationalInvestigation,
            when: C::all(vec![
                C::kind(Anomaly),
                C::DetectedByBoth,
                C::SeverityAtLeast { value: 1.0 },
            ]),
            action: ActionTemplate {
                duration_days: Some(14),
                ..template(
                    "Unusual {metric} pattern in {unit} ({level}) on {date}: severity {severity}",
                    "Investigate the {metric} anomaly in {unit}",
                    &[
                        "Review center-level data for the flagged period",
                        "Check for data quality issues",
                        "Interview center operators",
                        "Document findings and corrective actions",
                    ],
                )
            },
        },
        PriorityRule {
            id: "investigate-coverage-ratio".into(),
            tier: PriorityTier::High,
            kind: InsightKind::OperationalInvestigation,
            when: C::all(vec![
                C::kind(Anomaly),
                C::DetectionLevel {
                    level: DetectionLevel::CoverageRatio,
                },
            ]),
            action: ActionTemplate {
                duration_days: Some(14),
                ..template(
                    "Biometric to demographic ratio in {unit} is out of line with peers ({ratio})",
                    "Audit the update mix in {unit}",
                    &[
                        "Compare biometric and demographic update volumes",
                        "Check for process issues",
                    ],
                )
            },
        },
        PriorityRule {
            id: "pre-surge-campaign".into(),
            tier: PriorityTier::Medium,
            kind: InsightKind::TargetedCampaign,
            when: C::all(vec![
                C::kind(Surge),
                C::DaysUntilOnsetBetween { min: 30, max: 90 },
                C::MagnitudeAtLeast { value: 0.2 },
            ]),
            action: ActionTemplate {
                duration_days: Some(30),
                ..template(
                    "{metric} surge expected in {unit} in {days} days ({signals})",
                    "Run a pre-surge awareness campaign in {unit}",
                    &[
                        "Send SMS reminders to affected residents",
                        "Partner with schools and local bodies",
                        "Publish appointment slots early",
                    ],
                )
            },
        },
        PriorityRule {
            id: "plan-capacity".into(),
            tier: PriorityTier::Medium,
            kind: InsightKind::CapacityPlanning,
            when: C::all(vec![
                C::kind(Surge),
                C::SurgeConfidenceAtLeast { value: 0.5 },
            ]),
            action: ActionTemplate {
                estimate_resources: true,
                duration_days: Some(90),
                ..template(
                    "Expected {metric} volume of {volume} in {unit} over the coming window",
                    "Plan capacity of {centers} centers for {unit}",
                    &[
                        "Assess current center capacity",
                        "Optimize center locations",
                    ],
                )
            },
        },
        PriorityRule {
            id: "coverage-gap-campaign".into(),
            tier: PriorityTier::Medium,
            kind: InsightKind::TargetedCampaign,
            when: C::all(vec![
                C::kind(Coverage),
                C::CoverageRatioBelow { value: 0.5 },
            ]),
            action: ActionTemplate {
                duration_days: Some(45),
                ..template(
                    "Low biometric update coverage in {unit} ({ratio})",
                    "Run a biometric update awareness campaign in {unit}",
                    &[
                        "Door-to-door awareness",
                        "Mobile update camps",
                        "Local language outreach",
                    ],
                )
            },
        },
        PriorityRule {
            id: "review-anomaly".into(),
            tier: PriorityTier::Medium,
            kind: InsightKind::OperationalInvestigation,
            when: C::all(vec![
                C::kind(Anomaly),
                C::SeverityAtLeast { value: 0.3 },
            ]),
            action: template(
                "{metric} in {unit} deviated from its usual range on {date}",
                "Review the {metric} anomaly in {unit}",
                &["Review center-level data for the flagged period"],
            ),
        },
        PriorityRule {
            id: "monitor-degraded-surge".into(),
            tier: PriorityTier::Low,
            kind: InsightKind::Monitoring,
            when: C::all(vec![C::kind(Surge), C::Degraded]),
            action: template(
                "Surge prediction for {unit} rests on degraded inputs",
                "Monitor {metric} in {unit} until the forecast recovers",
                &[],
            ),
        },
        PriorityRule {
            id: "monitor-anomaly".into(),
            tier: PriorityTier::Low,
            kind: InsightKind::Monitoring,
            when: C::all(vec![
                C::kind(Anomaly),
                C::not(C::SeverityAtLeast { value: 0.3 }),
            ]),
            action: template(
                "Minor {metric} deviation in {unit} on {date}",
                "Keep monitoring {metric} in {unit}",
                &[],
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_grouped_by_tier() {
        let rules = default_rules();
        let tiers: Vec<PriorityTier> = rules.iter().map(|r| r.tier).collect();
        let mut sorted = tiers.clone();
        sorted.sort();
        assert_eq!(tiers, sorted);
    }

    #[test]
    fn test_default_rule_ids_unique() {
        let rules = default_rules();
        let mut ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn test_condition_serde_tagging() {
        let json = r#"{"type":"all","of":[{"type":"finding_kind","is":"surge"},{"type":"days_until_onset_at_most","days":45}]}"#;
        let condition: RuleCondition = serde_json::from_str(json).unwrap();
        assert_eq!(
            condition,
            RuleCondition::all(vec![
                RuleCondition::kind(FindingKind::Surge),
                RuleCondition::DaysUntilOnsetAtMost { days: 45 },
            ])
        );
    }

    #[test]
    fn test_rule_toml_round_trip() {
        let rules = default_rules();
        #[derive(Serialize, Deserialize)]
        struct Book {
            rules: Vec<PriorityRule>,
        }
        let text = toml::to_string(&Book {
            rules: rules.clone(),
        })
        .unwrap();
        let back: Book = toml::from_str(&text).unwrap();
        assert_eq!(back.rules, rules);
    }
}
