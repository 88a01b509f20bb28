//! Priority engine
//!
//! Turns anomaly, surge and coverage findings into ranked insight records.
//! For every finding each tier is checked in turn, and the first rule of
//! that tier whose condition holds produces one insight. A finding can
//! therefore yield at most one insight per tier.

mod finding;
mod template;

pub use finding::{coverage_gaps, merge_anomalies, AnomalyFinding, CoverageFinding, Finding};
pub use template::{render, PLACEHOLDERS};

use std::collections::BTreeMap;

use chrono::NaiveDate;
use temporal_api::{PriorityConfig, PriorityRule};
use temporal_spi::{
    AnomalyRecord, CoverageIndex, GenerationId, InsightRecord, PriorityTier, RecommendedAction,
    ResourceEstimate, SurgeRecord,
};
use tracing::debug;

/// Score components of one finding, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreParts {
    pub urgency: f64,
    pub magnitude: f64,
    pub confidence: f64,
}

/// Applies the rule book to findings
#[derive(Debug, Clone)]
pub struct PriorityEngine {
    config: PriorityConfig,
}

impl PriorityEngine {
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    /// Merge records into findings: anomalies per point, surges as-is, coverage gaps per unit
    pub fn findings(
        &self,
        anomalies: &[AnomalyRecord],
        surges: &[SurgeRecord],
        coverage: &[CoverageIndex],
    ) -> Vec<Finding> {
        let mut findings: Vec<Finding> = surges.iter().cloned().map(Finding::Surge).collect();
        findings.extend(merge_anomalies(anomalies).into_iter().map(Finding::Anomaly));
        findings.extend(
            coverage_gaps(coverage, self.config.coverage_floor)
                .into_iter()
                .map(Finding::Coverage),
        );
        findings
    }

    /// Ranked insights for one generation.
    ///
    /// `as_of` is the last observed day of the snapshot; anomaly urgency is
    /// measured from it.
    pub fn prioritize(
        &self,
        generation: GenerationId,
        as_of: Option<NaiveDate>,
        anomalies: &[AnomalyRecord],
        surges: &[SurgeRecord],
        coverage: &[CoverageIndex],
    ) -> Vec<InsightRecord> {
        let findings = self.findings(anomalies, surges, coverage);

        let mut insights = Vec::new();
        for finding in &findings {
            let score = self.score(finding, as_of);
            for tier in PriorityTier::ALL {
                let rule = self
                    .config
                    .rules
                    .iter()
                    .filter(|r| r.tier == tier)
                    .find(|r| finding.matches(&r.when));
                if let Some(rule) = rule {
                    insights.push(self.insight(rule, finding, score));
                }
            }
        }

        insights.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then(b.score.total_cmp(&a.score))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
                .then_with(|| source_unit(a).cmp(&source_unit(b)))
                .then_with(|| a.finding.cmp(&b.finding))
        });
        for (seq, insight) in insights.iter_mut().enumerate() {
            insight.id = format!("INS-{}-{}", generation, seq + 1);
        }

        debug!(
            findings = findings.len(),
            insights = insights.len(),
            "priority rules applied"
        );
        insights
    }

    /// Urgency, normalized magnitude and confidence of a finding
    pub fn score_parts(&self, finding: &Finding, as_of: Option<NaiveDate>) -> ScoreParts {
        let config = &self.config;
        let saturation = config.urgency_saturation_days as f64;
        let curve = |days: i64| (saturation / days.max(1) as f64).min(1.0);

        let (urgency, magnitude, confidence) = match finding {
            Finding::Surge(s) => (
                curve(s.days_until_onset as i64),
                s.magnitude / config.magnitude_scale,
                s.confidence,
            ),
            Finding::Anomaly(a) => {
                let urgency = match (a.timestamp, as_of) {
                    (Some(t), Some(end)) => curve((end - t).num_days()),
                    _ => config.coverage_urgency,
                };
                (
                    urgency,
                    a.severity / config.severity_scale,
                    a.methods.len() as f64 / 2.0,
                )
            }
            Finding::Coverage(c) => (
                config.coverage_urgency,
                (config.coverage_floor - c.ratio) / config.coverage_floor,
                1.0,
            ),
        };

        let discount = if finding.is_degraded() {
            config.degraded_discount
        } else {
            1.0
        };
        ScoreParts {
            urgency: urgency.clamp(0.0, 1.0),
            magnitude: magnitude.clamp(0.0, 1.0),
            confidence: (confidence * discount).clamp(0.0, 1.0),
        }
    }

    /// Weighted sum of the score parts
    pub fn score(&self, finding: &Finding, as_of: Option<NaiveDate>) -> f64 {
        let parts = self.score_parts(finding, as_of);
        let w = &self.config.weights;
        w.urgency * parts.urgency + w.magnitude * parts.magnitude + w.confidence * parts.confidence
    }

    /// Centers and staff needed for an expected volume
    pub fn resources(&self, expected_volume: f64) -> ResourceEstimate {
        let centers = (expected_volume.max(0.0) / self.config.events_per_center)
            .ceil()
            .max(1.0) as u32;
        ResourceEstimate {
            expected_volume,
            centers,
            staff: centers * self.config.staff_per_center,
        }
    }

    fn insight(&self, rule: &PriorityRule, finding: &Finding, score: f64) -> InsightRecord {
        let template = &rule.action;
        let resources = match finding {
            Finding::Surge(s) if template.estimate_resources => {
                Some(self.resources(s.expected_volume))
            }
            _ => None,
        };
        let start_within_days = match finding {
            Finding::Surge(s) => Some(
                s.days_until_onset
                    .saturating_sub(self.config.lead_time_days)
                    .max(1),
            ),
            _ if rule.tier.at_least(PriorityTier::High) => Some(1),
            _ => None,
        };

        let values = placeholder_values(finding, resources.as_ref());
        InsightRecord {
            id: String::new(),
            rule_id: rule.id.clone(),
            kind: rule.kind,
            tier: rule.tier,
            score,
            finding: render(&template.finding, &values),
            sources: vec![finding.source()],
            action: RecommendedAction {
                summary: render(&template.summary, &values),
                steps: template.steps.iter().map(|s| render(s, &values)).collect(),
                resources,
                start_within_days,
                duration_days: template.duration_days,
            },
        }
    }
}

fn source_unit(insight: &InsightRecord) -> Option<&str> {
    insight.sources.first().map(|s| s.unit())
}

fn placeholder_values(
    finding: &Finding,
    resources: Option<&ResourceEstimate>,
) -> BTreeMap<&'static str, String> {
    let mut values = BTreeMap::new();
    values.insert("unit", finding.unit().to_string());
    values.insert("level", finding.level().to_string());
    values.insert("metric", finding.metric().to_string());
    if let Some(ratio) = finding.coverage_ratio() {
        values.insert("ratio", format!("{ratio:.2}"));
    }
    if let Some(r) = resources {
        values.insert("centers", r.centers.to_string());
        values.insert("staff", r.staff.to_string());
    }

    match finding {
        Finding::Surge(s) => {
            values.insert("days", s.days_until_onset.to_string());
            values.insert("date", s.window.start.to_string());
            values.insert("volume", format!("{:.0}", s.expected_volume));
            values.insert("magnitude_pct", format!("{:.0}", s.magnitude * 100.0));
            values.insert("confidence_pct", format!("{:.0}", s.confidence * 100.0));
            let signals: Vec<String> = s.signals.iter().map(|k| k.to_string()).collect();
            values.insert("signals", signals.join(", "));
        }
        Finding::Anomaly(a) => {
            if let Some(t) = a.timestamp {
                values.insert("date", t.to_string());
            }
            values.insert("severity", format!("{:.2}", a.severity));
            let confidence = a.methods.len() as f64 / 2.0;
            values.insert("confidence_pct", format!("{:.0}", confidence * 100.0));
        }
        Finding::Coverage(_) => {}
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use chrono::Duration;
    use series_spi::{GeoLevel, SeriesKey};
    use temporal_api::{ActionTemplate, FindingKind, RuleCondition};
    use temporal_spi::{
        DetectionLevel, DetectionMethod, InsightKind, MagnitudeSource, SourceRef,
        SurgeSignalKind, SurgeWindow,
    };

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(i)
    }

    fn key(unit: &str) -> SeriesKey {
        SeriesKey::new(unit, GeoLevel::District, "enrolment")
    }

    fn surge(unit: &str, confidence: f64, days: u32, magnitude: f64) -> SurgeRecord {
        SurgeRecord {
            key: key(unit),
            window: SurgeWindow::new(day(days as i64), day(days as i64 + 29)),
            magnitude,
            magnitude_source: MagnitudeSource::Forecast,
            expected_volume: 250_000.0,
            baseline_volume: 150_000.0,
            days_until_onset: days,
            confidence,
            weighted_support: confidence,
            signals: [
                SurgeSignalKind::ForecastThreshold,
                SurgeSignalKind::AgeTransition,
                SurgeSignalKind::TrendAcceleration,
            ]
            .into_iter()
            .collect::<BTreeSet<_>>(),
            degraded: false,
        }
    }

    fn anomaly(method: DetectionMethod, t: i64, observed: f64, severity: f64) -> AnomalyRecord {
        AnomalyRecord {
            key: key("PUNE"),
            level: DetectionLevel::Temporal,
            method,
            timestamp: Some(day(t)),
            severity,
            score: 6.0,
            observed,
            expected: 100.0,
            lower: 80.0,
            upper: 120.0,
        }
    }

    fn engine() -> PriorityEngine {
        PriorityEngine::new(PriorityConfig::default())
    }

    #[test]
    fn test_imminent_surge_is_critical_with_resources() {
        let insights = engine().prioritize(
            GenerationId(3),
            Some(day(0)),
            &[],
            &[surge("PUNE", 0.75, 20, 0.6)],
            &[],
        );
        let critical = &insights[0];
        assert_eq!(critical.tier, PriorityTier::Critical);
        assert_eq!(critical.rule_id, "deploy-imminent-surge");
        assert_eq!(critical.id, "INS-3-1");
        let resources = critical.action.resources.unwrap();
        assert_eq!(resources.centers, 3);
        assert_eq!(resources.staff, 15);
        assert_eq!(critical.action.start_within_days, Some(6));
        assert!(critical.finding.contains("60%"));
        assert!(critical.action.summary.contains("Deploy 3 additional service centers"));

        // The same finding also appears once in each lower tier it matches
        let tiers: Vec<PriorityTier> = insights.iter().map(|i| i.tier).collect();
        assert_eq!(
            tiers,
            vec![PriorityTier::Critical, PriorityTier::High, PriorityTier::Medium]
        );
    }

    #[test]
    fn test_anomaly_detected_by_both_is_high() {
        let records = vec![
            anomaly(DetectionMethod::RangeBased, -2, 900.0, 4.0),
            anomaly(DetectionMethod::DeviationBased, -2, 900.0, 6.0),
        ];
        let insights = engine().prioritize(GenerationId(1), Some(day(0)), &records, &[], &[]);
        let high = insights
            .iter()
            .find(|i| i.tier == PriorityTier::High)
            .unwrap();
        assert_eq!(high.rule_id, "investigate-severe-anomaly");
        assert!(high.references_timestamp(day(-2)));
        assert_eq!(high.action.start_within_days, Some(1));
        assert!(high.finding.contains("severity 6.00"));
        match &high.sources[0] {
            SourceRef::Anomaly { methods, .. } => assert_eq!(methods.len(), 2),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_zero_volume_day_is_critical() {
        let records = vec![anomaly(DetectionMethod::RangeBased, -1, 0.0, 1.0)];
        let insights = engine().prioritize(GenerationId(1), Some(day(0)), &records, &[], &[]);
        assert_eq!(insights[0].tier, PriorityTier::Critical);
        assert_eq!(insights[0].rule_id, "investigate-zero-volume");
    }

    #[test]
    fn test_coverage_gap_campaign() {
        let coverage = vec![CoverageIndex {
            unit: "THANE".into(),
            level: GeoLevel::District,
            biometric: 20.0,
            demographic: 100.0,
        }];
        let insights = engine().prioritize(GenerationId(1), Some(day(0)), &[], &[], &coverage);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].rule_id, "coverage-gap-campaign");
        assert_eq!(insights[0].kind, InsightKind::TargetedCampaign);
        assert!(insights[0].finding.contains("0.20"));
    }

    #[test]
    fn test_score_parts() {
        let e = engine();
        let near = Finding::Surge(surge("PUNE", 1.0, 3, 2.0));
        let parts = e.score_parts(&near, None);
        assert_eq!(parts.urgency, 1.0);
        assert_eq!(parts.magnitude, 1.0);
        assert_eq!(parts.confidence, 1.0);
        assert!((e.score(&near, None) - 1.0).abs() < 1e-12);

        let far = Finding::Surge(surge("PUNE", 1.0, 70, 0.5));
        assert!((e.score_parts(&far, None).urgency - 0.1).abs() < 1e-12);

        let mut degraded = surge("PUNE", 1.0, 3, 2.0);
        degraded.degraded = true;
        let parts = e.score_parts(&Finding::Surge(degraded), None);
        assert_eq!(parts.confidence, 0.5);
    }

    #[test]
    fn test_ordering_by_tier_then_score() {
        let insights = engine().prioritize(
            GenerationId(9),
            Some(day(0)),
            &[],
            &[surge("AKOLA", 0.5, 60, 0.25), surge("PUNE", 1.0, 40, 0.5)],
            &[],
        );
        for pair in insights.windows(2) {
            assert!(
                pair[0].tier < pair[1].tier
                    || (pair[0].tier == pair[1].tier && pair[0].score >= pair[1].score)
            );
        }
        let ids: Vec<&str> = insights.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids[0], "INS-9-1");
    }

    #[test]
    fn test_custom_rule_book() {
        let config = PriorityConfig {
            rules: vec![PriorityRule {
                id: "any-surge".into(),
                tier: PriorityTier::Low,
                kind: InsightKind::Monitoring,
                when: RuleCondition::kind(FindingKind::Surge),
                action: ActionTemplate {
                    finding: "{unit}: {signals}".into(),
                    summary: "watch {unit}".into(),
                    steps: vec![],
                    estimate_resources: false,
                    duration_days: None,
                },
            }],
            ..PriorityConfig::default()
        };
        let insights = PriorityEngine::new(config).prioritize(
            GenerationId(1),
            None,
            &[anomaly(DetectionMethod::RangeBased, 0, 500.0, 2.0)],
            &[surge("PUNE", 0.5, 10, 0.3)],
            &[],
        );
        assert_eq!(insights.len(), 1);
        assert_eq!(
            insights[0].finding,
            "PUNE: forecast-threshold, age-transition, trend-acceleration"
        );
        assert_eq!(insights[0].action.start_within_days, Some(1));
    }

    #[test]
    fn test_resources_minimum_one_center() {
        let estimate = engine().resources(10.0);
        assert_eq!(estimate.centers, 1);
        assert_eq!(estimate.staff, 5);
    }
}
