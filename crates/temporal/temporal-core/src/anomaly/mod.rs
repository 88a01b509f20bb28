//! Multi-level anomaly detection
//!
//! Two independent robust detectors judge each point against a reference
//! window. Temporal and residual levels use a trailing window of the same
//! series; the geographic level compares a unit against its siblings on the
//! same day, and the coverage-ratio level compares coverage ratios across
//! peer units. The age-group share level scans the daily ratio of two
//! metrics of one unit. Every flag from every detector becomes its own record.

mod iqr;
mod mad;

pub use iqr::QuartileDetector;
pub use mad::RobustZDetector;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use series_spi::{GeoHierarchy, Series, SeriesKey, SeriesSource};
use temporal_api::AnomalyConfig;
use temporal_spi::{
    AnomalyRecord, CoverageIndex, Decomposition, DecompositionMode, DetectionLevel,
    PointDetector, PointVerdict,
};
use tracing::debug;

/// Upper bound on any reported severity
pub const SEVERITY_CEILING: f64 = 10.0;

/// Metric name used for coverage-ratio records
pub const COVERAGE_METRIC: &str = "coverage_ratio";

/// Metric name used for age-group share records
pub const AGE_SHARE_METRIC: &str = "age_group_share";

/// Verdict for a window with no spread.
///
/// The point is flagged with the ceiling severity only when it differs from
/// the constant by more than `tolerance`, relative to the constant (absolute
/// when the constant is zero).
pub(crate) fn constant_window_verdict(center: f64, value: f64, tolerance: f64) -> PointVerdict {
    let allowed = if center.abs() > f64::EPSILON {
        tolerance * center.abs()
    } else {
        tolerance
    };
    let deviation = value - center;
    let flagged = deviation.abs() > allowed;
    PointVerdict {
        is_anomaly: flagged,
        severity: if flagged { SEVERITY_CEILING } else { 0.0 },
        score: if flagged {
            deviation.signum() * SEVERITY_CEILING
        } else {
            0.0
        },
        center,
        lower: center - allowed,
        upper: center + allowed,
    }
}

/// Runs both detectors at every configured level
pub struct AnomalyDetector {
    config: AnomalyConfig,
    detectors: Vec<Box<dyn PointDetector>>,
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("config", &self.config)
            .field(
                "detectors",
                &self.detectors.iter().map(|d| d.method()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AnomalyDetector {
    /// Create a detector running the quartile and modified z-score estimators
    pub fn new(config: AnomalyConfig) -> Self {
        let detectors: Vec<Box<dyn PointDetector>> = vec![
            Box::new(QuartileDetector::from_config(&config)),
            Box::new(RobustZDetector::from_config(&config)),
        ];
        Self { config, detectors }
    }

    /// Create a detector with a custom set of estimators
    pub fn with_detectors(config: AnomalyConfig, detectors: Vec<Box<dyn PointDetector>>) -> Self {
        Self { config, detectors }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Temporal plus, when enabled, residual records for one series
    pub fn detect(
        &self,
        series: &Series,
        decomposition: Option<&Decomposition>,
    ) -> Vec<AnomalyRecord> {
        let mut records = self.temporal(series, decomposition);
        if self.config.detect_on_residuals {
            if let Some(d) = decomposition {
                records.extend(self.residual(d));
            }
        }
        records
    }

    /// Raw values against a trailing window of the same series
    pub fn temporal(
        &self,
        series: &Series,
        decomposition: Option<&Decomposition>,
    ) -> Vec<AnomalyRecord> {
        let timestamps: Vec<NaiveDate> = series.points().iter().map(|p| p.timestamp).collect();
        let records = self.trailing_scan(
            series.key(),
            DetectionLevel::Temporal,
            &timestamps,
            &series.values(),
            |timestamp, verdict| {
                decomposition
                    .and_then(|d| d.index_of(timestamp).and_then(|j| d.baseline_at(j)))
                    .unwrap_or(verdict.center)
            },
        );
        debug!(key = %series.key(), flagged = records.len(), "temporal scan complete");
        records
    }

    /// Daily share of the configured numerator metric in its denominator,
    /// against a trailing window of earlier shares.
    ///
    /// A unit takes part only when both of its metrics are in `keys`. Days
    /// where the denominator is missing or not positive are dropped.
    pub fn age_share(&self, source: &dyn SeriesSource, keys: &[SeriesKey]) -> Vec<AnomalyRecord> {
        let Some(metrics) = &self.config.age_share else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for key in keys.iter().filter(|k| k.metric == metrics.numerator) {
            let total_key = SeriesKey::new(key.unit.clone(), key.level, metrics.denominator.clone());
            if !keys.contains(&total_key) {
                continue;
            }
            let (part, total) = match (source.get_series(key), source.get_series(&total_key)) {
                (Ok(part), Ok(total)) => (part, total),
                _ => continue,
            };

            let (timestamps, shares): (Vec<NaiveDate>, Vec<f64>) = part
                .points()
                .iter()
                .filter_map(|p| {
                    total
                        .value_at(p.timestamp)
                        .filter(|t| *t > 0.0)
                        .map(|t| (p.timestamp, p.value / t))
                })
                .unzip();
            let share_key = SeriesKey::new(key.unit.clone(), key.level, AGE_SHARE_METRIC);
            records.extend(self.trailing_scan(
                &share_key,
                DetectionLevel::AgeGroupShare,
                &timestamps,
                &shares,
                |_, verdict| verdict.center,
            ));
        }

        debug!(flagged = records.len(), "age-group share scan complete");
        records
    }

    /// Each value against the `window` values before it
    fn trailing_scan(
        &self,
        key: &SeriesKey,
        level: DetectionLevel,
        timestamps: &[NaiveDate],
        values: &[f64],
        expected: impl Fn(NaiveDate, &PointVerdict) -> f64,
    ) -> Vec<AnomalyRecord> {
        let mut records = Vec::new();
        for (i, (timestamp, value)) in timestamps.iter().zip(values).enumerate() {
            let window = &values[i.saturating_sub(self.config.window)..i];
            for (method, verdict) in self.judge(window, *value) {
                records.push(AnomalyRecord {
                    key: key.clone(),
                    level,
                    method,
                    timestamp: Some(*timestamp),
                    severity: verdict.severity,
                    score: verdict.score,
                    observed: *value,
                    expected: expected(*timestamp, &verdict),
                    lower: verdict.lower,
                    upper: verdict.upper,
                });
            }
        }
        records
    }

    /// Decomposition residuals against a trailing residual window.
    ///
    /// Bounds are reported in value space, around the trend plus seasonal baseline.
    pub fn residual(&self, decomposition: &Decomposition) -> Vec<AnomalyRecord> {
        if decomposition.mode != DecompositionMode::Robust {
            return Vec::new();
        }
        let residual = &decomposition.residual;
        let mut records = Vec::new();

        for (i, r) in residual.iter().enumerate() {
            let window = &residual[i.saturating_sub(self.config.window)..i];
            for (method, verdict) in self.judge(window, *r) {
                let baseline = decomposition.baseline_at(i).unwrap_or(0.0);
                records.push(AnomalyRecord {
                    key: decomposition.key.clone(),
                    level: DetectionLevel::Residual,
                    method,
                    timestamp: decomposition.timestamps.get(i).copied(),
                    severity: verdict.severity,
                    score: verdict.score,
                    observed: decomposition.observed.get(i).copied().unwrap_or(baseline + r),
                    expected: baseline,
                    lower: baseline + verdict.lower,
                    upper: baseline + verdict.upper,
                });
            }
        }
        records
    }

    /// Each unit against its siblings on the same day.
    ///
    /// Siblings share the unit's parent in the hierarchy; units with no
    /// registered parent are compared with every other unit at their level.
    /// Only series in `keys` take part.
    pub fn geographic(&self, source: &dyn SeriesSource, keys: &[SeriesKey]) -> Vec<AnomalyRecord> {
        let hierarchy = source.hierarchy();
        let loaded: BTreeMap<&SeriesKey, Arc<Series>> = keys
            .iter()
            .filter_map(|k| source.get_series(k).ok().map(|s| (k, s)))
            .collect();

        let mut records = Vec::new();
        for (key, series) in &loaded {
            let peers: Vec<&Arc<Series>> = match hierarchy.siblings_of(&key.unit) {
                Some(siblings) => siblings
                    .into_iter()
                    .filter_map(|unit| loaded.get(&key.with_unit(unit, key.level)))
                    .collect(),
                None => loaded
                    .iter()
                    .filter(|(k, _)| {
                        k.level == key.level && k.metric == key.metric && k.unit != key.unit
                    })
                    .map(|(_, s)| s)
                    .collect(),
            };
            if peers.len() < self.config.min_points {
                continue;
            }

            for point in series.points() {
                let window: Vec<f64> = peers
                    .iter()
                    .filter_map(|s| s.value_at(point.timestamp))
                    .collect();
                for (method, verdict) in self.judge(&window, point.value) {
                    records.push(AnomalyRecord {
                        key: (*key).clone(),
                        level: DetectionLevel::Geographic,
                        method,
                        timestamp: Some(point.timestamp),
                        severity: verdict.severity,
                        score: verdict.score,
                        observed: point.value,
                        expected: verdict.center,
                        lower: verdict.lower,
                        upper: verdict.upper,
                    });
                }
            }
        }

        debug!(series = loaded.len(), flagged = records.len(), "geographic scan complete");
        records
    }

    /// Coverage ratio of each unit against its peers at the same level
    pub fn coverage(
        &self,
        indices: &[CoverageIndex],
        hierarchy: &GeoHierarchy,
    ) -> Vec<AnomalyRecord> {
        let ratios: Vec<(&CoverageIndex, f64)> = indices
            .iter()
            .filter_map(|c| c.ratio().map(|r| (c, r)))
            .collect();

        let mut records = Vec::new();
        for (index, ratio) in &ratios {
            let siblings = hierarchy.siblings_of(&index.unit);
            let window: Vec<f64> = ratios
                .iter()
                .filter(|(peer, _)| peer.level == index.level && peer.unit != index.unit)
                .filter(|(peer, _)| {
                    siblings
                        .as_ref()
                        .map_or(true, |s| s.contains(&peer.unit.as_str()))
                })
                .map(|(_, r)| *r)
                .collect();

            for (method, verdict) in self.judge(&window, *ratio) {
                records.push(AnomalyRecord {
                    key: SeriesKey::new(index.unit.clone(), index.level, COVERAGE_METRIC),
                    level: DetectionLevel::CoverageRatio,
                    method,
                    timestamp: None,
                    severity: verdict.severity,
                    score: verdict.score,
                    observed: *ratio,
                    expected: verdict.center,
                    lower: verdict.lower,
                    upper: verdict.upper,
                });
            }
        }
        records
    }

    /// Flagging verdicts of every detector for one value
    fn judge<'a>(
        &'a self,
        window: &'a [f64],
        value: f64,
    ) -> impl Iterator<Item = (temporal_spi::DetectionMethod, PointVerdict)> + 'a {
        self.detectors.iter().filter_map(move |d| {
            d.evaluate(window, value)
                .filter(|v| v.is_anomaly)
                .map(|v| (d.method(), v))
        })
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

/// Canonical record order: key, level, timestamp, method
pub fn sort_records(records: &mut [AnomalyRecord]) {
    records.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then(a.level.cmp(&b.level))
            .then(a.timestamp.cmp(&b.timestamp))
            .then(a.method.cmp(&b.method))
    });
}
