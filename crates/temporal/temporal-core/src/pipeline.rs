//! One-shot pipeline run over a series snapshot
//!
//! Decomposition, forecasting and temporal anomaly detection run per series
//! on a dedicated worker pool. Collecting those results is the barrier;
//! cross-sectional detection, the surge ensemble and the priority engine
//! run after it. A failure in one series never fails the run: it is caught
//! at the series boundary and recorded in that series' outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use series_spi::{Series, SeriesKey, SeriesSource};
use temporal_api::PipelineConfig;
use temporal_spi::{
    AgeCohortProjection, AnomalyRecord, BaselineSnapshot, CoverageIndex, Decomposer,
    Decomposition, DegradedReason, ForecastResult, Forecaster, Generation, GenerationId,
    Result, ResultStatus, SeriesOutcome, SeriesStatus, TemporalError,
};
use tracing::{debug, info, warn};

use crate::anomaly::{self, AnomalyDetector};
use crate::decomposition::StlDecomposer;
use crate::forecast::AutoArimaForecaster;
use crate::generation::GenerationStore;
use crate::priority::PriorityEngine;
use crate::seasonality::PeriodDetector;
use crate::surge::{self, SurgeEnsemble, SurgeInputs};

/// Read-only feeds supplied alongside the snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalFeeds {
    pub age_cohorts: Vec<AgeCohortProjection>,
    pub coverage: Vec<CoverageIndex>,
}

/// Everything one worker produced for one series
struct SeriesRun {
    series: Option<Arc<Series>>,
    decomposition: Option<Decomposition>,
    forecast: Option<ForecastResult>,
    anomalies: Vec<AnomalyRecord>,
    outcome: SeriesOutcome,
}

impl SeriesRun {
    fn skipped(key: &SeriesKey, reason: DegradedReason, message: String) -> Self {
        Self {
            series: None,
            decomposition: None,
            forecast: None,
            anomalies: Vec::new(),
            outcome: SeriesOutcome {
                key: key.clone(),
                status: SeriesStatus::Skipped { reason },
                messages: vec![message],
            },
        }
    }
}

/// Configured stages, ready to run against any snapshot
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    decomposer: StlDecomposer,
    forecaster: AutoArimaForecaster,
    detector: AnomalyDetector,
    surge: SurgeEnsemble,
    priority: PriorityEngine,
}

impl Pipeline {
    /// Build every stage from a validated configuration.
    ///
    /// Returns `TemporalError::Configuration` before any work is done when
    /// the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let detector = PeriodDetector::new(
            config.decomposition.candidate_periods.clone(),
            config.decomposition.acf_floor,
        );
        Ok(Self {
            decomposer: StlDecomposer::new(config.decomposition.clone()),
            forecaster: AutoArimaForecaster::new(config.forecast.clone())
                .with_period_detector(detector),
            detector: AnomalyDetector::new(config.anomaly.clone()),
            surge: SurgeEnsemble::new(config.surge.clone(), config.forecast.max_horizon()),
            priority: PriorityEngine::new(config.priority.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn decomposer(&self) -> &StlDecomposer {
        &self.decomposer
    }

    pub fn forecaster(&self) -> &AutoArimaForecaster {
        &self.forecaster
    }

    /// Series keys this run processes, in key order
    pub fn selected_keys(&self, source: &dyn SeriesSource) -> Vec<SeriesKey> {
        let metrics = &self.config.runtime.metrics;
        let mut keys: Vec<SeriesKey> = source
            .keys()
            .into_iter()
            .filter(|k| metrics.is_empty() || metrics.contains(&k.metric))
            .collect();
        keys.sort();
        keys
    }

    /// Run every stage against `source` and assemble generation `id`
    pub fn run(
        &self,
        source: &dyn SeriesSource,
        feeds: &ExternalFeeds,
        id: GenerationId,
    ) -> Result<Generation> {
        let started = Instant::now();
        let deadline = self
            .config
            .runtime
            .timeout_secs
            .map(|secs| started + Duration::from_secs(secs));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.runtime.workers)
            .build()
            .map_err(|e| TemporalError::configuration("runtime.workers", e.to_string()))?;

        let keys = self.selected_keys(source);
        info!(generation = %id, series = keys.len(), version = source.version(), "run started");

        let runs: Vec<SeriesRun> = pool.install(|| {
            keys.par_iter()
                .map(|key| self.process(source, key, deadline))
                .collect()
        });

        let mut decompositions = Vec::new();
        let mut forecasts = Vec::new();
        let mut anomalies = Vec::new();
        let mut outcomes = Vec::new();
        let mut processed = Vec::new();
        for run in runs {
            if let Some(series) = &run.series {
                processed.push((
                    Arc::clone(series),
                    run.decomposition.clone(),
                    run.forecast.clone(),
                ));
            }
            decompositions.extend(run.decomposition);
            forecasts.extend(run.forecast);
            anomalies.extend(run.anomalies);
            outcomes.push(run.outcome);
        }
        info!(
            decompositions = decompositions.len(),
            forecasts = forecasts.len(),
            temporal_anomalies = anomalies.len(),
            "per-series stages complete"
        );

        let live: Vec<SeriesKey> = processed.iter().map(|(s, _, _)| s.key().clone()).collect();
        if self.config.anomaly.geographic {
            anomalies.extend(self.detector.geographic(source, &live));
        }
        if self.config.anomaly.coverage {
            anomalies.extend(self.detector.coverage(&feeds.coverage, source.hierarchy()));
        }
        anomalies.extend(self.detector.age_share(source, &live));
        anomaly::sort_records(&mut anomalies);
        info!(anomalies = anomalies.len(), "anomaly detection complete");

        let baselines: Vec<BaselineSnapshot> = decompositions
            .iter()
            .filter_map(|d| BaselineSnapshot::from_decomposition(d, id))
            .collect();

        let mut surges: Vec<_> = pool.install(|| {
            processed
                .par_iter()
                .flat_map_iter(|(series, decomposition, forecast)| {
                    let baseline = baselines.iter().find(|b| &b.key == series.key());
                    self.surge.evaluate(SurgeInputs {
                        series,
                        decomposition: decomposition.as_ref(),
                        baseline,
                        forecast: forecast.as_ref(),
                        age_projections: &feeds.age_cohorts,
                    })
                })
                .collect()
        });
        surge::sort_records(&mut surges);
        info!(surges = surges.len(), "surge ensemble complete");

        let as_of = processed
            .iter()
            .filter_map(|(series, _, _)| series.last_timestamp())
            .max();
        let insights = self
            .priority
            .prioritize(id, as_of, &anomalies, &surges, &feeds.coverage);

        let generation = Generation {
            id,
            snapshot_version: source.version(),
            as_of,
            decompositions,
            baselines,
            forecasts,
            anomalies,
            surges,
            insights,
            outcomes,
        };
        info!(
            generation = %id,
            insights = generation.insights.len(),
            degraded = generation.degraded_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run complete"
        );
        Ok(generation)
    }

    /// Run with the store's next id and publish the result
    pub fn run_and_publish(
        &self,
        source: &dyn SeriesSource,
        feeds: &ExternalFeeds,
        store: &GenerationStore,
    ) -> Result<Arc<Generation>> {
        let generation = self.run(source, feeds, store.next_id())?;
        Ok(store.publish(generation))
    }

    fn process(
        &self,
        source: &dyn SeriesSource,
        key: &SeriesKey,
        deadline: Option<Instant>,
    ) -> SeriesRun {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(key = %key, "deadline passed before series started, skipping");
            let message = "run deadline exceeded".to_string();
            return SeriesRun::skipped(key, DegradedReason::Timeout, message);
        }

        let series = match source.get_series(key) {
            Ok(series) => series,
            Err(e) => {
                let error = TemporalError::from(e);
                warn!(key = %key, error = %error, "series unavailable, skipping");
                let message = error.to_string();
                return SeriesRun::skipped(key, reason_for(&error), message);
            }
        };

        let mut reasons = Vec::new();
        let mut messages = Vec::new();

        let decomposition = match self.decomposer.decompose(&series) {
            Ok(d) => Some(d),
            Err(e) => {
                debug!(key = %key, error = %e, "no decomposition");
                reasons.push(reason_for(&e));
                messages.push(format!("decomposition: {e}"));
                None
            }
        };

        let forecast = match self.forecaster.forecast(
            &series,
            decomposition.as_ref(),
            self.config.forecast.max_horizon(),
        ) {
            Ok(f) => {
                if let ResultStatus::Degraded { reason } = f.status {
                    reasons.push(reason);
                    messages.push(format!("forecast: {reason} fallback ({:?})", f.method));
                }
                Some(f)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "forecast failed");
                reasons.push(reason_for(&e));
                messages.push(format!("forecast: {e}"));
                None
            }
        };

        let anomalies = self.detector.detect(&series, decomposition.as_ref());

        reasons.sort_by_key(|r| *r as u8);
        reasons.dedup();
        let status = match (&decomposition, &forecast) {
            _ if reasons.is_empty() => SeriesStatus::Complete,
            (None, None) => SeriesStatus::Skipped { reason: reasons[0] },
            _ => SeriesStatus::Degraded { reasons },
        };
        debug!(
            key = %key,
            points = series.len(),
            anomalies = anomalies.len(),
            complete = status == SeriesStatus::Complete,
            "series processed"
        );

        SeriesRun {
            series: Some(series),
            decomposition,
            forecast,
            anomalies,
            outcome: SeriesOutcome {
                key: key.clone(),
                status,
                messages,
            },
        }
    }
}

fn reason_for(error: &TemporalError) -> DegradedReason {
    match error {
        TemporalError::InsufficientData { .. } => DegradedReason::InsufficientData,
        TemporalError::InvalidKey { .. } => DegradedReason::MissingSeries,
        TemporalError::Series(_) => DegradedReason::SourceError,
        _ => DegradedReason::FitFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use series_core::InMemorySeriesStore;
    use series_spi::{GeoLevel, Point, SeriesError};

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i)
    }

    fn store() -> InMemorySeriesStore {
        let mut store = InMemorySeriesStore::new();
        let weekly = |i: i64| 200.0 + i as f64 + 20.0 * ((i % 7) as f64 - 3.0);
        store
            .upsert_points(
                SeriesKey::new("PUNE", GeoLevel::District, "enrolment"),
                (0..120).map(|i| Point::new(day(i), weekly(i))),
            )
            .unwrap();
        store
            .upsert_points(
                SeriesKey::new("PUNE", GeoLevel::District, "demographic"),
                (0..120).map(|i| Point::new(day(i), 50.0 + (i % 3) as f64)),
            )
            .unwrap();
        store
            .upsert_points(
                SeriesKey::new("NASHIK", GeoLevel::District, "enrolment"),
                (0..5).map(|i| Point::new(day(i), 10.0)),
            )
            .unwrap();
        store
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.runtime.workers = 2;
        config
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = config();
        config.anomaly.iqr_k = 0.0;
        let err = Pipeline::new(config).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_run_records_every_series() {
        let store = store();
        let pipeline = Pipeline::new(config()).unwrap();
        let generation = pipeline
            .run(&store.snapshot(), &ExternalFeeds::default(), GenerationId(1))
            .unwrap();

        assert_eq!(generation.outcomes.len(), 3);
        assert_eq!(generation.as_of, Some(day(119)));
        let short = SeriesKey::new("NASHIK", GeoLevel::District, "enrolment");
        match &generation.outcome(&short).unwrap().status {
            SeriesStatus::Degraded { reasons } => {
                assert!(reasons.contains(&DegradedReason::InsufficientData))
            }
            other => panic!("unexpected status {other:?}"),
        }
        let full = SeriesKey::new("PUNE", GeoLevel::District, "enrolment");
        assert!(generation.decomposition(&full).is_some());
        assert!(generation.forecast(&full).is_some());
        assert!(generation.baseline(&full).is_some());
    }

    #[test]
    fn test_metric_filter() {
        let mut config = config();
        config.runtime.metrics = vec!["demographic".into()];
        let pipeline = Pipeline::new(config).unwrap();
        let keys = pipeline.selected_keys(&store());
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].metric, "demographic");
    }

    #[test]
    fn test_zero_timeout_skips_everything() {
        let mut config = config();
        config.runtime.timeout_secs = Some(0);
        let pipeline = Pipeline::new(config).unwrap();
        let generation = pipeline
            .run(&store(), &ExternalFeeds::default(), GenerationId(1))
            .unwrap();
        assert!(generation.outcomes.iter().all(|o| o.status
            == SeriesStatus::Skipped {
                reason: DegradedReason::Timeout
            }));
        assert!(generation.forecasts.is_empty());
        assert!(generation.surges.is_empty());
    }

    #[test]
    fn test_missing_series_is_not_insufficient_data() {
        let pipeline = Pipeline::new(config()).unwrap();
        let missing = SeriesKey::new("SATARA", GeoLevel::District, "enrolment");
        let run = pipeline.process(&store(), &missing, None);

        assert!(run.series.is_none());
        assert_eq!(
            run.outcome.status,
            SeriesStatus::Skipped {
                reason: DegradedReason::MissingSeries
            }
        );
        assert!(run.outcome.messages[0].contains("SATARA"));
    }

    #[test]
    fn test_source_failures_have_their_own_reason() {
        let error = TemporalError::from(SeriesError::InvalidLevels {
            from: GeoLevel::State,
            to: GeoLevel::District,
        });
        assert_eq!(reason_for(&error), DegradedReason::SourceError);
        assert_eq!(
            reason_for(&TemporalError::InvalidKey { key: "x".into() }),
            DegradedReason::MissingSeries
        );
    }

    #[test]
    fn test_run_and_publish_assigns_ids() {
        let store = store();
        let generations = GenerationStore::new();
        let pipeline = Pipeline::new(config()).unwrap();
        let first = pipeline
            .run_and_publish(&store, &ExternalFeeds::default(), &generations)
            .unwrap();
        let second = pipeline
            .run_and_publish(&store, &ExternalFeeds::default(), &generations)
            .unwrap();
        assert_eq!(first.id, GenerationId(1));
        assert_eq!(second.id, GenerationId(2));
        assert_eq!(generations.latest().unwrap().id, GenerationId(2));
    }
}
