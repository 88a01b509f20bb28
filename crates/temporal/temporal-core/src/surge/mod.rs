//! Surge ensemble
//!
//! Every signal is evaluated independently on each (unit, window) pair.
//! Combining is order-independent: confidence is the share of evaluated
//! signals that fired, and signals without inputs drop out of the
//! denominator instead of counting against the surge.

mod signals;

pub use signals::{
    default_signals, AgeTransitionSignal, ForecastThresholdSignal, HistoricalPatternSignal,
    TrendAccelerationSignal,
};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use series_spi::{Series, SeriesKey};
use temporal_api::SurgeConfig;
use temporal_spi::{
    AgeCohortProjection, BaselineSnapshot, Decomposition, ForecastResult, MagnitudeSource,
    SignalContext, SignalOutcome, SurgeRecord, SurgeSignal, SurgeSignalKind, SurgeWindow,
};
use tracing::debug;

use crate::stats::median;
use signals::window_baseline_volume;

/// Per-series inputs the ensemble reads
#[derive(Debug, Clone, Copy)]
pub struct SurgeInputs<'a> {
    pub series: &'a Series,
    pub decomposition: Option<&'a Decomposition>,
    pub baseline: Option<&'a BaselineSnapshot>,
    pub forecast: Option<&'a ForecastResult>,
    /// Every projection in the feed; the ensemble picks this unit's and its peers'
    pub age_projections: &'a [AgeCohortProjection],
}

/// Combines the surge signals into ranked surge records
pub struct SurgeEnsemble {
    config: SurgeConfig,
    horizon: usize,
    signals: Vec<Box<dyn SurgeSignal>>,
}

impl std::fmt::Debug for SurgeEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<SurgeSignalKind> = self.signals.iter().map(|s| s.kind()).collect();
        f.debug_struct("SurgeEnsemble")
            .field("config", &self.config)
            .field("horizon", &self.horizon)
            .field("signals", &kinds)
            .finish()
    }
}

impl SurgeEnsemble {
    /// Ensemble over the standard four signals.
    ///
    /// Windows reaching past `horizon` days are not evaluated.
    pub fn new(config: SurgeConfig, horizon: usize) -> Self {
        let signals = default_signals(&config);
        Self::with_signals(config, horizon, signals)
    }

    pub fn with_signals(
        config: SurgeConfig,
        horizon: usize,
        signals: Vec<Box<dyn SurgeSignal>>,
    ) -> Self {
        Self {
            config,
            horizon,
            signals,
        }
    }

    pub fn config(&self) -> &SurgeConfig {
        &self.config
    }

    /// Surge records for one series, one per window where enough signals agree
    pub fn evaluate(&self, inputs: SurgeInputs<'_>) -> Vec<SurgeRecord> {
        let Some(as_of) = inputs.series.last_timestamp() else {
            return Vec::new();
        };
        let key = inputs.series.key();

        let mut records = Vec::new();
        for window in self.windows(as_of) {
            let own: Vec<AgeCohortProjection> = inputs
                .age_projections
                .iter()
                .filter(|p| {
                    p.applies_to(&key.unit, &key.metric) && p.overlaps(window.start, window.end)
                })
                .cloned()
                .collect();
            let context = SignalContext {
                key,
                window,
                as_of,
                series: inputs.series,
                decomposition: inputs.decomposition,
                baseline: inputs.baseline,
                forecast: inputs.forecast,
                age_projections: &own,
                regional_age_baseline: regional_age_baseline(inputs.age_projections, key, window),
            };

            let outcomes: Vec<(SurgeSignalKind, SignalOutcome)> = self
                .signals
                .iter()
                .map(|s| (s.kind(), s.evaluate(&context)))
                .collect();
            if let Some(record) = self.combine(&context, &outcomes) {
                records.push(record);
            }
        }

        debug!(key = %key, surges = records.len(), "surge signals evaluated");
        records
    }

    /// Windows inside the horizon, starting the day after `as_of`
    pub fn windows(&self, as_of: NaiveDate) -> Vec<SurgeWindow> {
        self.config
            .windows
            .iter()
            .filter(|w| w.length_days > 0 && w.offset_days + w.length_days <= self.horizon)
            .map(|w| {
                let start = as_of + Duration::days(w.offset_days as i64 + 1);
                SurgeWindow::new(start, start + Duration::days(w.length_days as i64 - 1))
            })
            .collect()
    }

    fn combine(
        &self,
        context: &SignalContext<'_>,
        outcomes: &[(SurgeSignalKind, SignalOutcome)],
    ) -> Option<SurgeRecord> {
        let evaluated: Vec<_> = outcomes.iter().filter(|(_, o)| o.is_evaluated()).collect();
        let fired: Vec<_> = evaluated.iter().filter(|(_, o)| o.is_fired()).collect();
        if fired.is_empty() {
            return None;
        }

        let confidence = fired.len() as f64 / evaluated.len() as f64;
        if fired.len() < self.config.min_signals || confidence < self.config.min_confidence {
            return None;
        }
        let weights = &self.config.weights;
        let total: f64 = evaluated.iter().map(|(k, _)| weights.weight(*k)).sum();
        let support: f64 = fired.iter().map(|(k, _)| weights.weight(*k)).sum();
        let weighted_support = if total > 0.0 { support / total } else { 0.0 };

        let implied = |kind: SurgeSignalKind| {
            fired.iter().find_map(|(k, o)| match o {
                SignalOutcome::Fired {
                    implied_magnitude,
                    onset,
                } if *k == kind => Some((*implied_magnitude, *onset)),
                _ => None,
            })
        };

        let window = context.window;
        let baseline_volume = window_baseline_volume(context).unwrap_or(0.0);
        let (magnitude, magnitude_source, onset, expected_volume) =
            match implied(SurgeSignalKind::ForecastThreshold) {
                Some((magnitude, onset)) => {
                    let forecast_volume = context
                        .forecast
                        .map(|f| {
                            f.points_between(window.start, window.end)
                                .iter()
                                .map(|p| p.estimate)
                                .sum::<f64>()
                        })
                        .unwrap_or(baseline_volume * (1.0 + magnitude));
                    (magnitude, MagnitudeSource::Forecast, onset, forecast_volume)
                }
                None => {
                    let (kind, magnitude) = strongest(&fired)?;
                    (
                        magnitude,
                        MagnitudeSource::Signal { kind },
                        None,
                        baseline_volume * (1.0 + magnitude),
                    )
                }
            };

        let onset = onset.unwrap_or(window.start);
        let days_until_onset = (onset - context.as_of).num_days().max(1) as u32;
        let degraded =
            context.forecast.map_or(true, |f| f.is_degraded()) || context.decomposition.is_none();

        Some(SurgeRecord {
            key: context.key.clone(),
            window,
            magnitude,
            magnitude_source,
            expected_volume,
            baseline_volume,
            days_until_onset,
            confidence,
            weighted_support,
            signals: fired.iter().map(|(k, _)| *k).collect::<BTreeSet<_>>(),
            degraded,
        })
    }
}

/// Fired signal with the largest implied magnitude; leading signals win ties
fn strongest(fired: &[&&(SurgeSignalKind, SignalOutcome)]) -> Option<(SurgeSignalKind, f64)> {
    fired
        .iter()
        .filter_map(|(kind, outcome)| match outcome {
            SignalOutcome::Fired {
                implied_magnitude, ..
            } => Some((*kind, *implied_magnitude)),
            _ => None,
        })
        .max_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then(a.0.is_leading().cmp(&b.0.is_leading()))
                .then(b.0.cmp(&a.0))
        })
}

/// Median projected crossings of peer units at the same level over the window
fn regional_age_baseline(
    projections: &[AgeCohortProjection],
    key: &SeriesKey,
    window: SurgeWindow,
) -> Option<f64> {
    let mut per_unit: BTreeMap<&str, f64> = BTreeMap::new();
    for p in projections.iter().filter(|p| {
        p.level == key.level
            && p.unit != key.unit
            && p.metric.as_deref().map_or(true, |m| m == key.metric)
            && p.overlaps(window.start, window.end)
    }) {
        *per_unit.entry(p.unit.as_str()).or_default() +=
            p.projected_count * p.overlap_fraction(window.start, window.end);
    }
    let counts: Vec<f64> = per_unit.into_values().collect();
    median(&counts)
}

/// Sort by confidence, then weighted support, then nearest onset
pub fn sort_records(records: &mut [SurgeRecord]) {
    records.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.weighted_support.total_cmp(&a.weighted_support))
            .then(a.days_until_onset.cmp(&b.days_until_onset))
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.window.cmp(&b.window))
    });
}
