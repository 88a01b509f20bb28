//! Automatic seasonal ARIMA forecasting
//!
//! Differencing orders are chosen first (seasonal difference on strong
//! seasonality, then regular differences while the series still looks
//! integrated). Every (p, q, P) in the configured grid is then fitted on a
//! training prefix and ranked by AIC; candidates within the tie tolerance
//! are separated by their hold-out error, then by simplicity. The winner is
//! refitted on the full history.
//!
//! When the history is too short, or no candidate fits, a seasonal naive or
//! drift forecast is returned with a degraded status instead of an error.

mod arima;
pub mod metrics;
mod naive;

pub use arima::{apply_polynomial, differencing_polynomial, Arima};

use std::cmp::Ordering;

use chrono::NaiveDate;
use series_spi::Series;
use temporal_api::ForecastConfig;
use temporal_spi::{
    Decomposition, DegradedReason, ErrorMetrics, ForecastMethod, ForecastPoint, ForecastResult,
    Forecaster, ModelOrder, Result, ResultStatus, TemporalError,
};
use tracing::{debug, trace, warn};

use crate::calendar::{days_after, fill_gaps};
use crate::seasonality::PeriodDetector;
use crate::stats::{autocorrelation, linear_fit, variance, z_score};

use self::metrics::error_metrics;

/// Shortest history a model search is attempted on
const MIN_HISTORY: usize = 10;

/// Forecaster with automatic order selection and naive fallback
#[derive(Debug, Clone)]
pub struct AutoArimaForecaster {
    config: ForecastConfig,
    detector: PeriodDetector,
}

/// Values the model search runs on
struct Prepared {
    cutoff: NaiveDate,
    values: Vec<f64>,
    period: Option<usize>,
    seasonal_strength: f64,
}

/// A candidate fitted on the training prefix
struct Candidate {
    order: ModelOrder,
    aic: f64,
    holdout: Option<ErrorMetrics>,
}

impl AutoArimaForecaster {
    /// Create a new forecaster
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            config,
            detector: PeriodDetector::default(),
        }
    }

    /// Use a specific period detector when no decomposition is supplied
    pub fn with_period_detector(mut self, detector: PeriodDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    fn prepare(&self, series: &Series, decomposition: Option<&Decomposition>) -> Option<Prepared> {
        let usable = decomposition.filter(|d| {
            !d.is_empty()
                && d.observed.len() == d.len()
                && d.timestamps.last().copied() == series.last_timestamp()
        });

        match usable {
            Some(d) => {
                let floor = self.config.outlier_weight_floor;
                let values = d
                    .observed
                    .iter()
                    .enumerate()
                    .map(|(i, v)| match d.weights.get(i) {
                        Some(w) if *w < floor => d.baseline_at(i).unwrap_or(*v),
                        _ => *v,
                    })
                    .collect();
                Some(Prepared {
                    cutoff: *d.timestamps.last()?,
                    values,
                    period: d.period,
                    seasonal_strength: robust_seasonal_strength(d, floor),
                })
            }
            None => {
                let frame = fill_gaps(series.points());
                let period = self.detector.detect(&frame.values);
                Some(Prepared {
                    cutoff: frame.last_timestamp()?,
                    values: frame.values,
                    period,
                    seasonal_strength: 0.0,
                })
            }
        }
    }

    /// Regular and seasonal differencing orders
    fn differencing_orders(&self, prepared: &Prepared) -> (usize, usize) {
        let seasonal_d = match prepared.period {
            Some(s)
                if self.config.seasonal
                    && prepared.seasonal_strength > self.config.seasonal_strength_threshold
                    && prepared.values.len() >= 3 * s =>
            {
                1
            }
            _ => 0,
        };

        let mut w = match (seasonal_d, prepared.period) {
            (1, Some(s)) => apply_polynomial(
                &prepared.values,
                &differencing_polynomial(&ModelOrder::new(0, 0, 0).with_seasonal(0, 1, s)),
            ),
            _ => prepared.values.clone(),
        };
        let mut d = 0;
        while d < self.config.max_d && looks_integrated(&w) {
            w = apply_polynomial(&w, &[1.0, -1.0]);
            d += 1;
        }
        (d, seasonal_d)
    }

    fn candidate_orders(
        &self,
        prepared: &Prepared,
        d: usize,
        seasonal_d: usize,
    ) -> Vec<ModelOrder> {
        let seasonal = prepared.period.filter(|_| self.config.seasonal);
        let differenced_len = prepared
            .values
            .len()
            .saturating_sub(d + seasonal_d * seasonal.unwrap_or(0));
        let max_seasonal_p = match seasonal {
            Some(s) if differenced_len > 3 * s => 1,
            _ => 0,
        };

        let mut orders = Vec::new();
        for p in 0..=self.config.max_p {
            for q in 0..=self.config.max_q {
                for seasonal_p in 0..=max_seasonal_p {
                    let order = ModelOrder::new(p, d, q);
                    let order = match seasonal {
                        Some(s) if seasonal_p > 0 || seasonal_d > 0 => {
                            order.with_seasonal(seasonal_p, seasonal_d, s)
                        }
                        _ => order,
                    };
                    orders.push(order);
                }
            }
        }
        orders
    }

    /// Fit every candidate on the training prefix and refit the best on all values
    fn select(
        &self,
        values: &[f64],
        orders: &[ModelOrder],
    ) -> Result<(Arima, Option<ErrorMetrics>)> {
        let n = values.len();
        let split = ((n as f64) * (1.0 - self.config.holdout_ratio)).round() as usize;
        let use_holdout = split < n && split >= MIN_HISTORY;
        let train = if use_holdout { &values[..split] } else { values };
        let eval_start = orders.iter().map(max_lag).max().unwrap_or(0);

        let mut fitted: Vec<Candidate> = orders
            .iter()
            .filter_map(|order| {
                let mut model = Arima::new(*order).ok()?;
                if let Err(e) = model.fit(train, eval_start) {
                    trace!(order = %order, error = %e, "candidate rejected");
                    return None;
                }
                let holdout = if use_holdout {
                    model
                        .predict(n - split)
                        .ok()
                        .filter(|p| p.iter().all(|v| v.is_finite()))
                        .map(|p| error_metrics(&values[split..], &p))
                } else {
                    None
                };
                Some(Candidate {
                    order: *order,
                    aic: model.aic(),
                    holdout,
                })
            })
            .filter(|c| c.aic.is_finite())
            .collect();

        if fitted.is_empty() {
            return Err(TemporalError::fit_failure("no candidate order could be fitted"));
        }

        let best_aic = fitted.iter().map(|c| c.aic).fold(f64::INFINITY, f64::min);
        let tolerance = self.config.aic_tie_tolerance;
        fitted.sort_by(|a, b| rank(a, b, best_aic, tolerance));

        for candidate in &fitted {
            let mut model = Arima::new(candidate.order)?;
            match model.fit(values, eval_start) {
                Ok(()) => {
                    debug!(
                        order = %candidate.order,
                        aic = model.aic(),
                        candidates = fitted.len(),
                        "order selected"
                    );
                    return Ok((model, candidate.holdout));
                }
                Err(e) => trace!(order = %candidate.order, error = %e, "refit rejected"),
            }
        }
        Err(TemporalError::fit_failure("no candidate order survived the refit"))
    }

    fn modeled(
        &self,
        series: &Series,
        prepared: &Prepared,
        model: &Arima,
        holdout: Option<ErrorMetrics>,
        horizon: usize,
    ) -> Result<ForecastResult> {
        let estimates = model.predict(horizon)?;
        if estimates.iter().any(|v| !v.is_finite()) {
            return Err(TemporalError::fit_failure("forecast diverged"));
        }
        let variances = model.forecast_variance(horizon);
        let (actual, predicted) = model.in_sample();

        Ok(ForecastResult {
            key: series.key().clone(),
            horizon,
            training_cutoff: prepared.cutoff,
            points: self.points(prepared.cutoff, &estimates, &variances),
            method: ForecastMethod::Arima,
            order: Some(model.order()),
            aic: Some(model.aic()),
            confidence_level: self.config.confidence_level,
            in_sample: error_metrics(&actual, &predicted),
            holdout,
            status: ResultStatus::Complete,
        })
    }

    fn fallback(
        &self,
        series: &Series,
        prepared: &Prepared,
        horizon: usize,
        reason: DegradedReason,
    ) -> ForecastResult {
        warn!(key = %series.key(), %reason, "forecast degraded to naive fallback");
        let naive = naive::fallback(&prepared.values, prepared.period, horizon);
        ForecastResult {
            key: series.key().clone(),
            horizon,
            training_cutoff: prepared.cutoff,
            points: self.points(prepared.cutoff, &naive.estimates, &naive.variances),
            method: naive.method,
            order: None,
            aic: None,
            confidence_level: self.config.confidence_level,
            in_sample: naive.in_sample,
            holdout: None,
            status: ResultStatus::Degraded { reason },
        }
    }

    fn points(
        &self,
        cutoff: NaiveDate,
        estimates: &[f64],
        variances: &[f64],
    ) -> Vec<ForecastPoint> {
        let z = z_score(self.config.confidence_level);
        days_after(cutoff, estimates.len())
            .into_iter()
            .zip(estimates.iter().zip(variances))
            .map(|(timestamp, (estimate, var))| {
                let half = z * var.max(0.0).sqrt();
                ForecastPoint {
                    timestamp,
                    estimate: *estimate,
                    lower: estimate - half,
                    upper: estimate + half,
                }
            })
            .collect()
    }
}

impl Default for AutoArimaForecaster {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

impl Forecaster for AutoArimaForecaster {
    fn forecast(
        &self,
        series: &Series,
        decomposition: Option<&Decomposition>,
        horizon: usize,
    ) -> Result<ForecastResult> {
        if series.len() < 2 {
            return Err(TemporalError::InsufficientData {
                required: 2,
                actual: series.len(),
            });
        }
        let prepared = self
            .prepare(series, decomposition)
            .ok_or(TemporalError::InsufficientData {
                required: 2,
                actual: 0,
            })?;

        let required = MIN_HISTORY.max(prepared.period.map_or(0, |s| 2 * s));
        if prepared.values.len() < required {
            return Ok(self.fallback(series, &prepared, horizon, DegradedReason::InsufficientData));
        }

        let (d, seasonal_d) = self.differencing_orders(&prepared);
        let orders = self.candidate_orders(&prepared, d, seasonal_d);
        let outcome = self
            .select(&prepared.values, &orders)
            .and_then(|(model, holdout)| self.modeled(series, &prepared, &model, holdout, horizon));

        match outcome {
            Ok(result) => Ok(result),
            Err(TemporalError::FitFailure { reason }) => {
                debug!(key = %series.key(), reason = %reason, "model search failed");
                Ok(self.fallback(series, &prepared, horizon, DegradedReason::FitFailure))
            }
            Err(TemporalError::InsufficientData { .. }) => {
                Ok(self.fallback(series, &prepared, horizon, DegradedReason::InsufficientData))
            }
            Err(e) => Err(e),
        }
    }
}

fn max_lag(order: &ModelOrder) -> usize {
    let seasonal = order
        .seasonal
        .filter(|s| s.p > 0)
        .map_or(0, |s| s.period);
    order.p.max(seasonal)
}

/// Strong lag-1 persistence or a dominant linear trend
fn looks_integrated(w: &[f64]) -> bool {
    w.len() >= MIN_HISTORY
        && (autocorrelation(w, 1) >= 0.9 || linear_fit(w).map_or(false, |f| f.r_squared >= 0.5))
}

/// Seasonal strength computed only over points the decomposition trusts
fn robust_seasonal_strength(d: &Decomposition, floor: f64) -> f64 {
    if !d.has_seasonal() {
        return 0.0;
    }
    let (residual, detrended): (Vec<f64>, Vec<f64>) = d
        .seasonal
        .iter()
        .zip(&d.residual)
        .zip(&d.weights)
        .filter(|(_, w)| **w >= floor)
        .map(|((s, r), _)| (*r, s + r))
        .unzip();
    let var_detrended = variance(&detrended);
    if var_detrended <= f64::EPSILON {
        return 0.0;
    }
    (1.0 - variance(&residual) / var_detrended).clamp(0.0, 1.0)
}

/// Tied candidates first by hold-out error then simplicity; the rest by AIC
fn rank(a: &Candidate, b: &Candidate, best_aic: f64, tolerance: f64) -> Ordering {
    let a_tied = a.aic <= best_aic + tolerance;
    let b_tied = b.aic <= best_aic + tolerance;
    let holdout = |c: &Candidate| c.holdout.map_or(f64::INFINITY, |m| m.mae);
    let simplicity = |c: &Candidate| {
        (
            c.order.coefficient_count(),
            c.order.p,
            c.order.q,
            c.order.seasonal.map_or(0, |s| s.p),
        )
    };

    match (a_tied, b_tied) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => holdout(a)
            .total_cmp(&holdout(b))
            .then_with(|| simplicity(a).cmp(&simplicity(b))),
        (false, false) => a
            .aic
            .total_cmp(&b.aic)
            .then_with(|| simplicity(a).cmp(&simplicity(b))),
    }
}
