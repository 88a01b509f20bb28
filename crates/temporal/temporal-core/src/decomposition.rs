//! Robust seasonal-trend decomposition
//!
//! When a seasonal period is found the series is split with an STL-style
//! procedure: cycle-subseries loess, low-pass removal, then trend loess, all
//! inside an outer loop that re-weights points by their residual with a
//! bisquare function. Without a period the decomposer falls back to a linear
//! regression of value on time.

use series_spi::{Series, SeriesKey};
use temporal_api::DecompositionConfig;
use temporal_spi::{
    Decomposer, Decomposition, DecompositionMode, Result, TemporalError, TrendDirection,
};
use tracing::debug;

use crate::calendar::{as_frame, fill_gaps, DailyFrame};
use crate::loess::{loess_at, loess_smooth, moving_average, next_odd};
use crate::seasonality::PeriodDetector;
use crate::stats::{linear_fit, mean, median, min_max, sample_std};

/// Smallest subseries span used for the seasonal smoother
const SEASONAL_SPAN: usize = 7;

/// Robust STL decomposer with simple-trend fallback
#[derive(Debug, Clone)]
pub struct StlDecomposer {
    config: DecompositionConfig,
    detector: PeriodDetector,
}

impl StlDecomposer {
    /// Create a new decomposer
    pub fn new(config: DecompositionConfig) -> Self {
        let detector = PeriodDetector::new(config.candidate_periods.clone(), config.acf_floor);
        Self { config, detector }
    }

    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    /// Decompose an already framed series
    pub fn decompose_frame(&self, key: &SeriesKey, frame: DailyFrame) -> Result<Decomposition> {
        if frame.len() < self.config.min_points {
            return Err(TemporalError::InsufficientData {
                required: self.config.min_points,
                actual: frame.len(),
            });
        }

        let period = match self.config.period_override {
            Some(p) => Some(p).filter(|p| frame.len() >= p * 2),
            None => self.detector.detect(&frame.values),
        };

        let decomposition = match period {
            Some(p) => self.robust(key, frame, p),
            None => self.simple_trend(key, frame),
        };
        debug!(
            key = %key,
            mode = ?decomposition.mode,
            period = ?decomposition.period,
            slope = decomposition.slope,
            "series decomposed"
        );
        Ok(decomposition)
    }

    fn robust(&self, key: &SeriesKey, frame: DailyFrame, period: usize) -> Decomposition {
        let params = StlParams::new(
            period,
            self.config.inner_iterations,
            self.config.robust_iterations,
        );
        let (seasonal, trend, weights) = stl(&frame.values, &params);
        let residual: Vec<f64> = frame
            .values
            .iter()
            .zip(&seasonal)
            .zip(&trend)
            .map(|((y, s), t)| y - s - t)
            .collect();

        let slope = linear_fit(&trend).map_or(0.0, |f| f.slope);
        let seasonal_amplitude = min_max(&seasonal).map_or(0.0, |(lo, hi)| hi - lo);
        let residual_std = sample_std(&residual);

        Decomposition {
            key: key.clone(),
            mode: DecompositionMode::Robust,
            period: Some(period),
            direction: self.direction(slope, &frame.values),
            timestamps: frame.timestamps,
            observed: frame.values,
            trend,
            seasonal,
            residual,
            weights,
            slope,
            seasonal_amplitude,
            residual_std,
            filled_points: frame.filled,
        }
    }

    fn simple_trend(&self, key: &SeriesKey, frame: DailyFrame) -> Decomposition {
        let fit = linear_fit(&frame.values);
        let trend: Vec<f64> = match fit {
            Some(f) => (0..frame.len()).map(|t| f.at(t as f64)).collect(),
            None => frame.values.clone(),
        };
        let regression_residual: Vec<f64> = frame
            .values
            .iter()
            .zip(&trend)
            .map(|(y, t)| y - t)
            .collect();
        let slope = fit.map_or(0.0, |f| f.slope);
        let weights = bisquare_weights(&regression_residual, scale_floor(&frame.values));

        Decomposition {
            key: key.clone(),
            mode: DecompositionMode::SimpleTrend,
            period: None,
            direction: self.direction(slope, &frame.values),
            timestamps: frame.timestamps,
            observed: frame.values,
            trend,
            seasonal: Vec::new(),
            residual: Vec::new(),
            weights,
            slope,
            seasonal_amplitude: 0.0,
            residual_std: sample_std(&regression_residual),
            filled_points: frame.filled,
        }
    }

    fn direction(&self, slope: f64, values: &[f64]) -> TrendDirection {
        let level = mean(&values.iter().map(|v| v.abs()).collect::<Vec<_>>());
        let dead_zone = (self.config.stable_slope_ratio * level).max(1e-12);
        if slope > dead_zone {
            TrendDirection::Increasing
        } else if slope < -dead_zone {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }
}

impl Default for StlDecomposer {
    fn default() -> Self {
        Self::new(DecompositionConfig::default())
    }
}

impl Decomposer for StlDecomposer {
    fn decompose(&self, series: &Series) -> Result<Decomposition> {
        let frame = if self.config.fill_gaps {
            fill_gaps(series.points())
        } else {
            as_frame(series.points())
        };
        self.decompose_frame(series.key(), frame)
    }
}

#[derive(Debug, Clone, Copy)]
struct StlParams {
    period: usize,
    seasonal_span: usize,
    lowpass_span: usize,
    trend_span: usize,
    inner: usize,
    outer: usize,
}

impl StlParams {
    fn new(period: usize, inner: usize, outer: usize) -> Self {
        let seasonal_span = next_odd(SEASONAL_SPAN as f64);
        let ns = seasonal_span as f64;
        Self {
            period,
            seasonal_span,
            lowpass_span: next_odd(period as f64),
            trend_span: next_odd(1.5 * period as f64 / (1.0 - 1.5 / ns)),
            inner: inner.max(1),
            outer: outer.max(2),
        }
    }
}

/// Returns (seasonal, trend, final robustness weights)
fn stl(y: &[f64], params: &StlParams) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = y.len();
    let mut trend = vec![0.0; n];
    let mut seasonal = vec![0.0; n];
    let floor = scale_floor(y);
    // An unweighted first pass smears a spike into its neighbours
    let mut weights = seed_weights(y, params, floor);

    for pass in 0..params.outer {
        for _ in 0..params.inner {
            inner_pass(y, &weights, &mut trend, &mut seasonal, params);
        }
        if pass + 1 < params.outer {
            weights = bisquare_weights(&residuals(y, &seasonal, &trend), floor);
        }
    }
    let weights = bisquare_weights(&residuals(y, &seasonal, &trend), floor);
    (seasonal, trend, weights)
}

/// Robustness weights from a running median over one cycle plus the
/// per-phase median of what is left
fn seed_weights(y: &[f64], params: &StlParams, floor: f64) -> Vec<f64> {
    let n = y.len();
    let p = params.period;
    let width = params.lowpass_span.min(n);
    let level: Vec<f64> = (0..n)
        .map(|i| {
            let start = i.saturating_sub(width / 2).min(n - width);
            median(&y[start..start + width]).unwrap_or(y[i])
        })
        .collect();
    let detrended: Vec<f64> = y.iter().zip(&level).map(|(v, l)| v - l).collect();
    let profile: Vec<f64> = (0..p)
        .map(|phase| {
            let sub: Vec<f64> = detrended.iter().skip(phase).step_by(p).copied().collect();
            median(&sub).unwrap_or(0.0)
        })
        .collect();
    let residual: Vec<f64> = detrended
        .iter()
        .enumerate()
        .map(|(i, d)| d - profile[i % p])
        .collect();
    bisquare_weights(&residual, floor)
}

/// Smallest residual scale treated as real rather than rounding
fn scale_floor(y: &[f64]) -> f64 {
    let level = mean(&y.iter().map(|v| v.abs()).collect::<Vec<_>>());
    1e-9 * level.max(1.0)
}

fn inner_pass(
    y: &[f64],
    weights: &[f64],
    trend: &mut [f64],
    seasonal: &mut [f64],
    params: &StlParams,
) {
    let n = y.len();
    let p = params.period;
    let detrended: Vec<f64> = y.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();

    // Cycle-subseries smoothing, extended one cycle past each end
    let mut cycle = vec![0.0; n + 2 * p];
    for phase in 0..p.min(n) {
        let idx: Vec<usize> = (phase..n).step_by(p).collect();
        let sub: Vec<f64> = idx.iter().map(|&i| detrended[i]).collect();
        let sub_w: Vec<f64> = idx.iter().map(|&i| weights[i]).collect();
        let ones = vec![1.0; sub.len()];
        let m = sub.len() as i64;
        for j in -1..=m {
            let value = loess_at(&sub, &sub_w, params.seasonal_span, j as f64)
                .or_else(|| loess_at(&sub, &ones, params.seasonal_span, j as f64))
                .unwrap_or(0.0);
            let ext = phase as i64 + j * p as i64 + p as i64;
            if ext >= 0 && (ext as usize) < cycle.len() {
                cycle[ext as usize] = value;
            }
        }
    }

    // Low-pass filter of the cycle series
    let ma = moving_average(&moving_average(&moving_average(&cycle, p), p), 3);
    let lowpass = loess_smooth(&ma, &vec![1.0; ma.len()], params.lowpass_span);

    for i in 0..n {
        seasonal[i] = cycle[i + p] - lowpass.get(i).copied().unwrap_or(0.0);
    }

    let deseasonalized: Vec<f64> = y.iter().zip(seasonal.iter()).map(|(v, s)| v - s).collect();
    let smoothed = loess_smooth(&deseasonalized, weights, params.trend_span);
    trend.copy_from_slice(&smoothed);
}

fn residuals(y: &[f64], seasonal: &[f64], trend: &[f64]) -> Vec<f64> {
    y.iter()
        .zip(seasonal)
        .zip(trend)
        .map(|((v, s), t)| v - s - t)
        .collect()
}

/// Bisquare weights `(1 - (r / 6 median|r|)^2)^2` with the scale held at or
/// above `floor`
fn bisquare_weights(residuals: &[f64], floor: f64) -> Vec<f64> {
    let abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    let h = (6.0 * median(&abs).unwrap_or(0.0)).max(floor);
    if h <= 0.0 {
        return vec![1.0; residuals.len()];
    }
    abs.iter()
        .map(|r| {
            let u = r / h;
            if u < 1.0 {
                (1.0 - u * u).powi(2)
            } else {
                0.0
            }
        })
        .collect()
}
