//! Seasonal ARIMA estimation
//!
//! The model on the differenced series `w` is
//!
//! ```text
//! w_t = c + sum(phi_i * w_{t-i}) + Phi * w_{t-s} + sum(theta_j * e_{t-j}) + e_t
//! ```
//!
//! with `w = (1 - B)^d (1 - B^s)^D y`. Coefficients come from a two-stage
//! Hannan-Rissanen regression: a long autoregression supplies innovation
//! estimates, then the lags of `w` and of those innovations are regressed on
//! `w` by ordinary least squares. Residuals are recomputed recursively
//! (conditional sum of squares) from the final coefficients.

use temporal_spi::{ModelOrder, Result, TemporalError};

use crate::stats::least_squares;

const MAX_AR: usize = 10;
const MAX_MA: usize = 10;
const MAX_DIFF: usize = 2;

/// Seasonal ARIMA(p,d,q)(P,D,0)[s] model
#[derive(Debug, Clone)]
pub struct Arima {
    order: ModelOrder,
    constant: f64,
    ar_coeffs: Vec<f64>,
    seasonal_ar: f64,
    ma_coeffs: Vec<f64>,
    /// Coefficients of the differencing polynomial, element 0 is 1
    delta: Vec<f64>,
    sigma2: f64,
    aic: f64,
    history: Vec<f64>,
    differenced_data: Vec<f64>,
    residuals: Vec<f64>,
    eval_start: usize,
    fitted: bool,
}

impl Arima {
    /// Create a new unfitted model with the given order
    pub fn new(order: ModelOrder) -> Result<Self> {
        if order.p > MAX_AR {
            return Err(TemporalError::configuration("p", "AR order must be <= 10"));
        }
        if order.d > MAX_DIFF {
            return Err(TemporalError::configuration(
                "d",
                "Differencing order must be <= 2",
            ));
        }
        if order.q > MAX_MA {
            return Err(TemporalError::configuration("q", "MA order must be <= 10"));
        }
        if let Some(s) = order.seasonal {
            if s.period < 2 || s.p > 1 || s.d > 1 {
                return Err(TemporalError::configuration(
                    "seasonal",
                    "seasonal period must be >= 2 with P and D at most 1",
                ));
            }
        }

        Ok(Self {
            order,
            constant: 0.0,
            ar_coeffs: vec![0.0; order.p],
            seasonal_ar: 0.0,
            ma_coeffs: vec![0.0; order.q],
            delta: differencing_polynomial(&order),
            sigma2: 0.0,
            aic: f64::INFINITY,
            history: Vec::new(),
            differenced_data: Vec::new(),
            residuals: Vec::new(),
            eval_start: 0,
            fitted: false,
        })
    }

    pub fn order(&self) -> ModelOrder {
        self.order
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar_coeffs
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma_coeffs
    }

    pub fn seasonal_ar_coefficient(&self) -> f64 {
        self.seasonal_ar
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Innovation variance over the evaluation range
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn seasonal_lag(&self) -> usize {
        match self.order.seasonal {
            Some(s) if s.p > 0 => s.period,
            _ => 0,
        }
    }

    /// Largest lag of `w` the model reads
    pub fn max_lag(&self) -> usize {
        self.order.p.max(self.seasonal_lag())
    }

    /// Number of observations consumed by differencing
    pub fn differencing_lag(&self) -> usize {
        self.delta.len() - 1
    }

    /// Fit to `data`; the innovation variance and AIC are measured from
    /// index `eval_start` of the differenced series onward.
    pub fn fit(&mut self, data: &[f64], eval_start: usize) -> Result<()> {
        let lag = self.differencing_lag();
        let min_required = lag + self.max_lag() + self.order.coefficient_count() + 10;
        if data.len() < min_required {
            return Err(TemporalError::InsufficientData {
                required: min_required,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(TemporalError::fit_failure("data contains non-finite values"));
        }

        self.history = data.to_vec();
        self.differenced_data = apply_polynomial(data, &self.delta);
        self.estimate()?;
        self.residuals = self.css_residuals(&self.differenced_data);

        let m = self.differenced_data.len();
        self.eval_start = eval_start.max(self.max_lag()).min(m.saturating_sub(1));
        let evaluated = &self.residuals[self.eval_start..];
        let n_eff = evaluated.len() as f64;
        self.sigma2 = evaluated.iter().map(|e| e * e).sum::<f64>() / n_eff.max(1.0);
        let k = (self.order.coefficient_count() + 1) as f64;
        self.aic = n_eff * self.sigma2.max(1e-12).ln() + 2.0 * k;

        self.fitted = true;
        Ok(())
    }

    fn estimate(&mut self) -> Result<()> {
        let w = &self.differenced_data;
        let m = w.len();
        let p = self.order.p;
        let q = self.order.q;
        let s_lag = self.seasonal_lag();

        let (innovations, long_order) = if q > 0 {
            let long_order = (p.max(q) + 5).max(10).min(m / 4);
            (long_ar_residuals(w, long_order)?, long_order)
        } else {
            (vec![0.0; m], 0)
        };

        let start = self.max_lag().max(if q > 0 { long_order + q } else { 0 });
        let mut rows = Vec::with_capacity(m.saturating_sub(start));
        let mut targets = Vec::with_capacity(m.saturating_sub(start));
        for t in start..m {
            let mut row = Vec::with_capacity(1 + p + q + 1);
            row.push(1.0);
            row.extend((1..=p).map(|i| w[t - i]));
            if s_lag > 0 {
                row.push(w[t - s_lag]);
            }
            row.extend((1..=q).map(|j| innovations[t - j]));
            rows.push(row);
            targets.push(w[t]);
        }

        let beta = least_squares(&rows, &targets)
            .ok_or_else(|| {
                TemporalError::fit_failure(format!("singular system for {}", self.order))
            })?;

        let mut it = beta.into_iter();
        self.constant = it.next().unwrap_or(0.0);
        self.ar_coeffs = it.by_ref().take(p).collect();
        self.seasonal_ar = if s_lag > 0 { it.next().unwrap_or(0.0) } else { 0.0 };
        self.ma_coeffs = it.take(q).collect();

        let ar_mass: f64 =
            self.ar_coeffs.iter().map(|c| c.abs()).sum::<f64>() + self.seasonal_ar.abs();
        if ar_mass >= 1.0 {
            return Err(TemporalError::fit_failure(format!(
                "{} is not stationary",
                self.order
            )));
        }
        let ma_mass: f64 = self.ma_coeffs.iter().map(|c| c.abs()).sum();
        if ma_mass >= 1.0 {
            return Err(TemporalError::fit_failure(format!(
                "{} is not invertible",
                self.order
            )));
        }
        Ok(())
    }

    /// One-step prediction of `w[t]` from earlier values and innovations
    fn predict_step(&self, w: &[f64], e: &[f64], t: usize) -> f64 {
        let mut prediction = self.constant;
        for (i, phi) in self.ar_coeffs.iter().enumerate() {
            prediction += phi * w[t - i - 1];
        }
        let s_lag = self.seasonal_lag();
        if s_lag > 0 {
            prediction += self.seasonal_ar * w[t - s_lag];
        }
        for (j, theta) in self.ma_coeffs.iter().enumerate() {
            if t > j {
                prediction += theta * e[t - j - 1];
            }
        }
        prediction
    }

    fn css_residuals(&self, w: &[f64]) -> Vec<f64> {
        let mut e = vec![0.0; w.len()];
        for t in self.max_lag()..w.len() {
            e[t] = w[t] - self.predict_step(w, &e, t);
        }
        e
    }

    /// Point forecasts on the original scale
    pub fn predict(&self, steps: usize) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(TemporalError::fit_failure("model is not fitted"));
        }
        if steps == 0 {
            return Ok(Vec::new());
        }

        let mut w = self.differenced_data.clone();
        let mut e = self.residuals.clone();
        let mut y = self.history.clone();
        let n = y.len();

        for _ in 0..steps {
            let t = w.len();
            let next_w = self.predict_step(&w, &e, t);
            w.push(next_w);
            e.push(0.0);

            // y_t = w_t - sum_{k >= 1} delta_k * y_{t-k}
            let yt = y.len();
            let next_y = next_w
                - self
                    .delta
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(k, c)| c * y[yt - k])
                    .sum::<f64>();
            y.push(next_y);
        }

        Ok(y[n..].to_vec())
    }

    /// Forecast error variance for steps `1..=steps`
    pub fn forecast_variance(&self, steps: usize) -> Vec<f64> {
        let psi = self.psi_weights(steps);
        let mut acc = 0.0;
        psi.iter()
            .map(|w| {
                acc += w * w;
                self.sigma2 * acc
            })
            .collect()
    }

    /// MA(infinity) weights of the integrated model
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        let mut ar_poly = vec![1.0];
        ar_poly.extend(self.ar_coeffs.iter().map(|c| -c));
        let s_lag = self.seasonal_lag();
        if s_lag > 0 {
            let mut seasonal = vec![0.0; s_lag + 1];
            seasonal[0] = 1.0;
            seasonal[s_lag] = -self.seasonal_ar;
            ar_poly = poly_mul(&ar_poly, &seasonal);
        }
        let full = poly_mul(&ar_poly, &self.delta);

        let mut psi = Vec::with_capacity(count);
        for j in 0..count {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = self.ma_coeffs.get(j - 1).copied().unwrap_or(0.0);
            for k in 1..=j.min(full.len() - 1) {
                value -= full[k] * psi[j - k];
            }
            psi.push(value);
        }
        psi
    }

    /// In-sample (actual, one-step prediction) pairs over the evaluation range
    pub fn in_sample(&self) -> (Vec<f64>, Vec<f64>) {
        let lag = self.differencing_lag();
        let actual: Vec<f64> = self.history[lag + self.eval_start..].to_vec();
        let predicted: Vec<f64> = actual
            .iter()
            .zip(&self.residuals[self.eval_start..])
            .map(|(a, e)| a - e)
            .collect();
        (actual, predicted)
    }
}

/// Residuals of an OLS autoregression of order `order`, zero before `order`
fn long_ar_residuals(w: &[f64], order: usize) -> Result<Vec<f64>> {
    if order == 0 {
        return Err(TemporalError::fit_failure(
            "series too short for innovation estimates",
        ));
    }
    let m = w.len();
    let rows: Vec<Vec<f64>> = (order..m)
        .map(|t| {
            let mut row = Vec::with_capacity(order + 1);
            row.push(1.0);
            row.extend((1..=order).map(|i| w[t - i]));
            row
        })
        .collect();
    let targets: Vec<f64> = w[order..].to_vec();
    let beta = least_squares(&rows, &targets)
        .ok_or_else(|| TemporalError::fit_failure("singular long autoregression"))?;

    let mut residuals = vec![0.0; m];
    for (t, row) in (order..m).zip(&rows) {
        let fit: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
        residuals[t] = w[t] - fit;
    }
    Ok(residuals)
}

/// `(1 - B)^d (1 - B^s)^D` as a coefficient vector
pub fn differencing_polynomial(order: &ModelOrder) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..order.d {
        poly = poly_mul(&poly, &[1.0, -1.0]);
    }
    if let Some(s) = order.seasonal {
        for _ in 0..s.d {
            let mut seasonal = vec![0.0; s.period + 1];
            seasonal[0] = 1.0;
            seasonal[s.period] = -1.0;
            poly = poly_mul(&poly, &seasonal);
        }
    }
    poly
}

/// Apply a backshift polynomial; output starts at index `poly.len() - 1` of `data`
pub fn apply_polynomial(data: &[f64], poly: &[f64]) -> Vec<f64> {
    let lag = poly.len() - 1;
    (lag..data.len())
        .map(|t| poly.iter().enumerate().map(|(k, c)| c * data[t - k]).sum())
        .collect()
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}
