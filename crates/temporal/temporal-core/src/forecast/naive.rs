//! Naive fallback forecasts used when no model can be fitted

use temporal_spi::{ErrorMetrics, ForecastMethod};

use super::metrics::error_metrics;

/// Point forecasts with their error variances
#[derive(Debug, Clone)]
pub(crate) struct NaiveForecast {
    pub method: ForecastMethod,
    pub estimates: Vec<f64>,
    pub variances: Vec<f64>,
    pub in_sample: ErrorMetrics,
}

/// Seasonal naive with drift, or plain drift when no usable period exists
pub(crate) fn fallback(values: &[f64], period: Option<usize>, horizon: usize) -> NaiveForecast {
    match period.filter(|&s| s >= 2 && values.len() >= s + 2) {
        Some(s) => seasonal_naive(values, s, horizon),
        None => drift(values, horizon),
    }
}

/// Repeat the last cycle, shifted by the average change per cycle.
///
/// Step `h` falls `k = ceil(h / s)` cycles ahead and gets variance `sigma^2 * k`.
fn seasonal_naive(values: &[f64], s: usize, horizon: usize) -> NaiveForecast {
    let n = values.len();
    let first = values[..s].iter().sum::<f64>() / s as f64;
    let last = values[n - s..].iter().sum::<f64>() / s as f64;
    let drift_per_day = (last - first) / (n - s) as f64;
    let cycle_drift = drift_per_day * s as f64;

    let actual: Vec<f64> = values[s..].to_vec();
    let predicted: Vec<f64> = (s..n).map(|t| values[t - s] + cycle_drift).collect();
    let sigma2 = mean_square(&actual, &predicted);

    let mut estimates = Vec::with_capacity(horizon);
    let mut variances = Vec::with_capacity(horizon);
    for h in 1..=horizon {
        let cycles = (h - 1) / s + 1;
        estimates.push(values[n - s + (h - 1) % s] + cycle_drift * cycles as f64);
        variances.push(sigma2 * cycles as f64);
    }

    NaiveForecast {
        method: ForecastMethod::SeasonalNaive,
        estimates,
        variances,
        in_sample: error_metrics(&actual, &predicted),
    }
}

/// Extend the line through the first and last observation
fn drift(values: &[f64], horizon: usize) -> NaiveForecast {
    let n = values.len();
    let last = values.last().copied().unwrap_or(0.0);
    let slope = if n > 1 {
        (last - values[0]) / (n - 1) as f64
    } else {
        0.0
    };

    let actual: Vec<f64> = values.iter().skip(1).copied().collect();
    let predicted: Vec<f64> = values.windows(2).map(|w| w[0] + slope).collect();
    let sigma2 = mean_square(&actual, &predicted);
    let scale = (n.max(2) - 1) as f64;

    let estimates = (1..=horizon).map(|h| last + slope * h as f64).collect();
    let variances = (1..=horizon)
        .map(|h| {
            let h = h as f64;
            sigma2 * h * (1.0 + h / scale)
        })
        .collect();

    NaiveForecast {
        method: ForecastMethod::Drift,
        estimates,
        variances,
        in_sample: error_metrics(&actual, &predicted),
    }
}

fn mean_square(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_extends_line() {
        let values = vec![10.0, 12.0, 14.0, 16.0];
        let f = fallback(&values, None, 3);
        assert_eq!(f.method, ForecastMethod::Drift);
        assert_eq!(f.estimates, vec![18.0, 20.0, 22.0]);
        assert!(f.variances.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_drift_two_points() {
        let f = fallback(&[1.0, 3.0], None, 2);
        assert_eq!(f.estimates, vec![5.0, 7.0]);
    }

    #[test]
    fn test_seasonal_naive_repeats_cycle() {
        let values = vec![1.0, 5.0, 1.0, 5.0, 1.0, 5.0];
        let f = fallback(&values, Some(2), 4);
        assert_eq!(f.method, ForecastMethod::SeasonalNaive);
        assert_eq!(f.estimates, vec![1.0, 5.0, 1.0, 5.0]);
    }

    #[test]
    fn test_seasonal_variance_steps_per_cycle() {
        let values = vec![1.0, 5.0, 2.0, 4.0, 1.0, 6.0, 2.0, 5.0];
        let f = fallback(&values, Some(2), 5);
        assert!(f.variances[0] > 0.0);
        assert_eq!(f.variances[0], f.variances[1]);
        assert!((f.variances[2] - 2.0 * f.variances[0]).abs() < 1e-12);
        assert!(f.variances.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_short_history_falls_back_to_drift() {
        let f = fallback(&[1.0, 2.0, 3.0], Some(7), 2);
        assert_eq!(f.method, ForecastMethod::Drift);
    }
}
