//! Forecast accuracy metrics
//!
//! Empty or mismatched inputs give 0.0 rather than NaN so records stay
//! serializable.

use temporal_spi::ErrorMetrics;

/// Mean Absolute Error (MAE)
///
/// Average of absolute differences between predictions and actual values.
/// Lower is better. Same scale as the data.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return 0.0;
    }

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum();

    sum / actual.len() as f64
}

/// Root Mean Squared Error (RMSE)
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return 0.0;
    }

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    (sum / actual.len() as f64).sqrt()
}

/// Mean Absolute Percentage Error (MAPE), as a percentage.
///
/// Only non-zero actuals contribute.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() {
        return 0.0;
    }

    let (sum, count) = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, _)| a.abs() > 1e-10)
        .fold((0.0, 0usize), |(sum, count), (a, p)| {
            (sum + ((a - p) / a).abs(), count + 1)
        });

    if count == 0 {
        0.0
    } else {
        100.0 * sum / count as f64
    }
}

/// All three metrics at once
pub fn error_metrics(actual: &[f64], predicted: &[f64]) -> ErrorMetrics {
    ErrorMetrics {
        mae: mae(actual, predicted),
        rmse: rmse(actual, predicted),
        mape: mape(actual, predicted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let actual = vec![1.0, 2.0, 3.0];
        let m = error_metrics(&actual, &actual);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mape, 0.0);
    }

    #[test]
    fn test_known_values() {
        let actual = vec![2.0, 4.0];
        let predicted = vec![1.0, 6.0];
        assert!((mae(&actual, &predicted) - 1.5).abs() < 1e-12);
        assert!((rmse(&actual, &predicted) - (2.5f64).sqrt()).abs() < 1e-12);
        assert!((mape(&actual, &predicted) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_mape_skips_zero_actuals() {
        let actual = vec![0.0, 10.0];
        let predicted = vec![5.0, 11.0];
        assert!((mape(&actual, &predicted) - 10.0).abs() < 1e-12);
        assert_eq!(mape(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert_eq!(mae(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(rmse(&[], &[]), 0.0);
    }
}
