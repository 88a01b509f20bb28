//! Locally weighted linear regression on evenly spaced data

/// Share of the distance-weight mass the robustness weights must keep
pub const MIN_WEIGHT_MASS: f64 = 0.1;

/// Local linear fit at `x0` using the `span` nearest of the points `0..values.len()`.
///
/// Neighbours get tricube distance weights multiplied by their robustness
/// weight. When `span` exceeds the number of points the bandwidth is widened
/// past the furthest point, so the fit tends towards a global line. Returns
/// `None` when the robustness weights leave less than [`MIN_WEIGHT_MASS`] of
/// the distance-weight mass, or leave all of it on a single point.
pub fn loess_at(values: &[f64], robustness: &[f64], span: usize, x0: f64) -> Option<f64> {
    let n = values.len();
    if n == 0 || span == 0 {
        return None;
    }
    let q = span.min(n);

    let centre = x0.round().clamp(0.0, (n - 1) as f64) as usize;
    let start = centre.saturating_sub((q - 1) / 2).min(n - q);
    let end = start + q;

    let mut max_dist = (x0 - start as f64).abs().max((x0 - (end - 1) as f64).abs());
    if span > n {
        max_dist += (span - n) as f64 / 2.0;
    }
    let max_dist = max_dist.max(1.0);

    let mut mass = 0.0;
    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for i in start..end {
        let x = i as f64;
        let u = (x - x0).abs() / max_dist;
        if u >= 1.0 {
            continue;
        }
        let tricube = (1.0 - u.powi(3)).powi(3);
        mass += tricube;
        let w = tricube * robustness.get(i).copied().unwrap_or(1.0);
        if w <= 0.0 {
            continue;
        }
        sw += w;
        swx += w * x;
        swy += w * values[i];
        swxx += w * x * x;
        swxy += w * x * values[i];
    }

    if sw <= 1e-12 || sw < MIN_WEIGHT_MASS * mass {
        return None;
    }
    let mean_x = swx / sw;
    let mean_y = swy / sw;
    let var_x = swxx / sw - mean_x * mean_x;
    if var_x.abs() < 1e-9 {
        // A lone surviving neighbour would be echoed back as the fit
        return (q == 1).then_some(mean_y);
    }
    let slope = (swxy / sw - mean_x * mean_y) / var_x;
    Some(mean_y + slope * (x0 - mean_x))
}

/// Smooth every point of `values`.
///
/// Where the robustness weights leave too little support the point falls
/// back to the unweighted fit, and only then to its raw value.
pub fn loess_smooth(values: &[f64], robustness: &[f64], span: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let x0 = i as f64;
            loess_at(values, robustness, span, x0)
                .or_else(|| loess_at(values, &[], span, x0))
                .unwrap_or(values[i])
        })
        .collect()
}

/// Centered moving average of width `window`; output is `window - 1` shorter
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }
    out
}

/// Smallest odd integer not below `x`
pub fn next_odd(x: f64) -> usize {
    let n = x.ceil().max(1.0) as usize;
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproduces_line() {
        let values: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        let weights = vec![1.0; 20];
        let smooth = loess_smooth(&values, &weights, 7);
        for (a, b) in values.iter().zip(&smooth) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_extrapolates_one_step() {
        let values: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();
        let weights = vec![1.0; 10];
        assert!((loess_at(&values, &weights, 5, -1.0).unwrap() + 2.0).abs() < 1e-9);
        assert!((loess_at(&values, &weights, 5, 10.0).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_point_is_ignored() {
        let mut values = vec![1.0; 11];
        values[5] = 100.0;
        let mut weights = vec![1.0; 11];
        weights[5] = 0.0;
        let fit = loess_at(&values, &weights, 5, 5.0).unwrap();
        assert!((fit - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_lone_weighted_neighbour_is_not_echoed() {
        let mut values = vec![1.0; 11];
        values[5] = 100.0;
        let mut weights = vec![0.0; 11];
        weights[5] = 1.0;
        assert_eq!(loess_at(&values, &weights, 5, 5.0), None);

        // The smoother falls back to the unweighted fit instead
        let smooth = loess_smooth(&values, &weights, 5);
        assert!(smooth[5] < 100.0);
    }

    #[test]
    fn test_thin_weight_mass_is_rejected() {
        let values: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let weights = vec![0.01; 9];
        assert_eq!(loess_at(&values, &weights, 9, 4.0), None);
        assert!(loess_at(&values, &[0.5; 9], 9, 4.0).is_some());
    }

    #[test]
    fn test_span_wider_than_data() {
        let values = vec![1.0, 2.0, 3.0];
        let fit = loess_at(&values, &[1.0; 3], 15, 1.0).unwrap();
        assert!((fit - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(moving_average(&[1.0], 2).is_empty());
    }

    #[test]
    fn test_next_odd() {
        assert_eq!(next_odd(7.0), 7);
        assert_eq!(next_odd(8.0), 9);
        assert_eq!(next_odd(13.36), 15);
    }
}
