//! The four independent surge signals

use chrono::{Duration, NaiveDate};
use temporal_api::SurgeConfig;
use temporal_spi::{
    DecompositionMode, SignalContext, SignalOutcome, SurgeSignal, SurgeSignalKind, SurgeWindow,
};

use crate::stats::{linear_fit, mean};

/// Trailing days used to estimate a level when no baseline exists
const LEVEL_LOOKBACK: usize = 28;

/// Baseline volume over the window: the baseline snapshot summed per day,
/// else the recent mean level times the window length
pub(crate) fn window_baseline_volume(context: &SignalContext<'_>) -> Option<f64> {
    let window = context.window;
    match context.baseline {
        Some(baseline) => Some(
            days(window)
                .map(|day| baseline.expected_at(day))
                .sum::<f64>(),
        ),
        None => {
            let values = context.series.values();
            if values.is_empty() {
                return None;
            }
            let recent = &values[values.len().saturating_sub(LEVEL_LOOKBACK)..];
            Some(mean(recent) * window.length_days() as f64)
        }
    }
}

fn days(window: SurgeWindow) -> impl Iterator<Item = NaiveDate> {
    (0..window.length_days()).map(move |i| window.start + Duration::days(i))
}

/// Forecast total over the window against the baseline total
#[derive(Debug, Clone)]
pub struct ForecastThresholdSignal {
    multiplier: f64,
}

impl ForecastThresholdSignal {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl SurgeSignal for ForecastThresholdSignal {
    fn kind(&self) -> SurgeSignalKind {
        SurgeSignalKind::ForecastThreshold
    }

    fn evaluate(&self, context: &SignalContext<'_>) -> SignalOutcome {
        let (Some(forecast), Some(baseline)) = (context.forecast, context.baseline) else {
            return SignalOutcome::Unavailable;
        };
        let points = forecast.points_between(context.window.start, context.window.end);
        if points.is_empty() {
            return SignalOutcome::Unavailable;
        }

        let expected: f64 = points.iter().map(|p| p.estimate).sum();
        let base: f64 = points.iter().map(|p| baseline.expected_at(p.timestamp)).sum();
        if base <= 0.0 {
            return SignalOutcome::Unavailable;
        }
        if expected <= self.multiplier * base {
            return SignalOutcome::Quiet;
        }

        let onset = points
            .iter()
            .find(|p| p.estimate > self.multiplier * baseline.expected_at(p.timestamp))
            .map(|p| p.timestamp);
        SignalOutcome::Fired {
            implied_magnitude: expected / base - 1.0,
            onset,
        }
    }
}

/// Projected age-boundary crossings against the regional norm
#[derive(Debug, Clone)]
pub struct AgeTransitionSignal {
    margin: f64,
    conversion: f64,
}

impl AgeTransitionSignal {
    pub fn new(margin: f64, conversion: f64) -> Self {
        Self { margin, conversion }
    }
}

impl SurgeSignal for AgeTransitionSignal {
    fn kind(&self) -> SurgeSignalKind {
        SurgeSignalKind::AgeTransition
    }

    fn evaluate(&self, context: &SignalContext<'_>) -> SignalOutcome {
        let window = context.window;
        let relevant: Vec<_> = context
            .age_projections
            .iter()
            .filter(|p| p.overlaps(window.start, window.end))
            .collect();
        if relevant.is_empty() {
            return SignalOutcome::Unavailable;
        }

        let projected: f64 = relevant
            .iter()
            .map(|p| p.projected_count * p.overlap_fraction(window.start, window.end))
            .sum();
        let own_baseline = relevant
            .iter()
            .map(|p| {
                p.baseline_count
                    .map(|b| b * p.overlap_fraction(window.start, window.end))
            })
            .sum::<Option<f64>>();
        let Some(norm) = own_baseline.or(context.regional_age_baseline).filter(|b| *b > 0.0)
        else {
            return SignalOutcome::Unavailable;
        };
        if projected <= norm * self.margin {
            return SignalOutcome::Quiet;
        }

        let Some(volume) = window_baseline_volume(context).filter(|v| *v > 0.0) else {
            return SignalOutcome::Unavailable;
        };
        let onset = relevant.iter().map(|p| p.start.max(window.start)).min();
        SignalOutcome::Fired {
            implied_magnitude: projected * self.conversion / volume,
            onset,
        }
    }
}

/// Same window in earlier cycles against the period just before it
#[derive(Debug, Clone)]
pub struct HistoricalPatternSignal {
    cycle_days: i64,
    cycles: usize,
    ratio: f64,
}

impl HistoricalPatternSignal {
    pub fn new(cycle_days: usize, cycles: usize, ratio: f64) -> Self {
        Self {
            cycle_days: cycle_days as i64,
            cycles,
            ratio,
        }
    }
}

impl SurgeSignal for HistoricalPatternSignal {
    fn kind(&self) -> SurgeSignalKind {
        SurgeSignalKind::HistoricalPattern
    }

    fn evaluate(&self, context: &SignalContext<'_>) -> SignalOutcome {
        let window = context.window;
        let length = window.length_days();
        let needed = (length as usize / 2).max(1);

        let mut compared = 0;
        let mut matches = Vec::new();
        for k in 1..=self.cycles as i64 {
            let shift = Duration::days(self.cycle_days * k);
            let prior_start = window.start - shift;
            let prior_end = window.end - shift;
            let before_start = prior_start - Duration::days(length);
            let before_end = prior_start - Duration::days(1);

            let prior = context.series.range(prior_start, prior_end);
            let before = context.series.range(before_start, before_end);
            if prior.len() < needed || before.len() < needed {
                continue;
            }
            let prior_mean = prior.iter().map(|p| p.value).sum::<f64>() / prior.len() as f64;
            let before_mean = before.iter().map(|p| p.value).sum::<f64>() / before.len() as f64;
            if before_mean <= 0.0 {
                continue;
            }
            compared += 1;
            let ratio = prior_mean / before_mean;
            if ratio >= self.ratio {
                matches.push(ratio);
            }
        }

        if compared == 0 {
            SignalOutcome::Unavailable
        } else if matches.is_empty() {
            SignalOutcome::Quiet
        } else {
            SignalOutcome::fired(mean(&matches) - 1.0)
        }
    }
}

/// Recent trend slope against the slope of the segment before it
#[derive(Debug, Clone)]
pub struct TrendAccelerationSignal {
    segment: usize,
    margin: f64,
}

impl TrendAccelerationSignal {
    pub fn new(segment: usize, margin: f64) -> Self {
        Self { segment, margin }
    }
}

impl SurgeSignal for TrendAccelerationSignal {
    fn kind(&self) -> SurgeSignalKind {
        SurgeSignalKind::TrendAcceleration
    }

    fn evaluate(&self, context: &SignalContext<'_>) -> SignalOutcome {
        let values = match context.decomposition {
            Some(d) if d.mode == DecompositionMode::Robust => d.trend.clone(),
            Some(d) => d.observed.clone(),
            None => context.series.values(),
        };
        let n = values.len();
        if self.segment < 2 || n < 2 * self.segment {
            return SignalOutcome::Unavailable;
        }

        let recent = linear_fit(&values[n - self.segment..]).map(|f| f.slope);
        let prior = linear_fit(&values[n - 2 * self.segment..n - self.segment]).map(|f| f.slope);
        let (Some(recent), Some(prior)) = (recent, prior) else {
            return SignalOutcome::Unavailable;
        };
        if recent <= 0.0 || recent <= prior + self.margin * prior.abs() {
            return SignalOutcome::Quiet;
        }

        // Extra growth the steeper slope adds by the middle of the window
        let level = values[n - 1].abs().max(1.0);
        let window = context.window;
        let lead = (window.start - context.as_of).num_days() as f64;
        let mid = lead + window.length_days() as f64 / 2.0;
        let implied = (recent - prior.max(0.0)) * mid / level;
        SignalOutcome::fired(implied.max(0.0))
    }
}

/// The standard signal set in evaluation order
pub fn default_signals(config: &SurgeConfig) -> Vec<Box<dyn SurgeSignal>> {
    vec![
        Box::new(ForecastThresholdSignal::new(config.forecast_multiplier)),
        Box::new(AgeTransitionSignal::new(
            config.age_transition_margin,
            config.enrollment_conversion,
        )),
        Box::new(HistoricalPatternSignal::new(
            config.historical_cycle_days,
            config.historical_cycles,
            config.historical_ratio,
        )),
        Box::new(TrendAccelerationSignal::new(
            config.acceleration_segment,
            config.acceleration_margin,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use series_spi::{GeoLevel, Point, Series, SeriesKey};
    use temporal_spi::{
        AgeCohortProjection, BaselineSnapshot, ErrorMetrics, ForecastMethod, ForecastPoint,
        ForecastResult, GenerationId, ResultStatus,
    };

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i)
    }

    fn key() -> SeriesKey {
        SeriesKey::new("PUNE", GeoLevel::District, "enrolment")
    }

    fn flat_series(n: i64, level: f64) -> Series {
        Series::from_points(key(), (0..n).map(|i| Point::new(day(i), level))).unwrap()
    }

    fn baseline(anchor: NaiveDate, level: f64) -> BaselineSnapshot {
        BaselineSnapshot {
            key: key(),
            generation: GenerationId(1),
            anchor,
            trend_level: level,
            slope: 0.0,
            period: None,
            seasonal_profile: Vec::new(),
            residual_std: 1.0,
        }
    }

    fn forecast(from: NaiveDate, estimates: &[f64]) -> ForecastResult {
        ForecastResult {
            key: key(),
            horizon: estimates.len(),
            training_cutoff: from,
            points: estimates
                .iter()
                .enumerate()
                .map(|(i, e)| ForecastPoint {
                    timestamp: from + Duration::days(i as i64 + 1),
                    estimate: *e,
                    lower: e - 1.0,
                    upper: e + 1.0,
                })
                .collect(),
            method: ForecastMethod::Arima,
            order: None,
            aic: None,
            confidence_level: 0.95,
            in_sample: ErrorMetrics { mae: 0.0, rmse: 0.0, mape: 0.0 },
            holdout: None,
            status: ResultStatus::Complete,
        }
    }

    fn context<'a>(
        series: &'a Series,
        window: SurgeWindow,
        baseline: Option<&'a BaselineSnapshot>,
        forecast: Option<&'a ForecastResult>,
        projections: &'a [AgeCohortProjection],
    ) -> SignalContext<'a> {
        SignalContext {
            key: series.key(),
            window,
            as_of: series.last_timestamp().unwrap(),
            series,
            decomposition: None,
            baseline,
            forecast,
            age_projections: projections,
            regional_age_baseline: None,
        }
    }

    #[test]
    fn test_forecast_threshold_fires_with_onset() {
        let series = flat_series(60, 100.0);
        let as_of = day(59);
        let base = baseline(as_of, 100.0);
        let mut estimates = vec![100.0; 10];
        estimates.extend(vec![300.0; 20]);
        let fc = forecast(as_of, &estimates);
        let window = SurgeWindow::new(day(60), day(89));

        let outcome = ForecastThresholdSignal::new(1.5)
            .evaluate(&context(&series, window, Some(&base), Some(&fc), &[]));
        match outcome {
            SignalOutcome::Fired { implied_magnitude, onset } => {
                assert!((implied_magnitude - (7000.0 / 3000.0 - 1.0)).abs() < 1e-9);
                assert_eq!(onset, Some(day(70)));
            }
            other => panic!("expected fired, got {other:?}"),
        }
    }

    #[test]
    fn test_forecast_threshold_quiet_and_unavailable() {
        let series = flat_series(60, 100.0);
        let as_of = day(59);
        let base = baseline(as_of, 100.0);
        let fc = forecast(as_of, &[110.0; 30]);
        let window = SurgeWindow::new(day(60), day(89));
        let signal = ForecastThresholdSignal::new(1.5);

        assert_eq!(
            signal.evaluate(&context(&series, window, Some(&base), Some(&fc), &[])),
            SignalOutcome::Quiet
        );
        assert_eq!(
            signal.evaluate(&context(&series, window, None, Some(&fc), &[])),
            SignalOutcome::Unavailable
        );
    }

    #[test]
    fn test_age_transition_against_own_baseline() {
        let series = flat_series(60, 100.0);
        let base = baseline(day(59), 100.0);
        let window = SurgeWindow::new(day(60), day(89));
        let projections = vec![AgeCohortProjection {
            unit: "PUNE".into(),
            level: GeoLevel::District,
            metric: None,
            start: day(60),
            end: day(89),
            projected_count: 5000.0,
            baseline_count: Some(2000.0),
        }];
        let outcome = AgeTransitionSignal::new(1.2, 0.3)
            .evaluate(&context(&series, window, Some(&base), None, &projections));
        match outcome {
            SignalOutcome::Fired { implied_magnitude, onset } => {
                assert!((implied_magnitude - 5000.0 * 0.3 / 3000.0).abs() < 1e-9);
                assert_eq!(onset, Some(day(60)));
            }
            other => panic!("expected fired, got {other:?}"),
        }
    }

    #[test]
    fn test_age_transition_without_norm_is_unavailable() {
        let series = flat_series(60, 100.0);
        let window = SurgeWindow::new(day(60), day(89));
        let projections = vec![AgeCohortProjection {
            unit: "PUNE".into(),
            level: GeoLevel::District,
            metric: None,
            start: day(60),
            end: day(89),
            projected_count: 5000.0,
            baseline_count: None,
        }];
        let outcome = AgeTransitionSignal::new(1.2, 0.3)
            .evaluate(&context(&series, window, None, None, &projections));
        assert_eq!(outcome, SignalOutcome::Unavailable);
    }

    #[test]
    fn test_historical_pattern() {
        // A yearly bump on days 15..45 and 380..410 of a two-year history
        let points = (0..730).map(|i| {
            let bump = if (15..45).contains(&(i % 365)) { 300.0 } else { 100.0 };
            Point::new(day(i), bump)
        });
        let series = Series::from_points(key(), points).unwrap();
        let as_of = day(729);
        let window = SurgeWindow::new(day(745), day(774));
        let signal = HistoricalPatternSignal::new(365, 2, 1.5);
        let outcome = signal.evaluate(&context(&series, window, None, None, &[]));
        assert!(outcome.is_fired(), "{outcome:?}");
        assert_eq!(series.last_timestamp(), Some(as_of));

        let quiet_window = SurgeWindow::new(day(830), day(859));
        assert_eq!(
            signal.evaluate(&context(&series, quiet_window, None, None, &[])),
            SignalOutcome::Quiet
        );

        let short = flat_series(30, 100.0);
        let window = SurgeWindow::new(day(30), day(59));
        assert_eq!(
            signal.evaluate(&context(&short, window, None, None, &[])),
            SignalOutcome::Unavailable
        );
    }

    #[test]
    fn test_trend_acceleration() {
        let values: Vec<f64> = (0..56)
            .map(|i| if i < 28 { 100.0 + i as f64 } else { 128.0 + 3.0 * (i - 28) as f64 })
            .collect();
        let series = Series::from_points(
            key(),
            values.iter().enumerate().map(|(i, v)| Point::new(day(i as i64), *v)),
        )
        .unwrap();
        let window = SurgeWindow::new(day(56), day(85));
        let signal = TrendAccelerationSignal::new(28, 0.25);
        assert!(signal
            .evaluate(&context(&series, window, None, None, &[]))
            .is_fired());

        let steady = Series::from_points(
            key(),
            (0..56).map(|i| Point::new(day(i), 100.0 + i as f64)),
        )
        .unwrap();
        assert_eq!(
            signal.evaluate(&context(&steady, window, None, None, &[])),
            SignalOutcome::Quiet
        );
        assert_eq!(
            signal.evaluate(&context(&flat_series(20, 1.0), window, None, None, &[])),
            SignalOutcome::Unavailable
        );
    }
}
