//! Run configuration
//!
//! Every section has serde defaults, so a TOML file only needs the keys it
//! changes. Values are layered: defaults, then the file, then `TIP_*`
//! environment overrides, then [`PipelineConfig::validate`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use temporal_spi::{Result, SurgeSignalKind, TemporalError};
use tracing::debug;

use crate::rules::{default_rules, PriorityRule};

/// Configuration for seasonal-trend decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecompositionConfig {
    /// Force a seasonal period instead of detecting one
    pub period_override: Option<usize>,
    /// Lags tried by the autocorrelation search
    pub candidate_periods: Vec<usize>,
    /// Minimum autocorrelation for a lag to count as seasonal
    pub acf_floor: f64,
    /// Fewer points than this is `InsufficientData`
    pub min_points: usize,
    /// Outer robustness passes (at least 2)
    pub robust_iterations: usize,
    /// Inner loess passes per outer pass
    pub inner_iterations: usize,
    /// Trend dead-zone: |slope| below this share of the mean level is "stable"
    pub stable_slope_ratio: f64,
    /// Interpolate calendar gaps before decomposing
    pub fill_gaps: bool,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            period_override: None,
            candidate_periods: vec![7, 30],
            acf_floor: 0.3,
            min_points: 14,
            robust_iterations: 2,
            inner_iterations: 2,
            stable_slope_ratio: 0.001,
            fill_gaps: true,
        }
    }
}

/// Configuration for model search and forecasting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Horizons in days; the run forecasts the longest and truncates
    pub horizons: Vec<usize>,
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    /// Allow a seasonal AR term and seasonal differencing
    pub seasonal: bool,
    /// Share of history held out for tie-breaking
    pub holdout_ratio: f64,
    pub confidence_level: f64,
    /// Candidates within this AIC distance of the best are tied
    pub aic_tie_tolerance: f64,
    /// Points with a decomposition weight below this are replaced by their baseline
    pub outlier_weight_floor: f64,
    /// Seasonal strength above which one seasonal difference is taken
    pub seasonal_strength_threshold: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizons: vec![30, 60, 90],
            max_p: 5,
            max_d: 2,
            max_q: 5,
            seasonal: true,
            holdout_ratio: 0.2,
            confidence_level: 0.95,
            aic_tie_tolerance: 2.0,
            outlier_weight_floor: 0.1,
            seasonal_strength_threshold: 0.64,
        }
    }
}

impl ForecastConfig {
    /// Longest configured horizon
    pub fn max_horizon(&self) -> usize {
        self.horizons.iter().copied().max().unwrap_or(0)
    }
}

/// Configuration for the robust detectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnomalyConfig {
    /// Trailing window length in points
    pub window: usize,
    /// Windows with fewer points produce no flags
    pub min_points: usize,
    /// Quartile fence multiplier
    pub iqr_k: f64,
    /// Modified z-score threshold
    pub z_threshold: f64,
    /// Relative tolerance for deviations from a constant window
    pub constant_tolerance: f64,
    pub detect_on_residuals: bool,
    pub geographic: bool,
    pub coverage: bool,
    /// Daily `numerator / denominator` share scanned like a raw series;
    /// `None` disables the level
    pub age_share: Option<ShareMetrics>,
}

/// Metric pair whose daily ratio forms the age-group share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareMetrics {
    pub numerator: String,
    pub denominator: String,
}

impl Default for ShareMetrics {
    fn default() -> Self {
        Self {
            numerator: "biometric_5_17".into(),
            denominator: "biometric".into(),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window: 30,
            min_points: 4,
            iqr_k: 1.5,
            z_threshold: 3.0,
            constant_tolerance: 0.01,
            detect_on_residuals: true,
            geographic: true,
            coverage: true,
            age_share: Some(ShareMetrics::default()),
        }
    }
}

/// A future window as an offset from the last observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSpec {
    pub offset_days: usize,
    pub length_days: usize,
}

/// Tie-break weights per surge signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalWeights {
    pub forecast_threshold: f64,
    pub age_transition: f64,
    pub historical_pattern: f64,
    pub trend_acceleration: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            forecast_threshold: 1.5,
            age_transition: 1.5,
            historical_pattern: 1.0,
            trend_acceleration: 1.0,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, kind: SurgeSignalKind) -> f64 {
        match kind {
            SurgeSignalKind::ForecastThreshold => self.forecast_threshold,
            SurgeSignalKind::AgeTransition => self.age_transition,
            SurgeSignalKind::HistoricalPattern => self.historical_pattern,
            SurgeSignalKind::TrendAcceleration => self.trend_acceleration,
        }
    }
}

/// Configuration for the surge ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurgeConfig {
    pub windows: Vec<WindowSpec>,
    /// Forecast must exceed baseline by this factor
    pub forecast_multiplier: f64,
    /// Projected crossings must exceed the regional baseline by this factor
    pub age_transition_margin: f64,
    /// Share of age-boundary crossings that turn into enrollment demand
    pub enrollment_conversion: f64,
    pub historical_cycle_days: usize,
    pub historical_cycles: usize,
    /// Prior window / preceding period ratio that counts as a past surge
    pub historical_ratio: f64,
    /// Points per trend segment for the acceleration check
    pub acceleration_segment: usize,
    /// Relative slope increase that counts as acceleration
    pub acceleration_margin: f64,
    /// Signals that must agree before a record is emitted
    pub min_signals: usize,
    pub min_confidence: f64,
    pub weights: SignalWeights,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                WindowSpec {
                    offset_days: 0,
                    length_days: 30,
                },
                WindowSpec {
                    offset_days: 30,
                    length_days: 30,
                },
                WindowSpec {
                    offset_days: 60,
                    length_days: 30,
                },
            ],
            forecast_multiplier: 1.5,
            age_transition_margin: 1.2,
            enrollment_conversion: 0.3,
            historical_cycle_days: 365,
            historical_cycles: 2,
            historical_ratio: 1.5,
            acceleration_segment: 28,
            acceleration_margin: 0.25,
            min_signals: 2,
            min_confidence: 0.5,
            weights: SignalWeights::default(),
        }
    }
}

/// Weights of the priority score components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreWeights {
    pub urgency: f64,
    pub magnitude: f64,
    pub confidence: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            urgency: 0.4,
            magnitude: 0.3,
            confidence: 0.3,
        }
    }
}

/// Configuration for scoring and ranking insights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriorityConfig {
    pub weights: ScoreWeights,
    /// Findings this many days out or closer get full urgency
    pub urgency_saturation_days: u32,
    /// Surge magnitude that normalizes to 1.0
    pub magnitude_scale: f64,
    /// Anomaly severity that normalizes to 1.0
    pub severity_scale: f64,
    /// Coverage ratio below which a unit is a coverage gap
    pub coverage_floor: f64,
    /// Fixed urgency of coverage findings
    pub coverage_urgency: f64,
    /// Confidence multiplier for findings built on degraded results
    pub degraded_discount: f64,
    /// One service center per this many expected events
    pub events_per_center: f64,
    pub staff_per_center: u32,
    /// Actions start this many days before onset
    pub lead_time_days: u32,
    pub rules: Vec<PriorityRule>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            urgency_saturation_days: 7,
            magnitude_scale: 1.0,
            severity_scale: 3.0,
            coverage_floor: 0.5,
            coverage_urgency: 0.5,
            degraded_discount: 0.5,
            events_per_center: 100_000.0,
            staff_per_center: 5,
            lead_time_days: 14,
            rules: default_rules(),
        }
    }
}

/// Worker pool and deadline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Worker threads; 0 uses every available core
    pub workers: usize,
    /// Run-level deadline in seconds; series not started by then are skipped
    pub timeout_secs: Option<u64>,
    /// Metrics to process; empty processes every metric
    pub metrics: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout_secs: None,
            metrics: Vec::new(),
        }
    }
}

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub decomposition: DecompositionConfig,
    pub forecast: ForecastConfig,
    pub anomaly: AnomalyConfig,
    pub surge: SurgeConfig,
    pub priority: PriorityConfig,
    pub runtime: RuntimeConfig,
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TemporalError::configuration("toml", e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TemporalError::configuration(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Apply `TIP_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `TIP_*` overrides from any key/value source
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "TIP_WINDOW" => self.anomaly.window = parse(key, value)?,
                "TIP_IQR_K" => self.anomaly.iqr_k = parse(key, value)?,
                "TIP_Z_THRESHOLD" => self.anomaly.z_threshold = parse(key, value)?,
                "TIP_HORIZONS" => {
                    self.forecast.horizons = value
                        .split(',')
                        .map(|h| parse(key, h.trim()))
                        .collect::<Result<Vec<usize>>>()?
                }
                "TIP_MIN_SIGNALS" => self.surge.min_signals = parse(key, value)?,
                "TIP_WORKERS" => self.runtime.workers = parse(key, value)?,
                "TIP_TIMEOUT_SECS" => self.runtime.timeout_secs = Some(parse(key, value)?),
                _ => continue,
            }
            debug!(key, value, "configuration override applied");
        }
        Ok(self)
    }

    /// Reject out-of-range or inconsistent values
    pub fn validate(&self) -> Result<()> {
        let d = &self.decomposition;
        ensure(d.robust_iterations >= 2, "decomposition.robust_iterations", "must be at least 2")?;
        ensure(d.inner_iterations >= 1, "decomposition.inner_iterations", "must be at least 1")?;
        ensure(d.min_points >= 4, "decomposition.min_points", "must be at least 4")?;
        ensure(
            d.candidate_periods.iter().all(|p| *p >= 2),
            "decomposition.candidate_periods",
            "every period must be at least 2",
        )?;
        ensure(
            d.period_override.map_or(true, |p| p >= 2),
            "decomposition.period_override",
            "must be at least 2",
        )?;
        ensure(
            (0.0..1.0).contains(&d.acf_floor),
            "decomposition.acf_floor",
            "must be in [0, 1)",
        )?;
        ensure(
            d.stable_slope_ratio >= 0.0,
            "decomposition.stable_slope_ratio",
            "must be non-negative",
        )?;

        let f = &self.forecast;
        ensure(!f.horizons.is_empty(), "forecast.horizons", "must not be empty")?;
        ensure(f.horizons.iter().all(|h| *h > 0), "forecast.horizons", "must be positive")?;
        ensure(f.max_p <= 5 && f.max_q <= 5, "forecast.max_p", "p and q are searched in 0..=5")?;
        ensure(f.max_d <= 2, "forecast.max_d", "must be at most 2")?;
        ensure(
            (0.05..=0.5).contains(&f.holdout_ratio),
            "forecast.holdout_ratio",
            "must be in [0.05, 0.5]",
        )?;
        ensure(
            f.confidence_level > 0.5 && f.confidence_level < 1.0,
            "forecast.confidence_level",
            "must be in (0.5, 1)",
        )?;
        ensure(f.aic_tie_tolerance >= 0.0, "forecast.aic_tie_tolerance", "must be non-negative")?;

        let a = &self.anomaly;
        ensure(a.min_points >= 4, "anomaly.min_points", "must be at least 4")?;
        ensure(a.window >= a.min_points, "anomaly.window", "must be at least anomaly.min_points")?;
        ensure(a.iqr_k > 0.0, "anomaly.iqr_k", "must be positive")?;
        ensure(a.z_threshold > 0.0, "anomaly.z_threshold", "must be positive")?;
        ensure(
            a.constant_tolerance >= 0.0,
            "anomaly.constant_tolerance",
            "must be non-negative",
        )?;
        if let Some(share) = &a.age_share {
            ensure(
                !share.numerator.is_empty() && !share.denominator.is_empty(),
                "anomaly.age_share",
                "metric names must not be empty",
            )?;
            ensure(
                share.numerator != share.denominator,
                "anomaly.age_share",
                "numerator and denominator must differ",
            )?;
        }

        let s = &self.surge;
        ensure(!s.windows.is_empty(), "surge.windows", "must not be empty")?;
        ensure(
            s.windows.iter().all(|w| w.length_days > 0),
            "surge.windows",
            "window length must be positive",
        )?;
        let reach = s
            .windows
            .iter()
            .map(|w| w.offset_days + w.length_days)
            .max()
            .unwrap_or(0);
        ensure(
            reach <= f.max_horizon(),
            "surge.windows",
            "windows must end within the longest forecast horizon",
        )?;
        ensure(
            (1..=SurgeSignalKind::ALL.len()).contains(&s.min_signals),
            "surge.min_signals",
            "must be between 1 and 4",
        )?;
        ensure(
            (0.0..=1.0).contains(&s.min_confidence),
            "surge.min_confidence",
            "must be in [0, 1]",
        )?;
        ensure(s.forecast_multiplier > 1.0, "surge.forecast_multiplier", "must exceed 1")?;
        ensure(s.historical_ratio > 1.0, "surge.historical_ratio", "must exceed 1")?;
        ensure(
            s.acceleration_segment >= 3,
            "surge.acceleration_segment",
            "must be at least 3",
        )?;
        ensure(
            (0.0..=1.0).contains(&s.enrollment_conversion),
            "surge.enrollment_conversion",
            "must be in [0, 1]",
        )?;

        let p = &self.priority;
        let w = &p.weights;
        ensure(
            w.urgency >= 0.0 && w.magnitude >= 0.0 && w.confidence >= 0.0,
            "priority.weights",
            "must be non-negative",
        )?;
        ensure(
            w.urgency + w.magnitude + w.confidence > 0.0,
            "priority.weights",
            "must not all be zero",
        )?;
        ensure(p.events_per_center > 0.0, "priority.events_per_center", "must be positive")?;
        ensure(p.magnitude_scale > 0.0, "priority.magnitude_scale", "must be positive")?;
        ensure(p.severity_scale > 0.0, "priority.severity_scale", "must be positive")?;
        ensure(p.coverage_floor > 0.0, "priority.coverage_floor", "must be positive")?;
        ensure(
            (0.0..=1.0).contains(&p.coverage_urgency),
            "priority.coverage_urgency",
            "must be in [0, 1]",
        )?;
        ensure(
            (0.0..=1.0).contains(&p.degraded_discount),
            "priority.degraded_discount",
            "must be in [0, 1]",
        )?;
        let mut ids: Vec<&str> = p.rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        let unique = ids.windows(2).all(|pair| pair[0] != pair[1]);
        ensure(unique, "priority.rules", "rule ids must be unique")?;

        Ok(())
    }
}

fn ensure(condition: bool, name: &str, reason: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TemporalError::configuration(name, reason))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| TemporalError::configuration(key, format!("cannot parse '{}'", value)))
}
