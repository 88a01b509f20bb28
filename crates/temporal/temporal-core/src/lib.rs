//! Temporal Core
//!
//! Core implementations of the pipeline stages: robust decomposition,
//! automatic ARIMA forecasting, robust anomaly detection, the surge
//! ensemble and the priority engine, plus the runner that ties them
//! together and the store that publishes each run's generation.

pub mod anomaly;
pub mod calendar;
pub mod decomposition;
pub mod forecast;
pub mod generation;
pub mod loess;
pub mod pipeline;
pub mod priority;
pub mod seasonality;
pub mod stats;
pub mod surge;

// Re-export SPI traits for implementations
pub use temporal_spi::{
    Decomposer, Forecaster, PointDetector, Result, SurgeSignal, TemporalError,
};

// Re-export main types
pub use anomaly::{AnomalyDetector, QuartileDetector, RobustZDetector};
pub use decomposition::StlDecomposer;
pub use forecast::{Arima, AutoArimaForecaster};
pub use generation::GenerationStore;
pub use pipeline::{ExternalFeeds, Pipeline};
pub use priority::{Finding, PriorityEngine};
pub use seasonality::PeriodDetector;
pub use surge::{SurgeEnsemble, SurgeInputs};
