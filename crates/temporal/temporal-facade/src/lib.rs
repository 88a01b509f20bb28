//! Temporal Facade
//!
//! High-level API for the temporal intelligence pipeline. Re-exports the
//! public types of the series and temporal stacks so callers depend on a
//! single crate.

// Re-export everything from API (which includes SPI)
pub use temporal_api::*;

// Explicit re-exports for documentation
pub use temporal_api::prelude;

// Re-export core modules for direct access
pub use temporal_core::{anomaly, decomposition, forecast, generation, pipeline, priority, surge};

// Re-export core types at root
pub use temporal_core::{
    AnomalyDetector, Arima, AutoArimaForecaster, ExternalFeeds, Finding, GenerationStore,
    PeriodDetector, Pipeline, PriorityEngine, QuartileDetector, RobustZDetector, StlDecomposer,
    SurgeEnsemble, SurgeInputs,
};

// Series storage
pub use series_core::{InMemorySeriesStore, SeriesSnapshot};
pub use series_spi::{GeoHierarchy, HierarchyLink, SeriesError};
