//! Temporal Service Provider Interface
//!
//! Defines the records each pipeline stage emits, the traits stages are
//! implemented behind, and the error taxonomy shared by all of them.
//!
//! Every record is produced once per run, never mutated, and serializable.

pub mod contract;
pub mod error;
pub mod model;

// Re-export all public items at crate root for convenience
pub use contract::{Decomposer, Forecaster, PointDetector, SurgeSignal};
pub use error::{Result, TemporalError};
pub use model::{
    AgeCohortProjection, AnomalyRecord, BaselineSnapshot, CoverageIndex, Decomposition,
    DecompositionMode, DegradedReason, DetectionLevel, DetectionMethod, ErrorMetrics,
    ForecastMethod, ForecastPoint, ForecastResult, Generation, GenerationId, InsightKind,
    InsightRecord, MagnitudeSource, ModelOrder, PointVerdict, PriorityTier, RecommendedAction,
    ResourceEstimate, ResultStatus, SeasonalOrder, SeriesOutcome, SeriesStatus, SignalContext,
    SignalOutcome, SourceRef, SurgeRecord, SurgeSignalKind, SurgeWindow, TrendDirection,
};

// Series types appear in nearly every signature here
pub use series_spi::{GeoLevel, Point, Series, SeriesKey, SeriesSource};
