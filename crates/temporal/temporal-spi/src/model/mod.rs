//! Model types for pipeline records and external feeds

mod anomaly;
mod baseline;
mod decomposition;
mod feeds;
mod forecast;
mod generation;
mod insight;
mod surge;

pub use anomaly::{AnomalyRecord, DetectionLevel, DetectionMethod, PointVerdict};
pub use baseline::BaselineSnapshot;
pub use decomposition::{Decomposition, DecompositionMode, TrendDirection};
pub use feeds::{AgeCohortProjection, CoverageIndex};
pub use forecast::{
    DegradedReason, ErrorMetrics, ForecastMethod, ForecastPoint, ForecastResult, ModelOrder,
    ResultStatus, SeasonalOrder,
};
pub use generation::{Generation, GenerationId, SeriesOutcome, SeriesStatus};
pub use insight::{
    InsightKind, InsightRecord, PriorityTier, RecommendedAction, ResourceEstimate, SourceRef,
};
pub use surge::{
    MagnitudeSource, SignalContext, SignalOutcome, SurgeRecord, SurgeSignalKind, SurgeWindow,
};
