//! Temporal Consumer API
//!
//! Configuration types for a pipeline run.
//!
//! This crate provides:
//! - `PipelineConfig` and one section per stage, all with serde defaults
//! - Loading from TOML and `TIP_*` environment overrides
//! - Validation that fails before any work starts
//! - The declarative priority rule book

pub mod config;
pub mod rules;

pub use config::{
    AnomalyConfig, DecompositionConfig, ForecastConfig, PipelineConfig, PriorityConfig,
    RuntimeConfig, ScoreWeights, ShareMetrics, SignalWeights, SurgeConfig, WindowSpec,
};
pub use rules::{default_rules, ActionTemplate, FindingKind, PriorityRule, RuleCondition};

// Re-export SPI types
pub use temporal_spi::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{
        AnomalyConfig, DecompositionConfig, ForecastConfig, PipelineConfig, PriorityConfig,
        RuntimeConfig, SurgeConfig,
    };
    pub use crate::rules::{PriorityRule, RuleCondition};
    pub use temporal_spi::{
        AnomalyRecord, Decomposition, ForecastResult, Generation, InsightRecord, PriorityTier,
        Result, SurgeRecord, TemporalError,
    };
}
