//! Pipeline error types

use series_spi::SeriesError;
use thiserror::Error;

/// Errors that can occur in any pipeline stage.
///
/// Only configuration errors abort a run. The others are caught at the
/// series boundary and turned into a degraded or skipped status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemporalError {
    /// Not enough history for the requested operation
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// No candidate model could be fitted
    #[error("Fit failure: {reason}")]
    FitFailure { reason: String },

    /// The requested series does not exist
    #[error("Invalid key: {key}")]
    InvalidKey { key: String },

    /// A configuration value is out of range or inconsistent
    #[error("Configuration error in '{name}': {reason}")]
    Configuration { name: String, reason: String },

    /// Any other storage error surfaced by the series source
    #[error(transparent)]
    Series(SeriesError),
}

impl TemporalError {
    /// Build a configuration error
    pub fn configuration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        TemporalError::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build a fit failure
    pub fn fit_failure(reason: impl Into<String>) -> Self {
        TemporalError::FitFailure {
            reason: reason.into(),
        }
    }

    /// True when the run must stop before any work starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, TemporalError::Configuration { .. })
    }
}

impl From<SeriesError> for TemporalError {
    fn from(error: SeriesError) -> Self {
        match error {
            SeriesError::NotFound { key } => TemporalError::InvalidKey { key },
            other => TemporalError::Series(other),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, TemporalError>;
