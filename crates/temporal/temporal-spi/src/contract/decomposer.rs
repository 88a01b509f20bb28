//! Trait for seasonal-trend decomposition

use series_spi::Series;

use crate::error::Result;
use crate::model::Decomposition;

/// Splits a series into trend, seasonal and residual components
pub trait Decomposer: Send + Sync {
    /// Decompose one series.
    ///
    /// Returns `TemporalError::InsufficientData` below the minimum history;
    /// callers treat that as "no seasonal information", not as a failure.
    fn decompose(&self, series: &Series) -> Result<Decomposition>;
}
