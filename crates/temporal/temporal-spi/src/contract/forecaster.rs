//! Trait for horizon forecasting

use series_spi::{Series, SeriesKey, SeriesSource};

use crate::error::Result;
use crate::model::{Decomposition, ForecastResult};

/// Produces point forecasts with confidence bounds
pub trait Forecaster: Send + Sync {
    /// Forecast `horizon` days past the end of `series`.
    ///
    /// The decomposition, when supplied, informs seasonal order selection and
    /// outlier neutralization.
    fn forecast(
        &self,
        series: &Series,
        decomposition: Option<&Decomposition>,
        horizon: usize,
    ) -> Result<ForecastResult>;

    /// Look a series up by key and forecast it.
    ///
    /// A missing key surfaces as `TemporalError::InvalidKey`.
    fn forecast_key(
        &self,
        source: &dyn SeriesSource,
        key: &SeriesKey,
        horizon: usize,
    ) -> Result<ForecastResult> {
        let series = source.get_series(key)?;
        self.forecast(&series, None, horizon)
    }
}
