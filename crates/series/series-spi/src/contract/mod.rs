//! Contract module containing trait definitions for series access

mod series_source;

pub use series_source::SeriesSource;
