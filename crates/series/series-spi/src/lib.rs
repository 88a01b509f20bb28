//! Series Service Provider Interface
//!
//! Defines the keyed time series model shared by every pipeline stage, the
//! geographic hierarchy used for roll-ups, and the read-only `SeriesSource`
//! contract that stages query.

pub mod contract;
pub mod error;
pub mod model;

// Re-export all public items at crate root for convenience
pub use contract::SeriesSource;
pub use error::{Result, SeriesError};
pub use model::{
    AggregateOp, GeoHierarchy, GeoLevel, HierarchyLink, Point, Series, SeriesKey,
};
