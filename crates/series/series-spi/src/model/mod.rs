//! Model types for keyed time series

mod aggregate_op;
mod geo;
mod series;

pub use aggregate_op::AggregateOp;
pub use geo::{GeoHierarchy, GeoLevel, HierarchyLink};
pub use series::{Point, Series, SeriesKey};
