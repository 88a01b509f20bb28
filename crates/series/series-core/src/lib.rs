//! Series Core
//!
//! In-memory implementation of the series store. Writers mutate an
//! `InMemorySeriesStore`; pipeline runs read an immutable `SeriesSnapshot`
//! taken from it, so a run never observes a half-applied write.

pub mod aggregate;
pub mod cache;
pub mod snapshot;
pub mod store;

pub use aggregate::roll_up;
pub use cache::AggregateCache;
pub use snapshot::SeriesSnapshot;
pub use store::InMemorySeriesStore;

// Re-export SPI for convenience
pub use series_spi::*;
