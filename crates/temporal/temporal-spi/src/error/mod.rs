//! Error types for pipeline stages

mod temporal_error;

pub use temporal_error::{Result, TemporalError};
