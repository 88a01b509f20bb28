//! Contract module containing trait definitions for pipeline stages

mod decomposer;
mod forecaster;
mod point_detector;
mod surge_signal;

pub use decomposer::Decomposer;
pub use forecaster::Forecaster;
pub use point_detector::PointDetector;
pub use surge_signal::SurgeSignal;
