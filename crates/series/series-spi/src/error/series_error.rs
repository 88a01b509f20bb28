//! Series error types

use chrono::NaiveDate;
use thiserror::Error;

use crate::model::GeoLevel;

/// Errors raised by series storage and aggregation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    /// No series is stored under the requested key
    #[error("Series not found: {key}")]
    NotFound { key: String },

    /// A point carried a NaN or infinite value
    #[error("Invalid value {value} at {timestamp} for series {key}")]
    InvalidValue {
        key: String,
        timestamp: NaiveDate,
        value: f64,
    },

    /// Aggregation was asked to roll up from a level that is not finer than the target
    #[error("Cannot aggregate from {from} to {to}: source level must be finer than target")]
    InvalidLevels { from: GeoLevel, to: GeoLevel },

    /// Weighted mean aggregation found a child without its weight series
    #[error("Missing weight series '{metric}' for unit {unit}")]
    MissingWeights { unit: String, metric: String },

    /// A hierarchy link would give a unit two different parents or levels
    #[error("Hierarchy conflict for unit {unit}: {reason}")]
    HierarchyConflict { unit: String, reason: String },
}

/// Result type for series operations
pub type Result<T> = std::result::Result<T, SeriesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_message() {
        let error = SeriesError::NotFound {
            key: "state:MH/enrolment".to_string(),
        };
        assert_eq!(error.to_string(), "Series not found: state:MH/enrolment");
    }

    #[test]
    fn test_invalid_value_error_message() {
        let error = SeriesError::InvalidValue {
            key: "district:PUNE/enrolment".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            value: f64::NAN,
        };
        assert_eq!(
            error.to_string(),
            "Invalid value NaN at 2024-03-01 for series district:PUNE/enrolment"
        );
    }

    #[test]
    fn test_invalid_levels_error_message() {
        let error = SeriesError::InvalidLevels {
            from: GeoLevel::State,
            to: GeoLevel::District,
        };
        assert_eq!(
            error.to_string(),
            "Cannot aggregate from state to district: source level must be finer than target"
        );
    }

    #[test]
    fn test_missing_weights_fields() {
        let error = SeriesError::MissingWeights {
            unit: "PUNE".to_string(),
            metric: "demographic".to_string(),
        };
        if let SeriesError::MissingWeights { unit, metric } = error {
            assert_eq!(unit, "PUNE");
            assert_eq!(metric, "demographic");
        } else {
            panic!("Expected MissingWeights variant");
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<SeriesError>();
        assert_sync::<SeriesError>();
    }
}
