//! Keyed daily time series

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::GeoLevel;
use crate::error::{Result, SeriesError};

/// Identity of a series: geographic unit, its level, and the metric measured
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub unit: String,
    pub level: GeoLevel,
    pub metric: String,
}

impl SeriesKey {
    /// Create a new series key
    pub fn new(unit: impl Into<String>, level: GeoLevel, metric: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            level,
            metric: metric.into(),
        }
    }

    /// Same unit and level, different metric
    pub fn with_metric(&self, metric: impl Into<String>) -> Self {
        Self {
            unit: self.unit.clone(),
            level: self.level,
            metric: metric.into(),
        }
    }

    /// Same metric, different unit at the given level
    pub fn with_unit(&self, unit: impl Into<String>, level: GeoLevel) -> Self {
        Self {
            unit: unit.into(),
            level,
            metric: self.metric.clone(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.level, self.unit, self.metric)
    }
}

/// A single observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: NaiveDate,
    pub value: f64,
}

impl Point {
    pub fn new(timestamp: NaiveDate, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered series of points with strictly increasing, unique timestamps.
///
/// Gaps stay explicit: a missing day is absent, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    key: SeriesKey,
    points: Vec<Point>,
}

impl Series {
    /// Create an empty series
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            points: Vec::new(),
        }
    }

    /// Build a series from unordered points; later duplicates win
    pub fn from_points(key: SeriesKey, points: impl IntoIterator<Item = Point>) -> Result<Self> {
        let mut series = Self::new(key);
        series.upsert(points)?;
        Ok(series)
    }

    /// Insert or overwrite points by timestamp.
    ///
    /// The whole batch is validated before anything is written, so a rejected
    /// batch leaves the series unchanged. Returns the number of new timestamps.
    pub fn upsert(&mut self, points: impl IntoIterator<Item = Point>) -> Result<usize> {
        let incoming: Vec<Point> = points.into_iter().collect();
        if let Some(bad) = incoming.iter().find(|p| !p.value.is_finite()) {
            return Err(SeriesError::InvalidValue {
                key: self.key.to_string(),
                timestamp: bad.timestamp,
                value: bad.value,
            });
        }

        let mut added = 0;
        for point in incoming {
            match self
                .points
                .binary_search_by(|p| p.timestamp.cmp(&point.timestamp))
            {
                Ok(idx) => self.points[idx].value = point.value,
                Err(idx) => {
                    self.points.insert(idx, point);
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Values in timestamp order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Timestamps in order
    pub fn timestamps(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Value recorded on a given day, if any
    pub fn value_at(&self, timestamp: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by(|p| p.timestamp.cmp(&timestamp))
            .ok()
            .map(|idx| self.points[idx].value)
    }

    /// Points with `from <= timestamp <= to`
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> &[Point] {
        let start = self.points.partition_point(|p| p.timestamp < from);
        let end = self.points.partition_point(|p| p.timestamp <= to);
        if start >= end {
            &[]
        } else {
            &self.points[start..end]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn key() -> SeriesKey {
        SeriesKey::new("MH", GeoLevel::State, "enrolment")
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "state:MH/enrolment");
        assert_eq!(key().with_metric("biometric").metric, "biometric");
    }

    #[test]
    fn test_from_points_sorts_and_dedups() {
        let series = Series::from_points(
            key(),
            vec![
                Point::new(day(3), 3.0),
                Point::new(day(1), 1.0),
                Point::new(day(3), 30.0),
                Point::new(day(2), 2.0),
            ],
        )
        .unwrap();

        assert_eq!(series.timestamps(), vec![day(1), day(2), day(3)]);
        assert_eq!(series.values(), vec![1.0, 2.0, 30.0]);
    }

    #[test]
    fn test_upsert_overwrites_and_counts_new() {
        let mut series = Series::from_points(key(), vec![Point::new(day(1), 1.0)]).unwrap();
        let added = series
            .upsert(vec![Point::new(day(1), 5.0), Point::new(day(4), 4.0)])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(series.value_at(day(1)), Some(5.0));
        assert_eq!(series.value_at(day(2)), None);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_upsert_rejects_non_finite_atomically() {
        let mut series = Series::from_points(key(), vec![Point::new(day(1), 1.0)]).unwrap();
        let result = series.upsert(vec![Point::new(day(2), 2.0), Point::new(day(3), f64::NAN)]);
        assert!(matches!(result, Err(SeriesError::InvalidValue { .. })));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_range_inclusive() {
        let series = Series::from_points(
            key(),
            (1..=10).map(|d| Point::new(day(d), d as f64)),
        )
        .unwrap();
        let slice = series.range(day(3), day(5));
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].value, 3.0);
        assert!(series.range(day(8), day(2)).is_empty());
    }
}
