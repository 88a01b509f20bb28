//! Daily calendar handling

use chrono::{Duration, NaiveDate};
use series_spi::Point;

/// A series laid out on a contiguous daily calendar
#[derive(Debug, Clone, PartialEq)]
pub struct DailyFrame {
    pub timestamps: Vec<NaiveDate>,
    pub values: Vec<f64>,
    /// Days that were missing and got interpolated
    pub filled: usize,
}

impl DailyFrame {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.timestamps.last().copied()
    }
}

/// Fill internal calendar gaps by linear interpolation between the known neighbours
pub fn fill_gaps(points: &[Point]) -> DailyFrame {
    let mut timestamps = Vec::with_capacity(points.len());
    let mut values = Vec::with_capacity(points.len());
    let mut filled = 0;

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        timestamps.push(a.timestamp);
        values.push(a.value);
        let gap = (b.timestamp - a.timestamp).num_days();
        for step in 1..gap {
            let frac = step as f64 / gap as f64;
            timestamps.push(a.timestamp + Duration::days(step));
            values.push(a.value + (b.value - a.value) * frac);
            filled += 1;
        }
    }
    if let Some(last) = points.last() {
        timestamps.push(last.timestamp);
        values.push(last.value);
    }

    DailyFrame {
        timestamps,
        values,
        filled,
    }
}

/// Keep points as they are, only splitting them into columns
pub fn as_frame(points: &[Point]) -> DailyFrame {
    DailyFrame {
        timestamps: points.iter().map(|p| p.timestamp).collect(),
        values: points.iter().map(|p| p.value).collect(),
        filled: 0,
    }
}

/// `count` consecutive days starting the day after `last`
pub fn days_after(last: NaiveDate, count: usize) -> Vec<NaiveDate> {
    (1..=count as i64).map(|i| last + Duration::days(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_fill_gaps_interpolates() {
        let points = vec![
            Point::new(day(1), 10.0),
            Point::new(day(4), 40.0),
            Point::new(day(5), 50.0),
        ];
        let frame = fill_gaps(&points);
        assert_eq!(frame.filled, 2);
        assert_eq!(frame.timestamps, vec![day(1), day(2), day(3), day(4), day(5)]);
        assert_eq!(frame.values, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn test_fill_gaps_contiguous_is_identity() {
        let points: Vec<Point> = (1..=5).map(|d| Point::new(day(d), d as f64)).collect();
        let frame = fill_gaps(&points);
        assert_eq!(frame, as_frame(&points));
    }

    #[test]
    fn test_fill_gaps_empty() {
        assert!(fill_gaps(&[]).is_empty());
    }

    #[test]
    fn test_days_after() {
        assert_eq!(days_after(day(30), 2), vec![day(31), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()]);
    }
}
