//! Mutable in-memory series store

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use series_spi::{
    AggregateOp, GeoHierarchy, GeoLevel, HierarchyLink, Point, Result, Series, SeriesKey,
    SeriesSource,
};
use tracing::debug;

use crate::cache::AggregateCache;
use crate::snapshot::SeriesSnapshot;

/// Keyed series store with copy-on-write snapshots.
///
/// Every successful write bumps the version. Snapshots taken earlier keep
/// their data; the aggregation cache is shared with them and keyed by
/// version, so they keep hitting their own entries.
#[derive(Debug)]
pub struct InMemorySeriesStore {
    series: Arc<BTreeMap<SeriesKey, Arc<Series>>>,
    hierarchy: Arc<GeoHierarchy>,
    version: u64,
    cache: Arc<AggregateCache>,
}

impl InMemorySeriesStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            series: Arc::new(BTreeMap::new()),
            hierarchy: Arc::new(GeoHierarchy::new()),
            version: 0,
            cache: Arc::new(AggregateCache::new()),
        }
    }

    /// Create a store over an existing hierarchy
    pub fn with_hierarchy(hierarchy: GeoHierarchy) -> Self {
        Self {
            hierarchy: Arc::new(hierarchy),
            ..Self::new()
        }
    }

    /// Add a parent/child edge. Clears every cached roll-up.
    pub fn link(&mut self, link: HierarchyLink) -> Result<()> {
        Arc::make_mut(&mut self.hierarchy).link(link)?;
        self.cache.clear();
        self.version += 1;
        Ok(())
    }

    /// Append or overwrite points for one series, creating it if needed.
    ///
    /// Returns the number of new timestamps. Rejected batches leave the
    /// store and its version untouched.
    pub fn upsert_points(
        &mut self,
        key: SeriesKey,
        points: impl IntoIterator<Item = Point>,
    ) -> Result<usize> {
        let points: Vec<Point> = points.into_iter().collect();
        let updated = match self.series.get(&key) {
            Some(existing) => {
                let mut series = Series::clone(existing);
                let added = series.upsert(points)?;
                (series, added)
            }
            None => {
                let series = Series::from_points(key.clone(), points)?;
                let added = series.len();
                (series, added)
            }
        };

        let (series, added) = updated;
        Arc::make_mut(&mut self.series).insert(key.clone(), Arc::new(series));

        let touched: BTreeSet<SeriesKey> = [key].into_iter().collect();
        let invalidated = self.cache.advance(self.version, &touched);
        self.version += 1;
        debug!(version = self.version, added, invalidated, "series upserted");
        Ok(added)
    }

    /// Roll children up into a parent series, cached per store version
    pub fn aggregate(
        &self,
        key: &SeriesKey,
        from: GeoLevel,
        to: GeoLevel,
        op: &AggregateOp,
    ) -> Result<Arc<Series>> {
        self.snapshot().aggregate(key, from, to, op)
    }

    /// Immutable view of the current contents
    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot::new(
            self.version,
            Arc::clone(&self.series),
            Arc::clone(&self.hierarchy),
            Arc::clone(&self.cache),
        )
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of roll-ups currently cached
    pub fn cached_aggregates(&self) -> usize {
        self.cache.len()
    }
}

impl Default for InMemorySeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesSource for InMemorySeriesStore {
    fn get_series(&self, key: &SeriesKey) -> Result<Arc<Series>> {
        self.snapshot().get_series(key)
    }

    fn keys(&self) -> Vec<SeriesKey> {
        self.series.keys().cloned().collect()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn hierarchy(&self) -> &GeoHierarchy {
        &self.hierarchy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use series_spi::SeriesError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn district(unit: &str) -> SeriesKey {
        SeriesKey::new(unit, GeoLevel::District, "enrolment")
    }

    fn state() -> SeriesKey {
        SeriesKey::new("MH", GeoLevel::State, "enrolment")
    }

    fn store() -> InMemorySeriesStore {
        let mut store = InMemorySeriesStore::new();
        for child in ["PUNE", "NAGPUR"] {
            store
                .link(HierarchyLink {
                    parent: "MH".into(),
                    parent_level: GeoLevel::State,
                    child: child.into(),
                    child_level: GeoLevel::District,
                })
                .unwrap();
        }
        store
            .upsert_points(district("PUNE"), vec![Point::new(day(1), 10.0), Point::new(day(2), 12.0)])
            .unwrap();
        store
            .upsert_points(district("NAGPUR"), vec![Point::new(day(1), 4.0)])
            .unwrap();
        store
    }

    #[test]
    fn test_get_series_not_found() {
        let store = store();
        let err = store.get_series(&state()).unwrap_err();
        assert_eq!(
            err,
            SeriesError::NotFound {
                key: "state:MH/enrolment".into()
            }
        );
    }

    #[test]
    fn test_aggregate_is_cached() {
        let store = store();
        let first = store
            .aggregate(&state(), GeoLevel::District, GeoLevel::State, &AggregateOp::Sum)
            .unwrap();
        assert_eq!(first.values(), vec![14.0, 12.0]);
        assert_eq!(store.cached_aggregates(), 1);

        let second = store
            .aggregate(&state(), GeoLevel::District, GeoLevel::State, &AggregateOp::Sum)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_upsert_of_child_invalidates_roll_up() {
        let mut store = store();
        store
            .aggregate(&state(), GeoLevel::District, GeoLevel::State, &AggregateOp::Sum)
            .unwrap();

        store
            .upsert_points(district("NAGPUR"), vec![Point::new(day(2), 100.0)])
            .unwrap();
        assert_eq!(store.cached_aggregates(), 0);

        let rolled = store
            .aggregate(&state(), GeoLevel::District, GeoLevel::State, &AggregateOp::Sum)
            .unwrap();
        assert_eq!(rolled.values(), vec![14.0, 112.0]);
    }

    #[test]
    fn test_unrelated_upsert_keeps_cache() {
        let mut store = store();
        let before = store
            .aggregate(&state(), GeoLevel::District, GeoLevel::State, &AggregateOp::Sum)
            .unwrap();
        store
            .upsert_points(
                SeriesKey::new("MYSURU", GeoLevel::District, "enrolment"),
                vec![Point::new(day(1), 1.0)],
            )
            .unwrap();
        let after = store
            .aggregate(&state(), GeoLevel::District, GeoLevel::State, &AggregateOp::Sum)
            .unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_snapshot_is_isolated_from_writes() {
        let mut store = store();
        let snapshot = store.snapshot();
        let version = snapshot.version();

        store
            .upsert_points(district("PUNE"), vec![Point::new(day(3), 50.0)])
            .unwrap();

        assert_eq!(snapshot.version(), version);
        assert_eq!(snapshot.get_series(&district("PUNE")).unwrap().len(), 2);
        assert_eq!(store.get_series(&district("PUNE")).unwrap().len(), 3);
        assert!(store.version() > version);
    }

    #[test]
    fn test_rejected_batch_keeps_version() {
        let mut store = store();
        let version = store.version();
        let result = store.upsert_points(district("PUNE"), vec![Point::new(day(9), f64::INFINITY)]);
        assert!(result.is_err());
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_snapshot_readable_from_worker_threads() {
        use rayon::prelude::*;

        let store = store();
        let snapshot = store.snapshot();
        let total: usize = snapshot
            .keys()
            .par_iter()
            .map(|k| snapshot.get_series(k).map(|s| s.len()).unwrap_or(0))
            .sum();
        assert_eq!(total, 3);
    }
}
