//! Immutable point-in-time view of the store

use std::collections::BTreeMap;
use std::sync::Arc;

use series_spi::{
    AggregateOp, GeoHierarchy, GeoLevel, Result, Series, SeriesError, SeriesKey, SeriesSource,
};
use tracing::debug;

use crate::aggregate::{constituents, roll_up};
use crate::cache::AggregateCache;

/// Read-only snapshot of every series at one store version.
///
/// Cloning is cheap; all data sits behind `Arc`s shared with the store until
/// the store is next written.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    version: u64,
    series: Arc<BTreeMap<SeriesKey, Arc<Series>>>,
    hierarchy: Arc<GeoHierarchy>,
    cache: Arc<AggregateCache>,
}

impl SeriesSnapshot {
    pub(crate) fn new(
        version: u64,
        series: Arc<BTreeMap<SeriesKey, Arc<Series>>>,
        hierarchy: Arc<GeoHierarchy>,
        cache: Arc<AggregateCache>,
    ) -> Self {
        Self {
            version,
            series,
            hierarchy,
            cache,
        }
    }

    /// Build a standalone snapshot with its own cache
    pub fn from_series<I>(series: I, hierarchy: GeoHierarchy) -> Self
    where
        I: IntoIterator<Item = Series>,
    {
        let map = series
            .into_iter()
            .map(|s| (s.key().clone(), Arc::new(s)))
            .collect();
        Self::new(1, Arc::new(map), Arc::new(hierarchy), Arc::new(AggregateCache::new()))
    }

    /// Roll children at `from` up into the parent `key` at `to`, using the shared cache
    pub fn aggregate(
        &self,
        key: &SeriesKey,
        from: GeoLevel,
        to: GeoLevel,
        op: &AggregateOp,
    ) -> Result<Arc<Series>> {
        if key.level != to || !from.is_finer_than(to) {
            return Err(SeriesError::InvalidLevels { from, to });
        }
        if let Some(hit) = self.cache.get(key, from, op, self.version) {
            debug!(key = %key, version = self.version, "aggregate cache hit");
            return Ok(hit);
        }

        let rolled = Arc::new(roll_up(&self.series, &self.hierarchy, key, from, to, op)?);
        self.cache.insert(
            key,
            from,
            op,
            self.version,
            Arc::clone(&rolled),
            constituents(&self.hierarchy, key, from, op),
        );
        Ok(rolled)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Iterate stored series in key order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Series>> {
        self.series.values()
    }
}

impl SeriesSource for SeriesSnapshot {
    fn get_series(&self, key: &SeriesKey) -> Result<Arc<Series>> {
        self.series
            .get(key)
            .cloned()
            .ok_or_else(|| SeriesError::NotFound {
                key: key.to_string(),
            })
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
