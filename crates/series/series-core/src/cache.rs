//! Version-stamped cache of aggregated series

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use series_spi::{AggregateOp, GeoLevel, Series, SeriesKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    parent: SeriesKey,
    from: GeoLevel,
    op: AggregateOp,
    version: u64,
}

#[derive(Debug)]
struct CacheEntry {
    series: Arc<Series>,
    constituents: BTreeSet<SeriesKey>,
}

/// Roll-up results keyed by (parent, child level, operator, store version).
///
/// The parent key carries the target level. When the store moves to a new
/// version, entries whose constituent children were not written are carried
/// forward; the rest are dropped. Entries from older versions are pruned at
/// the same time.
#[derive(Debug, Default)]
pub struct AggregateCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        parent: &SeriesKey,
        from: GeoLevel,
        op: &AggregateOp,
        version: u64,
    ) -> Option<Arc<Series>> {
        let key = CacheKey {
            parent: parent.clone(),
            from,
            op: op.clone(),
            version,
        };
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).map(|e| Arc::clone(&e.series))
    }

    pub fn insert(
        &self,
        parent: &SeriesKey,
        from: GeoLevel,
        op: &AggregateOp,
        version: u64,
        series: Arc<Series>,
        constituents: BTreeSet<SeriesKey>,
    ) {
        let key = CacheKey {
            parent: parent.clone(),
            from,
            op: op.clone(),
            version,
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, CacheEntry { series, constituents });
    }

    /// Move entries from `version` to `version + 1`, dropping any that read a touched key.
    ///
    /// Returns how many entries were invalidated.
    pub fn advance(&self, version: u64, touched: &BTreeSet<SeriesKey>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut invalidated = 0;
        let carried: HashMap<CacheKey, CacheEntry> = entries
            .drain()
            .filter(|(key, _)| key.version == version)
            .filter_map(|(mut key, entry)| {
                if entry.constituents.is_disjoint(touched) {
                    key.version = version + 1;
                    Some((key, entry))
                } else {
                    invalidated += 1;
                    None
                }
            })
            .collect();
        *entries = carried;
        invalidated
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> SeriesKey {
        SeriesKey::new("MH", GeoLevel::State, "enrolment")
    }

    fn child(unit: &str) -> SeriesKey {
        SeriesKey::new(unit, GeoLevel::District, "enrolment")
    }

    fn fill(cache: &AggregateCache, version: u64) {
        cache.insert(
            &parent(),
            GeoLevel::District,
            &AggregateOp::Sum,
            version,
            Arc::new(Series::new(parent())),
            [child("PUNE"), child("NAGPUR")].into_iter().collect(),
        );
    }

    #[test]
    fn test_hit_requires_matching_version() {
        let cache = AggregateCache::new();
        fill(&cache, 3);
        assert!(cache.get(&parent(), GeoLevel::District, &AggregateOp::Sum, 3).is_some());
        assert!(cache.get(&parent(), GeoLevel::District, &AggregateOp::Sum, 4).is_none());
    }

    #[test]
    fn test_advance_carries_unrelated_entries() {
        let cache = AggregateCache::new();
        fill(&cache, 1);
        let touched = [child("MYSURU")].into_iter().collect();
        assert_eq!(cache.advance(1, &touched), 0);
        assert!(cache.get(&parent(), GeoLevel::District, &AggregateOp::Sum, 2).is_some());
    }

    #[test]
    fn test_advance_drops_touched_entries() {
        let cache = AggregateCache::new();
        fill(&cache, 1);
        let touched = [child("PUNE")].into_iter().collect();
        assert_eq!(cache.advance(1, &touched), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_advance_prunes_stale_versions() {
        let cache = AggregateCache::new();
        fill(&cache, 1);
        fill(&cache, 5);
        cache.advance(5, &BTreeSet::new());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&parent(), GeoLevel::District, &AggregateOp::Sum, 6).is_some());
    }
}
