//! Trait for read-only series access

use std::sync::Arc;

use crate::error::Result;
use crate::model::{GeoHierarchy, GeoLevel, Series, SeriesKey};

/// Read-only view over a keyed series collection.
///
/// Pipeline stages only ever see this trait; they never write back.
pub trait SeriesSource: Send + Sync {
    /// Fetch one series, or `SeriesError::NotFound`
    fn get_series(&self, key: &SeriesKey) -> Result<Arc<Series>>;

    /// All stored keys in a stable order
    fn keys(&self) -> Vec<SeriesKey>;

    /// Monotonic version, bumped on every write to the backing store
    fn version(&self) -> u64;

    /// Geographic hierarchy used for roll-ups and sibling lookup
    fn hierarchy(&self) -> &GeoHierarchy;

    /// Keys for one metric at one level
    fn keys_for(&self, level: GeoLevel, metric: &str) -> Vec<SeriesKey> {
        self.keys()
            .into_iter()
            .filter(|k| k.level == level && k.metric == metric)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeriesError;
    use std::collections::BTreeMap;

    struct MapSource {
        series: BTreeMap<SeriesKey, Arc<Series>>,
        hierarchy: GeoHierarchy,
    }

    impl SeriesSource for MapSource {
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
            1
        }

        fn hierarchy(&self) -> &GeoHierarchy {
            &self.hierarchy
        }
    }

    #[test]
    fn test_keys_for_filters_level_and_metric() {
        let mut series = BTreeMap::new();
        for key in [
            SeriesKey::new("MH", GeoLevel::State, "enrolment"),
            SeriesKey::new("MH", GeoLevel::State, "biometric"),
            SeriesKey::new("PUNE", GeoLevel::District, "enrolment"),
        ] {
            series.insert(key.clone(), Arc::new(Series::new(key)));
        }
        let source = MapSource {
            series,
            hierarchy: GeoHierarchy::new(),
        };

        let keys = source.keys_for(GeoLevel::State, "enrolment");
        assert_eq!(keys, vec![SeriesKey::new("MH", GeoLevel::State, "enrolment")]);
        assert!(source
            .get_series(&SeriesKey::new("KA", GeoLevel::State, "enrolment"))
            .is_err());
    }
}
