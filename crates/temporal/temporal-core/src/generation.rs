//! Published generations and the baselines they carry

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use series_spi::SeriesKey;
use temporal_spi::{BaselineSnapshot, Generation, GenerationId};
use tracing::info;

/// Generations kept by default
pub const DEFAULT_RETENTION: usize = 8;

/// Holds the most recent generations behind a lock.
///
/// A published generation is never modified. Readers get an `Arc` and keep
/// their view even after newer generations evict it from the store.
#[derive(Debug)]
pub struct GenerationStore {
    generations: RwLock<BTreeMap<GenerationId, Arc<Generation>>>,
    retention: usize,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Keep at most `retention` generations (at least one)
    pub fn with_retention(retention: usize) -> Self {
        Self {
            generations: RwLock::new(BTreeMap::new()),
            retention: retention.max(1),
        }
    }

    /// Id the next run should use
    pub fn next_id(&self) -> GenerationId {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations
            .keys()
            .next_back()
            .map_or(GenerationId(1), |id| id.next())
    }

    /// Publish a finished generation, evicting the oldest beyond retention
    pub fn publish(&self, generation: Generation) -> Arc<Generation> {
        let id = generation.id;
        let generation = Arc::new(generation);
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        generations.insert(id, Arc::clone(&generation));
        while generations.len() > self.retention {
            generations.pop_first();
        }
        info!(
            generation = %id,
            insights = generation.insights.len(),
            retained = generations.len(),
            "generation published"
        );
        generation
    }

    pub fn latest(&self) -> Option<Arc<Generation>> {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations.values().next_back().cloned()
    }

    pub fn get(&self, id: GenerationId) -> Option<Arc<Generation>> {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations.get(&id).cloned()
    }

    /// Baseline of one series as of one generation
    pub fn baseline(&self, key: &SeriesKey, id: GenerationId) -> Option<BaselineSnapshot> {
        self.get(id)?.baseline(key).cloned()
    }

    /// Baseline from the newest generation that has one for `key`
    pub fn latest_baseline(&self, key: &SeriesKey) -> Option<BaselineSnapshot> {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations
            .values()
            .rev()
            .find_map(|g| g.baseline(key).cloned())
    }

    pub fn ids(&self) -> Vec<GenerationId> {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations.keys().copied().collect()
    }
}

impl Default for GenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use series_spi::GeoLevel;

    fn key() -> SeriesKey {
        SeriesKey::new("MH", GeoLevel::State, "enrolment")
    }

    fn generation(id: u64, level: Option<f64>) -> Generation {
        let anchor = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Generation {
            id: GenerationId(id),
            snapshot_version: id,
            as_of: Some(anchor),
            decompositions: vec![],
            baselines: level
                .map(|trend_level| BaselineSnapshot {
                    key: key(),
                    generation: GenerationId(id),
                    anchor,
                    trend_level,
                    slope: 0.0,
                    period: None,
                    seasonal_profile: vec![],
                    residual_std: 0.0,
                })
                .into_iter()
                .collect(),
            forecasts: vec![],
            anomalies: vec![],
            surges: vec![],
            insights: vec![],
            outcomes: vec![],
        }
    }

    #[test]
    fn test_next_id_starts_at_one() {
        let store = GenerationStore::new();
        assert_eq!(store.next_id(), GenerationId(1));
        store.publish(generation(1, None));
        assert_eq!(store.next_id(), GenerationId(2));
    }

    #[test]
    fn test_latest_and_retention() {
        let store = GenerationStore::with_retention(2);
        for id in 1..=3 {
            store.publish(generation(id, Some(id as f64)));
        }
        assert_eq!(store.ids(), vec![GenerationId(2), GenerationId(3)]);
        assert_eq!(store.latest().unwrap().id, GenerationId(3));
        assert!(store.get(GenerationId(1)).is_none());
    }

    #[test]
    fn test_readers_keep_evicted_generation() {
        let store = GenerationStore::with_retention(1);
        let first = store.publish(generation(1, Some(10.0)));
        store.publish(generation(2, Some(20.0)));
        assert_eq!(first.baselines[0].trend_level, 10.0);
        assert!(store.get(GenerationId(1)).is_none());
    }

    #[test]
    fn test_baselines_by_generation() {
        let store = GenerationStore::new();
        store.publish(generation(1, Some(10.0)));
        store.publish(generation(2, None));
        assert_eq!(store.baseline(&key(), GenerationId(1)).unwrap().trend_level, 10.0);
        assert!(store.baseline(&key(), GenerationId(2)).is_none());
        assert_eq!(store.latest_baseline(&key()).unwrap().generation, GenerationId(1));
    }
}
