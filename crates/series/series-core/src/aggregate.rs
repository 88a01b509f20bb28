//! Geographic roll-up of child series into a parent series

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use series_spi::{
    AggregateOp, GeoHierarchy, GeoLevel, Point, Result, Series, SeriesError, SeriesKey,
};

/// Every child key a roll-up of `key` may read, whether stored or not.
///
/// Used to decide which cache entries an upsert invalidates.
pub fn constituents(
    hierarchy: &GeoHierarchy,
    key: &SeriesKey,
    from: GeoLevel,
    op: &AggregateOp,
) -> BTreeSet<SeriesKey> {
    let metrics = op.input_metrics(&key.metric);
    hierarchy
        .descendants_at(&key.unit, from)
        .into_iter()
        .flat_map(|unit| {
            metrics
                .iter()
                .map(move |metric| SeriesKey::new(unit, from, *metric))
        })
        .collect()
}

/// Roll children at `from` up into the parent named by `key` at `to`.
///
/// Sum adds child values per day. Weighted mean divides the weighted sum by
/// the total weight of children reporting both metrics that day; days with
/// zero total weight are omitted.
pub fn roll_up(
    series: &BTreeMap<SeriesKey, Arc<Series>>,
    hierarchy: &GeoHierarchy,
    key: &SeriesKey,
    from: GeoLevel,
    to: GeoLevel,
    op: &AggregateOp,
) -> Result<Series> {
    if !from.is_finer_than(to) || key.level != to {
        return Err(SeriesError::InvalidLevels { from, to });
    }

    let children = hierarchy.descendants_at(&key.unit, from);
    let mut sums: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    let mut contributing = 0usize;

    for unit in children {
        let child_key = SeriesKey::new(unit, from, key.metric.clone());
        let Some(child) = series.get(&child_key) else {
            continue;
        };
        contributing += 1;

        match op {
            AggregateOp::Sum => {
                for p in child.points() {
                    sums.entry(p.timestamp).or_insert((0.0, 0.0)).0 += p.value;
                }
            }
            AggregateOp::WeightedMean { weight_metric } => {
                let weight_key = child_key.with_metric(weight_metric.clone());
                let weights = series.get(&weight_key).ok_or_else(|| {
                    SeriesError::MissingWeights {
                        unit: unit.to_string(),
                        metric: weight_metric.clone(),
                    }
                })?;
                for p in child.points() {
                    if let Some(w) = weights.value_at(p.timestamp) {
                        let entry = sums.entry(p.timestamp).or_insert((0.0, 0.0));
                        entry.0 += p.value * w;
                        entry.1 += w;
                    }
                }
            }
        }
    }

    if contributing == 0 {
        return Err(SeriesError::NotFound {
            key: key.to_string(),
        });
    }

    let points = sums.into_iter().filter_map(|(timestamp, (num, den))| match op {
        AggregateOp::Sum => Some(Point::new(timestamp, num)),
        AggregateOp::WeightedMean { .. } if den > 0.0 => Some(Point::new(timestamp, num / den)),
        AggregateOp::WeightedMean { .. } => None,
    });
    Series::from_points(key.clone(), points)
}
