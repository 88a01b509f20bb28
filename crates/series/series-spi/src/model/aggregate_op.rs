//! Roll-up operators for geographic aggregation

use serde::{Deserialize, Serialize};

/// How child series are combined into their parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum AggregateOp {
    /// Plain sum, for volume metrics
    Sum,
    /// Mean weighted by another metric of the same unit, for ratio metrics
    WeightedMean { weight_metric: String },
}

impl AggregateOp {
    /// Metric names a roll-up with this operator reads from each child
    pub fn input_metrics<'a>(&'a self, metric: &'a str) -> Vec<&'a str> {
        match self {
            AggregateOp::Sum => vec![metric],
            AggregateOp::WeightedMean { weight_metric } => vec![metric, weight_metric.as_str()],
        }
    }
}
