//! Running weighted averages.
//!
//! Every record keeps, per metric, a running sum and the current average,
//! plus one submission counter shared by all metrics. A new rating is
//! folded in without looking at history:
//!
//! ```text
//! vote_count' = vote_count + 1            (once per submission)
//! sum'(m)     = sum(m) + input(m)         (each supplied metric)
//! value'(m)   = sum'(m) / vote_count'
//! ```
//!
//! The counter counts submissions to the record, not votes per metric: a
//! metric left out of a submission keeps its sum and value while the
//! counter still advances.

use crate::models::{CatalogRecord, Metric, MetricStats};
use std::collections::BTreeMap;

/// New values for one submission, keyed by metric.
pub type MetricInputs = BTreeMap<Metric, f64>;

/// Fold one submission into `record` and return the updated record.
///
/// Inputs are not range checked here; the caller validates them against
/// the scale. A metric the record has never seen starts from a zero sum.
pub fn apply_rating(record: &CatalogRecord, inputs: &MetricInputs) -> CatalogRecord {
    let mut updated = record.clone();
    let vote_count = record.vote_count.saturating_add(1);
    updated.vote_count = vote_count;

    for (metric, input) in inputs {
        let stats = updated.metrics.entry(*metric).or_default();
        stats.sum += input;
        stats.value = stats.sum / f64::from(vote_count);
    }

    updated
}

/// Statistics for a metric as found at load time.
///
/// A missing value becomes `default_value`. A missing sum is rebuilt as if
/// the value were the average of `vote_count` votes, which keeps
/// `value == sum / vote_count`.
pub fn seed_metric(
    value: Option<f64>,
    sum: Option<f64>,
    vote_count: u32,
    default_value: f64,
) -> MetricStats {
    let value = value.unwrap_or(default_value);
    let sum = sum.unwrap_or(value * f64::from(vote_count));
    MetricStats { value, sum }
}

/// Whether `value == sum / vote_count` holds for `metric`, within rounding.
pub fn is_consistent(record: &CatalogRecord, metric: Metric) -> bool {
    match record.metrics.get(&metric) {
        Some(stats) if record.vote_count > 0 => {
            (stats.value - stats.sum / f64::from(record.vote_count)).abs() < 1e-9
        }
        _ => false,
    }
}
