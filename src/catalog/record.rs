//! Conversion between raw store rows and catalog records.

use super::CatalogError;
use crate::analysis::aggregator::seed_metric;
use crate::config::RatingsConfig;
use crate::models::{
    cell_bool, cell_f64, cell_i32, cell_str, CatalogRecord, Row, COL_POSTER, COL_REMASTER,
    COL_TITLE, COL_TYPE, COL_VOTE_COUNT, COL_YEAR,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A record built from a row, with the columns that had to be filled in.
#[derive(Debug, Clone)]
pub struct Backfilled {
    pub record: CatalogRecord,
    pub filled: Vec<&'static str>,
}

/// Build a record from a raw row, filling missing rating columns.
///
/// Only the title is required. Columns for metrics outside `ratings` are
/// kept verbatim in [`CatalogRecord::extra`].
pub fn from_row(row: &Row, ratings: &RatingsConfig) -> Result<Backfilled, CatalogError> {
    let title = cell_str(row.get(COL_TITLE))
        .filter(|t| !t.is_empty())
        .ok_or(CatalogError::MissingTitle)?;

    let mut filled = Vec::new();

    let vote_count = match cell_f64(row.get(COL_VOTE_COUNT)) {
        Some(count) if count >= 1.0 => count.round() as u32,
        _ => {
            filled.push(COL_VOTE_COUNT);
            ratings.initial_vote_count.max(1)
        }
    };

    let mut metrics = BTreeMap::new();
    let tracked = ratings.tracked_metrics();
    for metric in &tracked {
        let value = cell_f64(row.get(metric.column()));
        let sum = cell_f64(row.get(metric.sum_column()));
        if value.is_none() {
            filled.push(metric.column());
        }
        if sum.is_none() {
            filled.push(metric.sum_column());
        }
        metrics.insert(
            *metric,
            seed_metric(value, sum, vote_count, ratings.midpoint()),
        );
    }

    let mut known: Vec<&str> = vec![
        COL_TITLE,
        COL_YEAR,
        COL_TYPE,
        COL_POSTER,
        COL_VOTE_COUNT,
        COL_REMASTER,
    ];
    for metric in &tracked {
        known.push(metric.column());
        known.push(metric.sum_column());
    }
    let extra: Row = row
        .iter()
        .filter(|(column, _)| !known.contains(&column.as_str()))
        .map(|(column, cell)| (column.clone(), cell.clone()))
        .collect();

    let year = cell_i32(row.get(COL_YEAR));
    let kind = cell_str(row.get(COL_TYPE)).filter(|k| !k.is_empty());
    let poster_url = cell_str(row.get(COL_POSTER));

    let mut absent = BTreeSet::new();
    if year.is_none() {
        absent.insert(COL_YEAR);
    }
    if kind.is_none() {
        absent.insert(COL_TYPE);
    }
    if poster_url.is_none() {
        absent.insert(COL_POSTER);
    }

    let record = CatalogRecord {
        title,
        year: year.unwrap_or(0),
        kind: kind.unwrap_or_else(|| "Unknown".to_string()),
        poster_url: poster_url.unwrap_or_default(),
        remaster_available: cell_bool(row.get(COL_REMASTER)),
        vote_count,
        metrics,
        extra,
        absent,
    };

    Ok(Backfilled { record, filled })
}

/// Flatten a record back into a row with every tracked column present.
pub fn to_row(record: &CatalogRecord) -> Row {
    let mut row = Row::new();
    row.insert(COL_TITLE.to_string(), json!(record.title));
    let identity = [
        (COL_YEAR, json!(record.year)),
        (COL_TYPE, json!(record.kind)),
        (COL_POSTER, json!(record.poster_url)),
    ];
    for (column, cell) in identity {
        if !record.absent.contains(column) {
            row.insert(column.to_string(), cell);
        }
    }
    if let Some(remaster) = record.remaster_available {
        row.insert(COL_REMASTER.to_string(), Value::Bool(remaster));
    }
    row.insert(COL_VOTE_COUNT.to_string(), json!(record.vote_count));

    for (metric, stats) in &record.metrics {
        row.insert(metric.column().to_string(), json!(stats.value));
        row.insert(metric.sum_column().to_string(), json!(stats.sum));
    }

    for (column, cell) in &record.extra {
        row.entry(column.clone()).or_insert_with(|| cell.clone());
    }

    row
}
