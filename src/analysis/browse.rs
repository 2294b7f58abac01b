//! Filtering, sorting and grouping of catalog records.
//!
//! Everything here works on borrowed records and keeps each record's
//! position in the catalog, since selection is by catalog index.

use crate::models::{CatalogRecord, Metric};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

/// A catalog record paired with its index in the catalog.
pub type Entry<'a> = (usize, &'a CatalogRecord);

/// Criteria for narrowing the catalog. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Sub-genre, matched case-insensitively.
    pub kind: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// Minimum overall rating.
    pub min_overall: Option<f64>,
    /// Case-insensitive title substring.
    pub title_contains: Option<String>,
}

impl CatalogFilter {
    /// Whether `record` passes every set criterion.
    pub fn matches(&self, record: &CatalogRecord) -> bool {
        if let Some(ref kind) = self.kind {
            if !record.kind.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if self.year_from.is_some_and(|from| record.year < from) {
            return false;
        }
        if self.year_to.is_some_and(|to| record.year > to) {
            return false;
        }
        if self.min_overall.is_some_and(|min| record.overall() < min) {
            return false;
        }
        if let Some(ref needle) = self.title_contains {
            if !record.title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Apply `filter` and keep catalog indices.
pub fn filter_records<'a>(records: &'a [CatalogRecord], filter: &CatalogFilter) -> Vec<Entry<'a>> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| filter.matches(r))
        .collect()
}

/// Column to order a listing by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Catalog order.
    #[default]
    Catalog,
    Title,
    Year,
    Metric(Metric),
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "catalog" | "index" => Ok(SortKey::Catalog),
            "title" => Ok(SortKey::Title),
            "year" => Ok(SortKey::Year),
            other => other.parse::<Metric>().map(SortKey::Metric),
        }
    }
}

/// Sort entries in place. Metric sorts put records lacking the metric last.
pub fn sort_entries(entries: &mut [Entry<'_>], key: SortKey, descending: bool) {
    entries.sort_by(|(ia, a), (ib, b)| {
        let ordering = match key {
            SortKey::Catalog => ia.cmp(ib),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::Year => a.year.cmp(&b.year),
            SortKey::Metric(metric) => match (a.value(metric), b.value(metric)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        let ordering = if descending { ordering.reverse() } else { ordering };
        ordering.then_with(|| ia.cmp(ib))
    });
}

/// Records grouped by sub-genre.
pub fn group_by_type(records: &[CatalogRecord]) -> BTreeMap<String, Vec<&CatalogRecord>> {
    let mut grouped: BTreeMap<String, Vec<&CatalogRecord>> = BTreeMap::new();

    for record in records {
        grouped.entry(record.kind.clone()).or_default().push(record);
    }

    grouped
}

/// Per sub-genre statistics for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    pub kind: String,
    pub films: usize,
    /// Mean of the metric over films that carry it.
    pub mean: Option<f64>,
}

/// Mean of `metric` for each sub-genre, largest groups first.
pub fn type_summaries(records: &[CatalogRecord], metric: Metric) -> Vec<TypeSummary> {
    let mut summaries: Vec<TypeSummary> = group_by_type(records)
        .into_iter()
        .map(|(kind, films)| {
            let values: Vec<f64> = films.iter().filter_map(|r| r.value(metric)).collect();
            let mean = if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            };
            TypeSummary {
                kind,
                films: films.len(),
                mean,
            }
        })
        .collect();

    summaries.sort_by_key(|s| std::cmp::Reverse(s.films));
    summaries
}

/// The `n` best records by `metric`.
pub fn top_rated(records: &[CatalogRecord], metric: Metric, n: usize) -> Vec<Entry<'_>> {
    let mut entries: Vec<Entry<'_>> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.value(metric).is_some())
        .collect();
    sort_entries(&mut entries, SortKey::Metric(metric), true);
    entries.truncate(n);
    entries
}

/// One film on the "Sauce Spectrum" scatter plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumPoint {
    pub index: usize,
    pub title: String,
    /// x axis: release year.
    pub year: i32,
    /// y axis: the chosen sauce metric.
    pub sauce: f64,
    /// Marker size: overall enjoyment.
    pub enjoyment: f64,
    /// Colour: sub-genre.
    pub kind: String,
}

/// Scatter series of `y_metric` against release year. Records without the
/// metric are left off the chart.
pub fn sauce_spectrum(records: &[CatalogRecord], y_metric: Metric) -> Vec<SpectrumPoint> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, r)| {
            r.value(y_metric).map(|sauce| SpectrumPoint {
                index,
                title: r.title.clone(),
                year: r.year,
                sauce,
                enjoyment: r.overall(),
                kind: r.kind.clone(),
            })
        })
        .collect()
}
