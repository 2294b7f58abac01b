//! The in-memory catalog and the session that keeps it in sync with the
//! store.

pub mod record;
pub mod seed;
pub mod session;

pub use session::{Phase, Session, SessionError};

use crate::analysis::aggregator::is_consistent;
use crate::config::RatingsConfig;
use crate::models::{CatalogRecord, Row, RowKey};
use crate::store::Snapshot;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// Catalog construction errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("row has no title")]
    MissingTitle,

    #[error("row {row}: {source}")]
    MalformedRow {
        row: usize,
        #[source]
        source: Box<CatalogError>,
    },
}

/// One loaded copy of the catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<CatalogRecord>,
    // rows exactly as read, for keyed writes
    source_rows: Vec<Row>,
    revision: u64,
    loaded_at: DateTime<Utc>,
    backfilled: usize,
}

impl Catalog {
    /// Build the catalog from a store snapshot, filling missing columns.
    pub fn from_snapshot(snapshot: Snapshot, ratings: &RatingsConfig) -> Result<Self, CatalogError> {
        let mut records: Vec<CatalogRecord> = Vec::with_capacity(snapshot.rows.len());
        let mut backfilled = 0;

        for (i, row) in snapshot.rows.iter().enumerate() {
            let built = record::from_row(row, ratings).map_err(|e| CatalogError::MalformedRow {
                row: i,
                source: Box::new(e),
            })?;

            let key = built.record.key();
            if records.iter().any(|r| r.key() == key) {
                warn!("{} appears more than once; keyed writes to it will be refused", key);
            }

            if !built.filled.is_empty() {
                debug!("Backfilled {} for {}", built.filled.join(", "), key);
                backfilled += 1;
            }
            for metric in built.record.metrics.keys() {
                if !is_consistent(&built.record, *metric) {
                    debug!("{}: {} average does not match its sum", key, metric);
                }
            }
            records.push(built.record);
        }

        if backfilled > 0 {
            warn!("{} of {} films had missing rating columns", backfilled, records.len());
        }

        Ok(Self {
            records,
            source_rows: snapshot.rows,
            revision: snapshot.revision,
            loaded_at: Utc::now(),
            backfilled,
        })
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The selected record, if `index` is in range.
    pub fn get(&self, index: usize) -> Option<&CatalogRecord> {
        self.records.get(index)
    }

    /// Index of the record with `key`.
    pub fn position(&self, key: &RowKey) -> Option<usize> {
        self.records.iter().position(|r| &r.key() == key)
    }

    /// Row for `index` as it was read from the store.
    pub fn source_row(&self, index: usize) -> Option<&Row> {
        self.source_rows.get(index)
    }

    /// Replace the record at `index` in memory. Returns the old record.
    pub fn replace(&mut self, index: usize, record: CatalogRecord) -> Option<CatalogRecord> {
        self.records
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, record))
    }

    /// Every record as a store row, in catalog order.
    pub fn to_rows(&self) -> Vec<Row> {
        self.records.iter().map(record::to_row).collect()
    }

    /// Store revision this copy was read at.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Number of records that needed default columns at load.
    pub fn backfilled(&self) -> usize {
        self.backfilled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metric;
    use serde_json::json;

    fn snapshot(rows: serde_json::Value) -> Snapshot {
        Snapshot {
            rows: serde_json::from_value(rows).unwrap(),
            revision: 3,
        }
    }

    #[test]
    fn test_from_snapshot() {
        let catalog = Catalog::from_snapshot(
            snapshot(json!([
                {"Title": "Django", "Year": 1966, "Avg_Rating": 8.0, "Sum_Rating": 8.0, "Vote_Count": 1},
                {"Title": "Rio Bravo", "Year": 1959},
            ])),
            &RatingsConfig::default(),
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.revision(), 3);
        assert_eq!(catalog.backfilled(), 2);
        assert_eq!(catalog.get(1).unwrap().value(Metric::Overall), Some(5.0));
        assert!(catalog.get(2).is_none());
        assert_eq!(catalog.source_row(1).unwrap()["Title"], json!("Rio Bravo"));
    }

    #[test]
    fn test_malformed_row_reports_position() {
        let err = Catalog::from_snapshot(
            snapshot(json!([{"Title": "Django"}, {"Year": 1970}])),
            &RatingsConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, CatalogError::MalformedRow { row: 1, .. }));
    }

    #[test]
    fn test_duplicate_films_still_load() {
        let catalog = Catalog::from_snapshot(
            snapshot(json!([
                {"Title": "True Grit", "Year": 1969, "Avg_Rating": 7.0},
                {"Title": "Django", "Year": 1966},
                {"Title": "True Grit", "Year": 1969, "Avg_Rating": 6.0},
            ])),
            &RatingsConfig::default(),
        )
        .unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(2).unwrap().value(Metric::Overall), Some(6.0));
    }

    #[test]
    fn test_same_title_different_year_is_fine() {
        let catalog = Catalog::from_snapshot(
            snapshot(json!([
                {"Title": "True Grit", "Year": 1969},
                {"Title": "True Grit", "Year": 2010},
            ])),
            &RatingsConfig::default(),
        )
        .unwrap();

        let key = RowKey {
            title: "True Grit".to_string(),
            year: 2010,
        };
        assert_eq!(catalog.position(&key), Some(1));
    }

    #[test]
    fn test_replace_in_memory() {
        let mut catalog = Catalog::from_snapshot(
            snapshot(json!([{"Title": "Django", "Year": 1966}])),
            &RatingsConfig::default(),
        )
        .unwrap();

        let mut changed = catalog.get(0).unwrap().clone();
        changed.vote_count = 9;
        let old = catalog.replace(0, changed).unwrap();

        assert_eq!(old.vote_count, 1);
        assert_eq!(catalog.get(0).unwrap().vote_count, 9);
        assert_eq!(catalog.to_rows()[0]["Vote_Count"], json!(9));
        // the source row is what the store held
        assert!(catalog.source_row(0).unwrap().get("Vote_Count").is_none());
        assert!(catalog.replace(5, old).is_none());
    }
}
