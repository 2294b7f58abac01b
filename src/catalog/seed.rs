//! Starter catalog shipped with the binary.
//!
//! Several rows leave out rating columns on purpose; they are filled in at
//! load time like any hand-edited sheet.

use crate::models::Row;

const STARTER_CATALOG: &str = include_str!("../../data/westerns.json");

/// Rows of the starter catalog.
pub fn starter_rows() -> Result<Vec<Row>, serde_json::Error> {
    serde_json::from_str(STARTER_CATALOG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::RatingsConfig;
    use crate::models::Metric;
    use crate::store::Snapshot;

    #[test]
    fn test_starter_catalog_loads() {
        let rows = starter_rows().unwrap();
        assert!(rows.len() >= 10);

        let catalog = Catalog::from_snapshot(
            Snapshot { rows, revision: 0 },
            &RatingsConfig::default(),
        )
        .unwrap();

        for record in catalog.records() {
            assert_eq!(record.vote_count, 1);
            for metric in RatingsConfig::default().tracked_metrics() {
                let value = record.value(metric).unwrap();
                assert!((0.0..=10.0).contains(&value), "{} {}", record.title, metric);
            }
        }
        assert!(catalog.backfilled() > 0);
        assert!(catalog
            .records()
            .iter()
            .any(|r| r.value(Metric::Spaghettiness) == Some(10.0)));
    }
}
