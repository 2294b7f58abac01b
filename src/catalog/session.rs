//! One user's view of the catalog.
//!
//! A session owns an independent copy of the catalog, refreshed when the
//! cache window runs out. Submitting a rating walks
//! `Loaded -> Mutated -> Persisted`: the record is updated in memory, written
//! back, and the catalog is reloaded from the store. A failed write drops
//! the in-memory copy, so the next read only shows what the store holds.

use super::{record, Catalog, CatalogError};
use crate::analysis::aggregator::{apply_rating, MetricInputs};
use crate::config::{Config, RatingsConfig, WriteMode};
use crate::models::{CatalogRecord, Metric};
use crate::store::{StoreError, TabularStore};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load catalog from {store}: {source}")]
    Load {
        store: String,
        #[source]
        source: StoreError,
    },

    #[error("catalog is malformed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("catalog has not been loaded")]
    NotLoaded,

    #[error("no film at index {index} (catalog has {len})")]
    NoSuchRecord { index: usize, len: usize },

    #[error("{0} is not rated in this catalog")]
    UntrackedMetric(Metric),

    #[error("rating for {key} was not saved: {source}")]
    WriteBack {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl SessionError {
    /// Whether a write lost to a concurrent change of the same row.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionError::WriteBack { source, .. } if source.is_conflict())
    }
}

/// Where the session is in the load/mutate/persist cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing cached; the next read goes to the store.
    Unloaded,
    Loaded,
    /// A rating was applied in memory and is being written back.
    Mutated,
    /// The last rating was written and the catalog reloaded.
    Persisted,
}

struct Cached {
    catalog: Catalog,
    fetched: Instant,
}

/// A user session over a tabular store.
pub struct Session {
    store: Box<dyn TabularStore>,
    ratings: RatingsConfig,
    write_mode: WriteMode,
    ttl: Duration,
    cached: Option<Cached>,
    phase: Phase,
}

impl Session {
    /// Create a session without loading anything yet.
    pub fn new(
        store: Box<dyn TabularStore>,
        ratings: RatingsConfig,
        write_mode: WriteMode,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            ratings,
            write_mode,
            ttl,
            cached: None,
            phase: Phase::Unloaded,
        }
    }

    /// Create a session from the application configuration and load the
    /// catalog.
    pub async fn open(store: Box<dyn TabularStore>, config: &Config) -> Result<Self, SessionError> {
        let mut session = Self::new(
            store,
            config.ratings.clone(),
            config.store.write_mode,
            config.cache.ttl(),
        );
        session.reload().await?;
        Ok(session)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ratings(&self) -> &RatingsConfig {
        &self.ratings
    }

    /// Whether the next read has to go to the store.
    pub fn is_stale(&self) -> bool {
        self.cached
            .as_ref()
            .map_or(true, |cached| cached.fetched.elapsed() >= self.ttl)
    }

    /// Drop the cached catalog.
    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            debug!("Catalog cache invalidated");
        }
        self.phase = Phase::Unloaded;
    }

    /// Read the full table from the store and rebuild the catalog.
    pub async fn reload(&mut self) -> Result<&Catalog, SessionError> {
        let snapshot = self.store.read().await.map_err(|source| SessionError::Load {
            store: self.store.describe(),
            source,
        })?;
        let catalog = Catalog::from_snapshot(snapshot, &self.ratings)?;
        info!(
            "Loaded {} films from {} (revision {})",
            catalog.len(),
            self.store.describe(),
            catalog.revision()
        );

        self.phase = Phase::Loaded;
        let cached = self.cached.insert(Cached {
            catalog,
            fetched: Instant::now(),
        });
        Ok(&cached.catalog)
    }

    /// The catalog, reloaded if the cache window has passed.
    pub async fn catalog(&mut self) -> Result<&Catalog, SessionError> {
        if self.is_stale() {
            debug!("Catalog cache is stale, reloading");
            return self.reload().await;
        }
        self.cached
            .as_ref()
            .map(|cached| &cached.catalog)
            .ok_or(SessionError::NotLoaded)
    }

    /// The record at `index`.
    pub async fn select(&mut self, index: usize) -> Result<&CatalogRecord, SessionError> {
        let catalog = self.catalog().await?;
        let len = catalog.len();
        catalog
            .get(index)
            .ok_or(SessionError::NoSuchRecord { index, len })
    }

    /// Apply one rating to the record at `index` and write it back.
    ///
    /// Returns the updated record once the store holds it, even if the
    /// reload after the write fails; the session is then left `Unloaded`.
    /// On a failed write nothing is kept in memory.
    pub async fn submit(
        &mut self,
        index: usize,
        inputs: &MetricInputs,
    ) -> Result<CatalogRecord, SessionError> {
        if let Some(metric) = inputs.keys().find(|m| !self.ratings.tracks(**m)) {
            return Err(SessionError::UntrackedMetric(*metric));
        }

        self.catalog().await?;
        let catalog = match self.cached.as_mut() {
            Some(cached) => &mut cached.catalog,
            None => return Err(SessionError::NotLoaded),
        };

        let len = catalog.len();
        let current = catalog
            .get(index)
            .cloned()
            .ok_or(SessionError::NoSuchRecord { index, len })?;
        let expected = catalog.source_row(index).cloned();

        let updated = apply_rating(&current, inputs);
        catalog.replace(index, updated.clone());
        self.phase = Phase::Mutated;

        let key = updated.key();
        debug!(
            "Rated {}: vote count {} -> {}",
            key, current.vote_count, updated.vote_count
        );

        let result = match self.write_mode {
            WriteMode::Upsert => {
                let row = record::to_row(&updated);
                self.store.upsert(&key, expected.as_ref(), row).await
            }
            WriteMode::Overwrite => {
                let rows = catalog.to_rows();
                self.store.update(rows).await
            }
        };

        match result {
            Ok(revision) => {
                info!("Saved rating for {} (revision {})", key, revision);
                self.invalidate();
                // the rating is stored; a failed refresh only leaves the cache empty
                match self.reload().await {
                    Ok(_) => self.phase = Phase::Persisted,
                    Err(e) => warn!("Rating for {} saved but the catalog could not be refreshed: {}", key, e),
                }
                Ok(updated)
            }
            Err(source) => {
                warn!("Rating for {} was not saved: {}", key, source);
                self.invalidate();
                Err(SessionError::WriteBack {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn rows(value: serde_json::Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    fn two_films() -> MemoryStore {
        MemoryStore::with_rows(rows(json!([
            {"Title": "Django", "Year": 1966, "Type": "Spaghetti",
             "Avg_Rating": 5.0, "Vote_Count": 1, "Sum_Rating": 5.0},
            {"Title": "Rio Bravo", "Year": 1959, "Type": "Classic",
             "Avg_Rating": 8.0, "Vote_Count": 1, "Sum_Rating": 8.0, "Grit": 3.0},
        ])))
    }

    fn session(store: &MemoryStore, mode: WriteMode, ttl: Duration) -> Session {
        Session::new(Box::new(store.clone()), RatingsConfig::default(), mode, ttl)
    }

    fn inputs(pairs: &[(Metric, f64)]) -> MetricInputs {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_overall_rating_is_persisted() {
        let store = two_films();
        let mut session = session(&store, WriteMode::Upsert, Duration::from_secs(60));

        let updated = session
            .submit(0, &inputs(&[(Metric::Overall, 7.0)]))
            .await
            .unwrap();

        assert_eq!(updated.vote_count, 2);
        assert_eq!(updated.sum(Metric::Overall), Some(12.0));
        assert_eq!(updated.value(Metric::Overall), Some(6.0));
        assert_eq!(session.phase(), Phase::Persisted);

        let stored = &store.rows()[0];
        assert_eq!(stored["Vote_Count"], json!(2));
        assert_eq!(stored["Sum_Rating"], json!(12.0));
        assert_eq!(stored["Avg_Rating"], json!(6.0));

        // the reloaded catalog reflects the store
        let reloaded = session.select(0).await.unwrap();
        assert_eq!(reloaded.vote_count, 2);
    }

    #[tokio::test]
    async fn test_missing_grit_defaults_then_averages() {
        let store = two_films();
        let mut session = session(&store, WriteMode::Upsert, Duration::from_secs(60));

        session
            .submit(0, &inputs(&[(Metric::Grit, 9.0)]))
            .await
            .unwrap();

        let stored = &store.rows()[0];
        assert_eq!(stored["Sum_Grit"], json!(14.0));
        assert_eq!(stored["Grit"], json!(7.0));
        // overall was not part of the submission
        assert_eq!(stored["Avg_Rating"], json!(5.0));
        assert_eq!(stored["Sum_Rating"], json!(5.0));
        assert_eq!(stored["Vote_Count"], json!(2));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_visible() {
        let store = two_films();
        let mut session = session(&store, WriteMode::Upsert, Duration::from_secs(60));
        session.reload().await.unwrap();

        store.set_fail_writes(true);
        let err = session
            .submit(0, &inputs(&[(Metric::Overall, 10.0)]))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::WriteBack { .. }));
        assert!(!err.is_conflict());
        assert_eq!(session.phase(), Phase::Unloaded);

        store.set_fail_writes(false);
        let record = session.select(0).await.unwrap();
        assert_eq!(record.vote_count, 1);
        assert_eq!(record.value(Metric::Overall), Some(5.0));
    }

    #[tokio::test]
    async fn test_saved_rating_survives_failed_refresh() {
        let store = two_films();
        let mut session = session(&store, WriteMode::Upsert, Duration::from_secs(60));
        session.reload().await.unwrap();

        store.set_fail_reads(true);
        let updated = session
            .submit(0, &inputs(&[(Metric::Overall, 7.0)]))
            .await
            .unwrap();

        assert_eq!(updated.vote_count, 2);
        assert_eq!(store.rows()[0]["Vote_Count"], json!(2));
        assert_eq!(session.phase(), Phase::Unloaded);
        assert!(session.is_stale());

        store.set_fail_reads(false);
        assert_eq!(session.select(0).await.unwrap().vote_count, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rows_in_overwrite_mode() {
        let store = MemoryStore::with_rows(rows(json!([
            {"Title": "True Grit", "Year": 1969, "Avg_Rating": 6.0, "Vote_Count": 1},
            {"Title": "Django", "Year": 1966, "Avg_Rating": 5.0, "Vote_Count": 1},
            {"Title": "True Grit", "Year": 1969, "Avg_Rating": 6.0, "Vote_Count": 1},
        ])));
        let mut session = session(&store, WriteMode::Overwrite, Duration::from_secs(60));

        assert_eq!(session.reload().await.unwrap().len(), 3);
        session
            .submit(1, &inputs(&[(Metric::Overall, 9.0)]))
            .await
            .unwrap();

        let stored = store.rows();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1]["Avg_Rating"], json!(7.0));
    }

    #[tokio::test]
    async fn test_upsert_on_duplicate_key_conflicts() {
        let store = MemoryStore::with_rows(rows(json!([
            {"Title": "True Grit", "Year": 1969, "Avg_Rating": 6.0, "Vote_Count": 1},
            {"Title": "True Grit", "Year": 1969, "Avg_Rating": 6.0, "Vote_Count": 1},
        ])));
        let mut session = session(&store, WriteMode::Upsert, Duration::from_secs(60));

        let err = session
            .submit(0, &inputs(&[(Metric::Overall, 9.0)]))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_failure_is_not_visible() {
        let store = two_films();
        let mut session = session(&store, WriteMode::Overwrite, Duration::from_secs(60));

        store.set_fail_writes(true);
        assert!(session
            .submit(1, &inputs(&[(Metric::Overall, 1.0)]))
            .await
            .is_err());
        store.set_fail_writes(false);

        assert_eq!(session.catalog().await.unwrap().records()[1].vote_count, 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_load() {
        let store = two_films();
        store.set_fail_reads(true);

        let err = Session::open(Box::new(store.clone()), &Config::default())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SessionError::Load { .. }));
    }

    #[tokio::test]
    async fn test_rejects_untracked_metric_and_bad_index() {
        let store = two_films();
        let mut session = Session::new(
            Box::new(store.clone()),
            RatingsConfig::legacy(),
            WriteMode::Upsert,
            Duration::from_secs(60),
        );

        let err = session
            .submit(0, &inputs(&[(Metric::Grit, 5.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UntrackedMetric(Metric::Grit)));

        let err = session
            .submit(7, &inputs(&[(Metric::Overall, 5.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoSuchRecord { index: 7, len: 2 }));
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_upsert_on_same_row_conflicts() {
        let store = two_films();
        let mut alice = session(&store, WriteMode::Upsert, Duration::from_secs(60));
        let mut bob = session(&store, WriteMode::Upsert, Duration::from_secs(60));
        alice.reload().await.unwrap();
        bob.reload().await.unwrap();

        alice
            .submit(0, &inputs(&[(Metric::Overall, 9.0)]))
            .await
            .unwrap();
        let err = bob
            .submit(0, &inputs(&[(Metric::Overall, 1.0)]))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.rows()[0]["Avg_Rating"], json!(7.0));

        // after the conflict bob reloads and can retry
        bob.submit(0, &inputs(&[(Metric::Overall, 1.0)]))
            .await
            .unwrap();
        assert_eq!(store.rows()[0]["Vote_Count"], json!(3));
        assert_eq!(store.rows()[0]["Sum_Rating"], json!(15.0));
    }

    #[tokio::test]
    async fn test_upsert_keeps_unrelated_rows() {
        let store = two_films();
        let mut alice = session(&store, WriteMode::Upsert, Duration::from_secs(60));
        let mut bob = session(&store, WriteMode::Upsert, Duration::from_secs(60));
        alice.reload().await.unwrap();
        bob.reload().await.unwrap();

        alice
            .submit(0, &inputs(&[(Metric::Overall, 9.0)]))
            .await
            .unwrap();
        bob.submit(1, &inputs(&[(Metric::Overall, 10.0)]))
            .await
            .unwrap();

        let stored = store.rows();
        assert_eq!(stored[0]["Vote_Count"], json!(2));
        assert_eq!(stored[1]["Vote_Count"], json!(2));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let store = two_films();
        let mut alice = session(&store, WriteMode::Overwrite, Duration::from_secs(60));
        let mut bob = session(&store, WriteMode::Overwrite, Duration::from_secs(60));
        alice.reload().await.unwrap();
        bob.reload().await.unwrap();

        alice
            .submit(0, &inputs(&[(Metric::Overall, 9.0)]))
            .await
            .unwrap();
        bob.submit(1, &inputs(&[(Metric::Overall, 10.0)]))
            .await
            .unwrap();

        // bob's stale copy of row 0 clobbered alice's rating
        let stored = store.rows();
        assert_eq!(stored[0]["Vote_Count"], json!(1));
        assert_eq!(stored[1]["Vote_Count"], json!(2));
    }

    #[tokio::test]
    async fn test_cache_window() {
        let store = two_films();
        let mut cached = session(&store, WriteMode::Upsert, Duration::from_secs(3600));
        let mut uncached = session(&store, WriteMode::Upsert, Duration::ZERO);
        cached.reload().await.unwrap();
        uncached.reload().await.unwrap();

        store.update(rows(json!([{"Title": "El Topo", "Year": 1970}]))).await.unwrap();

        assert_eq!(cached.catalog().await.unwrap().len(), 2);
        assert_eq!(uncached.catalog().await.unwrap().len(), 1);

        cached.invalidate();
        assert!(cached.is_stale());
        assert_eq!(cached.catalog().await.unwrap().len(), 1);
    }
}
