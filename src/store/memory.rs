//! In-process table.
//!
//! Holds the catalog for the `memory` backend and for tests. Clones share
//! the same table, so a test can keep a handle while a session owns another.
//! Reads and writes can be made to fail to exercise the error paths.

use super::{swap_row, Snapshot, StoreError, StoreResult, TabularStore};
use crate::models::{Row, RowKey};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: Snapshot,
    fail_reads: bool,
    fail_writes: bool,
}

/// Shared in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create a store holding `rows` at revision 0.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                snapshot: Snapshot { rows, revision: 0 },
                ..MemoryState::default()
            })),
        }
    }

    /// Current rows, bypassing failure injection.
    pub fn rows(&self) -> Vec<Row> {
        self.state().snapshot.rows.clone()
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.state().snapshot.revision
    }

    /// Make every read fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Make every write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // a panic while holding the lock leaves the table intact
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn read(&self) -> StoreResult<Snapshot> {
        let state = self.state();
        if state.fail_reads {
            return Err(StoreError::Unreachable("memory store read failure".to_string()));
        }
        Ok(state.snapshot.clone())
    }

    async fn update(&self, rows: Vec<Row>) -> StoreResult<u64> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(StoreError::Unreachable("memory store write failure".to_string()));
        }
        state.snapshot.rows = rows;
        state.snapshot.revision += 1;
        Ok(state.snapshot.revision)
    }

    async fn upsert(&self, key: &RowKey, expected: Option<&Row>, row: Row) -> StoreResult<u64> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(StoreError::Unreachable("memory store write failure".to_string()));
        }
        swap_row(&mut state.snapshot.rows, key, expected, row)?;
        state.snapshot.revision += 1;
        Ok(state.snapshot.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn film(title: &str, year: i32) -> Row {
        let mut r = Row::new();
        r.insert("Title".to_string(), json!(title));
        r.insert("Year".to_string(), json!(year));
        r
    }

    #[tokio::test]
    async fn test_clones_share_the_table() {
        let store = MemoryStore::with_rows(vec![film("Django", 1966)]);
        let handle = store.clone();

        let revision = store.update(vec![film("Rio Bravo", 1959)]).await.unwrap();

        assert_eq!(revision, 1);
        assert_eq!(handle.rows(), vec![film("Rio Bravo", 1959)]);
        assert_eq!(handle.read().await.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::with_rows(vec![film("Django", 1966)]);

        store.set_fail_writes(true);
        assert!(matches!(
            store.update(vec![]).await,
            Err(StoreError::Unreachable(_))
        ));
        assert_eq!(store.rows().len(), 1);

        store.set_fail_reads(true);
        assert!(store.read().await.is_err());
        store.set_fail_reads(false);
        assert!(store.read().await.is_ok());
    }

    #[test]
    fn test_upsert_bumps_revision() {
        let store = MemoryStore::with_rows(vec![film("Django", 1966)]);
        let key = RowKey {
            title: "Django".to_string(),
            year: 1966,
        };
        let mut updated = film("Django", 1966);
        updated.insert("Grit".to_string(), json!(8));

        let original = film("Django", 1966);
        let revision =
            tokio_test::block_on(store.upsert(&key, Some(&original), updated.clone())).unwrap();

        assert_eq!(revision, 1);
        assert_eq!(store.rows(), vec![updated]);
    }
}
