//! Tabular store abstraction.
//!
//! The catalog lives in an external table that only offers whole-table
//! reads and writes, plus a keyed row swap for backends that can do it.
//! Backends are swappable behind [`TabularStore`].

pub mod file;
pub mod http;
pub mod memory;

pub use file::FileStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::models::{Row, RowKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("row {key} changed since it was loaded")]
    Conflict { key: String },

    #[error("malformed table: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    /// Whether the write lost a race with another session.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The full table as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every row, in store order.
    pub rows: Vec<Row>,
    /// Bumped by every successful write.
    #[serde(default)]
    pub revision: u64,
}

/// A whole-table store holding the catalog.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Read the full table.
    async fn read(&self) -> StoreResult<Snapshot>;

    /// Overwrite the full table. Returns the new revision.
    async fn update(&self, rows: Vec<Row>) -> StoreResult<u64>;

    /// Swap the row identified by `key`.
    ///
    /// `expected` is the row as the caller last saw it (`None` if it did
    /// not exist). Fails with [`StoreError::Conflict`] when the stored row
    /// differs. No other row is touched. Returns the new revision.
    async fn upsert(&self, key: &RowKey, expected: Option<&Row>, row: Row) -> StoreResult<u64>;
}

/// Apply a keyed row swap to an in-memory table.
///
/// A key carried by more than one row is ambiguous and always conflicts.
pub(crate) fn swap_row(
    rows: &mut Vec<Row>,
    key: &RowKey,
    expected: Option<&Row>,
    row: Row,
) -> StoreResult<()> {
    let matching: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| RowKey::from_row(r).as_ref() == Some(key))
        .map(|(i, _)| i)
        .collect();
    if matching.len() > 1 {
        debug!("Row {} is not unique ({} rows)", key, matching.len());
        return Err(StoreError::Conflict {
            key: key.to_string(),
        });
    }

    match (matching.first().copied(), expected) {
        (Some(i), Some(expected)) if &rows[i] == expected => {
            rows[i] = row;
            Ok(())
        }
        (None, None) => {
            rows.push(row);
            Ok(())
        }
        _ => {
            debug!("Row {} does not match the expected content", key);
            Err(StoreError::Conflict {
                key: key.to_string(),
            })
        }
    }
}

/// Open the store described by the configuration.
pub fn open_store(config: &StoreConfig) -> StoreResult<Box<dyn TabularStore>> {
    match config.backend {
        StoreBackend::File => Ok(Box::new(FileStore::new(config.path.clone()))),
        StoreBackend::Http => {
            let url = config.url.as_deref().ok_or_else(|| {
                StoreError::Unreachable("http backend selected but no URL configured".to_string())
            })?;
            Ok(Box::new(HttpStore::new(url, config.timeout_seconds)?))
        }
        StoreBackend::Memory => {
            let rows = crate::catalog::seed::starter_rows()?;
            Ok(Box::new(MemoryStore::with_rows(rows)))
        }
    }
}
