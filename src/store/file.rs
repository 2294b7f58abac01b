//! JSON table file.
//!
//! The file holds `{"revision": n, "rows": [...]}`. A bare array of row
//! objects is accepted too, as exported by most spreadsheet tools, and is
//! read as revision 0. Writes replace the file atomically.

use super::{swap_row, Snapshot, StoreError, StoreResult, TabularStore};
use crate::models::{Row, RowKey};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    Snapshot(Snapshot),
    Rows(Vec<Row>),
}

/// Catalog table stored in a local JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`. The file is not touched until used.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the table file with `rows`, refusing to clobber an existing one
    /// unless `force` is set.
    pub async fn create(&self, rows: Vec<Row>, force: bool) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        if !force && tokio::fs::try_exists(&self.path).await? {
            return Err(StoreError::Malformed(format!(
                "{} already exists",
                self.path.display()
            )));
        }
        self.persist(Snapshot { rows, revision: 0 }).await
    }

    async fn load(&self) -> StoreResult<Snapshot> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Unreachable(format!(
                    "{} not found",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let table: TableFile = serde_json::from_str(&content).map_err(|e| {
            StoreError::Malformed(format!("{}: {}", self.path.display(), e))
        })?;

        Ok(match table {
            TableFile::Snapshot(snapshot) => snapshot,
            TableFile::Rows(rows) => Snapshot { rows, revision: 0 },
        })
    }

    async fn persist(&self, snapshot: Snapshot) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unreachable(format!("write task failed: {}", e)))??;

        debug!(
            "Wrote {} rows to {} (revision {})",
            snapshot.rows.len(),
            self.path.display(),
            snapshot.revision
        );
        Ok(())
    }
}

#[async_trait]
impl TabularStore for FileStore {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn read(&self) -> StoreResult<Snapshot> {
        self.load().await
    }

    async fn update(&self, rows: Vec<Row>) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;
        let current = self.load().await?;
        let revision = current.revision + 1;
        self.persist(Snapshot { rows, revision }).await?;
        info!("Overwrote {} at revision {}", self.path.display(), revision);
        Ok(revision)
    }

    async fn upsert(&self, key: &RowKey, expected: Option<&Row>, row: Row) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;
        let mut current = self.load().await?;
        swap_row(&mut current.rows, key, expected, row)?;
        current.revision += 1;
        let revision = current.revision;
        self.persist(current).await?;
        info!("Updated {} in {} (revision {})", key, self.path.display(), revision);
        Ok(revision)
    }
}
