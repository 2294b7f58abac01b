//! Spreadsheet web endpoint.
//!
//! Talks to a sheet published behind a small JSON API:
//!
//! - `GET {url}` returns `{"rows": [...], "revision": n}`
//! - `PUT {url}` with `{"rows": [...]}` overwrites the sheet
//! - `POST {url}/rows` with `{"key", "expected", "row"}` swaps one row
//!
//! Writes answer `{"revision": n}`. A 409 or 412 means the row changed
//! under us.

use super::{Snapshot, StoreError, StoreResult, TabularStore};
use crate::models::{Row, RowKey};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct OverwriteRequest<'a> {
    rows: &'a [Row],
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    key: &'a RowKey,
    expected: Option<&'a Row>,
    row: &'a Row,
}

#[derive(Deserialize)]
struct WriteResponse {
    revision: u64,
}

/// Catalog table behind an HTTP endpoint.
#[derive(Debug)]
pub struct HttpStore {
    url: String,
    client: reqwest::Client,
}

impl HttpStore {
    /// Create a client for `url` with a per-request timeout.
    pub fn new(url: &str, timeout_seconds: u64) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn rows_url(&self) -> String {
        format!("{}/rows", self.url)
    }

    /// Map a non-success status to a store error.
    fn check_status(&self, status: StatusCode, key: Option<&RowKey>) -> StoreResult<()> {
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Err(StoreError::Conflict {
                key: key.map(|k| k.to_string()).unwrap_or_else(|| "table".to_string()),
            }),
            other => {
                warn!("{} answered {}", self.url, other);
                Err(StoreError::Unreachable(format!(
                    "{} answered {}",
                    self.url, other
                )))
            }
        }
    }
}

/// Connection failures and timeouts mean the sheet is unreachable.
fn send_error(e: reqwest::Error) -> StoreError {
    if e.is_connect() || e.is_timeout() {
        StoreError::Unreachable(e.to_string())
    } else {
        StoreError::Http(e)
    }
}

#[async_trait]
impl TabularStore for HttpStore {
    fn describe(&self) -> String {
        format!("http {}", self.url)
    }

    async fn read(&self) -> StoreResult<Snapshot> {
        debug!("GET {}", self.url);
        let response = self.client.get(&self.url).send().await.map_err(send_error)?;
        self.check_status(response.status(), None)?;

        let snapshot: Snapshot = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(snapshot)
    }

    async fn update(&self, rows: Vec<Row>) -> StoreResult<u64> {
        debug!("PUT {} ({} rows)", self.url, rows.len());
        let response = self
            .client
            .put(&self.url)
            .json(&OverwriteRequest { rows: &rows })
            .send()
            .await
            .map_err(send_error)?;
        self.check_status(response.status(), None)?;

        let body: WriteResponse = response.json().await?;
        Ok(body.revision)
    }

    async fn upsert(&self, key: &RowKey, expected: Option<&Row>, row: Row) -> StoreResult<u64> {
        debug!("POST {} for {}", self.rows_url(), key);
        let response = self
            .client
            .post(self.rows_url())
            .json(&UpsertRequest {
                key,
                expected,
                row: &row,
            })
            .send()
            .await
            .map_err(send_error)?;
        self.check_status(response.status(), Some(key))?;

        let body: WriteResponse = response.json().await?;
        Ok(body.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned response and hand back the raw request.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_read_snapshot() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"rows": [{"Title": "Django", "Year": 1966}], "revision": 7}"#,
        )
        .await;

        let store = HttpStore::new(&url, 5).unwrap();
        let snapshot = store.read().await.unwrap();

        assert_eq!(snapshot.revision, 7);
        assert_eq!(snapshot.rows.len(), 1);
        assert!(server.await.unwrap().starts_with("GET / "));
    }

    #[tokio::test]
    async fn test_upsert_conflict() {
        let (url, server) = serve_once("409 Conflict", "{}").await;

        let store = HttpStore::new(&url, 5).unwrap();
        let key = RowKey {
            title: "Django".to_string(),
            year: 1966,
        };
        let err = store.upsert(&key, None, Row::new()).await.unwrap_err();

        assert!(err.is_conflict());
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /rows "));
        assert!(request.contains("\"Django\""));
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;

        let store = HttpStore::new(&url, 5).unwrap();
        let err = store.update(vec![]).await.unwrap_err();

        assert!(matches!(err, StoreError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let store = HttpStore::new(&url, 5).unwrap();
        let err = store.read().await.unwrap_err();

        assert!(matches!(err, StoreError::Unreachable(_)));
    }
}
