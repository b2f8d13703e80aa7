use std::sync::Arc;

use tracing::{debug, info};

use super::notification::ObjectChangeEvent;
use super::preprocess::{PreprocessError, RawTable};
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to parse {uri}: {source}")]
    Parse {
        uri: String,
        #[source]
        source: PreprocessError,
    },
}

/// Reads the object behind a notification into a raw table.
#[derive(Debug, Clone)]
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
}

impl ObjectFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the object is not (yet) visible in storage.
    pub async fn fetch(&self, event: &ObjectChangeEvent) -> Result<Option<RawTable>, FetchError> {
        if !self.store.exists(&event.bucket, &event.path).await? {
            info!(uri = %event.uri(), "object not found, skipping");
            return Ok(None);
        }

        let bytes = match self.store.fetch(&event.bucket, &event.path).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => {
                info!(uri = %event.uri(), "object disappeared before download, skipping");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let table = RawTable::from_reader(bytes.as_slice()).map_err(|source| FetchError::Parse {
            uri: event.uri(),
            source,
        })?;
        debug!(
            uri = %event.uri(),
            rows = table.rows.len(),
            columns = table.headers.len(),
            "fetched source table"
        );

        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ingest::notification::STORAGE_OBJECT_KIND;
    use crate::storage::LocalObjectStore;

    fn event(path: &str) -> ObjectChangeEvent {
        ObjectChangeEvent {
            kind: STORAGE_OBJECT_KIND.to_string(),
            bucket: "landing".to_string(),
            path: path.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn absent_objects_are_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = ObjectFetcher::new(Arc::new(LocalObjectStore::new(dir.path())));

        assert!(fetcher.fetch(&event("missing.csv")).await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn present_objects_are_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());
        store
            .put("landing", "tx.csv", b"V1,Amount\n1,2\n3,4\n")
            .await
            .expect("put");
        let fetcher = ObjectFetcher::new(Arc::new(store));

        let table = fetcher
            .fetch(&event("tx.csv"))
            .await
            .expect("fetch")
            .expect("present");

        assert_eq!(table.headers, vec!["V1", "Amount"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[tokio::test]
    async fn malformed_content_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());
        store
            .put("landing", "bad.csv", b"V1,V2\n1\n")
            .await
            .expect("put");
        let fetcher = ObjectFetcher::new(Arc::new(store));

        let error = fetcher.fetch(&event("bad.csv")).await.expect_err("ragged");
        assert!(matches!(error, FetchError::Parse { .. }));
    }
}
