//! Object storage capability: existence checks, content fetches and downloads
//! into a local file.

mod http;
mod local;

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::{StorageBackend, StorageConfig};

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;

#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError>;

    async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Persists the object at `dest`. A partially written file never becomes
    /// visible under `dest`.
    async fn download_to(&self, bucket: &str, path: &str, dest: &Path) -> Result<(), StorageError> {
        let bytes = self.fetch(bucket, path).await?;
        write_atomically(dest, &bytes).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object gs://{bucket}/{path} not found")]
    NotFound { bucket: String, path: String },
    #[error("storage request failed: {0}")]
    Transport(String),
    #[error("storage request timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage returned HTTP {status} for {uri}")]
    Status { status: u16, uri: String },
    #[error("invalid storage location: {0}")]
    InvalidLocation(String),
    #[error("storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        StorageBackend::Gcs => Ok(Arc::new(HttpObjectStore::new(
            &config.endpoint,
            config.access_token.clone(),
            config.timeout,
        )?)),
        StorageBackend::Local => Ok(Arc::new(LocalObjectStore::new(&config.local_root))),
    }
}

pub(crate) async fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| StorageError::io(parent, err))?;
    }

    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::InvalidLocation(dest.display().to_string()))?;
    let partial = dest.with_file_name(format!("{file_name}.part"));

    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|err| StorageError::io(&partial, err))?;
    file.write_all(bytes)
        .await
        .map_err(|err| StorageError::io(&partial, err))?;
    file.sync_all()
        .await
        .map_err(|err| StorageError::io(&partial, err))?;
    drop(file);

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|err| StorageError::io(dest, err))
}
