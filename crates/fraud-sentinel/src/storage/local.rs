use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{write_atomically, ObjectStore, StorageError};

/// Directory-backed store laid out as `{root}/{bucket}/{path}`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes an object, creating the bucket directory when needed.
    pub async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(bucket, path)?;
        write_atomically(&target, bytes).await
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(bucket).join(path);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if bucket.is_empty() || path.is_empty() || !plain {
            return Err(StorageError::InvalidLocation(format!("{bucket}/{path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
        let target = self.resolve(bucket, path)?;
        match tokio::fs::metadata(&target).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io(&target, err)),
        }
    }

    async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(bucket, path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            }),
            Err(err) => Err(StorageError::io(&target, err)),
        }
    }
}
