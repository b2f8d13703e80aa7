use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ModelError;
use crate::config::{ConfigError, ModelConfig};
use crate::storage::ObjectStore;

/// Keeps the configured artifact mirrored on local disk.
#[derive(Debug, Clone)]
pub struct ModelCache {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    remote_path: String,
    local_path: PathBuf,
}

impl ModelCache {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        remote_path: impl Into<String>,
        cache_root: &Path,
    ) -> Self {
        let remote_path = remote_path.into();
        let local_path = cache_root.join(&remote_path);
        Self {
            store,
            bucket: bucket.into(),
            remote_path,
            local_path,
        }
    }

    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        config: &ModelConfig,
    ) -> Result<Self, ConfigError> {
        let bucket = config.require_bucket()?;
        Ok(Self::new(
            store,
            bucket,
            config.remote_path(),
            &config.cache_root,
        ))
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Returns the local artifact path, downloading it first on a cache miss.
    ///
    /// Other files in the artifact directory are removed before a download so
    /// that superseded models do not accumulate.
    pub async fn ensure_local(&self) -> Result<PathBuf, ModelError> {
        let directory = self
            .local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if !directory.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&directory)
                .await
                .map_err(|source| ModelError::Cache {
                    path: directory.clone(),
                    source,
                })?;
        }

        let cached = tokio::fs::try_exists(&self.local_path)
            .await
            .map_err(|source| ModelError::Cache {
                path: self.local_path.clone(),
                source,
            })?;
        if cached {
            debug!(path = %self.local_path.display(), "model artifact cache hit");
            return Ok(self.local_path.clone());
        }

        if !directory.as_os_str().is_empty() {
            self.evict_stale(&directory).await?;
        }

        info!(
            bucket = %self.bucket,
            object = %self.remote_path,
            dest = %self.local_path.display(),
            "downloading model artifact"
        );
        self.store
            .download_to(&self.bucket, &self.remote_path, &self.local_path)
            .await?;

        Ok(self.local_path.clone())
    }

    async fn evict_stale(&self, directory: &Path) -> Result<(), ModelError> {
        let cache_err = |source| ModelError::Cache {
            path: directory.to_path_buf(),
            source,
        };
        let mut entries = tokio::fs::read_dir(directory).await.map_err(cache_err)?;

        while let Some(entry) = entries.next_entry().await.map_err(cache_err)? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(cache_err)?;
            if !file_type.is_file() || path == self.local_path {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "evicted stale model artifact"),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to evict file"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalObjectStore;

    async fn seeded_store(root: &Path) -> Arc<dyn ObjectStore> {
        let store = LocalObjectStore::new(root);
        store
            .put("models-bucket", "fraudapp/models/ae.json", b"fresh")
            .await
            .expect("seed");
        Arc::new(store)
    }

    #[tokio::test]
    async fn miss_downloads_and_evicts_older_artifacts() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store = seeded_store(remote.path()).await;

        let stale = cache_root.path().join("fraudapp/models/old.json");
        std::fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
        std::fs::write(&stale, b"old").expect("stale");

        let cache = ModelCache::new(store, "models-bucket", "fraudapp/models/ae.json", cache_root.path());
        let path = cache.ensure_local().await.expect("downloaded");

        assert_eq!(path, cache_root.path().join("fraudapp/models/ae.json"));
        assert_eq!(std::fs::read(&path).expect("read"), b"fresh");
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn hit_skips_the_store() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(remote.path()));

        let local = cache_root.path().join("fraudapp/models/ae.json");
        std::fs::create_dir_all(local.parent().expect("parent")).expect("mkdir");
        std::fs::write(&local, b"cached").expect("cached");

        let cache = ModelCache::new(store, "models-bucket", "fraudapp/models/ae.json", cache_root.path());
        let path = cache.ensure_local().await.expect("cache hit");

        assert_eq!(std::fs::read(path).expect("read"), b"cached");
    }

    #[tokio::test]
    async fn missing_remote_artifact_surfaces_storage_error() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(remote.path()));

        let cache = ModelCache::new(store, "models-bucket", "fraudapp/models/ae.json", cache_root.path());
        let error = cache.ensure_local().await.expect_err("absent");

        assert!(matches!(error, ModelError::Storage(_)));
    }
}
