use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::{error, info};

use super::{load_model, ModelCache, ModelError, ScoringModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    Uninitialized,
    Downloading,
    Loaded,
    Failed,
}

impl ModelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Downloading,
            2 => Self::Loaded,
            3 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Downloading => "DOWNLOADING",
            Self::Loaded => "LOADED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Process-wide slot for the scoring model and its lifecycle state.
///
/// State only moves forward: UNINITIALIZED -> DOWNLOADING -> LOADED | FAILED.
/// Readers never block; the model is visible only once LOADED.
#[derive(Debug)]
pub struct ModelHandle {
    input_dim: usize,
    state: AtomicU8,
    started: AtomicBool,
    model: OnceLock<Arc<dyn ScoringModel>>,
    failure: OnceLock<String>,
}

impl ModelHandle {
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            state: AtomicU8::new(ModelState::Uninitialized as u8),
            started: AtomicBool::new(false),
            model: OnceLock::new(),
            failure: OnceLock::new(),
        }
    }

    /// A handle that is already LOADED with `model`.
    pub fn loaded(model: Arc<dyn ScoringModel>) -> Self {
        let handle = Self::new(model.input_dim());
        handle.started.store(true, Ordering::SeqCst);
        if let Err(err) = handle.install(model) {
            handle.fail(&err);
        }
        handle
    }

    pub fn state(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    pub fn model(&self) -> Option<Arc<dyn ScoringModel>> {
        if self.state() != ModelState::Loaded {
            return None;
        }
        self.model.get().cloned()
    }

    /// Fetches and loads the artifact once. Later calls return the current
    /// state without touching storage.
    pub async fn initialize(&self, cache: &ModelCache) -> ModelState {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.state();
        }

        self.set_state(ModelState::Downloading);
        match self.fetch_and_load(cache).await {
            Ok(model) => {
                if let Err(err) = self.install(model) {
                    self.fail(&err);
                }
            }
            Err(err) => self.fail(&err),
        }

        let state = self.state();
        if state == ModelState::Loaded {
            info!(path = %cache.local_path().display(), "scoring model loaded");
        }
        state
    }

    async fn fetch_and_load(&self, cache: &ModelCache) -> Result<Arc<dyn ScoringModel>, ModelError> {
        let path = cache.ensure_local().await?;
        let input_dim = self.input_dim;
        tokio::task::spawn_blocking(move || load_model(&path, input_dim))
            .await
            .map_err(|err| ModelError::Runtime(format!("model loader task failed: {err}")))?
    }

    fn install(&self, model: Arc<dyn ScoringModel>) -> Result<(), ModelError> {
        if model.input_dim() != self.input_dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim,
                found: model.input_dim(),
            });
        }
        self.model
            .set(model)
            .map_err(|_| ModelError::Runtime("model already installed".to_string()))?;
        self.set_state(ModelState::Loaded);
        Ok(())
    }

    fn fail(&self, err: &ModelError) {
        error!(error = %err, "scoring model failed to load");
        let _ = self.failure.set(err.to_string());
        self.set_state(ModelState::Failed);
    }

    fn set_state(&self, state: ModelState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::storage::{LocalObjectStore, ObjectStore, StorageError};

    const IDENTITY_2D: &[u8] =
        br#"{"layers":[{"weights":[[1.0,0.0],[0.0,1.0]],"bias":[0.0,0.0]}]}"#;

    #[derive(Debug)]
    struct CountingStore {
        inner: LocalObjectStore,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
            self.inner.exists(bucket, path).await
        }

        async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.fetch(bucket, path).await
        }
    }

    async fn seeded(root: &Path) -> LocalObjectStore {
        let store = LocalObjectStore::new(root);
        store
            .put("bucket", "fraudapp/models/ae.json", IDENTITY_2D)
            .await
            .expect("seed");
        store
    }

    #[tokio::test]
    async fn initialize_moves_to_loaded() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store: Arc<dyn ObjectStore> = Arc::new(seeded(remote.path()).await);
        let cache = ModelCache::new(store, "bucket", "fraudapp/models/ae.json", cache_root.path());

        let handle = ModelHandle::new(2);
        assert_eq!(handle.state(), ModelState::Uninitialized);
        assert!(handle.model().is_none());

        assert_eq!(handle.initialize(&cache).await, ModelState::Loaded);
        assert_eq!(handle.model().expect("model").input_dim(), 2);
        assert!(handle.failure_reason().is_none());
    }

    #[tokio::test]
    async fn missing_artifact_leaves_handle_failed() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(remote.path()));
        let cache = ModelCache::new(store, "bucket", "fraudapp/models/ae.json", cache_root.path());

        let handle = ModelHandle::new(2);
        assert_eq!(handle.initialize(&cache).await, ModelState::Failed);
        assert!(handle.model().is_none());
        assert!(handle.failure_reason().expect("reason").contains("not found"));
    }

    #[tokio::test]
    async fn dimension_disagreement_fails_the_load() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store: Arc<dyn ObjectStore> = Arc::new(seeded(remote.path()).await);
        let cache = ModelCache::new(store, "bucket", "fraudapp/models/ae.json", cache_root.path());

        let handle = ModelHandle::new(29);
        assert_eq!(handle.initialize(&cache).await, ModelState::Failed);
    }

    #[tokio::test]
    async fn concurrent_initialization_fetches_once() {
        let remote = tempfile::tempdir().expect("remote");
        let cache_root = tempfile::tempdir().expect("cache");
        let store = Arc::new(CountingStore {
            inner: seeded(remote.path()).await,
            fetches: AtomicUsize::new(0),
        });
        let cache = ModelCache::new(
            store.clone(),
            "bucket",
            "fraudapp/models/ae.json",
            cache_root.path(),
        );
        let handle = ModelHandle::new(2);

        let (first, second) = tokio::join!(handle.initialize(&cache), handle.initialize(&cache));

        assert!(first == ModelState::Loaded || second == ModelState::Loaded);
        assert_eq!(handle.state(), ModelState::Loaded);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }
}
