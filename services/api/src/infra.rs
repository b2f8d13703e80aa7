use fraud_sentinel::config::AppConfig;
use fraud_sentinel::error::AppError;
use fraud_sentinel::inference;
use fraud_sentinel::ingest::{IngestionPipeline, ObjectFetcher, Preprocessor};
use fraud_sentinel::scoring::{ModelCache, ModelHandle, ScoringEngine};
use fraud_sentinel::sink::{JsonLinesSink, RecordSink};
use fraud_sentinel::storage::{self, ObjectStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) project_name: Arc<str>,
    pub(crate) model: Arc<ModelHandle>,
    pub(crate) pipeline: Arc<IngestionPipeline>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) notifications: Arc<NotificationWorkers>,
}

/// Runs pushed notifications in the background, at most `workers` at a time.
#[derive(Debug)]
pub(crate) struct NotificationWorkers {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl NotificationWorkers {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Accepted notifications that have not finished processing, queued ones included.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queues `payload` without waiting for a free worker.
    pub(crate) fn dispatch(
        &self,
        pipeline: Arc<IngestionPipeline>,
        payload: Vec<u8>,
    ) -> JoinHandle<()> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => {
                    let outcome = pipeline.handle(&payload).await;
                    info!(outcome = outcome.label(), "notification processed");
                }
                Err(_) => warn!("notification workers closed, payload dropped"),
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Long-lived services shared by every entry point, built once per process.
pub(crate) struct Services {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) model: Arc<ModelHandle>,
    pub(crate) engine: Arc<ScoringEngine>,
    pub(crate) pipeline: Arc<IngestionPipeline>,
}

impl Services {
    pub(crate) fn build(config: &AppConfig) -> Result<Self, AppError> {
        let store = storage::from_config(&config.storage)?;
        let sink: Arc<dyn RecordSink> = Arc::new(JsonLinesSink::new(&config.sink.table_path));
        Self::with_parts(config, store, sink)
    }

    pub(crate) fn with_parts(
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, AppError> {
        let model = Arc::new(ModelHandle::new(config.model.input_dim));
        let engine = Arc::new(ScoringEngine::new(model.clone(), config.model.threshold));
        let scorer = inference::from_config(&config.pipeline, engine.clone())?;
        let pipeline = Arc::new(IngestionPipeline::new(
            ObjectFetcher::new(store.clone()),
            Preprocessor::new(config.model.input_dim),
            scorer,
            sink,
        ));

        Ok(Self {
            store,
            model,
            engine,
            pipeline,
        })
    }

    /// Cache for the configured model artifact. Needs `GCS_BUCKET_NAME`.
    pub(crate) fn model_cache(&self, config: &AppConfig) -> Result<ModelCache, AppError> {
        Ok(ModelCache::from_config(self.store.clone(), &config.model)?)
    }

    /// In-process scoring needs the model; a remote `API_URL` does not.
    pub(crate) fn needs_local_model(config: &AppConfig) -> bool {
        config.pipeline.api_url.is_none()
    }
}
