use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use super::failure::{BatchFailurePolicy, LogAndDrop};
use super::fetcher::{FetchError, ObjectFetcher};
use super::notification::{decode_notification, unwrap_push_envelope, NotApplicable, ObjectChangeEvent};
use super::preprocess::{PreprocessError, Preprocessor};
use crate::inference::BatchScorer;
use crate::sink::{build_records, RecordSink, SinkError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ignored(NotApplicable),
    NotFound { uri: String },
    Empty { uri: String },
    Written { uri: String, records: usize },
    Dropped { uri: String, rows: usize },
    Aborted { uri: String, reason: String },
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Ignored(_) => "ignored",
            IngestOutcome::NotFound { .. } => "not_found",
            IngestOutcome::Empty { .. } => "empty",
            IngestOutcome::Written { .. } => "written",
            IngestOutcome::Dropped { .. } => "dropped",
            IngestOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// Per-outcome counts for a run over many notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub ignored: usize,
    pub not_found: usize,
    pub empty: usize,
    pub written: usize,
    pub records: usize,
    pub dropped: usize,
    pub aborted: usize,
}

impl IngestSummary {
    pub fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Ignored(_) => self.ignored += 1,
            IngestOutcome::NotFound { .. } => self.not_found += 1,
            IngestOutcome::Empty { .. } => self.empty += 1,
            IngestOutcome::Written { records, .. } => {
                self.written += 1;
                self.records += records;
            }
            IngestOutcome::Dropped { .. } => self.dropped += 1,
            IngestOutcome::Aborted { .. } => self.aborted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ignored + self.not_found + self.empty + self.written + self.dropped + self.aborted
    }
}

/// Fetch, preprocess, score and persist one file per notification.
///
/// Each notification is an independent unit of work. Failures are logged and
/// reported as an outcome; they never escape into other files' processing.
#[derive(Debug)]
pub struct IngestionPipeline {
    fetcher: ObjectFetcher,
    preprocessor: Preprocessor,
    scorer: Arc<dyn BatchScorer>,
    sink: Arc<dyn RecordSink>,
    failure_policy: Arc<dyn BatchFailurePolicy>,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: ObjectFetcher,
        preprocessor: Preprocessor,
        scorer: Arc<dyn BatchScorer>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            fetcher,
            preprocessor,
            scorer,
            sink,
            failure_policy: Arc::new(LogAndDrop),
        }
    }

    pub fn with_failure_policy(mut self, policy: Arc<dyn BatchFailurePolicy>) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Handles a raw notification payload, bare or wrapped in a push envelope.
    pub async fn handle(&self, payload: &[u8]) -> IngestOutcome {
        let event = match unwrap_push_envelope(payload).and_then(|raw| decode_notification(&raw)) {
            Ok(event) => event,
            Err(reason) => {
                info!(%reason, "notification skipped");
                return IngestOutcome::Ignored(reason);
            }
        };

        let span = info_span!("ingest", uri = %event.uri());
        async {
            info!(created_at = %event.created_at, "new object notification");
            match self.process(&event).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(error = %err, "file processing aborted");
                    IngestOutcome::Aborted {
                        uri: event.uri(),
                        reason: err.to_string(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn process(&self, event: &ObjectChangeEvent) -> Result<IngestOutcome, PipelineError> {
        let uri = event.uri();
        let Some(table) = self.fetcher.fetch(event).await? else {
            return Ok(IngestOutcome::NotFound { uri });
        };

        let batch = self.preprocessor.transform(&table)?;
        info!(
            rows = batch.vectors.len(),
            features = batch.columns.len(),
            "data preprocessed"
        );
        if batch.vectors.is_empty() {
            warn!("source file has no rows");
            return Ok(IngestOutcome::Empty { uri });
        }

        let predictions = match self.scorer.score_batch(&batch.vectors).await {
            Ok(predictions) => predictions,
            Err(err) => {
                self.failure_policy
                    .on_inference_failure(event, batch.vectors.len(), &err);
                return Ok(IngestOutcome::Dropped {
                    uri,
                    rows: batch.vectors.len(),
                });
            }
        };

        let records = build_records(
            event.file_name(),
            event.created_at,
            &batch.vectors,
            &predictions,
        )?;
        self.sink.append(&records).await?;
        info!(records = records.len(), "prediction rows written");

        Ok(IngestOutcome::Written {
            uri,
            records: records.len(),
        })
    }

    /// Drains `payloads`, processing at most `workers` files at once.
    pub async fn run_stream<S>(self: Arc<Self>, payloads: S, workers: usize) -> IngestSummary
    where
        S: Stream<Item = Vec<u8>> + Send,
    {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = IngestSummary::default();
        let mut payloads = std::pin::pin!(payloads);

        while let Some(payload) = payloads.next().await {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pipeline = Arc::clone(&self);
            tasks.spawn(async move {
                let outcome = pipeline.handle(&payload).await;
                drop(permit);
                outcome
            });

            while let Some(done) = tasks.try_join_next() {
                collect(&mut summary, done);
            }
        }

        while let Some(done) = tasks.join_next().await {
            collect(&mut summary, done);
        }

        info!(
            total = summary.total(),
            written = summary.written,
            records = summary.records,
            dropped = summary.dropped,
            aborted = summary.aborted,
            "ingestion run finished"
        );
        summary
    }
}

fn collect(summary: &mut IngestSummary, done: Result<IngestOutcome, tokio::task::JoinError>) {
    match done {
        Ok(outcome) => summary.record(&outcome),
        Err(err) => {
            error!(error = %err, "ingestion task panicked");
            summary.aborted += 1;
        }
    }
}
