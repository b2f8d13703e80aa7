use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ensure_aligned, BatchScorer, InferenceError};
use crate::scoring::{FeatureVector, PredictionResult, ScoringEngine};

/// Runs the in-process engine on the blocking pool under a timeout.
#[derive(Debug, Clone)]
pub struct LocalInferenceClient {
    engine: Arc<ScoringEngine>,
    timeout: Duration,
}

impl LocalInferenceClient {
    pub fn new(engine: Arc<ScoringEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }
}

#[async_trait]
impl BatchScorer for LocalInferenceClient {
    async fn score_batch(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<Vec<PredictionResult>, InferenceError> {
        let engine = Arc::clone(&self.engine);
        let owned = vectors.to_vec();
        let task = tokio::task::spawn_blocking(move || engine.score_batch(&owned));

        let results = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(scored)) => scored?,
            Ok(Err(join)) => return Err(InferenceError::Transport(join.to_string())),
            Err(_) => return Err(InferenceError::Timeout(self.timeout)),
        };

        ensure_aligned(vectors, results)
    }
}
