//! Batched inference: one scoring call per source file.

mod http;
mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::PipelineConfig;
use crate::scoring::{FeatureVector, PredictionResult, ScoringEngine, ScoringError};

pub use http::HttpInferenceClient;
pub use local::LocalInferenceClient;

/// Scores an ordered batch and returns one result per vector, in order.
#[async_trait]
pub trait BatchScorer: Send + Sync + std::fmt::Debug {
    async fn score_batch(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<Vec<PredictionResult>, InferenceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Transport(String),
    #[error("inference service answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not decode inference response: {0}")]
    Decode(String),
    #[error("inference returned {found} results for {expected} vectors")]
    LengthMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Remote client when `API_URL` is configured, otherwise the in-process engine.
pub fn from_config(
    config: &PipelineConfig,
    engine: Arc<ScoringEngine>,
) -> Result<Arc<dyn BatchScorer>, InferenceError> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpInferenceClient::new(
            url,
            config.inference_timeout,
        )?)),
        None => Ok(Arc::new(LocalInferenceClient::new(
            engine,
            config.inference_timeout,
        ))),
    }
}

pub(crate) fn ensure_aligned(
    vectors: &[FeatureVector],
    results: Vec<PredictionResult>,
) -> Result<Vec<PredictionResult>, InferenceError> {
    if results.len() != vectors.len() {
        return Err(InferenceError::LengthMismatch {
            expected: vectors.len(),
            found: results.len(),
        });
    }
    Ok(results)
}
