use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::info;

use super::{ensure_aligned, BatchScorer, InferenceError};
use crate::scoring::{
    FeatureVector, PredictionBatchResponse, PredictionResult, TransactionBatchRequest,
    TransactionRequest,
};

/// Posts whole batches to a remote batch prediction endpoint.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let url = Url::parse(url).map_err(|err| InferenceError::Transport(format!("{url}: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| InferenceError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl BatchScorer for HttpInferenceClient {
    async fn score_batch(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<Vec<PredictionResult>, InferenceError> {
        let payload = TransactionBatchRequest {
            transactions: vectors
                .iter()
                .map(|vector| TransactionRequest {
                    features: vector.values().to_vec(),
                })
                .collect(),
        };
        info!(url = %self.url, rows = vectors.len(), "sending batch for scoring");

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    InferenceError::Timeout(self.timeout)
                } else {
                    InferenceError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: PredictionBatchResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                InferenceError::Timeout(self.timeout)
            } else {
                InferenceError::Decode(err.to_string())
            }
        })?;

        ensure_aligned(vectors, decoded.transactions)
    }
}
