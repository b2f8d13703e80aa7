//! Output records and the append-only analytical sinks that store them.

mod jsonl;
mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{FeatureVector, PredictionResult, TransactionStatus};

pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

/// Column layout of the analytical table.
pub const TABLE_SCHEMA: &[(&str, &str)] = &[
    ("filename", "STRING"),
    ("transaction_id", "STRING"),
    ("timestamp", "TIMESTAMP"),
    ("features", "STRING"),
    ("autoencoder_error", "FLOAT"),
    ("status", "STRING"),
];

/// One scored transaction row as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub filename: String,
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    /// JSON-encoded feature array.
    pub features: String,
    pub autoencoder_error: f64,
    pub status: TransactionStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{predictions} predictions for {vectors} feature rows")]
    LengthMismatch { vectors: usize, predictions: usize },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait RecordSink: Send + Sync + std::fmt::Debug {
    /// Appends records in order. Never rewrites earlier rows.
    async fn append(&self, records: &[OutputRecord]) -> Result<(), SinkError>;
}

pub fn transaction_id(filename: &str, index: usize) -> String {
    format!("{filename}_row_{index}")
}

/// Pairs each feature row with its prediction by index.
pub fn build_records(
    filename: &str,
    timestamp: DateTime<Utc>,
    vectors: &[FeatureVector],
    predictions: &[PredictionResult],
) -> Result<Vec<OutputRecord>, SinkError> {
    if vectors.len() != predictions.len() {
        return Err(SinkError::LengthMismatch {
            vectors: vectors.len(),
            predictions: predictions.len(),
        });
    }

    vectors
        .iter()
        .zip(predictions)
        .enumerate()
        .map(|(index, (vector, prediction))| -> Result<OutputRecord, SinkError> {
            Ok(OutputRecord {
                filename: filename.to_string(),
                transaction_id: transaction_id(filename, index),
                timestamp,
                features: serde_json::to_string(vector.values())?,
                autoencoder_error: prediction.reconstruction_error,
                status: prediction.status,
            })
        })
        .collect()
}
