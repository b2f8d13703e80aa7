use serde::{Deserialize, Serialize};

/// Fixed-length numeric representation of one transaction.
///
/// The length must match the loaded model's input dimension before it can be
/// scored; the engine rejects mismatches instead of padding or truncating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Normal,
    FraudRisk,
}

impl TransactionStatus {
    /// Strictly greater than the threshold is a fraud risk; equality is normal.
    pub fn classify(reconstruction_error: f64, threshold: f64) -> Self {
        if reconstruction_error > threshold {
            Self::FraudRisk
        } else {
            Self::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::FraudRisk => "FRAUD_RISK",
        }
    }
}

/// Verdict for a single feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "autoencoder_error")]
    pub reconstruction_error: f64,
    pub status: TransactionStatus,
}

impl PredictionResult {
    pub fn classify(reconstruction_error: f64, threshold: f64) -> Self {
        Self {
            reconstruction_error,
            status: TransactionStatus::classify(reconstruction_error, threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBatchRequest {
    pub transactions: Vec<TransactionRequest>,
}

impl TransactionBatchRequest {
    pub fn into_vectors(self) -> Vec<FeatureVector> {
        self.transactions
            .into_iter()
            .map(|tx| FeatureVector::new(tx.features))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatchResponse {
    pub transactions: Vec<PredictionResult>,
}
