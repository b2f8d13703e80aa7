use std::sync::Arc;

use ndarray::{Array2, Axis};

use super::domain::{FeatureVector, PredictionResult};
use super::model::{ModelError, ModelHandle, ModelState};

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("model is not available (state {state})")]
    ModelUnavailable { state: ModelState },
    #[error("Invalid input. Expected {expected} features, got {found}")]
    Validation {
        expected: usize,
        found: usize,
        position: usize,
    },
    #[error("Invalid input. At least one transaction is required")]
    EmptyBatch,
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ScoringError {
    /// Whether the caller sent bad input, as opposed to the service failing.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::EmptyBatch)
    }
}

/// Turns feature vectors into verdicts with the shared model handle.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    model: Arc<ModelHandle>,
    threshold: f64,
}

impl ScoringEngine {
    pub fn new(model: Arc<ModelHandle>, threshold: f64) -> Self {
        Self { model, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    pub fn model_state(&self) -> ModelState {
        self.model.state()
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn score(&self, vector: &FeatureVector) -> Result<PredictionResult, ScoringError> {
        let mut results = self.score_batch(std::slice::from_ref(vector))?;
        results.pop().ok_or(ScoringError::EmptyBatch)
    }

    /// Scores the whole batch with one reconstruction pass. Results follow
    /// input order.
    pub fn score_batch(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<Vec<PredictionResult>, ScoringError> {
        let model = self.model.model().ok_or(ScoringError::ModelUnavailable {
            state: self.model.state(),
        })?;

        let expected = self.model.input_dim();
        if vectors.is_empty() {
            return Err(ScoringError::EmptyBatch);
        }
        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != expected)
        {
            return Err(ScoringError::Validation {
                expected,
                found: vector.len(),
                position,
            });
        }

        let flat: Vec<f64> = vectors
            .iter()
            .flat_map(|vector| vector.values().iter().copied())
            .collect();
        let input = Array2::from_shape_vec((vectors.len(), expected), flat)
            .map_err(|err| ModelError::Runtime(err.to_string()))?;

        let reconstruction = model.reconstruct(input.view())?;
        if reconstruction.dim() != input.dim() {
            return Err(ModelError::ShapeMismatch {
                expected: input.dim(),
                found: reconstruction.dim(),
            }
            .into());
        }

        let errors = (&input - &reconstruction)
            .mapv(f64::abs)
            .mean_axis(Axis(1))
            .ok_or(ModelError::ShapeMismatch {
                expected: input.dim(),
                found: reconstruction.dim(),
            })?;

        Ok(errors
            .iter()
            .map(|error| PredictionResult::classify(*error, self.threshold))
            .collect())
    }
}
