use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::info;

use super::{ModelError, ScoringModel};

/// Autoencoder exported to ONNX, executed with ONNX Runtime.
///
/// `Session::run` needs exclusive access, so calls are serialized on a mutex.
pub struct OnnxAutoencoder {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_dim: usize,
}

impl OnnxAutoencoder {
    pub fn from_path(path: &Path, input_dim: usize) -> Result<Self, ModelError> {
        let invalid = |err: ort::Error| ModelError::InvalidArtifact {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        let session = Session::builder()
            .map_err(invalid)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(invalid)?
            .commit_from_file(path)
            .map_err(invalid)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| ModelError::InvalidArtifact {
                path: path.to_path_buf(),
                reason: "model declares no inputs".to_string(),
            })?;
        let input_name = input.name.clone();
        // Dynamic feature axes fall back to the configured width.
        let input_dim = input
            .input_type
            .tensor_shape()
            .and_then(|shape| declared_width(shape))
            .unwrap_or(input_dim);
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ModelError::InvalidArtifact {
                path: path.to_path_buf(),
                reason: "model declares no outputs".to_string(),
            })?;

        info!(
            path = %path.display(),
            input = %input_name,
            output = %output_name,
            input_dim,
            "onnx autoencoder loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_dim,
        })
    }
}

/// Width of the feature axis, when the graph fixes it.
fn declared_width(shape: &[i64]) -> Option<usize> {
    shape
        .last()
        .copied()
        .filter(|width| *width > 0)
        .and_then(|width| usize::try_from(width).ok())
}

impl std::fmt::Debug for OnnxAutoencoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxAutoencoder")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_dim", &self.input_dim)
            .finish_non_exhaustive()
    }
}

impl ScoringModel for OnnxAutoencoder {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn reconstruct(&self, batch: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let (rows, cols) = batch.dim();
        let data: Vec<f32> = batch.iter().map(|value| *value as f32).collect();
        let tensor = Tensor::from_array((vec![rows as i64, cols as i64], data))
            .map_err(|err| ModelError::Runtime(err.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::Runtime("onnx session mutex poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|err| ModelError::Runtime(err.to_string()))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| ModelError::Runtime(format!("missing output '{}'", self.output_name)))?;
        let (_, values) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| ModelError::Runtime(err.to_string()))?;

        let values: Vec<f64> = values.iter().map(|value| f64::from(*value)).collect();
        let found = values.len();
        Array2::from_shape_vec((rows, cols), values).map_err(|_| ModelError::ShapeMismatch {
            expected: (rows, cols),
            found: (found / cols.max(1), cols),
        })
    }
}
