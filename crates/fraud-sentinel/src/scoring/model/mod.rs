//! Scoring model capability, concrete backends and the artifact lifecycle.

mod cache;
mod dense;
mod handle;
#[cfg(feature = "onnx")]
mod onnx;

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::storage::StorageError;

pub use cache::ModelCache;
pub use dense::{Activation, DenseAutoencoder, DenseLayer};
pub use handle::{ModelHandle, ModelState};
#[cfg(feature = "onnx")]
pub use onnx::OnnxAutoencoder;

/// A model that reconstructs a batch of feature rows.
///
/// Implementations must be read-only during inference so that one instance
/// can serve concurrent scoring calls.
pub trait ScoringModel: Send + Sync + Debug {
    fn input_dim(&self) -> usize;

    /// Returns one reconstruction row per input row, same shape as `batch`.
    fn reconstruct(&self, batch: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model artifact {path}: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },
    #[error("unsupported model artifact format '{0}'")]
    UnsupportedFormat(String),
    #[error("model expects {found} input features, configured dimension is {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("model returned a {found:?} reconstruction for a {expected:?} batch")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("model runtime failure: {0}")]
    Runtime(String),
    #[error("model artifact cache error at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Loads an artifact from local disk, choosing the backend from its extension.
pub fn load_model(path: &Path, input_dim: usize) -> Result<Arc<dyn ScoringModel>, ModelError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let model: Arc<dyn ScoringModel> = match extension.as_str() {
        "json" => Arc::new(DenseAutoencoder::from_path(path)?),
        #[cfg(feature = "onnx")]
        "onnx" => Arc::new(OnnxAutoencoder::from_path(path, input_dim)?),
        other => return Err(ModelError::UnsupportedFormat(other.to_string())),
    };

    if model.input_dim() != input_dim {
        return Err(ModelError::DimensionMismatch {
            expected: input_dim,
            found: model.input_dim(),
        });
    }

    Ok(model)
}
