use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};
use serde::Deserialize;

use super::{ModelError, ScoringModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(self, values: &mut Array2<f64>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => values.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => values.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => values.mapv_inplace(f64::tanh),
        }
    }
}

/// Fully connected layer; `weights` is `inputs x outputs`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl DenseLayer {
    pub fn new(
        weights: Array2<f64>,
        bias: Array1<f64>,
        activation: Activation,
    ) -> Result<Self, String> {
        if bias.len() != weights.ncols() {
            return Err(format!(
                "bias has {} entries but the layer has {} outputs",
                bias.len(),
                weights.ncols()
            ));
        }
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    fn forward(&self, input: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut output = input.dot(&self.weights) + &self.bias;
        self.activation.apply(&mut output);
        output
    }
}

/// Pure-Rust autoencoder made of dense layers.
#[derive(Debug, Clone)]
pub struct DenseAutoencoder {
    layers: Vec<DenseLayer>,
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    layers: Vec<ArtifactLayer>,
}

#[derive(Debug, Deserialize)]
struct ArtifactLayer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default)]
    activation: Activation,
}

impl DenseAutoencoder {
    /// Chains layers, requiring each to consume the previous layer's output and
    /// the last to reproduce the input width.
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, String> {
        let first = layers.first().ok_or("model has no layers")?;
        let input_dim = first.inputs();

        for (index, pair) in layers.windows(2).enumerate() {
            if pair[0].outputs() != pair[1].inputs() {
                return Err(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    index,
                    pair[0].outputs(),
                    index + 1,
                    pair[1].inputs()
                ));
            }
        }

        let output_dim = layers.last().map(DenseLayer::outputs).unwrap_or(0);
        if output_dim != input_dim {
            return Err(format!(
                "reconstruction width {output_dim} differs from input width {input_dim}"
            ));
        }

        Ok(Self { layers })
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&raw).map_err(|reason| ModelError::InvalidArtifact {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, String> {
        let artifact: ArtifactFile = serde_json::from_slice(raw).map_err(|err| err.to_string())?;

        let layers = artifact
            .layers
            .into_iter()
            .enumerate()
            .map(|(index, layer)| {
                let rows = layer.weights.len();
                let cols = layer.weights.first().map(Vec::len).unwrap_or(0);
                if rows == 0 || cols == 0 {
                    return Err(format!("layer {index} has empty weights"));
                }
                if layer.weights.iter().any(|row| row.len() != cols) {
                    return Err(format!("layer {index} has ragged weight rows"));
                }
                let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
                let weights = Array2::from_shape_vec((rows, cols), flat)
                    .map_err(|err| format!("layer {index}: {err}"))?;
                DenseLayer::new(weights, Array1::from(layer.bias), layer.activation)
                    .map_err(|err| format!("layer {index}: {err}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(layers)
    }
}

impl ScoringModel for DenseAutoencoder {
    fn input_dim(&self) -> usize {
        self.layers.first().map(DenseLayer::inputs).unwrap_or(0)
    }

    fn reconstruct(&self, batch: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        if batch.ncols() != self.input_dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim(),
                found: batch.ncols(),
            });
        }

        let mut current = batch.to_owned();
        for layer in &self.layers {
            current = layer.forward(current.view());
        }
        Ok(current)
    }
}
