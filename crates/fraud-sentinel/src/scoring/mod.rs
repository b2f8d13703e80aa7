//! Scoring engine: model lifecycle, batch reconstruction scoring and the
//! prediction HTTP boundary.

pub mod domain;
pub mod engine;
pub mod model;
pub mod router;

pub use domain::{
    FeatureVector, PredictionBatchResponse, PredictionResult, TransactionBatchRequest,
    TransactionRequest, TransactionStatus,
};
pub use engine::{ScoringEngine, ScoringError};
pub use model::{load_model, ModelCache, ModelError, ModelHandle, ModelState, ScoringModel};
pub use router::prediction_router;
