use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use super::domain::{
    FeatureVector, PredictionBatchResponse, TransactionBatchRequest, TransactionRequest,
};
use super::engine::{ScoringEngine, ScoringError};

/// Single and batch prediction endpoints backed by the in-process engine.
pub fn prediction_router(engine: Arc<ScoringEngine>) -> Router {
    Router::new()
        .route("/api/prediction/sanityCheck", get(sanity_check))
        .route("/api/prediction", post(predict_handler))
        .route("/api/prediction/", post(predict_handler))
        .route("/api/prediction/batch", post(predict_batch_handler))
        .with_state(engine)
}

async fn sanity_check() -> Json<&'static str> {
    Json("prediction fine")
}

pub(crate) async fn predict_handler(
    State(engine): State<Arc<ScoringEngine>>,
    Json(request): Json<TransactionRequest>,
) -> Response {
    let vector = FeatureVector::new(request.features);
    let scored = tokio::task::spawn_blocking(move || engine.score(&vector)).await;

    match scored {
        Ok(Ok(prediction)) => (StatusCode::OK, Json(prediction)).into_response(),
        Ok(Err(err)) => scoring_failure(err),
        Err(join) => {
            error!(error = %join, "prediction task failed");
            internal_error()
        }
    }
}

pub(crate) async fn predict_batch_handler(
    State(engine): State<Arc<ScoringEngine>>,
    Json(request): Json<TransactionBatchRequest>,
) -> Response {
    let vectors = request.into_vectors();
    let scored = tokio::task::spawn_blocking(move || engine.score_batch(&vectors)).await;

    match scored {
        Ok(Ok(transactions)) => {
            (StatusCode::OK, Json(PredictionBatchResponse { transactions })).into_response()
        }
        Ok(Err(err)) => scoring_failure(err),
        Err(join) => {
            error!(error = %join, "batch prediction task failed");
            internal_error()
        }
    }
}

fn scoring_failure(err: ScoringError) -> Response {
    if err.is_validation() {
        warn!(error = %err, "rejected prediction request");
        let payload = json!({ "detail": err.to_string() });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }

    error!(error = %err, "prediction failed");
    internal_error()
}

fn internal_error() -> Response {
    let payload = json!({ "detail": "Internal server error during prediction." });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
