use crate::infra::AppState;
use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use fraud_sentinel::scoring::{prediction_router, ModelState, ScoringEngine};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub(crate) fn with_service_routes(engine: Arc<ScoringEngine>) -> Router {
    prediction_router(engine)
        .route("/", get(root_endpoint))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/notifications", post(notification_endpoint))
}

pub(crate) async fn root_endpoint(Extension(state): Extension<AppState>) -> Json<serde_json::Value> {
    info!("root endpoint hit");
    Json(json!({ "status": format!("{} is running", state.project_name) }))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let model_state = state.model.state();
    match model_state {
        ModelState::Loaded => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "model": model_state })),
        ),
        ModelState::Failed => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "failed",
                "model": model_state,
                "reason": state.model.failure_reason(),
            })),
        ),
        ModelState::Uninitialized | ModelState::Downloading => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing", "model": model_state })),
        ),
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Push endpoint for storage notifications. Processing happens in the
/// background and the push is always acknowledged, so a notification is
/// handled at most once.
pub(crate) async fn notification_endpoint(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> StatusCode {
    state
        .notifications
        .dispatch(state.pipeline.clone(), body.to_vec());
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{NotificationWorkers, Services};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use fraud_sentinel::config::{
        AppConfig, AppEnvironment, LogFormat, ModelConfig, PipelineConfig, ServerConfig,
        SinkConfig, StorageBackend, StorageConfig, TelemetryConfig,
    };
    use std::path::Path;
    use std::time::Duration;
    use fraud_sentinel::sink::{MemorySink, RecordSink};
    use fraud_sentinel::storage::LocalObjectStore;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: AppState,
        services: Services,
        config: AppConfig,
        store: LocalObjectStore,
        sink: Arc<MemorySink>,
        _dir: tempfile::TempDir,
    }

    fn config(root: &Path) -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            project_name: "Credit Card Fraud Detector API".to_string(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                format: LogFormat::Compact,
            },
            model: ModelConfig {
                input_dim: 29,
                threshold: 0.5,
                filename: "autoencoder.json".to_string(),
                base_dir: "fraudapp".to_string(),
                dir_path: "models".to_string(),
                cache_root: root.join("cache"),
                bucket: Some("models".to_string()),
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                endpoint: "http://127.0.0.1".to_string(),
                access_token: None,
                local_root: root.to_path_buf(),
                timeout: Duration::from_secs(5),
            },
            pipeline: PipelineConfig {
                api_url: None,
                inference_timeout: Duration::from_secs(5),
                workers: 1,
            },
            sink: SinkConfig {
                table_path: root.join("predictions.jsonl"),
            },
        }
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let sink = Arc::new(MemorySink::new());
        let sink_dyn: Arc<dyn RecordSink> = sink.clone();
        let store = LocalObjectStore::new(dir.path());
        let services = Services::with_parts(&config, Arc::new(store.clone()), sink_dyn)
            .expect("services");

        let recorder = PrometheusBuilder::new().build_recorder();
        let state = AppState {
            project_name: Arc::from("Credit Card Fraud Detector API"),
            model: services.model.clone(),
            pipeline: services.pipeline.clone(),
            metrics: Arc::new(recorder.handle()),
            notifications: Arc::new(NotificationWorkers::new(config.pipeline.workers)),
        };
        let router = with_service_routes(services.engine.clone()).layer(Extension(state.clone()));

        TestApp {
            router,
            state,
            services,
            config,
            store,
            sink,
            _dir: dir,
        }
    }

    /// Waits until every accepted notification has been processed.
    async fn settle(state: &AppState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.notifications.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("notifications settle");
    }

    async fn post_notification(router: Router, body: String) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/notifications")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request");
        router.oneshot(request).await.expect("response").status()
    }

    /// Zero-weight autoencoder: every row reconstructs to zeros.
    fn zero_model_artifact(dim: usize) -> String {
        json!({
            "layers": [{
                "weights": vec![vec![0.0; dim]; dim],
                "bias": vec![0.0; dim],
                "activation": "linear"
            }]
        })
        .to_string()
    }

    fn transactions_csv(amounts: &[f64]) -> String {
        let mut header = vec!["Time".to_string()];
        header.extend((1..29).map(|index| format!("V{index}")));
        header.push("Amount".to_string());
        header.push("Class".to_string());

        let mut csv = header.join(",");
        csv.push('\n');
        for (row, amount) in amounts.iter().enumerate() {
            let mut cells = vec![row.to_string()];
            cells.extend((1..29).map(|_| "0".to_string()));
            cells.push(amount.to_string());
            cells.push("0".to_string());
            csv.push_str(&cells.join(","));
            csv.push('\n');
        }
        csv
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
        let response = router.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn root_reports_project_name() {
        let app = test_app();
        let (status, body) = get_json(app.router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Credit Card Fraud Detector API is running");
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let app = test_app();
        let (status, body) = get_json(app.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_waits_for_the_model() {
        let app = test_app();
        assert_eq!(app.state.model.state(), ModelState::Uninitialized);

        let (status, body) = get_json(app.router, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["model"], "UNINITIALIZED");
    }

    #[tokio::test]
    async fn predictions_fail_until_the_model_loads() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/prediction/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "features": vec![0.0; 29] }).to_string()))
            .expect("request");

        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn notifications_are_acknowledged_even_when_ignored() {
        let app = test_app();
        app.store
            .put("landing", "incoming/tx.csv", transactions_csv(&[10.0]).as_bytes())
            .await
            .expect("seed csv");
        let body = json!({
            "kind": "storage#bucket",
            "bucket": "landing",
            "name": "incoming/tx.csv",
            "timeCreated": "2024-03-01T12:00:00Z"
        })
        .to_string();

        let status = post_notification(app.router.clone(), body).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        settle(&app.state).await;
        assert!(app.sink.records().is_empty());
    }

    #[tokio::test]
    async fn pushed_object_notifications_reach_the_sink() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;

        let app = test_app();
        app.store
            .put(
                "models",
                "fraudapp/models/autoencoder.json",
                zero_model_artifact(29).as_bytes(),
            )
            .await
            .expect("seed model");
        let cache = app.services.model_cache(&app.config).expect("cache");
        assert_eq!(app.state.model.initialize(&cache).await, ModelState::Loaded);

        app.store
            .put("landing", "incoming/tx.csv", transactions_csv(&[10.0, 100.0]).as_bytes())
            .await
            .expect("seed csv");
        let notification = json!({
            "kind": "storage#object",
            "bucket": "landing",
            "name": "incoming/tx.csv",
            "timeCreated": "2024-03-01T12:00:00Z"
        })
        .to_string();
        let envelope = json!({
            "message": {
                "data": STANDARD.encode(notification),
                "messageId": "1"
            },
            "subscription": "projects/demo/subscriptions/landing"
        })
        .to_string();

        let status = post_notification(app.router.clone(), envelope).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        settle(&app.state).await;
        let records = app.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transaction_id, "tx.csv_row_0");
        assert_eq!(records[1].transaction_id, "tx.csv_row_1");
        assert_eq!(records[0].filename, "tx.csv");
        assert!(records[0].autoencoder_error < records[1].autoencoder_error);
    }
}
