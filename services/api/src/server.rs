use crate::cli::ServeArgs;
use crate::infra::{AppState, NotificationWorkers, Services};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fraud_sentinel::config::AppConfig;
use fraud_sentinel::error::AppError;
use fraud_sentinel::telemetry;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let services = Services::build(&config)?;
    let cache = services.model_cache(&config)?;

    let model = services.model.clone();
    tokio::spawn(async move {
        let state = model.initialize(&cache).await;
        info!(%state, "model lifecycle settled");
    });

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let app_state = AppState {
        project_name: Arc::from(config.project_name.as_str()),
        model: services.model.clone(),
        pipeline: services.pipeline.clone(),
        metrics: Arc::new(prometheus_handle),
        notifications: Arc::new(NotificationWorkers::new(config.pipeline.workers)),
    };

    let app = with_service_routes(services.engine.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        environment = ?config.environment,
        %addr,
        threshold = config.model.threshold,
        input_dim = config.model.input_dim,
        workers = config.pipeline.workers,
        "{} listening",
        config.project_name
    );

    axum::serve(listener, app).await?;
    Ok(())
}
