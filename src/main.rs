use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use jimeng_gateway::app_state::AppState;
use jimeng_gateway::config::AppConfig;
use jimeng_gateway::routes;
use jimeng_gateway::services::{
    generation::GenerationService,
    ids::{IdGenerator, UuidIdGenerator},
    orchestrator::TaskOrchestrator,
    vendor::{DreaminaClient, RemoteJobClient},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing jimeng-gateway server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Generation jobs accepted by the vendor"
    );
    metrics::describe_counter!(
        "generation_jobs_completed_total",
        "Generation jobs that produced a result"
    );
    metrics::describe_counter!(
        "generation_jobs_failed_total",
        "Generation jobs that ended in an error, by error kind"
    );
    metrics::describe_counter!(
        "generation_partial_results_total",
        "Generation jobs that timed out with fewer items than expected"
    );
    metrics::describe_histogram!(
        "generation_poll_seconds",
        "Wall-clock time spent polling a job to its exit"
    );

    let ids: Arc<dyn IdGenerator> = Arc::new(UuidIdGenerator::new(false));

    tracing::info!(
        request_timeout_secs = config.request_timeout_seconds,
        retry_attempts = config.retry_attempts,
        "Initializing Dreamina client"
    );
    let vendor = DreaminaClient::new(config.request_timeout(), config.retry_policy(), Arc::clone(&ids))
        .expect("Failed to initialize Dreamina client");
    let vendor = Arc::new(vendor);

    let generation = GenerationService::new(
        Arc::clone(&vendor) as Arc<dyn RemoteJobClient>,
        Arc::clone(&ids),
        TaskOrchestrator::new(config.stream_channel_capacity),
        config.image_polling(),
        config.video_polling(),
    );

    // Create shared application state
    let state = AppState::new(generation, vendor, ids);

    let app = routes::app_router(state, prometheus_handle)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting jimeng-gateway on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
