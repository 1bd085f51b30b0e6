pub mod auth;
pub mod chat;
pub mod error;
pub mod health;
pub mod images;
pub mod metrics;
pub mod models;
pub mod token;
pub mod videos;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::app_state::AppState;

/// Every route except `/metrics`, which carries its own state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health_check))
        .route("/v1/models", get(models::list_models))
        .route("/v1/images/generations", post(images::create_images))
        .route("/v1/videos/generations", post(videos::create_video))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/token/check", post(token::check_token))
        .route("/token/points", post(token::token_points))
        .with_state(state)
}

pub fn app_router(state: AppState, prometheus_handle: Arc<PrometheusHandle>) -> Router {
    api_router(state).route(
        "/metrics",
        get(metrics::prometheus_metrics).with_state(prometheus_handle),
    )
}
