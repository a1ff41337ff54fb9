//! HTTP API for Forget.
//!
//! Every operation is a `GET` with its arguments in the query string:
//!
//! - `/incr?distribution=&field=&field=…&N=`
//! - `/get?distribution=&field=…&rate=&prune=`
//! - `/dist?distribution=&rate=&prune=`
//! - `/nmostprobable?distribution=&N=&rate=&prune=`
//! - `/dbsize`
//! - `/health`, `/metrics`
//!
//! Successful responses use the [`ApiResponse`] envelope; failures render a
//! [`crate::error::ErrorResponse`].

mod handlers;
mod params;

pub use params::QueryParams;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::health::HealthService;
use crate::service::ForgetService;
use crate::telemetry::MetricsRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ForgetService,
    pub health: Arc<HealthService>,
    pub metrics: MetricsRegistry,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/incr", get(handlers::increment))
        .route("/get", get(handlers::get_field))
        .route("/dist", get(handlers::get_distribution))
        .route("/nmostprobable", get(handlers::get_top_n))
        .route("/dbsize", get(handlers::db_size))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// API response wrapper.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }
}
