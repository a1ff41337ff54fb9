//! Request handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState, QueryParams};
use crate::error::ForgetError;

const DEFAULT_INCREMENT: u64 = 1;
const DEFAULT_TOP_N: usize = 10;

type Pairs = Query<Vec<(String, String)>>;

// ═══════════════════════════════════════════════════════════════════════════════
// Distribution Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub distribution: String,
    pub fields: Vec<String>,
    #[serde(rename = "N")]
    pub amount: u64,
}

pub async fn increment(
    State(state): State<AppState>,
    Query(pairs): Pairs,
) -> Result<impl IntoResponse, ForgetError> {
    let params = QueryParams::new(pairs);
    let distribution = params.require("distribution")?.to_string();
    let fields = params.require_all("field")?;
    let amount = params.parse::<u64>("N")?.unwrap_or(DEFAULT_INCREMENT);

    state
        .service
        .increment(&distribution, &fields, amount)
        .await?;

    Ok(Json(ApiResponse::success(IncrementResponse {
        distribution,
        fields,
        amount,
    })))
}

pub async fn get_field(
    State(state): State<AppState>,
    Query(pairs): Pairs,
) -> Result<impl IntoResponse, ForgetError> {
    let params = QueryParams::new(pairs);
    let distribution = params.require("distribution")?;
    let fields = params.require_all("field")?;

    let dist = state
        .service
        .get_field(distribution, &fields, params.rate()?, params.flag("prune")?)
        .await?;

    Ok(Json(ApiResponse::success(dist.snapshot())))
}

pub async fn get_distribution(
    State(state): State<AppState>,
    Query(pairs): Pairs,
) -> Result<impl IntoResponse, ForgetError> {
    let params = QueryParams::new(pairs);
    let distribution = params.require("distribution")?;

    let dist = state
        .service
        .get_distribution(distribution, params.rate()?, params.flag("prune")?)
        .await?;

    Ok(Json(ApiResponse::success(dist.snapshot())))
}

pub async fn get_top_n(
    State(state): State<AppState>,
    Query(pairs): Pairs,
) -> Result<impl IntoResponse, ForgetError> {
    let params = QueryParams::new(pairs);
    let distribution = params.require("distribution")?;
    let n = params.parse::<usize>("N")?.unwrap_or(DEFAULT_TOP_N);

    let dist = state
        .service
        .get_top_n(distribution, n, params.rate()?, params.flag("prune")?)
        .await?;

    Ok(Json(ApiResponse::success(dist.snapshot())))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbSizeResponse {
    pub dbsize: u64,
}

pub async fn db_size(State(state): State<AppState>) -> Result<impl IntoResponse, ForgetError> {
    let dbsize = state.service.size().await?;
    Ok(Json(ApiResponse::success(DbSizeResponse { dbsize })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check_health().await;
    let status = if report.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}
