//! HTTP API tests against the in-memory store.
//!
//! Tests cover:
//! - Increment and read endpoints
//! - Repeated `field` parameters
//! - Argument errors and their codes
//! - Health and metrics endpoints
//! - Response envelope serialization

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use forget_core::api::{self, ApiResponse, AppState};
use forget_core::config::DecayConfig;
use forget_core::decay::now_unix;
use forget_core::health::{HealthService, PipelineHealthChecker, StoreHealthChecker};
use forget_core::pipeline::{PipelineStats, UpdateQueue};
use forget_core::service::ForgetService;
use forget_core::store::MemoryStore;
use forget_core::telemetry::MetricsRegistry;
use serde_json::{json, Value};
use tokio::sync::mpsc::Receiver;
use tower::ServiceExt;

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    _rx: Receiver<forget_core::distribution::Distribution>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (queue, rx) = UpdateQueue::bounded(64, Duration::from_millis(10));
    let defaults = DecayConfig {
        default_rate: 1e-9,
        ..DecayConfig::default()
    };

    let health = HealthService::new(Duration::from_secs(1))
        .with_checker(Arc::new(StoreHealthChecker::new(store.clone())))
        .with_checker(Arc::new(PipelineHealthChecker::new(
            queue.clone(),
            PipelineStats::new(),
        )));

    let state = AppState {
        service: ForgetService::new(store.clone(), queue, defaults),
        health: Arc::new(health),
        metrics: MetricsRegistry::disabled(),
    };

    Harness {
        app: api::build_router(state),
        store,
        _rx: rx,
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

// ============================================================================
// ApiResponse Tests
// ============================================================================

#[test]
fn test_api_response_success() {
    let response = ApiResponse::success("test data");

    assert!(response.success);
    assert_eq!(response.data, Some("test data"));
    assert!(response.error.is_none());
}

#[test]
fn test_api_response_serialization_skips_empty_fields() {
    let response = ApiResponse::success(json!({"dbsize": 3}));
    let parsed: Value = serde_json::to_value(&response).unwrap();

    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["data"]["dbsize"], 3);
    assert!(parsed.get("error").is_none());
    assert!(parsed.get("error_code").is_none());
}

// ============================================================================
// Increment
// ============================================================================

#[tokio::test]
async fn test_incr_with_repeated_fields() {
    let h = harness();

    let (status, body) = get(&h.app, "/incr?distribution=colors&field=red&field=blue&N=4").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["fields"], json!(["red", "blue"]));
    assert_eq!(body["data"]["N"], 4);
    assert_eq!(h.store.count("colors", "red"), Some(4));
    assert_eq!(h.store.count("colors", "blue"), Some(4));
    assert_eq!(h.store.mass("colors"), Some(8));
}

#[tokio::test]
async fn test_incr_defaults_to_one() {
    let h = harness();

    let (status, _) = get(&h.app, "/incr?distribution=colors&field=red").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.count("colors", "red"), Some(1));
}

#[tokio::test]
async fn test_incr_missing_distribution() {
    let h = harness();

    let (status, body) = get(&h.app, "/incr?field=red").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "MISSING_ARG_DISTRIBUTION");
    assert_eq!(body["error_code"], "MISSING_ARGUMENT");
}

#[tokio::test]
async fn test_incr_missing_field() {
    let h = harness();

    let (status, body) = get(&h.app, "/incr?distribution=colors").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "MISSING_ARG_FIELD");
}

#[tokio::test]
async fn test_incr_bad_amount() {
    let h = harness();

    let (status, body) = get(&h.app, "/incr?distribution=colors&field=red&N=lots").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "CANNOT_PARSE_N");
    assert_eq!(body["error_code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_incr_amount_out_of_range() {
    let h = harness();

    for uri in [
        "/incr?distribution=colors&field=red&N=9223372036854775808",
        "/incr?distribution=colors&field=red&N=0",
        "/incr?distribution=colors&field=red&field=blue&N=9223372036854775807",
    ] {
        let (status, body) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
        assert_eq!(body["error"], "CANNOT_PARSE_N");
    }

    assert_eq!(h.store.count("colors", "red"), None);
    assert_eq!(h.store.mass("colors"), None);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_get_fields() {
    let h = harness();
    h.store.seed("colors", &[("red", 6), ("blue", 2), ("green", 2)], now_unix());

    let (status, body) = get(&h.app, "/get?distribution=colors&field=red&field=purple").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["distribution"], "colors");
    assert_eq!(data["Z"], 10);
    assert_eq!(data["full"], false);
    assert_eq!(data["data"][0]["bin"], "red");
    assert_eq!(data["data"][0]["count"], 6);
    assert_eq!(data["data"][1]["bin"], "purple");
    assert_eq!(data["data"][1]["count"], 0);
}

#[tokio::test]
async fn test_dist_is_normalized() {
    let h = harness();
    h.store.seed("colors", &[("red", 3), ("blue", 1)], now_unix());

    let (status, body) = get(&h.app, "/dist?distribution=colors").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["Z"], 4);
    assert_eq!(data["full"], true);
    assert_eq!(data["data"][0]["p"], 0.75);
    assert_eq!(data["data"][1]["p"], 0.25);
}

#[tokio::test]
async fn test_dist_uses_request_rate_and_prune() {
    let h = harness();
    h.store.seed("colors", &[("red", 3)], now_unix());

    let (status, body) = get(&h.app, "/dist?distribution=colors&rate=0.000001&prune=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rate"], 0.000001);
    assert_eq!(body["data"]["prune"], true);
}

#[tokio::test]
async fn test_dist_bad_rate() {
    let h = harness();

    let (status, body) = get(&h.app, "/dist?distribution=colors&rate=fast").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "CANNOT_PARSE_RATE");
}

#[tokio::test]
async fn test_dist_missing_distribution() {
    let h = harness();

    let (status, body) = get(&h.app, "/dist").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "MISSING_ARG_DISTRIBUTION");
}

#[tokio::test]
async fn test_nmostprobable_limits_bins() {
    let h = harness();
    h.store.seed(
        "colors",
        &[("red", 9), ("blue", 5), ("green", 1), ("cyan", 7)],
        now_unix(),
    );

    let (status, body) = get(&h.app, "/nmostprobable?distribution=colors&N=2").await;

    assert_eq!(status, StatusCode::OK);
    let bins: Vec<&str> = body["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["bin"].as_str().unwrap())
        .collect();
    assert_eq!(bins, vec!["red", "cyan"]);
    assert_eq!(body["data"]["Z"], 22);
}

#[tokio::test]
async fn test_dbsize() {
    let h = harness();
    h.store.seed("colors", &[("red", 1)], now_unix());

    let (status, body) = get(&h.app, "/dbsize").await;

    assert_eq!(status, StatusCode::OK);
    // the set plus its _Z and _T keys
    assert_eq!(body["data"]["dbsize"], 3);
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[tokio::test]
async fn test_health() {
    let h = harness();

    let (status, body) = get(&h.app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_metrics_is_text() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_unknown_route() {
    let h = harness();

    let (status, _) = get(&h.app, "/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
