//! Telemetry: structured logging, optional OTLP trace export, and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use forget_core::telemetry::{self, TelemetryConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let handle = telemetry::init(&TelemetryConfig::default())?;
//! // ...
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, LogFormat};
pub use self::metrics::{init_metrics, MetricsRegistry};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name reported to trace collectors
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Log filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// OpenTelemetry OTLP endpoint; traces are only exported when set
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Install the Prometheus recorder
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            otlp_endpoint: None,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

fn default_service_name() -> String {
    "forget-server".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

/// Initialize metrics and logging. Call once at startup.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(config.metrics_enabled)?;
    init_logging(config)?;

    Ok(TelemetryHandle {
        metrics,
        otlp: config.otlp_endpoint.is_some(),
    })
}

/// Handle for managing telemetry lifecycle.
pub struct TelemetryHandle {
    /// Metrics handle for rendering the scrape endpoint
    pub metrics: MetricsRegistry,
    otlp: bool,
}

impl TelemetryHandle {
    /// Flush pending spans.
    pub fn shutdown(self) {
        if self.otlp {
            opentelemetry::global::shutdown_tracer_provider();
        }
        tracing::info!("Telemetry shutdown complete");
    }
}
