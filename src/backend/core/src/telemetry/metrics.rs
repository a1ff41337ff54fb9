//! Prometheus metrics.
//!
//! Metrics are recorded with the `metrics` macros at the call sites; this
//! module installs the recorder and describes what is emitted.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Renders the installed recorder for the scrape endpoint.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry that renders nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the global Prometheus recorder.
pub fn init_metrics(enabled: bool) -> anyhow::Result<MetricsRegistry> {
    if !enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])?
        .install_recorder()?;

    register_metric_descriptions();
    tracing::info!("Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!("forget_increments_total", "Fields incremented");
    describe_counter!("forget_reads_total", "Distribution reads by kind");
    describe_counter!("forget_writebacks_total", "Write-backs by outcome");
    describe_counter!(
        "forget_enqueue_rejected_total",
        "Distributions dropped because the update queue stayed full"
    );
    describe_counter!("forget_errors_total", "Errors by code, category and severity");
    describe_counter!("forget_store_operations_total", "Store operations by backend and kind");
    describe_histogram!(
        "forget_writeback_duration_seconds",
        "Time spent reconciling one distribution with the store"
    );
}
