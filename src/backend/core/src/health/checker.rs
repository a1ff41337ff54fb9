//! Component health checkers.

use super::ComponentHealth;
use crate::pipeline::{PipelineStats, UpdateQueue};
use crate::store::DistributionStore;
use async_trait::async_trait;
use std::sync::Arc;

/// A component that can report its own health.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;
}

/// Pings the distribution store.
pub struct StoreHealthChecker {
    store: Arc<dyn DistributionStore>,
    latency_threshold_ms: u64,
}

impl StoreHealthChecker {
    pub fn new(store: Arc<dyn DistributionStore>) -> Self {
        Self {
            store,
            latency_threshold_ms: 100,
        }
    }

    pub fn with_latency_threshold(mut self, threshold_ms: u64) -> Self {
        self.latency_threshold_ms = threshold_ms;
        self
    }
}

#[async_trait]
impl HealthChecker for StoreHealthChecker {
    fn name(&self) -> &str {
        "store"
    }

    async fn check(&self) -> ComponentHealth {
        match self.store.ping().await {
            Ok(latency) => {
                let mut health = ComponentHealth::healthy(self.name())
                    .with_latency(latency)
                    .with_metadata("backend", self.store.backend_name());
                health.check_latency_threshold(self.latency_threshold_ms);
                health
            }
            Err(e) => ComponentHealth::unhealthy(self.name())
                .with_error(e.user_message().to_string())
                .with_metadata("backend", self.store.backend_name()),
        }
    }
}

/// Reports queue pressure and write-back counters.
pub struct PipelineHealthChecker {
    queue: UpdateQueue,
    stats: PipelineStats,
}

impl PipelineHealthChecker {
    pub fn new(queue: UpdateQueue, stats: PipelineStats) -> Self {
        Self { queue, stats }
    }
}

#[async_trait]
impl HealthChecker for PipelineHealthChecker {
    fn name(&self) -> &str {
        "pipeline"
    }

    async fn check(&self) -> ComponentHealth {
        let depth = self.queue.depth();
        let capacity = self.queue.capacity();

        let health = if self.queue.is_closed() {
            ComponentHealth::unhealthy(self.name()).with_error("update queue is closed")
        } else if depth >= capacity {
            ComponentHealth::degraded(self.name()).with_message("update queue is full")
        } else {
            ComponentHealth::healthy(self.name())
        };

        health
            .with_metadata("queue_depth", depth)
            .with_metadata("queue_capacity", capacity)
            .with_metadata("stats", self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;
    use crate::health::HealthStatus;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_store_checker_healthy() {
        let checker = StoreHealthChecker::new(Arc::new(MemoryStore::new()));
        let health = checker.check().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.metadata["backend"], "memory");
    }

    #[tokio::test]
    async fn test_pipeline_checker_reports_full_queue() {
        let (queue, _rx) = UpdateQueue::bounded(1, Duration::from_millis(10));
        let checker = PipelineHealthChecker::new(queue.clone(), PipelineStats::new());

        assert_eq!(checker.check().await.status, HealthStatus::Healthy);

        queue.enqueue(Distribution::new("a", 0.5, false)).await.unwrap();
        let health = checker.check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.metadata["queue_depth"], 1);
    }
}
