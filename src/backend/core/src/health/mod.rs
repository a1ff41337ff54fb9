//! Health checks for the store and the update pipeline.

mod check;
mod checker;

pub use check::*;
pub use checker::*;

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs every registered checker with a per-check timeout.
pub struct HealthService {
    check_timeout: Duration,
    checkers: Vec<Arc<dyn HealthChecker>>,
    started_at: Instant,
}

impl HealthService {
    pub fn new(check_timeout: Duration) -> Self {
        Self {
            check_timeout,
            checkers: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Run all health checks concurrently.
    pub async fn check_health(&self) -> HealthReport {
        let futures: Vec<_> = self
            .checkers
            .iter()
            .map(|checker| {
                let checker = checker.clone();
                let timeout = self.check_timeout;
                async move {
                    match tokio::time::timeout(timeout, checker.check()).await {
                        Ok(health) => health,
                        Err(_) => ComponentHealth::unhealthy(checker.name())
                            .with_error(format!("Health check timed out after {:?}", timeout)),
                    }
                }
            })
            .collect();

        let components = futures::future::join_all(futures).await;

        HealthReport::new()
            .with_uptime(self.started_at.elapsed())
            .with_components(components)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
