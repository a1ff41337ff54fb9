//! Update pipeline: a bounded queue drained by a fixed set of write-back workers.
//!
//! Reads hand their decayed distributions to the pipeline, which reconciles
//! them with the store in the background. The queue is bounded so a slow store
//! pushes back on readers instead of growing memory.

pub mod queue;
pub mod worker;

pub use queue::UpdateQueue;
pub use worker::{expiry_secs, write_back, WriteBackOutcome};

use crate::distribution::Distribution;
use crate::error::{ErrorCode, Result};
use crate::store::DistributionStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use worker::WorkerContext;

/// Configuration for the update pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of write-back workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending distributions held before enqueue blocks
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Longest an enqueue waits for a free slot
    #[serde(default = "default_enqueue_timeout", with = "humantime_serde")]
    pub enqueue_timeout: Duration,

    /// Interval between per-worker throughput logs
    #[serde(default = "default_status_interval", with = "humantime_serde")]
    pub status_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout: default_enqueue_timeout(),
            status_interval: default_status_interval(),
        }
    }
}

fn default_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    10
}

fn default_enqueue_timeout() -> Duration {
    Duration::from_millis(100)
}

fn default_status_interval() -> Duration {
    Duration::from_secs(60)
}

/// Counters shared by all workers of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Distributions taken off the queue
    pub processed: Arc<AtomicU64>,
    pub committed: Arc<AtomicU64>,
    /// Throttled or unchanged, nothing written
    pub skipped: Arc<AtomicU64>,
    pub conflicts: Arc<AtomicU64>,
    pub empty: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, result: &Result<WriteBackOutcome>) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(WriteBackOutcome::Committed) => &self.committed,
            Ok(WriteBackOutcome::Conflict) => &self.conflicts,
            Ok(WriteBackOutcome::Skipped | WriteBackOutcome::Unchanged) => &self.skipped,
            Err(e) if e.code() == ErrorCode::DistributionEmpty => &self.empty,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatsSnapshot {
    pub processed: u64,
    pub committed: u64,
    pub skipped: u64,
    pub conflicts: u64,
    pub empty: u64,
    pub failed: u64,
}

/// A running set of write-back workers.
pub struct UpdatePipeline {
    queue: UpdateQueue,
    stats: PipelineStats,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl UpdatePipeline {
    /// Spawn `config.workers` workers reading from a fresh queue.
    pub fn start(
        store: Arc<dyn DistributionStore>,
        config: &PipelineConfig,
        expire_sigma: f64,
    ) -> Self {
        let (queue, receiver) = UpdateQueue::bounded(config.queue_capacity, config.enqueue_timeout);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = PipelineStats::new();

        let ctx = Arc::new(WorkerContext {
            store,
            receiver: Mutex::new(receiver),
            stats: stats.clone(),
            expire_sigma,
            status_interval: config.status_interval,
        });

        let worker_count = config.workers.max(1);
        info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            "Starting update workers"
        );

        let workers = (0..worker_count)
            .map(|id| tokio::spawn(worker::run(id, ctx.clone(), shutdown_rx.clone())))
            .collect();

        Self {
            queue,
            stats,
            shutdown,
            workers,
        }
    }

    /// A producer handle for the queue.
    pub fn queue(&self) -> UpdateQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue through the pipeline's own producer handle.
    pub async fn enqueue(&self, dist: Distribution) -> Result<()> {
        self.queue.enqueue(dist).await
    }

    /// Stop accepting work, let workers drain the queue, and wait for them.
    pub async fn shutdown(self) -> PipelineStatsSnapshot {
        let _ = self.shutdown.send(true);
        drop(self.queue);

        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Update worker panicked");
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            processed = snapshot.processed,
            committed = snapshot.committed,
            conflicts = snapshot.conflicts,
            "Update pipeline stopped"
        );
        snapshot
    }
}
