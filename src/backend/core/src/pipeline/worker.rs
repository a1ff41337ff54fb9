//! Write-back workers.
//!
//! A worker takes a distribution off the queue, brings it up to date with the
//! store if needed, and commits the decayed counts under an optimistic lock
//! on the mass key.

use super::PipelineStats;
use crate::decay;
use crate::distribution::Distribution;
use crate::error::{ErrorCode, ForgetError, Result};
use crate::store::{CommitOutcome, DistributionStore, WriteBatch};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};

/// Expiry for a distribution whose largest count is `max_count`.
///
/// `η = sqrt(max_count / rate)` is the expected time for that count to decay
/// away; the keys live for `(σ + η)²` seconds, at least one and at most
/// [`MAX_EXPIRY_SECS`]. A horizon too large to represent saturates at the cap.
pub fn expiry_secs(max_count: u64, rate: f64, sigma: f64) -> u64 {
    let eta = (max_count as f64 / rate).sqrt();
    let secs = (sigma + eta).powi(2);
    if !secs.is_finite() || secs >= MAX_EXPIRY_SECS as f64 {
        MAX_EXPIRY_SECS
    } else if secs < 1.0 {
        1
    } else {
        secs as u64
    }
}

/// Largest expiry `EXPIRE` accepts.
pub const MAX_EXPIRY_SECS: u64 = i64::MAX as u64;

/// What a write-back did with one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteBackOutcome {
    Committed,
    /// The mass key moved since load; the update was dropped
    Conflict,
    /// Not enough time elapsed to expect a decay event
    Skipped,
    /// Decay left the counts unchanged, nothing written
    Unchanged,
}

impl WriteBackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Conflict => "conflict",
            Self::Skipped => "skipped",
            Self::Unchanged => "unchanged",
        }
    }
}

impl From<CommitOutcome> for WriteBackOutcome {
    fn from(outcome: CommitOutcome) -> Self {
        match outcome {
            CommitOutcome::Committed => Self::Committed,
            CommitOutcome::Conflict => Self::Conflict,
        }
    }
}

/// Reconcile one distribution with the store.
///
/// A partially loaded distribution is reloaded in full and decayed to `now`
/// first, provided at least one decay event is expected since its last load.
/// Returns a `DistributionEmpty` error when no mass is left.
pub async fn write_back(
    store: &dyn DistributionStore,
    mut dist: Distribution,
    expire_sigma: f64,
    now: i64,
) -> Result<WriteBackOutcome> {
    if !dist.is_full() {
        if !dist.needs_sync(now) {
            return Ok(WriteBackOutcome::Skipped);
        }
        dist.fill(store).await?;
        dist.decay_at(now);
        dist.normalize();
    }

    if dist.z == 0 {
        return Err(ForgetError::distribution_empty(&dist.name));
    }

    if !dist.has_decayed() {
        return Ok(WriteBackOutcome::Unchanged);
    }

    let expire = expiry_secs(dist.max_count(), dist.rate, expire_sigma);
    let batch = WriteBatch::from_distribution(&dist, expire);
    let outcome = store.commit(&batch).await?;

    debug!(
        distribution = %dist.name,
        z = dist.z,
        expire_secs = expire,
        outcome = outcome.as_str(),
        "Write-back finished"
    );

    Ok(outcome.into())
}

/// Shared state for all workers of one pipeline.
pub(crate) struct WorkerContext {
    pub store: Arc<dyn DistributionStore>,
    pub receiver: Mutex<mpsc::Receiver<Distribution>>,
    pub stats: PipelineStats,
    pub expire_sigma: f64,
    pub status_interval: Duration,
}

/// Worker loop: runs until shutdown is signalled or every producer is gone,
/// then drains what is left in the queue.
pub(crate) async fn run(id: usize, ctx: Arc<WorkerContext>, mut shutdown: watch::Receiver<bool>) {
    info!(worker = id, "Update worker started");

    let mut status = StatusReporter::new(id, ctx.status_interval);

    loop {
        let next = {
            let mut receiver = ctx.receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                item = receiver.recv() => item,
            }
        };

        match next {
            Some(dist) => {
                process(id, &ctx, dist).await;
                status.tick();
            }
            None => break,
        }
    }

    // Close the channel so producers fail fast, then finish what was queued.
    loop {
        let next = {
            let mut receiver = ctx.receiver.lock().await;
            receiver.close();
            receiver.recv().await
        };
        match next {
            Some(dist) => {
                process(id, &ctx, dist).await;
                status.tick();
            }
            None => break,
        }
    }

    info!(worker = id, "Update worker stopped");
}

async fn process(id: usize, ctx: &WorkerContext, dist: Distribution) {
    let name = dist.name.clone();
    let span = info_span!("write_back", worker = id, distribution = %name);
    let start = Instant::now();

    let result = write_back(ctx.store.as_ref(), dist, ctx.expire_sigma, decay::now_unix())
        .instrument(span)
        .await;

    histogram!("forget_writeback_duration_seconds").record(start.elapsed().as_secs_f64());
    ctx.stats.record(&result);

    let outcome = match &result {
        Ok(outcome) => outcome.as_str(),
        Err(e) if e.code() == ErrorCode::DistributionEmpty => "empty",
        Err(_) => "failed",
    };
    counter!("forget_writebacks_total", "outcome" => outcome).increment(1);

    match result {
        Ok(WriteBackOutcome::Conflict) => {
            ForgetError::commit_conflict(&name)
                .with_context("worker", id)
                .log();
        }
        Ok(_) => {}
        Err(e) => {
            if e.code() != ErrorCode::DistributionEmpty {
                warn!(worker = id, distribution = %name, error = %e, "Failed to update");
            }
            e.log();
        }
    }
}

/// Periodic per-worker throughput logging.
struct StatusReporter {
    worker: usize,
    interval: Duration,
    since: Instant,
    updates: u64,
}

impl StatusReporter {
    fn new(worker: usize, interval: Duration) -> Self {
        Self {
            worker,
            interval,
            since: Instant::now(),
            updates: 0,
        }
    }

    fn tick(&mut self) {
        self.updates += 1;
        let elapsed = self.since.elapsed();
        if elapsed > self.interval {
            let rate = self.updates as f64 / elapsed.as_secs_f64();
            info!(
                worker = self.worker,
                updates_per_sec = rate,
                "Performing store updates at {:.3e} updates/second",
                rate
            );
            self.since = Instant::now();
            self.updates = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FullSnapshot, MemoryStore};

    #[test]
    fn test_expiry_formula() {
        assert_eq!(expiry_secs(100, 0.5, 2.0), 260);
    }

    #[test]
    fn test_expiry_saturates_for_slow_rates() {
        assert_eq!(expiry_secs(100, 1e-320, 2.0), MAX_EXPIRY_SECS);
        assert_eq!(expiry_secs(u64::MAX, f64::MIN_POSITIVE, 0.0), MAX_EXPIRY_SECS);

        // slower decay never shortens the horizon
        let slow = expiry_secs(100, 1e-9, 2.0);
        assert!(slow > expiry_secs(100, 0.5, 2.0));
        assert!(expiry_secs(100, 1e-320, 2.0) >= slow);
    }

    #[test]
    fn test_expiry_has_floor() {
        assert_eq!(expiry_secs(0, 0.5, 0.0), 1);
        assert_eq!(expiry_secs(0, 0.5, 3.0), 9);
    }

    #[tokio::test]
    async fn test_unchanged_distribution_is_not_committed() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 5), ("blue", 5)], 1_000);

        let mut dist = Distribution::new("colors", 0.5, false);
        dist.apply_full(store.load_full("colors").await.unwrap(), 1_000);
        dist.decay_at(1_000);

        let outcome = write_back(&store, dist, 2.0, 1_000).await.unwrap();
        assert_eq!(outcome, WriteBackOutcome::Unchanged);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_request_is_throttled() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 5)], 1_000);

        let mut dist = Distribution::new("colors", 0.5, false);
        dist.last_sync_t = 1_000;

        let outcome = write_back(&store, dist, 2.0, 1_001).await.unwrap();
        assert_eq!(outcome, WriteBackOutcome::Skipped);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_distribution_is_reported() {
        let store = MemoryStore::new();
        let mut dist = Distribution::new("nothing", 0.5, false);
        dist.apply_full(FullSnapshot::default(), 0);

        let err = write_back(&store, dist, 2.0, 0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DistributionEmpty);
    }

    #[tokio::test]
    async fn test_decayed_distribution_commits_with_expiry() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 100), ("blue", 50)], 0);

        let mut dist = Distribution::new("colors", 0.5, false);
        dist.apply_full(store.load_full("colors").await.unwrap(), 0);
        dist.decay_with(10, &mut |_: u64, _: u64, _: i64, _: f64, _: i64| 10u64);
        dist.normalize();

        let outcome = write_back(&store, dist, 2.0, 10).await.unwrap();

        assert_eq!(outcome, WriteBackOutcome::Committed);
        assert_eq!(store.count("colors", "red"), Some(90));
        assert_eq!(store.count("colors", "blue"), Some(40));
        assert_eq!(store.mass("colors"), Some(130));
        assert_eq!(store.time("colors"), Some(10));
        assert_eq!(store.expiry("colors"), Some(expiry_secs(90, 0.5, 2.0)));
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_dropped() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 100)], 0);

        let mut dist = Distribution::new("colors", 0.5, false);
        dist.apply_full(store.load_full("colors").await.unwrap(), 0);
        dist.decay_with(10, &mut |_: u64, _: u64, _: i64, _: f64, _: i64| 10u64);

        // an increment lands between load and commit
        store
            .increment("colors", &["red".to_string()], 1, 5)
            .await
            .unwrap();

        let outcome = write_back(&store, dist, 2.0, 10).await.unwrap();
        assert_eq!(outcome, WriteBackOutcome::Conflict);
        assert_eq!(store.count("colors", "red"), Some(101));
    }
}
