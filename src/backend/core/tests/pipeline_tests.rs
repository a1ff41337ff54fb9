//! Update pipeline tests: reads feeding write-back workers.

use std::sync::Arc;
use std::time::Duration;

use forget_core::config::DecayConfig;
use forget_core::decay::now_unix;
use forget_core::distribution::Distribution;
use forget_core::error::ErrorCode;
use forget_core::pipeline::{PipelineConfig, UpdatePipeline};
use forget_core::service::ForgetService;
use forget_core::store::MemoryStore;
use tokio_test::{assert_err, assert_ok};

fn config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        queue_capacity: 16,
        enqueue_timeout: Duration::from_millis(50),
        status_interval: Duration::from_secs(60),
    }
}

fn start(store: &Arc<MemoryStore>, workers: usize, rate: f64) -> (UpdatePipeline, ForgetService) {
    let pipeline = UpdatePipeline::start(store.clone(), &config(workers), 2.0);
    let defaults = DecayConfig {
        default_rate: rate,
        ..DecayConfig::default()
    };
    let service = ForgetService::new(store.clone(), pipeline.queue(), defaults);
    (pipeline, service)
}

#[tokio::test]
async fn test_decayed_read_is_written_back() {
    let store = Arc::new(MemoryStore::new());
    store.seed("colors", &[("red", 5), ("green", 3), ("blue", 3)], now_unix() - 1_000);

    let (pipeline, service) = start(&store, 2, 0.5);

    // five hundred expected events per field saturates every draw
    let dist = assert_ok!(service.get_distribution("colors", None, None).await);
    assert_eq!(dist.z, 3);
    drop(service);

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.committed, 1);

    assert_eq!(store.count("colors", "red"), Some(1));
    assert_eq!(store.mass("colors"), Some(3));
    assert!(store.expiry("colors").is_some());
}

#[tokio::test]
async fn test_fresh_read_commits_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.seed("colors", &[("red", 5)], now_unix());

    let (pipeline, service) = start(&store, 1, 1e-9);

    assert_ok!(service.get_distribution("colors", None, None).await);
    assert_ok!(
        service
            .get_field("colors", &["red".to_string()], None, None)
            .await
    );
    drop(service);

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.committed, 0);
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_empty_distribution_is_counted() {
    let store = Arc::new(MemoryStore::new());
    let (pipeline, _service) = start(&store, 1, 0.5);

    let mut dist = Distribution::new("gone", 0.5, true);
    dist.extent = forget_core::distribution::Extent::Full;
    pipeline.enqueue(dist).await.unwrap();

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.empty, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_shutdown_drains_queue() {
    let store = Arc::new(MemoryStore::new());
    let now = now_unix();
    for i in 0..8 {
        store.seed(&format!("d{}", i), &[("a", 4), ("b", 2)], now - 1_000);
    }

    let (pipeline, service) = start(&store, 3, 0.5);
    for i in 0..8 {
        service
            .get_distribution(&format!("d{}", i), None, None)
            .await
            .unwrap();
    }

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.processed, 8);
    assert_eq!(stats.committed, 8);
    assert_eq!(store.commit_count(), 8);
}

#[tokio::test]
async fn test_enqueue_after_shutdown_fails() {
    let store = Arc::new(MemoryStore::new());
    let (pipeline, service) = start(&store, 1, 0.5);

    pipeline.shutdown().await;

    let err = assert_err!(
        service
            .queue()
            .enqueue(Distribution::new("late", 0.5, false))
            .await
    );
    assert_eq!(err.code(), ErrorCode::PipelineClosed);
}
