//! Forget Server - Main entry point
//!
//! Serves decaying frequency distributions over HTTP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use forget_core::{
    api::{self, AppState},
    config::Config,
    health::{HealthService, PipelineHealthChecker, StoreHealthChecker},
    pipeline::UpdatePipeline,
    service::ForgetService,
    store::{DistributionStore, RedisStore},
    telemetry,
};

#[derive(Parser, Debug)]
#[command(name = "forget-server", version, about = "Decaying frequency distributions over HTTP")]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "FORGET_CONFIG")]
    config: Option<String>,

    /// Redis address as host:port:db
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis URI; takes precedence over --redis-host
    #[arg(long)]
    redis_uri: Option<String>,

    /// Decay rate used when a request does not give one
    #[arg(long)]
    default_rate: Option<f64>,

    /// Number of write-back workers
    #[arg(long)]
    nworkers: Option<usize>,

    /// HTTP listen address
    #[arg(long)]
    http: Option<String>,

    /// Additive slack in the key expiry formula
    #[arg(long)]
    expire_sigma: Option<f64>,

    /// Remove fields whose count decays to zero
    #[arg(long)]
    prune: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.redis_host {
            config.store.address = host;
        }
        if let Some(uri) = self.redis_uri {
            config.store.address = uri;
        }
        if let Some(rate) = self.default_rate {
            config.decay.default_rate = rate;
        }
        if let Some(workers) = self.nworkers {
            config.pipeline.workers = workers;
        }
        if let Some(http) = self.http {
            config.server.http = http;
        }
        if let Some(sigma) = self.expire_sigma {
            config.decay.expire_sigma = sigma;
        }
        if self.prune {
            config.decay.prune = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load configuration
    let mut config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Could not load config: {}. Using defaults.", e);
            Config::default()
        }),
    };
    args.apply(&mut config);
    config.validate()?;

    // Initialize telemetry
    let telemetry = telemetry::init(&config.telemetry)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        default_rate = config.decay.default_rate,
        prune = config.decay.prune,
        "Starting Forget Server"
    );

    // Connect to Redis
    let store: Arc<dyn DistributionStore> = Arc::new(RedisStore::connect(&config.store).await?);
    tracing::info!(store = %config.store.address, "Connected to store");

    // Start write-back workers
    let pipeline = UpdatePipeline::start(store.clone(), &config.pipeline, config.decay.expire_sigma);

    let service = ForgetService::new(store.clone(), pipeline.queue(), config.decay.clone());

    let health = HealthService::new(Duration::from_secs(2))
        .with_checker(Arc::new(StoreHealthChecker::new(store)))
        .with_checker(Arc::new(PipelineHealthChecker::new(
            pipeline.queue(),
            pipeline.stats().clone(),
        )));

    let app_state = AppState {
        service,
        health: Arc::new(health),
        metrics: telemetry.metrics.clone(),
    };

    // Build router
    let app = api::build_router(app_state);

    // Start server
    let addr = config.listen_addr();
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain pending write-backs
    let stats = pipeline.shutdown().await;
    tracing::info!(
        processed = stats.processed,
        committed = stats.committed,
        "Update pipeline stopped"
    );

    telemetry.shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
