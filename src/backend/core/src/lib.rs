#![allow(clippy::result_large_err)]
//! # Forget Core
//!
//! Decaying frequency distributions kept in Redis.
//!
//! ## Architecture
//!
//! - **Decay**: Poisson sampling of how many events each bin has forgotten
//! - **Distribution**: In-memory model of one distribution, with floor and prune policies
//! - **Store**: Redis key layout, atomic loads, and version-checked commits
//! - **Pipeline**: Bounded queue and worker pool that write decayed state back
//! - **Service**: Read and increment operations behind the HTTP API
//! - **Telemetry**: Structured logging, optional OTLP export, and Prometheus metrics
//! - **Health**: Store and pipeline health reporting

pub mod api;
pub mod config;
pub mod decay;
pub mod distribution;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, ForgetError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, DecayConfig};
    pub use crate::decay::{decay, poisson, DecaySampler, PoissonSampler};
    pub use crate::distribution::{Distribution, DistributionView, Extent};
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, ForgetError, Result};
    pub use crate::pipeline::{PipelineConfig, UpdatePipeline, UpdateQueue, WriteBackOutcome};
    pub use crate::service::ForgetService;
    pub use crate::store::{DistributionStore, MemoryStore, RedisStore, WriteBatch};
}
