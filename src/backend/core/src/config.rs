//! Configuration management.

use crate::error::{ForgetError, Result};
use crate::pipeline::PipelineConfig;
use crate::store::{RedisAddress, StoreConfig};
use crate::telemetry::TelemetryConfig;
use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Decay defaults
    #[serde(default)]
    pub decay: DecayConfig,

    /// Update pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging, tracing and metrics
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http")]
    pub http: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: default_http(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecayConfig {
    /// Rate used when a request does not name one
    #[serde(default = "default_rate")]
    pub default_rate: f64,

    /// Let fields decay to zero and be removed
    #[serde(default)]
    pub prune: bool,

    /// Additive slack in the expiry formula, in seconds^(1/2)
    #[serde(default = "default_expire_sigma")]
    pub expire_sigma: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            default_rate: default_rate(),
            prune: false,
            expire_sigma: default_expire_sigma(),
        }
    }
}

// Default value functions
fn default_http() -> String { ":6666".to_string() }
fn default_rate() -> f64 { 0.5 }
fn default_expire_sigma() -> f64 { 2.0 }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FORGET").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment variables on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("FORGET").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Socket address to bind; a bare `:port` listens on all interfaces.
    pub fn listen_addr(&self) -> String {
        if self.server.http.starts_with(':') {
            format!("0.0.0.0{}", self.server.http)
        } else {
            self.server.http.clone()
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.decay.default_rate > 0.0 && self.decay.default_rate.is_finite()) {
            return Err(ForgetError::configuration(format!(
                "default rate must be positive, got {}",
                self.decay.default_rate
            )));
        }
        if !(self.decay.expire_sigma >= 0.0 && self.decay.expire_sigma.is_finite()) {
            return Err(ForgetError::configuration(format!(
                "expire sigma must be non-negative, got {}",
                self.decay.expire_sigma
            )));
        }
        if self.pipeline.workers == 0 {
            return Err(ForgetError::configuration("at least one update worker is required"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ForgetError::configuration("queue capacity must be positive"));
        }
        if self.store.pool_size == 0 {
            return Err(ForgetError::configuration("store pool size must be positive"));
        }
        self.store.address.parse::<RedisAddress>()?;
        Ok(())
    }
}
