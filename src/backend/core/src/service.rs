//! Core operations exposed to the API layer.

use crate::config::DecayConfig;
use crate::decay;
use crate::distribution::Distribution;
use crate::error::{ErrorCode, ForgetError, Result};
use crate::pipeline::UpdateQueue;
use crate::store::DistributionStore;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle to the store, the write-back queue and the decay defaults.
#[derive(Clone)]
pub struct ForgetService {
    store: Arc<dyn DistributionStore>,
    queue: UpdateQueue,
    defaults: DecayConfig,
}

impl ForgetService {
    pub fn new(store: Arc<dyn DistributionStore>, queue: UpdateQueue, defaults: DecayConfig) -> Self {
        Self {
            store,
            queue,
            defaults,
        }
    }

    pub fn store(&self) -> &Arc<dyn DistributionStore> {
        &self.store
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    pub fn defaults(&self) -> &DecayConfig {
        &self.defaults
    }

    /// Add `amount` to each of `fields`.
    pub async fn increment(&self, name: &str, fields: &[String], amount: u64) -> Result<()> {
        validate_name(name)?;
        if fields.is_empty() {
            return Err(ForgetError::missing_argument("field"));
        }
        check_amount(amount, fields.len())?;

        self.store
            .increment(name, fields, amount, decay::now_unix())
            .await
            .map_err(|e| e.for_distribution(name))?;

        counter!("forget_increments_total").increment(fields.len() as u64);
        debug!(distribution = %name, fields = fields.len(), amount, "Incremented");
        Ok(())
    }

    /// Decayed counts of `fields`.
    pub async fn get_field(
        &self,
        name: &str,
        fields: &[String],
        rate: Option<f64>,
        prune: Option<bool>,
    ) -> Result<Distribution> {
        let mut dist = self.new_distribution(name, rate, prune)?;
        dist.load_fields(self.store.as_ref(), fields).await?;
        dist.decay();

        counter!("forget_reads_total", "kind" => "fields").increment(1);
        self.schedule_write_back(&dist).await;
        Ok(dist)
    }

    /// The whole distribution, decayed and normalized.
    pub async fn get_distribution(
        &self,
        name: &str,
        rate: Option<f64>,
        prune: Option<bool>,
    ) -> Result<Distribution> {
        let mut dist = self.new_distribution(name, rate, prune)?;
        dist.fill(self.store.as_ref()).await?;
        dist.decay();
        dist.normalize();

        counter!("forget_reads_total", "kind" => "full").increment(1);
        self.schedule_write_back(&dist).await;
        Ok(dist)
    }

    /// The `n` most probable fields, decayed.
    pub async fn get_top_n(
        &self,
        name: &str,
        n: usize,
        rate: Option<f64>,
        prune: Option<bool>,
    ) -> Result<Distribution> {
        let mut dist = self.new_distribution(name, rate, prune)?;
        dist.load_top(self.store.as_ref(), n).await?;
        dist.decay();

        counter!("forget_reads_total", "kind" => "top").increment(1);
        self.schedule_write_back(&dist).await;
        Ok(dist)
    }

    /// Number of keys in the store.
    pub async fn size(&self) -> Result<u64> {
        self.store.size().await
    }

    fn new_distribution(&self, name: &str, rate: Option<f64>, prune: Option<bool>) -> Result<Distribution> {
        validate_name(name)?;
        let rate = rate.unwrap_or(self.defaults.default_rate);
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(ForgetError::new(ErrorCode::InvalidArgument, "CANNOT_PARSE_RATE")
                .with_context("rate", rate));
        }
        Ok(Distribution::new(name, rate, prune.unwrap_or(self.defaults.prune)))
    }

    /// Hand a read result to the pipeline. A full queue only costs the
    /// write-back, never the read.
    async fn schedule_write_back(&self, dist: &Distribution) {
        if let Err(e) = self.queue.enqueue(dist.clone()).await {
            warn!(distribution = %dist.name, error = %e, "Could not schedule write-back");
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ForgetError::missing_argument("distribution"));
    }
    Ok(())
}

/// An increment must be positive and its total must fit the signed mass key.
fn check_amount(amount: u64, fields: usize) -> Result<()> {
    let total = amount.checked_mul(fields as u64);
    match total {
        Some(total) if amount > 0 && total <= i64::MAX as u64 => Ok(()),
        _ => Err(ForgetError::invalid_argument("N", &amount.to_string())),
    }
}
