//! Durable storage for distributions.
//!
//! A distribution named `<name>` occupies three keys:
//! - `<name>`: sorted set, member = field, score = count
//! - `<name>._Z`: aggregate mass, maintained by increments and write-backs
//! - `<name>._T`: unix time of the last decay applied to the stored counts
//!
//! Backends:
//! - **RedisStore**: the production store, backed by a deadpool-redis pool
//! - **MemoryStore**: an in-process store with the same semantics, for tests and local runs

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisAddress, RedisStore, StoreConfig};

use crate::distribution::Distribution;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Key holding the aggregate mass of a distribution.
pub fn mass_key(name: &str) -> String {
    format!("{}._Z", name)
}

/// Key holding the last decay time of a distribution.
pub fn time_key(name: &str) -> String {
    format!("{}._T", name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Load Results
// ═══════════════════════════════════════════════════════════════════════════════

/// Every member of a distribution plus its bookkeeping keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullSnapshot {
    /// `<name>._T`, absent when the key does not exist
    pub time: Option<i64>,
    /// `<name>._Z`, absent when the key does not exist
    pub mass: Option<u64>,
    /// All `(field, count)` members
    pub members: Vec<(String, u64)>,
}

/// A subset of members along with the set cardinality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialSnapshot {
    /// Requested `(field, count)` members; missing fields count 0
    pub members: Vec<(String, u64)>,
    /// `ZCARD <name>`
    pub cardinality: u64,
    pub mass: Option<u64>,
    pub time: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Write-back
// ═══════════════════════════════════════════════════════════════════════════════

/// One compare-and-commit transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteBatch {
    pub name: String,
    /// `_Z` value the batch was computed from; any other value aborts the commit
    pub expected_mass: u64,
    pub mass: u64,
    pub time: i64,
    /// Members written with `ZADD`
    pub upserts: Vec<(String, u64)>,
    /// Members removed with `ZREM`
    pub removals: Vec<String>,
    /// Expiry applied to all three keys
    pub expire_secs: u64,
}

impl WriteBatch {
    /// Build the write for a decayed distribution.
    pub fn from_distribution(dist: &Distribution, expire_secs: u64) -> Self {
        let mut upserts = Vec::with_capacity(dist.data.len());
        let mut removals = Vec::new();

        for (field, value) in &dist.data {
            if value.count == 0 {
                removals.push(field.clone());
            } else {
                upserts.push((field.clone(), value.count));
            }
        }
        upserts.sort();
        removals.sort();

        Self {
            name: dist.name.clone(),
            expected_mass: dist.stored_mass,
            mass: dist.z,
            time: dist.t,
            upserts,
            removals,
            expire_secs,
        }
    }
}

/// Result of a compare-and-commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed,
    /// `_Z` changed between load and commit; nothing was written
    Conflict,
}

impl CommitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Conflict => "conflict",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage operations used by distributions and the update pipeline.
#[async_trait]
pub trait DistributionStore: Send + Sync {
    /// Add `amount` to each field, `amount * fields.len()` to the mass, and
    /// set the time key to `now` if it does not exist. Atomic.
    async fn increment(&self, name: &str, fields: &[String], amount: u64, now: i64) -> Result<()>;

    /// Load all members, the mass and the time in one atomic batch.
    async fn load_full(&self, name: &str) -> Result<FullSnapshot>;

    /// Load the given fields plus cardinality, mass and time in one atomic batch.
    async fn load_fields(&self, name: &str, fields: &[String]) -> Result<PartialSnapshot>;

    /// Load the `n` highest-count members plus cardinality, mass and time.
    async fn load_top(&self, name: &str, n: usize) -> Result<PartialSnapshot>;

    /// Apply a write-back if the mass key still holds `batch.expected_mass`.
    async fn commit(&self, batch: &WriteBatch) -> Result<CommitOutcome>;

    /// Number of keys in the database.
    async fn size(&self) -> Result<u64>;

    /// Round-trip latency to the store.
    async fn ping(&self) -> Result<Duration>;

    /// Get the backend name.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(mass_key("colors"), "colors._Z");
        assert_eq!(time_key("colors"), "colors._T");
    }

    #[test]
    fn test_write_batch_splits_zero_counts() {
        let mut dist = Distribution::new("colors", 0.5, false);
        dist.insert_count("red", 3);
        dist.insert_count("blue", 0);
        dist.normalize();
        dist.stored_mass = 7;

        let batch = WriteBatch::from_distribution(&dist, 60);

        assert_eq!(batch.upserts, vec![("red".to_string(), 3)]);
        assert_eq!(batch.removals, vec!["blue".to_string()]);
        assert_eq!(batch.expected_mass, 7);
        assert_eq!(batch.mass, 3);
        assert_eq!(batch.expire_secs, 60);
    }
}
