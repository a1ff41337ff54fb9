//! The distribution entity and its load / decay / normalize lifecycle.
//!
//! A [`Distribution`] is an in-memory view of one named frequency
//! distribution. It is populated from the store in one of three shapes:
//!
//! - **Full** (`fill`): every member is loaded, so the mass `z` can be
//!   recomputed exactly from the counts.
//! - **Fields** (`load_fields`) and **Top-N** (`load_top`): only some members
//!   are loaded. `z` is the stored aggregate and decay of the unseen members
//!   is extrapolated from the loaded ones.

use crate::decay::{self, DecaySampler, PoissonSampler};
use crate::error::{ForgetError, Result};
use crate::store::{DistributionStore, FullSnapshot, PartialSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Expected number of decay events above which a partial distribution is
/// worth reconciling with the store.
pub const SYNC_THRESHOLD: f64 = 0.75;

/// Count and probability of one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub count: u64,
    pub p: f64,
}

impl Value {
    pub fn new(count: u64) -> Self {
        Self { count, p: 0.0 }
    }
}

/// How much of the stored distribution is held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extent {
    /// All members are loaded; `z` equals the sum of counts after normalize.
    Full,
    /// A subset is loaded out of `num_entries` stored members.
    Partial { num_entries: u64 },
}

impl Default for Extent {
    fn default() -> Self {
        Self::Partial { num_entries: 0 }
    }
}

/// An in-memory frequency distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub name: String,
    /// Total mass
    pub z: u64,
    /// Unix time the counts were last decayed to
    pub t: i64,
    /// Store time observed at the last load
    pub last_sync_t: i64,
    pub data: HashMap<String, Value>,
    /// Decay events per unit count per second
    pub rate: f64,
    /// When set, a field may decay to zero and is removed
    pub prune: bool,
    pub extent: Extent,
    has_decayed: bool,
    /// `_Z` observed at the last load, the version checked on write-back
    pub stored_mass: u64,
}

impl Distribution {
    /// Create an empty, unloaded distribution.
    pub fn new(name: impl Into<String>, rate: f64, prune: bool) -> Self {
        Self {
            name: name.into(),
            z: 0,
            t: 0,
            last_sync_t: 0,
            data: HashMap::new(),
            rate,
            prune,
            extent: Extent::default(),
            has_decayed: false,
            stored_mass: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self.extent, Extent::Full)
    }

    /// True iff the last decay pass changed `z`.
    pub fn has_decayed(&self) -> bool {
        self.has_decayed
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Set a field count directly, leaving `z` untouched.
    pub fn insert_count(&mut self, field: impl Into<String>, count: u64) {
        self.data.insert(field.into(), Value::new(count));
    }

    pub fn count(&self, field: &str) -> Option<u64> {
        self.data.get(field).map(|v| v.count)
    }

    pub fn probability(&self, field: &str) -> Option<f64> {
        self.data.get(field).map(|v| v.p)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Load every member from the store.
    pub async fn fill(&mut self, store: &dyn DistributionStore) -> Result<()> {
        let snapshot = store
            .load_full(&self.name)
            .await
            .map_err(|e| e.for_distribution(self.name.clone()))?;
        self.apply_full(snapshot, decay::now_unix());
        Ok(())
    }

    /// Load only `fields` from the store.
    pub async fn load_fields(&mut self, store: &dyn DistributionStore, fields: &[String]) -> Result<()> {
        if fields.is_empty() {
            return Err(ForgetError::missing_argument("field"));
        }
        let snapshot = store
            .load_fields(&self.name, fields)
            .await
            .map_err(|e| e.for_distribution(self.name.clone()))?;
        self.apply_partial(snapshot, decay::now_unix());
        Ok(())
    }

    /// Load the `n` most probable members from the store.
    pub async fn load_top(&mut self, store: &dyn DistributionStore, n: usize) -> Result<()> {
        let snapshot = store
            .load_top(&self.name, n)
            .await
            .map_err(|e| e.for_distribution(self.name.clone()))?;
        self.apply_partial(snapshot, decay::now_unix());
        Ok(())
    }

    /// Replace the in-memory state with a full load.
    pub fn apply_full(&mut self, snapshot: FullSnapshot, now: i64) {
        self.data = snapshot
            .members
            .into_iter()
            .map(|(field, count)| (field, Value::new(count)))
            .collect();
        self.t = self.reference_time(snapshot.time, now);
        self.last_sync_t = self.t;
        self.stored_mass = snapshot.mass.unwrap_or(0);
        self.extent = Extent::Full;
        self.has_decayed = false;
        self.normalize();
    }

    /// Replace the in-memory state with a partial load.
    pub fn apply_partial(&mut self, snapshot: PartialSnapshot, now: i64) {
        self.data = snapshot
            .members
            .into_iter()
            .map(|(field, count)| (field, Value::new(count)))
            .collect();
        self.t = self.reference_time(snapshot.time, now);
        self.last_sync_t = self.t;
        self.z = snapshot.mass.unwrap_or(0);
        self.stored_mass = self.z;
        self.extent = Extent::Partial {
            num_entries: snapshot.cardinality,
        };
        self.has_decayed = false;
        self.calc_probabilities();
    }

    fn reference_time(&self, stored: Option<i64>, now: i64) -> i64 {
        match stored {
            Some(t) => t,
            None if self.data.values().any(|v| v.count > 0) => {
                warn!(
                    distribution = %self.name,
                    "Time key missing for a populated distribution, decaying from now"
                );
                now
            }
            None => now,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decay
    // ─────────────────────────────────────────────────────────────────────────

    /// Decay every loaded field up to the current wall-clock time.
    pub fn decay(&mut self) {
        self.decay_at(decay::now_unix());
    }

    /// Decay every loaded field up to `now`.
    pub fn decay_at(&mut self, now: i64) {
        self.decay_with(now, &mut PoissonSampler);
    }

    /// Decay every loaded field up to `now`, drawing amounts from `sampler`.
    pub fn decay_with<S: DecaySampler + ?Sized>(&mut self, now: i64, sampler: &mut S) {
        if self.data.is_empty() {
            return;
        }

        let starting_z = self.z;
        let mut removed_total: u64 = 0;
        let mut remaining: u64 = 0;

        for value in self.data.values_mut() {
            let mut amount = sampler.sample(value.count, self.z, self.t, self.rate, now);
            if amount >= value.count {
                amount = if self.prune {
                    value.count
                } else {
                    value.count.saturating_sub(1)
                };
            }
            value.count -= amount;
            removed_total += amount;
            remaining += value.count;
        }

        match self.extent {
            Extent::Full => self.z = remaining,
            Extent::Partial { num_entries } => {
                let loaded = self.data.len() as u64;
                let extrapolated = (removed_total / loaded).saturating_mul(num_entries);
                self.z = self.z.saturating_sub(extrapolated);
            }
        }

        self.has_decayed = self.z != starting_z;
        self.t = self.t.max(now);
        self.calc_probabilities();

        debug!(
            distribution = %self.name,
            removed = removed_total,
            z = self.z,
            "Decayed distribution"
        );
    }

    /// Recompute `z` from the loaded counts and refresh probabilities.
    pub fn normalize(&mut self) {
        self.z = self.data.values().map(|v| v.count).sum();
        self.calc_probabilities();
    }

    fn calc_probabilities(&mut self) {
        let z = self.z as f64;
        for value in self.data.values_mut() {
            value.p = if self.z == 0 { 0.0 } else { value.count as f64 / z };
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write-back helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether enough time has passed since the last load to expect a decay event.
    pub fn needs_sync(&self, now: i64) -> bool {
        (now - self.last_sync_t) as f64 * self.rate > SYNC_THRESHOLD
    }

    /// Largest count among the loaded fields.
    pub fn max_count(&self) -> u64 {
        self.data.values().map(|v| v.count).max().unwrap_or(0)
    }

    /// Fields whose count reached zero.
    pub fn zeroed_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .data
            .iter()
            .filter(|(_, v)| v.count == 0)
            .map(|(k, _)| k.as_str())
            .collect();
        fields.sort_unstable();
        fields
    }

    /// Serialisable view with bins ordered by descending count.
    pub fn snapshot(&self) -> DistributionView {
        let mut data: Vec<Bin> = self
            .data
            .iter()
            .map(|(bin, v)| Bin {
                bin: bin.clone(),
                count: v.count,
                p: v.p,
            })
            .collect();
        data.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.bin.cmp(&b.bin)));

        DistributionView {
            distribution: self.name.clone(),
            z: self.z,
            t: self.t,
            rate: self.rate,
            prune: self.prune,
            last_sync_time: self.last_sync_t,
            full: self.is_full(),
            data,
        }
    }
}

/// One field of a [`DistributionView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub bin: String,
    pub count: u64,
    pub p: f64,
}

/// Wire representation of a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionView {
    pub distribution: String,
    #[serde(rename = "Z")]
    pub z: u64,
    #[serde(rename = "T")]
    pub t: i64,
    pub rate: f64,
    pub prune: bool,
    pub last_sync_time: i64,
    pub full: bool,
    pub data: Vec<Bin>,
}
