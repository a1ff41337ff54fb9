//! In-process store with Redis key semantics.

use super::{
    mass_key, time_key, CommitOutcome, DistributionStore, FullSnapshot, PartialSnapshot,
    WriteBatch,
};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Keyspace {
    /// Sorted sets by name
    sets: HashMap<String, HashMap<String, u64>>,
    /// `_Z` and `_T` string keys
    strings: HashMap<String, i64>,
    /// Last expiry applied per key, in seconds
    expiries: HashMap<String, u64>,
}

impl Keyspace {
    fn get_u64(&self, key: &str) -> Option<u64> {
        self.strings.get(key).map(|v| (*v).max(0) as u64)
    }
}

/// Store used by tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keys: Mutex<Keyspace>,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a distribution directly, bypassing increments.
    pub fn seed(&self, name: &str, members: &[(&str, u64)], time: i64) {
        let mut keys = self.keys.lock();
        let set: HashMap<String, u64> = members
            .iter()
            .map(|(field, count)| (field.to_string(), *count))
            .collect();
        let mass: u64 = set.values().sum();
        keys.sets.insert(name.to_string(), set);
        keys.strings.insert(mass_key(name), mass as i64);
        keys.strings.insert(time_key(name), time);
    }

    /// Overwrite the stored time key.
    pub fn set_time(&self, name: &str, time: i64) {
        self.keys.lock().strings.insert(time_key(name), time);
    }

    /// Overwrite the stored mass key.
    pub fn set_mass(&self, name: &str, mass: u64) {
        self.keys.lock().strings.insert(mass_key(name), mass as i64);
    }

    pub fn count(&self, name: &str, field: &str) -> Option<u64> {
        self.keys
            .lock()
            .sets
            .get(name)
            .and_then(|set| set.get(field).copied())
    }

    pub fn mass(&self, name: &str) -> Option<u64> {
        self.keys.lock().get_u64(&mass_key(name))
    }

    pub fn time(&self, name: &str) -> Option<i64> {
        self.keys.lock().strings.get(&time_key(name)).copied()
    }

    /// Last expiry written to the sorted set key.
    pub fn expiry(&self, name: &str) -> Option<u64> {
        self.keys.lock().expiries.get(name).copied()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Number of commits rejected by the version check.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DistributionStore for MemoryStore {
    async fn increment(&self, name: &str, fields: &[String], amount: u64, now: i64) -> Result<()> {
        let mut keys = self.keys.lock();

        let set = keys.sets.entry(name.to_string()).or_default();
        for field in fields {
            let count = set.entry(field.clone()).or_insert(0);
            *count = count.saturating_add(amount);
        }

        let added = i64::try_from(amount.saturating_mul(fields.len() as u64)).unwrap_or(i64::MAX);
        let mass = keys.strings.entry(mass_key(name)).or_insert(0);
        *mass = mass.saturating_add(added);
        keys.strings.entry(time_key(name)).or_insert(now);
        Ok(())
    }

    async fn load_full(&self, name: &str) -> Result<FullSnapshot> {
        let keys = self.keys.lock();
        let members = keys
            .sets
            .get(name)
            .map(|set| set.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();

        Ok(FullSnapshot {
            time: keys.strings.get(&time_key(name)).copied(),
            mass: keys.get_u64(&mass_key(name)),
            members,
        })
    }

    async fn load_fields(&self, name: &str, fields: &[String]) -> Result<PartialSnapshot> {
        let keys = self.keys.lock();
        let set = keys.sets.get(name);
        let members = fields
            .iter()
            .map(|field| {
                let count = set.and_then(|s| s.get(field).copied()).unwrap_or(0);
                (field.clone(), count)
            })
            .collect();

        Ok(PartialSnapshot {
            members,
            cardinality: set.map(|s| s.len() as u64).unwrap_or(0),
            mass: keys.get_u64(&mass_key(name)),
            time: keys.strings.get(&time_key(name)).copied(),
        })
    }

    async fn load_top(&self, name: &str, n: usize) -> Result<PartialSnapshot> {
        let keys = self.keys.lock();
        let set = keys.sets.get(name);

        let mut members: Vec<(String, u64)> = set
            .map(|s| s.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        // ZREVRANGEBYSCORE orders ties by member descending
        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        members.truncate(n);

        Ok(PartialSnapshot {
            members,
            cardinality: set.map(|s| s.len() as u64).unwrap_or(0),
            mass: keys.get_u64(&mass_key(name)),
            time: keys.strings.get(&time_key(name)).copied(),
        })
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<CommitOutcome> {
        let mut keys = self.keys.lock();

        let current = keys.get_u64(&mass_key(&batch.name)).unwrap_or(0);
        if current != batch.expected_mass {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitOutcome::Conflict);
        }

        let set = keys.sets.entry(batch.name.clone()).or_default();
        for field in &batch.removals {
            set.remove(field);
        }
        for (field, count) in &batch.upserts {
            set.insert(field.clone(), *count);
        }
        if set.is_empty() {
            keys.sets.remove(&batch.name);
        }

        keys.strings.insert(mass_key(&batch.name), batch.mass as i64);
        keys.strings.insert(time_key(&batch.name), batch.time);

        for key in [batch.name.clone(), mass_key(&batch.name), time_key(&batch.name)] {
            keys.expiries.insert(key, batch.expire_secs);
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(CommitOutcome::Committed)
    }

    async fn size(&self) -> Result<u64> {
        let keys = self.keys.lock();
        Ok((keys.sets.len() + keys.strings.len()) as u64)
    }

    async fn ping(&self) -> Result<Duration> {
        Ok(Duration::ZERO)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_increment_sets_time_once() {
        let store = MemoryStore::new();

        store.increment("colors", &fields(&["red", "blue"]), 2, 100).await.unwrap();
        store.increment("colors", &fields(&["red"]), 1, 200).await.unwrap();

        assert_eq!(store.count("colors", "red"), Some(3));
        assert_eq!(store.count("colors", "blue"), Some(2));
        assert_eq!(store.mass("colors"), Some(5));
        assert_eq!(store.time("colors"), Some(100));
        assert_eq!(store.size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_load_fields_fills_missing_with_zero() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 4), ("blue", 1)], 10);

        let snapshot = store
            .load_fields("colors", &fields(&["red", "green"]))
            .await
            .unwrap();

        assert_eq!(
            snapshot.members,
            vec![("red".to_string(), 4), ("green".to_string(), 0)]
        );
        assert_eq!(snapshot.cardinality, 2);
        assert_eq!(snapshot.mass, Some(5));
    }

    #[tokio::test]
    async fn test_load_top_orders_by_count() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 4), ("blue", 9), ("green", 1)], 10);

        let snapshot = store.load_top("colors", 2).await.unwrap();

        assert_eq!(
            snapshot.members,
            vec![("blue".to_string(), 9), ("red".to_string(), 4)]
        );
        assert_eq!(snapshot.cardinality, 3);
    }

    #[tokio::test]
    async fn test_missing_distribution_loads_empty() {
        let store = MemoryStore::new();
        let snapshot = store.load_full("nothing").await.unwrap();
        assert_eq!(snapshot, FullSnapshot::default());
    }

    #[tokio::test]
    async fn test_commit_checks_mass() {
        let store = MemoryStore::new();
        store.seed("colors", &[("red", 4), ("blue", 1)], 10);

        let batch = WriteBatch {
            name: "colors".to_string(),
            expected_mass: 4,
            mass: 3,
            time: 20,
            upserts: vec![("red".to_string(), 3)],
            removals: vec!["blue".to_string()],
            expire_secs: 60,
        };
        assert_eq!(store.commit(&batch).await.unwrap(), CommitOutcome::Conflict);
        assert_eq!(store.count("colors", "red"), Some(4));

        let batch = WriteBatch {
            expected_mass: 5,
            ..batch
        };
        assert_eq!(store.commit(&batch).await.unwrap(), CommitOutcome::Committed);
        assert_eq!(store.count("colors", "red"), Some(3));
        assert_eq!(store.count("colors", "blue"), None);
        assert_eq!(store.mass("colors"), Some(3));
        assert_eq!(store.time("colors"), Some(20));
        assert_eq!(store.expiry("colors"), Some(60));
        assert_eq!(store.commit_count(), 1);
        assert_eq!(store.conflict_count(), 1);
    }
}
