//! IV-011: In-memory artifact store.
//!
//! Holds values directly (no serialization) behind a mutex, with a
//! pluggable eviction policy. Default is LRU with capacity 1000.

use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::store::{ArtifactStore, StoreStats};
use indexmap::{IndexMap, IndexSet};
use std::sync::{Mutex, MutexGuard};

/// Composite store key.
pub type StoreKey = (String, String);

/// Mapping policy for the in-memory store. The policy tracks key
/// recency/frequency and picks eviction victims; the store owns the
/// artifacts themselves.
pub trait CachePolicy: Send {
    /// Maximum number of entries, or None for unbounded.
    fn capacity(&self) -> Option<usize>;

    /// A key was served by `get`.
    fn record_access(&mut self, key: &StoreKey);

    /// A key was inserted by `put`.
    fn record_insert(&mut self, key: StoreKey);

    /// Remove and return the next eviction victim.
    fn evict(&mut self) -> Option<StoreKey>;

    fn clear(&mut self);
}

/// Least-recently-used: victims come from the cold end of the order.
pub struct LruPolicy {
    capacity: usize,
    order: IndexSet<StoreKey>,
}

impl LruPolicy {
    pub fn new(capacity: usize) -> LruPolicy {
        LruPolicy {
            capacity,
            order: IndexSet::new(),
        }
    }
}

impl CachePolicy for LruPolicy {
    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn record_access(&mut self, key: &StoreKey) {
        if self.order.shift_remove(key) {
            self.order.insert(key.clone());
        }
    }

    fn record_insert(&mut self, key: StoreKey) {
        self.order.shift_remove(&key);
        self.order.insert(key);
    }

    fn evict(&mut self) -> Option<StoreKey> {
        self.order.shift_remove_index(0)
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}

/// Least-frequently-used; ties evict the earliest-inserted key.
pub struct LfuPolicy {
    capacity: usize,
    counts: IndexMap<StoreKey, u64>,
}

impl LfuPolicy {
    pub fn new(capacity: usize) -> LfuPolicy {
        LfuPolicy {
            capacity,
            counts: IndexMap::new(),
        }
    }
}

impl CachePolicy for LfuPolicy {
    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn record_access(&mut self, key: &StoreKey) {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
        }
    }

    fn record_insert(&mut self, key: StoreKey) {
        self.counts.entry(key).or_insert(0);
    }

    fn evict(&mut self) -> Option<StoreKey> {
        let mut coldest: Option<(usize, u64)> = None;
        for (idx, (_, count)) in self.counts.iter().enumerate() {
            match coldest {
                Some((_, best)) if *count >= best => {}
                _ => coldest = Some((idx, *count)),
            }
        }
        coldest
            .and_then(|(idx, _)| self.counts.shift_remove_index(idx))
            .map(|(key, _)| key)
    }

    fn clear(&mut self) {
        self.counts.clear();
    }
}

/// No bound, no eviction.
#[derive(Default)]
pub struct UnboundedPolicy;

impl CachePolicy for UnboundedPolicy {
    fn capacity(&self) -> Option<usize> {
        None
    }
    fn record_access(&mut self, _key: &StoreKey) {}
    fn record_insert(&mut self, _key: StoreKey) {}
    fn evict(&mut self) -> Option<StoreKey> {
        None
    }
    fn clear(&mut self) {}
}

const DEFAULT_LRU_CAPACITY: usize = 1000;

struct MemoryInner {
    artifacts: IndexMap<StoreKey, Value>,
    policy: Box<dyn CachePolicy>,
    stats: StoreStats,
}

/// In-memory artifact store.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    /// LRU with the default capacity of 1000.
    pub fn new() -> MemoryStore {
        MemoryStore::lru(DEFAULT_LRU_CAPACITY)
    }

    pub fn lru(capacity: usize) -> MemoryStore {
        MemoryStore::with_policy(Box::new(LruPolicy::new(capacity)))
    }

    pub fn lfu(capacity: usize) -> MemoryStore {
        MemoryStore::with_policy(Box::new(LfuPolicy::new(capacity)))
    }

    pub fn unbounded() -> MemoryStore {
        MemoryStore::with_policy(Box::new(UnboundedPolicy))
    }

    pub fn with_policy(policy: Box<dyn CachePolicy>) -> MemoryStore {
        MemoryStore {
            inner: Mutex::new(MemoryInner {
                artifacts: IndexMap::new(),
                policy,
                stats: StoreStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop all artifacts and zero the statistics.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.artifacts.clear();
        inner.policy.clear();
        inner.stats = StoreStats::default();
    }

    pub fn len(&self) -> usize {
        self.lock().artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, op_name: &str, digest: &str) -> Result<bool, InvariantError> {
        let mut inner = self.lock();
        let present = inner
            .artifacts
            .contains_key(&(op_name.to_string(), digest.to_string()));
        if !present {
            inner.stats.misses += 1;
        }
        Ok(present)
    }

    fn get(&self, op_name: &str, digest: &str) -> Result<Value, InvariantError> {
        let key = (op_name.to_string(), digest.to_string());
        let mut inner = self.lock();
        match inner.artifacts.get(&key).cloned() {
            Some(value) => {
                inner.policy.record_access(&key);
                inner.stats.hits += 1;
                Ok(value)
            }
            None => {
                inner.stats.misses += 1;
                Err(InvariantError::StoreIo(format!(
                    "artifact ('{}', '{}') not found",
                    op_name, digest
                )))
            }
        }
    }

    fn put(&self, op_name: &str, digest: &str, artifact: &Value) -> Result<(), InvariantError> {
        let key = (op_name.to_string(), digest.to_string());
        let mut inner = self.lock();

        // Make room before inserting, so the newcomer is never its own
        // victim.
        if !inner.artifacts.contains_key(&key) {
            if let Some(capacity) = inner.policy.capacity() {
                while inner.artifacts.len() >= capacity {
                    match inner.policy.evict() {
                        Some(victim) => {
                            inner.artifacts.shift_remove(&victim);
                        }
                        None => break,
                    }
                }
            }
        }

        inner.artifacts.insert(key.clone(), artifact.clone());
        inner.policy.record_insert(key);
        inner.stats.puts += 1;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        self.lock().stats
    }

    fn reset_stats(&self) {
        self.lock().stats = StoreStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    #[test]
    fn test_iv011_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("add", &digest(1), &Value::int(8)).unwrap();
        assert!(store.exists("add", &digest(1)).unwrap());
        assert_eq!(store.get("add", &digest(1)).unwrap(), Value::int(8));
    }

    #[test]
    fn test_iv011_composite_key_separates_ops() {
        let store = MemoryStore::new();
        store.put("add", &digest(1), &Value::int(8)).unwrap();
        store.put("multiply", &digest(1), &Value::int(15)).unwrap();
        assert_eq!(store.get("add", &digest(1)).unwrap(), Value::int(8));
        assert_eq!(store.get("multiply", &digest(1)).unwrap(), Value::int(15));
    }

    #[test]
    fn test_iv011_get_absent_fails() {
        let store = MemoryStore::new();
        assert!(store.get("add", &digest(9)).is_err());
    }

    #[test]
    fn test_iv011_put_is_idempotent() {
        let store = MemoryStore::new();
        store.put("add", &digest(1), &Value::int(8)).unwrap();
        store.put("add", &digest(1), &Value::int(8)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("add", &digest(1)).unwrap(), Value::int(8));
    }

    #[test]
    fn test_iv011_stats_counting() {
        let store = MemoryStore::new();
        assert!(!store.exists("add", &digest(1)).unwrap()); // miss
        store.put("add", &digest(1), &Value::int(8)).unwrap(); // put
        assert!(store.exists("add", &digest(1)).unwrap()); // no count
        store.get("add", &digest(1)).unwrap(); // hit
        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 1);

        store.reset_stats();
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_iv011_clear_zeroes_stats_and_artifacts() {
        let store = MemoryStore::new();
        store.put("add", &digest(1), &Value::int(8)).unwrap();
        store.get("add", &digest(1)).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_iv011_lru_evicts_coldest() {
        let store = MemoryStore::lru(2);
        store.put("op", &digest(1), &Value::int(1)).unwrap();
        store.put("op", &digest(2), &Value::int(2)).unwrap();
        // Touch 1 so 2 becomes the coldest.
        store.get("op", &digest(1)).unwrap();
        store.put("op", &digest(3), &Value::int(3)).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("op", &digest(1)).is_ok());
        assert!(store.get("op", &digest(2)).is_err());
        assert!(store.get("op", &digest(3)).is_ok());
    }

    #[test]
    fn test_iv011_lfu_evicts_least_frequent() {
        let store = MemoryStore::lfu(2);
        store.put("op", &digest(1), &Value::int(1)).unwrap();
        store.put("op", &digest(2), &Value::int(2)).unwrap();
        store.get("op", &digest(1)).unwrap();
        store.get("op", &digest(1)).unwrap();
        store.get("op", &digest(2)).unwrap();
        store.put("op", &digest(3), &Value::int(3)).unwrap();
        // digest(2) had fewer accesses than digest(1).
        assert!(store.get("op", &digest(1)).is_ok());
        assert!(store.get("op", &digest(2)).is_err());
    }

    #[test]
    fn test_iv011_lfu_tie_evicts_earliest() {
        let store = MemoryStore::lfu(2);
        store.put("op", &digest(1), &Value::int(1)).unwrap();
        store.put("op", &digest(2), &Value::int(2)).unwrap();
        store.put("op", &digest(3), &Value::int(3)).unwrap();
        assert!(store.get("op", &digest(1)).is_err());
        assert!(store.get("op", &digest(2)).is_ok());
    }

    #[test]
    fn test_iv011_unbounded_never_evicts() {
        let store = MemoryStore::unbounded();
        for i in 0..50u8 {
            store.put("op", &digest(i), &Value::int(i as i64)).unwrap();
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_iv011_custom_policy() {
        // A policy that refuses to hold more than one key, always
        // evicting whatever is stored.
        struct OneSlot {
            held: Option<StoreKey>,
        }
        impl CachePolicy for OneSlot {
            fn capacity(&self) -> Option<usize> {
                Some(1)
            }
            fn record_access(&mut self, _key: &StoreKey) {}
            fn record_insert(&mut self, key: StoreKey) {
                self.held = Some(key);
            }
            fn evict(&mut self) -> Option<StoreKey> {
                self.held.take()
            }
            fn clear(&mut self) {
                self.held = None;
            }
        }

        let store = MemoryStore::with_policy(Box::new(OneSlot { held: None }));
        store.put("op", &digest(1), &Value::int(1)).unwrap();
        store.put("op", &digest(2), &Value::int(2)).unwrap();
        assert_eq!(store.len(), 1);
    }
}
