//! IV-014: Two-tier chain store.
//!
//! L1 is consulted first; an L2 hit promotes the artifact into L1
//! before returning. Writes go to both tiers. Each tier keeps its own
//! statistics; the chain's counters are the aggregate view of the
//! composite operations.

use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::store::{ArtifactStore, StoreStats};
use std::sync::{Mutex, MutexGuard};

pub struct ChainStore<L1: ArtifactStore, L2: ArtifactStore> {
    pub l1: L1,
    pub l2: L2,
    stats: Mutex<StoreStats>,
}

impl<L1: ArtifactStore, L2: ArtifactStore> ChainStore<L1, L2> {
    pub fn new(l1: L1, l2: L2) -> ChainStore<L1, L2> {
        ChainStore {
            l1,
            l2,
            stats: Mutex::new(StoreStats::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Per-tier statistics (L1, L2).
    pub fn tier_stats(&self) -> (StoreStats, StoreStats) {
        (self.l1.stats(), self.l2.stats())
    }
}

impl<L1: ArtifactStore, L2: ArtifactStore> ArtifactStore for ChainStore<L1, L2> {
    fn exists(&self, op_name: &str, digest: &str) -> Result<bool, InvariantError> {
        if self.l1.exists(op_name, digest)? {
            return Ok(true);
        }
        let present = self.l2.exists(op_name, digest)?;
        if !present {
            self.lock().misses += 1;
        }
        Ok(present)
    }

    fn get(&self, op_name: &str, digest: &str) -> Result<Value, InvariantError> {
        if self.l1.exists(op_name, digest)? {
            let value = self.l1.get(op_name, digest)?;
            self.lock().hits += 1;
            return Ok(value);
        }
        if self.l2.exists(op_name, digest)? {
            let value = self.l2.get(op_name, digest)?;
            // Promote for faster subsequent access.
            self.l1.put(op_name, digest, &value)?;
            self.lock().hits += 1;
            return Ok(value);
        }
        self.lock().misses += 1;
        Err(InvariantError::StoreIo(format!(
            "artifact ('{}', '{}') not found in L1 or L2",
            op_name, digest
        )))
    }

    fn put(&self, op_name: &str, digest: &str, artifact: &Value) -> Result<(), InvariantError> {
        self.l1.put(op_name, digest, artifact)?;
        self.l2.put(op_name, digest, artifact)?;
        self.lock().puts += 1;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        *self.lock()
    }

    fn reset_stats(&self) {
        *self.lock() = StoreStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DiskStore, MemoryStore};

    fn digest(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    fn chain_over(dir: &std::path::Path) -> ChainStore<MemoryStore, DiskStore> {
        ChainStore::new(MemoryStore::new(), DiskStore::with_root(dir))
    }

    #[test]
    fn test_iv014_put_writes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_over(dir.path());
        chain.put("op", &digest(1), &Value::int(5)).unwrap();
        assert!(chain.l1.exists("op", &digest(1)).unwrap());
        assert!(chain.l2.exists("op", &digest(1)).unwrap());
    }

    #[test]
    fn test_iv014_l2_hit_promotes_into_l1() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_over(dir.path());
        chain.put("op", &digest(1), &Value::int(5)).unwrap();

        chain.l1.clear();
        assert!(!chain.l1.exists("op", &digest(1)).unwrap());

        assert_eq!(chain.get("op", &digest(1)).unwrap(), Value::int(5));
        // Promoted: now present in L1 again.
        assert!(chain.l1.exists("op", &digest(1)).unwrap());
    }

    #[test]
    fn test_iv014_exists_consults_both() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_over(dir.path());
        chain.put("op", &digest(1), &Value::int(5)).unwrap();
        chain.l1.clear();
        assert!(chain.exists("op", &digest(1)).unwrap());
        assert!(!chain.exists("op", &digest(2)).unwrap());
    }

    #[test]
    fn test_iv014_miss_in_both_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_over(dir.path());
        let e = chain.get("op", &digest(9)).unwrap_err();
        assert!(e.to_string().contains("L1 or L2"));
    }

    #[test]
    fn test_iv014_aggregate_and_tier_stats_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_over(dir.path());
        chain.put("op", &digest(1), &Value::int(5)).unwrap();
        chain.get("op", &digest(1)).unwrap();

        let aggregate = chain.stats();
        assert_eq!(aggregate.puts, 1);
        assert_eq!(aggregate.hits, 1);

        let (l1, l2) = chain.tier_stats();
        assert_eq!(l1.puts, 1);
        assert_eq!(l2.puts, 1);
        // The chain's hit came from L1; L2 was never read.
        assert_eq!(l2.hits, 0);
    }
}
