//! IV-015: Null store — never caches, forcing every dispatch.

use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::store::{ArtifactStore, StoreStats};

/// `exists` is always false, `put` is a no-op, `get` fails. Use when
/// execution should be forced regardless of prior work. Statistics
/// stay zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> NullStore {
        NullStore
    }
}

impl ArtifactStore for NullStore {
    fn exists(&self, _op_name: &str, _digest: &str) -> Result<bool, InvariantError> {
        Ok(false)
    }

    fn get(&self, op_name: &str, digest: &str) -> Result<Value, InvariantError> {
        Err(InvariantError::StoreIo(format!(
            "artifact ('{}', '{}') not found (null store)",
            op_name, digest
        )))
    }

    fn put(&self, _op_name: &str, _digest: &str, _artifact: &Value) -> Result<(), InvariantError> {
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats::default()
    }

    fn reset_stats(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iv015_never_caches() {
        let store = NullStore::new();
        let d = "0".repeat(64);
        store.put("op", &d, &Value::int(1)).unwrap();
        assert!(!store.exists("op", &d).unwrap());
        assert!(store.get("op", &d).is_err());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_iv015_get_or_compute_always_computes() {
        let store = NullStore::new();
        let d = "0".repeat(64);
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            Ok(Value::int(7))
        };
        store.get_or_compute("op", &d, &mut compute).unwrap();
        store.get_or_compute("op", &d, &mut compute).unwrap();
        assert_eq!(calls, 2);
    }
}
