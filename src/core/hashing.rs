//! IV-002: Canonical recursive hashing of values and manifests.
//!
//! `hash_value` is total on the value universe and returns bytes that
//! are identical across machines and runs for structurally equal
//! inputs. Sorted map keys are the single source of canonicalisation.

use crate::core::types::Manifest;
use crate::core::value::{canonical_decimal_string, Value};
use sha2::{Digest, Sha256};

/// Recursively hash a value to 32 bytes.
///
/// Leaves hash their canonical byte form; containers absorb the raw
/// 32-byte child hashes into a fresh hasher (lists in order, maps in
/// sorted-key order with the key hashed as a string first). Domain
/// artifacts contribute their own stable hash, treated as opaque.
pub fn hash_value(value: &Value) -> [u8; 32] {
    match value {
        Value::Null => sha256_bytes(b"None"),
        Value::Bool(b) => sha256_bytes(if *b { b"true" } else { b"false" }),
        Value::Int(i) => sha256_bytes(i.to_string().as_bytes()),
        Value::Decimal(d) => sha256_bytes(canonical_decimal_string(d).as_bytes()),
        Value::Str(s) => sha256_bytes(s.as_bytes()),
        Value::List(items) => {
            let mut hasher = Sha256::new();
            for item in items {
                hasher.update(hash_value(item));
            }
            hasher.finalize().into()
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut hasher = Sha256::new();
            for key in keys {
                hasher.update(sha256_bytes(key.as_bytes()));
                hasher.update(hash_value(&map[key.as_str()]));
            }
            hasher.finalize().into()
        }
        Value::Domain(d) => d.stable_hash(),
    }
}

/// Hash a manifest. Equivalent to hashing it as a map value.
pub fn hash_manifest(manifest: &Manifest) -> [u8; 32] {
    let mut keys: Vec<&String> = manifest.keys().collect();
    keys.sort();
    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(sha256_bytes(key.as_bytes()));
        hasher.update(hash_value(&manifest[key.as_str()]));
    }
    hasher.finalize().into()
}

/// Digest of a manifest: lowercase hex of its 32-byte hash.
pub fn manifest_digest(manifest: &Manifest) -> String {
    hex::encode(hash_manifest(manifest))
}

fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn manifest(entries: &[(&str, Value)]) -> Manifest {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_iv002_hash_is_deterministic() {
        let v = Value::List(vec![Value::int(1), Value::str("x"), Value::Null]);
        assert_eq!(hash_value(&v), hash_value(&v));
    }

    #[test]
    fn test_iv002_distinct_leaves_distinct_hashes() {
        assert_ne!(hash_value(&Value::int(1)), hash_value(&Value::int(2)));
        assert_ne!(hash_value(&Value::int(1)), hash_value(&Value::str("1")));
        assert_ne!(
            hash_value(&Value::Bool(true)),
            hash_value(&Value::Bool(false))
        );
        assert_ne!(hash_value(&Value::Null), hash_value(&Value::str("None")));
    }

    #[test]
    fn test_iv002_map_hash_ignores_insertion_order() {
        let mut m1 = IndexMap::new();
        m1.insert("a".to_string(), Value::int(1));
        m1.insert("b".to_string(), Value::int(2));
        let mut m2 = IndexMap::new();
        m2.insert("b".to_string(), Value::int(2));
        m2.insert("a".to_string(), Value::int(1));
        assert_eq!(hash_value(&Value::Map(m1)), hash_value(&Value::Map(m2)));
    }

    #[test]
    fn test_iv002_list_order_matters() {
        let a = Value::List(vec![Value::int(1), Value::int(2)]);
        let b = Value::List(vec![Value::int(2), Value::int(1)]);
        assert_ne!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_iv002_decimal_scale_canonicalised() {
        let a = Value::Decimal(Decimal::from_str("1.50").unwrap());
        let b = Value::Decimal(Decimal::from_str("1.5").unwrap());
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_iv002_decimal_negative_zero() {
        let a = Value::Decimal(Decimal::from_str("-0.0").unwrap());
        let b = Value::Decimal(Decimal::from_str("0").unwrap());
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_iv002_int_and_decimal_hash_by_text_form() {
        // "2" as Int and "2" as Decimal share the same canonical text,
        // so they hash equal at the leaf level. Structural equality
        // still tells them apart; the cache key only sees manifests.
        let i = Value::int(2);
        let d = Value::Decimal(Decimal::from_str("2").unwrap());
        assert_eq!(hash_value(&i), hash_value(&d));
    }

    #[test]
    fn test_iv002_manifest_digest_is_hex_64() {
        let m = manifest(&[("a", Value::int(5)), ("b", Value::int(3))]);
        let digest = manifest_digest(&m);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, digest.to_lowercase());
    }

    #[test]
    fn test_iv002_equal_manifests_equal_digests() {
        let m1 = manifest(&[("a", Value::int(5)), ("b", Value::int(3))]);
        let m2 = manifest(&[("b", Value::int(3)), ("a", Value::int(5))]);
        assert_eq!(manifest_digest(&m1), manifest_digest(&m2));
    }

    #[test]
    fn test_iv002_nested_structures() {
        let mut inner = IndexMap::new();
        inner.insert("k".to_string(), Value::List(vec![Value::int(1)]));
        let m1 = manifest(&[("outer", Value::Map(inner.clone()))]);
        let m2 = manifest(&[("outer", Value::Map(inner))]);
        assert_eq!(manifest_digest(&m1), manifest_digest(&m2));
    }
}
