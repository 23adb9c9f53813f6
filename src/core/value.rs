//! IV-001: The closed value universe.
//!
//! Everything the engine stores, hashes, or passes between vertices is a
//! `Value`. The union is closed under list/map composition and domain
//! embedding: no float, no byte string, no arbitrary object. Making the
//! universe a sum type turns "is this cacheable?" into a compile-time
//! guarantee.

use indexmap::IndexMap;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Capability set for opaque domain artifacts (polynomials, images, ...).
///
/// A domain artifact carries a fully-qualified type identifier, a
/// deterministic byte serialization, and a stable structural hash that
/// agrees across processes and runs for the same logical content.
/// Deserialization is registered per type name in
/// [`crate::store::codec::DomainTypeRegistry`]; no reflection.
pub trait DomainArtifact: fmt::Debug + Send + Sync {
    /// Fully-qualified type identifier, e.g. `"invariant.ops.poly.Polynomial"`.
    fn type_name(&self) -> &str;

    /// Deterministic hash of the artifact's structural state.
    fn stable_hash(&self) -> [u8; 32];

    /// Append the deterministic serialization to `out`. Must be the
    /// inverse of the decoder registered for `type_name`, and must be
    /// self-delimiting so artifacts can nest inside containers.
    fn to_stream(&self, out: &mut Vec<u8>);

    /// Public attribute set, projected into the value universe. Field
    /// access from expressions reads these entries.
    fn attributes(&self) -> IndexMap<String, Value>;

    /// Downcast hook so operations can recover their concrete types.
    fn as_any(&self) -> &dyn Any;
}

/// A member of the closed value universe.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// Arbitrary-precision signed integer.
    Int(BigInt),
    /// Exact decimal; hashed and serialized via its canonical text form.
    Decimal(Decimal),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// Opaque artifact implementing [`DomainArtifact`].
    Domain(Arc<dyn DomainArtifact>),
}

impl Value {
    /// Human-readable variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Str(_) => "Str",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Domain(_) => "Domain",
        }
    }

    pub fn int(v: i64) -> Value {
        Value::Int(BigInt::from(v))
    }

    pub fn str(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_domain(&self) -> Option<&Arc<dyn DomainArtifact>> {
        match self {
            Value::Domain(d) => Some(d),
            _ => None,
        }
    }

    /// Deterministic textual form, used when a value is substituted into
    /// an interpolated string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Decimal(d) => canonical_decimal_string(d),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_text).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let parts: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{}: {}", k, map[k.as_str()].to_text()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Domain(d) => {
                let hex = hex::encode(d.stable_hash());
                format!("<{} {}>", d.type_name(), &hex[..12])
            }
        }
    }
}

/// Canonical decimal text: normalized scale (no trailing non-significant
/// zeros) and `-0` collapsed to `0`. This form is the single source of
/// truth for decimal hashing, equality, and serialization.
pub fn canonical_decimal_string(d: &Decimal) -> String {
    if d.is_zero() {
        return "0".to_string();
    }
    d.normalize().to_string()
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Maps compare by content; iteration order is irrelevant.
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Domain(a), Value::Domain(b)) => {
                a.type_name() == b.type_name() && a.stable_hash() == b.stable_hash()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(BigInt::from(v))
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Value {
        Value::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Value {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Value {
        Value::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_iv001_structural_equality() {
        assert_eq!(Value::int(5), Value::int(5));
        assert_ne!(Value::int(5), Value::int(6));
        assert_ne!(Value::int(5), Value::str("5"));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn test_iv001_int_and_decimal_are_distinct_variants() {
        let i = Value::int(1);
        let d = Value::Decimal(Decimal::from_str("1").unwrap());
        assert_ne!(i, d);
    }

    #[test]
    fn test_iv001_decimal_equality_ignores_scale() {
        let a = Value::Decimal(Decimal::from_str("1.50").unwrap());
        let b = Value::Decimal(Decimal::from_str("1.5").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_iv001_map_equality_ignores_order() {
        let mut m1 = IndexMap::new();
        m1.insert("a".to_string(), Value::int(1));
        m1.insert("b".to_string(), Value::int(2));
        let mut m2 = IndexMap::new();
        m2.insert("b".to_string(), Value::int(2));
        m2.insert("a".to_string(), Value::int(1));
        assert_eq!(Value::Map(m1), Value::Map(m2));
    }

    #[test]
    fn test_iv001_canonical_decimal_string() {
        assert_eq!(
            canonical_decimal_string(&Decimal::from_str("1.500").unwrap()),
            "1.5"
        );
        assert_eq!(
            canonical_decimal_string(&Decimal::from_str("-0.0").unwrap()),
            "0"
        );
        assert_eq!(
            canonical_decimal_string(&Decimal::from_str("0.00").unwrap()),
            "0"
        );
        assert_eq!(
            canonical_decimal_string(&Decimal::from_str("-2.25").unwrap()),
            "-2.25"
        );
    }

    #[test]
    fn test_iv001_to_text() {
        assert_eq!(Value::Null.to_text(), "null");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::int(-7).to_text(), "-7");
        assert_eq!(
            Value::Decimal(Decimal::from_str("2.50").unwrap()).to_text(),
            "2.5"
        );
        assert_eq!(
            Value::List(vec![Value::int(1), Value::str("x")]).to_text(),
            "[1, x]"
        );
    }

    #[test]
    fn test_iv001_to_text_map_sorts_keys() {
        let mut m = IndexMap::new();
        m.insert("z".to_string(), Value::int(1));
        m.insert("a".to_string(), Value::int(2));
        assert_eq!(Value::Map(m).to_text(), "{a: 2, z: 1}");
    }

    #[test]
    fn test_iv001_big_integers_survive() {
        let big = BigInt::from_str("123456789012345678901234567890").unwrap();
        let v = Value::Int(big.clone());
        assert_eq!(v.as_int(), Some(&big));
        assert_eq!(v.to_text(), "123456789012345678901234567890");
    }
}
