//! IV-018: Standard operations for basic data manipulation.
//!
//! Each op draws its inputs from the manifest by name; missing required
//! keys are dispatch errors.

use crate::core::registry::OpRegistry;
use crate::core::types::Manifest;
use crate::core::value::Value;
use crate::errors::InvariantError;
use indexmap::IndexMap;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use std::str::FromStr;

fn err(msg: String) -> InvariantError {
    InvariantError::Dispatch(msg)
}

fn require<'m>(manifest: &'m Manifest, key: &str, op: &str) -> Result<&'m Value, InvariantError> {
    manifest
        .get(key)
        .ok_or_else(|| err(format!("{} op requires '{}' in manifest", op, key)))
}

/// Register the standard ops under their bare names.
pub fn register_stdlib(registry: &mut OpRegistry) -> Result<(), InvariantError> {
    registry.register_fn("identity", identity)?;
    registry.register_fn("add", add)?;
    registry.register_fn("multiply", multiply)?;
    registry.register_fn("dict_get", dict_get)?;
    registry.register_fn("dict_merge", dict_merge)?;
    registry.register_fn("list_append", list_append)?;
    registry.register_fn("from_integer", from_integer)?;
    Ok(())
}

/// Return the `value` input unchanged.
pub fn identity(manifest: &Manifest) -> Result<Value, InvariantError> {
    Ok(require(manifest, "value", "identity")?.clone())
}

/// Add `a` and `b`. Int when both operands are integers, Decimal otherwise.
pub fn add(manifest: &Manifest) -> Result<Value, InvariantError> {
    binary_numeric(manifest, "add", |x, y| x + y, |x, y| {
        x.checked_add(y)
            .ok_or_else(|| err("add: decimal overflow".to_string()))
    })
}

/// Multiply `a` and `b`. Int when both operands are integers, Decimal otherwise.
pub fn multiply(manifest: &Manifest) -> Result<Value, InvariantError> {
    binary_numeric(manifest, "multiply", |x, y| x * y, |x, y| {
        x.checked_mul(y)
            .ok_or_else(|| err("multiply: decimal overflow".to_string()))
    })
}

enum Numeric {
    Int(BigInt),
    Dec(Decimal),
}

/// Pull a numeric operand out of a manifest value. Domain artifacts
/// wrapping a scalar contribute their `value` attribute; numeric-looking
/// strings are parsed.
fn extract_numeric(value: &Value, name: &str) -> Result<Numeric, InvariantError> {
    match value {
        Value::Int(i) => Ok(Numeric::Int(i.clone())),
        Value::Decimal(d) => Ok(Numeric::Dec(*d)),
        Value::Str(s) => {
            if s.contains('.') {
                Decimal::from_str(s)
                    .map(Numeric::Dec)
                    .map_err(|_| err(format!("'{}' must be numeric, got string '{}'", name, s)))
            } else {
                s.parse::<BigInt>()
                    .map(Numeric::Int)
                    .map_err(|_| err(format!("'{}' must be numeric, got string '{}'", name, s)))
            }
        }
        Value::Domain(d) => match d.attributes().get("value") {
            Some(inner) => extract_numeric(inner, name),
            None => Err(err(format!(
                "'{}' must be numeric, got {} without a 'value' attribute",
                name,
                d.type_name()
            ))),
        },
        other => Err(err(format!(
            "'{}' must be numeric, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn int_to_decimal(i: &BigInt, op: &str) -> Result<Decimal, InvariantError> {
    Decimal::from_str(&i.to_string())
        .map_err(|_| err(format!("{}: integer {} exceeds decimal range", op, i)))
}

fn binary_numeric(
    manifest: &Manifest,
    op: &str,
    int_op: impl Fn(&BigInt, &BigInt) -> BigInt,
    dec_op: impl Fn(Decimal, Decimal) -> Result<Decimal, InvariantError>,
) -> Result<Value, InvariantError> {
    let a = extract_numeric(require(manifest, "a", op)?, "a")?;
    let b = extract_numeric(require(manifest, "b", op)?, "b")?;
    match (a, b) {
        (Numeric::Int(x), Numeric::Int(y)) => Ok(Value::Int(int_op(&x, &y))),
        (a, b) => {
            let x = match a {
                Numeric::Int(i) => int_to_decimal(&i, op)?,
                Numeric::Dec(d) => d,
            };
            let y = match b {
                Numeric::Int(i) => int_to_decimal(&i, op)?,
                Numeric::Dec(d) => d,
            };
            dec_op(x, y).map(Value::Decimal)
        }
    }
}

/// Extract `dict[key]`.
pub fn dict_get(manifest: &Manifest) -> Result<Value, InvariantError> {
    let dict = require(manifest, "dict", "dict_get")?
        .as_map()
        .ok_or_else(|| err("dict_get: 'dict' must be a Map".to_string()))?;
    let key = require(manifest, "key", "dict_get")?
        .as_str()
        .ok_or_else(|| err("dict_get: 'key' must be a Str".to_string()))?;
    dict.get(key)
        .cloned()
        .ok_or_else(|| err(format!("dict_get: key '{}' not found in dictionary", key)))
}

/// Merge the maps in `dicts`; later entries win on duplicate keys.
pub fn dict_merge(manifest: &Manifest) -> Result<Value, InvariantError> {
    let dicts = require(manifest, "dicts", "dict_merge")?
        .as_list()
        .ok_or_else(|| err("dict_merge: 'dicts' must be a List of Maps".to_string()))?;
    let mut merged: IndexMap<String, Value> = IndexMap::new();
    for (index, entry) in dicts.iter().enumerate() {
        let map = entry.as_map().ok_or_else(|| {
            err(format!(
                "dict_merge: element {} must be a Map, got {}",
                index,
                entry.type_name()
            ))
        })?;
        for (key, value) in map {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Map(merged))
}

/// Return `list` with `item` appended.
pub fn list_append(manifest: &Manifest) -> Result<Value, InvariantError> {
    let list = require(manifest, "list", "list_append")?
        .as_list()
        .ok_or_else(|| err("list_append: 'list' must be a List".to_string()))?;
    let item = require(manifest, "item", "list_append")?;
    let mut out = list.to_vec();
    out.push(item.clone());
    Ok(Value::List(out))
}

/// Pass an integer through, rejecting everything else.
pub fn from_integer(manifest: &Manifest) -> Result<Value, InvariantError> {
    let value = require(manifest, "value", "from_integer")?;
    match value {
        Value::Int(_) => Ok(value.clone()),
        other => Err(err(format!(
            "from_integer op requires an Int value, got {}",
            other.type_name()
        ))),
    }
}
