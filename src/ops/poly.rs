//! IV-019: Polynomial operations and the reference domain artifact.
//!
//! `Polynomial` exercises the whole domain capability set: stable
//! hashing, stream serialization, attribute projection, and type-name
//! registration for the disk codec and the wire format.

use crate::core::registry::{OpFn, OpRegistry};
use crate::core::types::Manifest;
use crate::core::value::{DomainArtifact, Value};
use crate::errors::InvariantError;
use crate::store::codec::{ByteReader, DomainTypeRegistry};
use indexmap::IndexMap;
use num_bigint::BigInt;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const POLYNOMIAL_TYPE: &str = "invariant.ops.poly.Polynomial";

fn err(msg: String) -> InvariantError {
    InvariantError::Dispatch(msg)
}

/// A polynomial over arbitrary-precision integer coefficients, stored
/// lowest degree first with trailing zeros stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polynomial {
    coefficients: Vec<BigInt>,
}

impl Polynomial {
    pub fn new(mut coefficients: Vec<BigInt>) -> Polynomial {
        let zero = BigInt::from(0);
        while coefficients.len() > 1 && coefficients.last() == Some(&zero) {
            coefficients.pop();
        }
        if coefficients.is_empty() {
            coefficients.push(zero);
        }
        Polynomial { coefficients }
    }

    pub fn from_i64(coefficients: &[i64]) -> Polynomial {
        Polynomial::new(coefficients.iter().map(|c| BigInt::from(*c)).collect())
    }

    pub fn coefficients(&self) -> &[BigInt] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Horner's method, highest degree down.
    pub fn evaluate(&self, x: &BigInt) -> BigInt {
        let mut result = BigInt::from(0);
        for coefficient in self.coefficients.iter().rev() {
            result = result * x + coefficient;
        }
        result
    }

    pub fn add(&self, other: &Polynomial) -> Polynomial {
        let zero = BigInt::from(0);
        let len = self.coefficients.len().max(other.coefficients.len());
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let a = self.coefficients.get(i).unwrap_or(&zero);
            let b = other.coefficients.get(i).unwrap_or(&zero);
            out.push(a + b);
        }
        Polynomial::new(out)
    }

    /// Convolution of coefficient lists.
    pub fn multiply(&self, other: &Polynomial) -> Polynomial {
        let len = self.coefficients.len() + other.coefficients.len() - 1;
        let mut out = vec![BigInt::from(0); len];
        for (i, a) in self.coefficients.iter().enumerate() {
            for (j, b) in other.coefficients.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Polynomial::new(out)
    }
}

impl DomainArtifact for Polynomial {
    fn type_name(&self) -> &str {
        POLYNOMIAL_TYPE
    }

    fn stable_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(POLYNOMIAL_TYPE.as_bytes());
        for coefficient in &self.coefficients {
            hasher.update(b"\0");
            hasher.update(coefficient.to_string().as_bytes());
        }
        hasher.finalize().into()
    }

    fn to_stream(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.coefficients.len() as u32).to_be_bytes());
        for coefficient in &self.coefficients {
            let bytes = coefficient.to_signed_bytes_be();
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
    }

    fn attributes(&self) -> IndexMap<String, Value> {
        let mut attrs = IndexMap::new();
        attrs.insert(
            "coefficients".to_string(),
            Value::List(
                self.coefficients
                    .iter()
                    .map(|c| Value::Int(c.clone()))
                    .collect(),
            ),
        );
        attrs.insert("degree".to_string(), Value::Int(BigInt::from(self.degree())));
        attrs
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Stream decoder, the inverse of `to_stream`.
pub fn polynomial_from_stream(
    reader: &mut ByteReader<'_>,
) -> Result<Arc<dyn DomainArtifact>, InvariantError> {
    let count = reader.read_u32()? as usize;
    let mut coefficients = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let len = reader.read_u32()? as usize;
        let bytes = reader.read_bytes(len)?;
        coefficients.push(if bytes.is_empty() {
            BigInt::from(0)
        } else {
            BigInt::from_signed_bytes_be(bytes)
        });
    }
    Ok(Arc::new(Polynomial::new(coefficients)))
}

/// Register the polynomial type with a domain-type registry (stream
/// decoding for the disk codec, JSON decoding for the wire format).
pub fn register_poly_types(types: &mut DomainTypeRegistry) {
    types.register(POLYNOMIAL_TYPE, Arc::new(polynomial_from_stream));
    types.register_json(
        POLYNOMIAL_TYPE,
        Arc::new(|json: &serde_json::Value| {
            let items = json.as_array().ok_or_else(|| {
                InvariantError::Validation(
                    "Polynomial JSON value must be an array of integers".to_string(),
                )
            })?;
            let mut coefficients = Vec::with_capacity(items.len());
            for item in items {
                let n = item.as_i64().ok_or_else(|| {
                    InvariantError::Validation(format!(
                        "Polynomial coefficient must be an integer, got {}",
                        item
                    ))
                })?;
                coefficients.push(BigInt::from(n));
            }
            Ok(Arc::new(Polynomial::new(coefficients)) as Arc<dyn DomainArtifact>)
        }),
    );
}

/// Register the `poly:*` package.
pub fn register_poly(registry: &mut OpRegistry) -> Result<(), InvariantError> {
    registry.register_package(
        "poly",
        vec![
            ("from_coefficients", Arc::new(from_coefficients) as OpFn),
            ("add", Arc::new(poly_add) as OpFn),
            ("multiply", Arc::new(poly_multiply) as OpFn),
            ("scale", Arc::new(poly_scale) as OpFn),
            ("derivative", Arc::new(poly_derivative) as OpFn),
            ("evaluate", Arc::new(poly_evaluate) as OpFn),
        ],
    )
}

fn as_polynomial(value: &Value) -> Option<Polynomial> {
    value
        .as_domain()
        .and_then(|d| d.as_any().downcast_ref::<Polynomial>())
        .cloned()
}

/// Polynomials in the manifest, scanned in sorted key order so the
/// catch-all convention stays deterministic.
fn polynomials_in(manifest: &Manifest) -> Vec<Polynomial> {
    let mut keys: Vec<&String> = manifest.keys().collect();
    keys.sort();
    keys.iter()
        .filter_map(|k| as_polynomial(&manifest[k.as_str()]))
        .collect()
}

fn integers_in(manifest: &Manifest) -> Vec<BigInt> {
    let mut keys: Vec<&String> = manifest.keys().collect();
    keys.sort();
    keys.iter()
        .filter_map(|k| manifest[k.as_str()].as_int().cloned())
        .collect()
}

/// Build a polynomial from a list of integer coefficients.
pub fn from_coefficients(manifest: &Manifest) -> Result<Value, InvariantError> {
    let coefficients = manifest
        .get("coefficients")
        .ok_or_else(|| err("poly:from_coefficients op requires 'coefficients' in manifest".to_string()))?
        .as_list()
        .ok_or_else(|| err("poly:from_coefficients: 'coefficients' must be a List".to_string()))?;

    let mut out = Vec::with_capacity(coefficients.len());
    for (index, coefficient) in coefficients.iter().enumerate() {
        let i = coefficient.as_int().ok_or_else(|| {
            err(format!(
                "poly:from_coefficients: coefficient at index {} must be Int, got {}",
                index,
                coefficient.type_name()
            ))
        })?;
        out.push(i.clone());
    }
    Ok(Value::Domain(Arc::new(Polynomial::new(out))))
}

/// Extract two polynomial operands: explicit `a`/`b` first, then the
/// first two polynomials found in the manifest.
fn extract_two(manifest: &Manifest, op: &str) -> Result<(Polynomial, Polynomial), InvariantError> {
    if let (Some(a), Some(b)) = (manifest.get("a"), manifest.get("b")) {
        if let (Some(a), Some(b)) = (as_polynomial(a), as_polynomial(b)) {
            return Ok((a, b));
        }
    }
    let mut found = polynomials_in(manifest);
    match found.len() {
        0 => Err(err(format!(
            "{} requires two Polynomial operands, found none in manifest",
            op
        ))),
        1 => Err(err(format!(
            "{} requires two Polynomial operands, found only one in manifest",
            op
        ))),
        _ => {
            let b = found.swap_remove(1);
            let a = found.swap_remove(0);
            Ok((a, b))
        }
    }
}

fn extract_one(manifest: &Manifest, op: &str) -> Result<Polynomial, InvariantError> {
    if let Some(poly) = manifest.get("poly").and_then(as_polynomial) {
        return Ok(poly);
    }
    polynomials_in(manifest).into_iter().next().ok_or_else(|| {
        err(format!(
            "{} requires a Polynomial operand, found none in manifest",
            op
        ))
    })
}

pub fn poly_add(manifest: &Manifest) -> Result<Value, InvariantError> {
    let (a, b) = extract_two(manifest, "poly:add")?;
    Ok(Value::Domain(Arc::new(a.add(&b))))
}

pub fn poly_multiply(manifest: &Manifest) -> Result<Value, InvariantError> {
    let (a, b) = extract_two(manifest, "poly:multiply")?;
    Ok(Value::Domain(Arc::new(a.multiply(&b))))
}

/// Multiply every coefficient by an integer scalar.
pub fn poly_scale(manifest: &Manifest) -> Result<Value, InvariantError> {
    let (poly, scalar) = match (
        manifest.get("poly").and_then(as_polynomial),
        manifest.get("scalar").and_then(|v| v.as_int().cloned()),
    ) {
        (Some(poly), Some(scalar)) => (poly, scalar),
        _ => {
            let polys = polynomials_in(manifest);
            let ints = integers_in(manifest);
            if polys.len() == 1 && ints.len() == 1 {
                (polys.into_iter().next().unwrap(), ints.into_iter().next().unwrap())
            } else {
                return Err(err(
                    "poly:scale op requires 'poly' and 'scalar' in manifest".to_string(),
                ));
            }
        }
    };
    let scaled = poly
        .coefficients()
        .iter()
        .map(|c| c * &scalar)
        .collect::<Vec<BigInt>>();
    Ok(Value::Domain(Arc::new(Polynomial::new(scaled))))
}

/// Derivative: coefficient i becomes i * c[i] at index i - 1.
pub fn poly_derivative(manifest: &Manifest) -> Result<Value, InvariantError> {
    let poly = extract_one(manifest, "poly:derivative")?;
    if poly.coefficients().len() <= 1 {
        return Ok(Value::Domain(Arc::new(Polynomial::from_i64(&[0]))));
    }
    let derived = poly
        .coefficients()
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, c)| c * BigInt::from(i))
        .collect::<Vec<BigInt>>();
    Ok(Value::Domain(Arc::new(Polynomial::new(derived))))
}

/// Evaluate at an integer point; returns Int.
pub fn poly_evaluate(manifest: &Manifest) -> Result<Value, InvariantError> {
    let (poly, x) = match (
        manifest.get("poly").and_then(as_polynomial),
        manifest.get("x").and_then(|v| v.as_int().cloned()),
    ) {
        (Some(poly), Some(x)) => (poly, x),
        _ => {
            let polys = polynomials_in(manifest);
            let ints = integers_in(manifest);
            if polys.len() == 1 && ints.len() == 1 {
                (polys.into_iter().next().unwrap(), ints.into_iter().next().unwrap())
            } else {
                return Err(err(
                    "poly:evaluate op requires 'poly' and 'x' in manifest".to_string(),
                ));
            }
        }
    };
    Ok(Value::Int(poly.evaluate(&x)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::Executor;
    use crate::core::params::Param;
    use crate::core::types::{Context, Graph, Vertex};
    use crate::store::codec;
    use crate::store::{ArtifactStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manifest(entries: Vec<(&str, Value)>) -> Manifest {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn poly_value(coefficients: &[i64]) -> Value {
        Value::Domain(Arc::new(Polynomial::from_i64(coefficients)))
    }

    #[test]
    fn test_iv019_trailing_zeros_stripped() {
        let p = Polynomial::from_i64(&[1, 2, 0, 0]);
        assert_eq!(p.coefficients().len(), 2);
        assert_eq!(p.degree(), 1);
        let zero = Polynomial::from_i64(&[0, 0, 0]);
        assert_eq!(zero.coefficients(), &[BigInt::from(0)]);
    }

    #[test]
    fn test_iv019_add_and_multiply() {
        let p = Polynomial::from_i64(&[1, 2, 1]); // x^2 + 2x + 1
        let q = Polynomial::from_i64(&[3, 0, -1]); // -x^2 + 3
        assert_eq!(p.add(&q), Polynomial::from_i64(&[4, 2]));
        // (x + 1)^2 * (x + 1) = x^3 + 3x^2 + 3x + 1
        let r = Polynomial::from_i64(&[1, 1]);
        assert_eq!(p.multiply(&r), Polynomial::from_i64(&[1, 3, 3, 1]));
    }

    #[test]
    fn test_iv019_horner_evaluation() {
        let p = Polynomial::from_i64(&[1, 2, 1]); // (x + 1)^2
        assert_eq!(p.evaluate(&BigInt::from(5)), BigInt::from(36));
        assert_eq!(p.evaluate(&BigInt::from(-1)), BigInt::from(0));
    }

    #[test]
    fn test_iv019_stable_hash_agrees_for_equal_polys() {
        let a = Polynomial::from_i64(&[1, 2, 0]);
        let b = Polynomial::from_i64(&[1, 2]);
        assert_eq!(a.stable_hash(), b.stable_hash());
        let c = Polynomial::from_i64(&[1, 2, 3]);
        assert_ne!(a.stable_hash(), c.stable_hash());
    }

    #[test]
    fn test_iv019_stream_roundtrip() {
        let p = Polynomial::from_i64(&[5, -3, 0, 7]);
        let mut bytes = Vec::new();
        p.to_stream(&mut bytes);
        let mut reader = ByteReader::new(&bytes);
        let back = polynomial_from_stream(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(
            back.as_any().downcast_ref::<Polynomial>().unwrap(),
            &p
        );
    }

    #[test]
    fn test_iv019_codec_roundtrip_via_type_registry() {
        let mut types = DomainTypeRegistry::new();
        register_poly_types(&mut types);

        let value = poly_value(&[1, 2, 1]);
        let bytes = codec::encode(&value).unwrap();
        let back = codec::decode(&bytes, &types).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_iv019_attributes_expose_coefficients() {
        let p = Polynomial::from_i64(&[4, 2]);
        let attrs = p.attributes();
        assert_eq!(
            attrs["coefficients"],
            Value::List(vec![Value::int(4), Value::int(2)])
        );
        assert_eq!(attrs["degree"], Value::int(1));
    }

    #[test]
    fn test_iv019_from_coefficients_op() {
        let m = manifest(vec![(
            "coefficients",
            Value::List(vec![Value::int(1), Value::int(2), Value::int(1)]),
        )]);
        let out = from_coefficients(&m).unwrap();
        let poly = as_polynomial(&out).unwrap();
        assert_eq!(poly, Polynomial::from_i64(&[1, 2, 1]));
    }

    #[test]
    fn test_iv019_ops_fall_back_to_manifest_scan() {
        let m = manifest(vec![
            ("p", poly_value(&[1, 1])),
            ("q", poly_value(&[2, 0, 1])),
        ]);
        let sum = poly_add(&m).unwrap();
        assert_eq!(as_polynomial(&sum).unwrap(), Polynomial::from_i64(&[3, 1, 1]));
    }

    #[test]
    fn test_iv019_add_requires_two_operands() {
        let m = manifest(vec![("p", poly_value(&[1, 1]))]);
        let e = poly_add(&m).unwrap_err();
        assert!(e.to_string().contains("only one"));
    }

    #[test]
    fn test_iv019_scale_and_derivative() {
        let m = manifest(vec![
            ("poly", poly_value(&[1, 2, 3])),
            ("scalar", Value::int(2)),
        ]);
        let scaled = poly_scale(&m).unwrap();
        assert_eq!(as_polynomial(&scaled).unwrap(), Polynomial::from_i64(&[2, 4, 6]));

        let m = manifest(vec![("poly", poly_value(&[1, 2, 3]))]);
        let derived = poly_derivative(&m).unwrap();
        assert_eq!(as_polynomial(&derived).unwrap(), Polynomial::from_i64(&[2, 6]));

        let constant = manifest(vec![("poly", poly_value(&[5]))]);
        let derived = poly_derivative(&constant).unwrap();
        assert_eq!(as_polynomial(&derived).unwrap(), Polynomial::from_i64(&[0]));
    }

    #[test]
    fn test_iv019_evaluate_op() {
        let m = manifest(vec![("poly", poly_value(&[1, 2, 1])), ("x", Value::int(5))]);
        assert_eq!(poly_evaluate(&m).unwrap(), Value::int(36));
    }

    /// Distributive law over a cold store: (p + q) * r == p*r + q*r,
    /// with poly:multiply dispatched exactly three times.
    #[test]
    fn test_iv019_distributive_law_pipeline() {
        let mut registry = OpRegistry::new();
        let multiplies = Arc::new(AtomicUsize::new(0));
        registry
            .register_fn("poly:from_coefficients", from_coefficients)
            .unwrap();
        registry.register_fn("poly:add", poly_add).unwrap();
        registry.register_fn("poly:evaluate", poly_evaluate).unwrap();
        {
            let counter = Arc::clone(&multiplies);
            registry
                .register_fn("poly:multiply", move |m: &Manifest| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    poly_multiply(m)
                })
                .unwrap();
        }

        let coeff_vertex = |coefficients: &[i64]| {
            let list = Value::List(coefficients.iter().map(|c| Value::int(*c)).collect());
            Vertex::op(
                "poly:from_coefficients",
                vec![("coefficients".to_string(), Param::Value(list))]
                    .into_iter()
                    .collect(),
                vec![],
            )
            .unwrap()
        };
        let binary_vertex = |op: &str, left: &str, right: &str| {
            Vertex::op(
                op,
                vec![
                    ("a".to_string(), Param::refer(left)),
                    ("b".to_string(), Param::refer(right)),
                ]
                .into_iter()
                .collect(),
                vec![left.to_string(), right.to_string()],
            )
            .unwrap()
        };
        let eval_vertex = |poly: &str| {
            Vertex::op(
                "poly:evaluate",
                vec![
                    ("poly".to_string(), Param::refer(poly)),
                    ("x".to_string(), Param::lit(5i64)),
                ]
                .into_iter()
                .collect(),
                vec![poly.to_string()],
            )
            .unwrap()
        };

        let mut graph = Graph::new();
        graph.insert("p".to_string(), coeff_vertex(&[1, 2, 1]));
        graph.insert("q".to_string(), coeff_vertex(&[3, 0, -1]));
        graph.insert("r".to_string(), coeff_vertex(&[1, 1]));
        graph.insert("p_plus_q".to_string(), binary_vertex("poly:add", "p", "q"));
        graph.insert("lhs".to_string(), binary_vertex("poly:multiply", "p_plus_q", "r"));
        graph.insert("pr".to_string(), binary_vertex("poly:multiply", "p", "r"));
        graph.insert("qr".to_string(), binary_vertex("poly:multiply", "q", "r"));
        graph.insert("rhs".to_string(), binary_vertex("poly:add", "pr", "qr"));
        graph.insert("eval_lhs".to_string(), eval_vertex("lhs"));
        graph.insert("eval_rhs".to_string(), eval_vertex("rhs"));

        let store = MemoryStore::new();
        let executor = Executor::new(&registry, &store);
        let results = executor.execute(&graph, &Context::new()).unwrap();

        let lhs = as_polynomial(&results["lhs"]).unwrap();
        let rhs = as_polynomial(&results["rhs"]).unwrap();
        assert_eq!(lhs.coefficients(), rhs.coefficients());
        assert_eq!(results["eval_lhs"], results["eval_rhs"]);
        assert_eq!(multiplies.load(Ordering::SeqCst), 3);
        assert!(store.stats().puts >= 8);
    }
}
