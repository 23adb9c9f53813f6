//! IV-006: Parameter trees, markers, and the parameter resolver.
//!
//! Parameter trees are what vertices declare; resolution turns them
//! into manifests by replacing markers with values drawn from the
//! environment (dependency artifacts plus context bindings).
//!
//! Three marker kinds: a reference marker resolving to a dependency's
//! artifact, an expression marker resolving to the evaluator's result,
//! and `${...}` interpolation inside string literals. A string whose
//! trimmed content is exactly one `${expr}` resolves to the native
//! result of `expr`; any other occurrence stringifies each segment.

use crate::core::types::Manifest;
use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::expr::{eval, VariableEnv};
use indexmap::IndexMap;

/// A node in a parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A literal value. String literals may carry `${...}` segments.
    Value(Value),
    /// Reference marker: resolves to the named dependency's artifact.
    Ref(String),
    /// Expression marker: resolves to the evaluated expression result.
    Cel(String),
    List(Vec<Param>),
    Map(IndexMap<String, Param>),
}

impl Param {
    pub fn lit(value: impl Into<Value>) -> Param {
        Param::Value(value.into())
    }

    pub fn refer(dep: &str) -> Param {
        Param::Ref(dep.to_string())
    }

    pub fn cel(expr: &str) -> Param {
        Param::Cel(expr.to_string())
    }
}

/// Collect every reference-marker dependency name in a parameter tree.
pub fn collect_refs(param: &Param, out: &mut Vec<String>) {
    match param {
        Param::Ref(dep) => out.push(dep.clone()),
        Param::List(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Param::Map(map) => {
            for value in map.values() {
                collect_refs(value, out);
            }
        }
        Param::Value(_) | Param::Cel(_) => {}
    }
}

/// Resolve a full parameter map into a manifest.
pub fn resolve_params(
    params: &IndexMap<String, Param>,
    env: &VariableEnv,
) -> Result<Manifest, InvariantError> {
    let mut manifest = Manifest::new();
    for (key, param) in params {
        let value = resolve_param(param, env)
            .map_err(|e| prefix_key(e, key))?;
        manifest.insert(key.clone(), value);
    }
    Ok(manifest)
}

fn prefix_key(e: InvariantError, key: &str) -> InvariantError {
    match e {
        InvariantError::Resolution(m) => {
            InvariantError::Resolution(format!("param '{}': {}", key, m))
        }
        other => other,
    }
}

/// Resolve a single parameter tree against an environment.
pub fn resolve_param(param: &Param, env: &VariableEnv) -> Result<Value, InvariantError> {
    match param {
        Param::Value(Value::Str(s)) => resolve_string(s, env),
        Param::Value(v) => Ok(v.clone()),
        Param::Ref(dep) => env.get(dep).cloned().ok_or_else(|| {
            InvariantError::Resolution(format!(
                "reference to '{}' is not bound in the environment",
                dep
            ))
        }),
        Param::Cel(expr) => eval(expr, env),
        Param::List(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_param(item, env)?);
            }
            Ok(Value::List(resolved))
        }
        Param::Map(map) => {
            let mut resolved = IndexMap::new();
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_param(value, env)?);
            }
            Ok(Value::Map(resolved))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Text(String),
    Expr(String),
}

/// Split a string into literal text and `${...}` expression segments.
/// `${` opens a segment; the balanced matching `}` closes it. An
/// unbalanced `${` with no closing brace is literal text.
fn scan_segments(s: &str) -> Vec<Segment> {
    let chars: Vec<char> = s.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '{' {
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                let inner: String = chars[i + 2..j - 1].iter().collect();
                segments.push(Segment::Expr(inner));
                i = j;
                continue;
            }
            // No closing brace: the rest is literal.
            text.extend(&chars[i..]);
            break;
        }
        text.push(chars[i]);
        i += 1;
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

fn resolve_string(s: &str, env: &VariableEnv) -> Result<Value, InvariantError> {
    if !s.contains("${") {
        return Ok(Value::Str(s.to_string()));
    }

    let segments = scan_segments(s.trim());
    if segments.len() == 1 {
        if let Segment::Expr(expr) = &segments[0] {
            // Whole-string interpolation: native result, not stringified.
            return eval(expr.trim(), env);
        }
    }

    // Mixed text and expressions: stringify each segment over the
    // original (untrimmed) string.
    let mut result = String::new();
    for segment in scan_segments(s) {
        match segment {
            Segment::Text(t) => result.push_str(&t),
            Segment::Expr(expr) => {
                let value = eval(expr.trim(), env)?;
                result.push_str(&value.to_text());
            }
        }
    }
    Ok(Value::Str(result))
}
