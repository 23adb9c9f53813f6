//! IV-017: JSON wire format for graphs.
//!
//! Document envelope: `{"format": "invariant-graph", "version": 1,
//! "graph": {...}}`. Single-key objects whose only key is a reserved
//! `$`-prefixed name are markers; multi-key objects are plain maps. A
//! plain map that would decode as a marker is wrapped in `$literal` on
//! encode. Encoding is deterministic: object keys are emitted sorted
//! and dependency lists are sorted too (bindings are by name, so dep
//! order is not semantic). JSON floats are rejected outright.
//!
//! `$tuple` is accepted for compatibility with producers that
//! distinguish tuples from lists; it decodes to a List, and the encoder
//! never emits it.

use crate::core::params::Param;
use crate::core::types::{Graph, Vertex};
use crate::core::value::{canonical_decimal_string, Value};
use crate::errors::InvariantError;
use crate::store::codec::DomainTypeRegistry;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde_json::{json, Value as Json};
use std::str::FromStr;

pub const FORMAT_ID: &str = "invariant-graph";
pub const SUPPORTED_VERSIONS: [u64; 1] = [1];

const RESERVED_KEYS: [&str; 6] = [
    "$ref",
    "$cel",
    "$decimal",
    "$tuple",
    "$literal",
    "$icacheable",
];

fn err(msg: String) -> InvariantError {
    InvariantError::Validation(msg)
}

// ============================================================================
// Decoding
// ============================================================================

/// Parse a wire document from JSON text.
pub fn decode_document(text: &str, types: &DomainTypeRegistry) -> Result<Graph, InvariantError> {
    let json: Json =
        serde_json::from_str(text).map_err(|e| err(format!("invalid JSON document: {}", e)))?;
    decode_document_value(&json, types)
}

/// Decode an already-parsed wire document.
pub fn decode_document_value(
    json: &Json,
    types: &DomainTypeRegistry,
) -> Result<Graph, InvariantError> {
    let obj = json
        .as_object()
        .ok_or_else(|| err("document must be a JSON object".to_string()))?;

    let format = obj
        .get("format")
        .and_then(Json::as_str)
        .ok_or_else(|| err("document missing 'format' string".to_string()))?;
    if format != FORMAT_ID {
        return Err(err(format!(
            "unsupported format '{}' (expected '{}')",
            format, FORMAT_ID
        )));
    }

    let version = obj
        .get("version")
        .and_then(Json::as_u64)
        .ok_or_else(|| err("document missing integer 'version'".to_string()))?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(err(format!("unsupported version {}", version)));
    }

    let graph = obj
        .get("graph")
        .ok_or_else(|| err("document missing 'graph' object".to_string()))?;
    decode_graph(graph, types)
}

fn decode_graph(json: &Json, types: &DomainTypeRegistry) -> Result<Graph, InvariantError> {
    let obj = json
        .as_object()
        .ok_or_else(|| err("'graph' must be a JSON object".to_string()))?;
    let mut graph = Graph::new();
    for (name, vertex_json) in obj {
        let vertex = decode_vertex(vertex_json, types)
            .map_err(|e| e.at_vertex(name))?;
        graph.insert(name.clone(), vertex);
    }
    Ok(graph)
}

fn decode_vertex(json: &Json, types: &DomainTypeRegistry) -> Result<Vertex, InvariantError> {
    let obj = json
        .as_object()
        .ok_or_else(|| err("vertex must be a JSON object".to_string()))?;
    let kind = obj
        .get("kind")
        .and_then(Json::as_str)
        .ok_or_else(|| err("vertex missing 'kind' string".to_string()))?;

    let params = decode_params(obj.get("params").unwrap_or(&Json::Null), types)?;
    let deps = decode_deps(obj.get("deps").unwrap_or(&Json::Null))?;

    match kind {
        "node" => {
            let op_name = obj
                .get("op_name")
                .and_then(Json::as_str)
                .ok_or_else(|| err("node vertex missing 'op_name' string".to_string()))?;
            let cache = match obj.get("cache") {
                None => true,
                Some(Json::Bool(b)) => *b,
                Some(other) => {
                    return Err(err(format!("'cache' must be a boolean, got {}", other)))
                }
            };
            Vertex::op_with_cache(op_name, params, deps, cache)
        }
        "subgraph" => {
            let inner = obj
                .get("graph")
                .ok_or_else(|| err("subgraph vertex missing 'graph' object".to_string()))?;
            let output = obj
                .get("output")
                .and_then(Json::as_str)
                .ok_or_else(|| err("subgraph vertex missing 'output' string".to_string()))?;
            let graph = decode_graph(inner, types)?;
            Vertex::subgraph(params, deps, graph, output)
        }
        other => Err(err(format!("unknown vertex kind '{}'", other))),
    }
}

fn decode_params(
    json: &Json,
    types: &DomainTypeRegistry,
) -> Result<IndexMap<String, Param>, InvariantError> {
    match json {
        Json::Null => Ok(IndexMap::new()),
        Json::Object(obj) => {
            let mut params = IndexMap::new();
            for (key, value) in obj {
                params.insert(key.clone(), decode_param(value, types)?);
            }
            Ok(params)
        }
        other => Err(err(format!("'params' must be a JSON object, got {}", other))),
    }
}

fn decode_deps(json: &Json) -> Result<Vec<String>, InvariantError> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| err(format!("'deps' entries must be strings, got {}", item)))
            })
            .collect(),
        other => Err(err(format!("'deps' must be a JSON array, got {}", other))),
    }
}

fn decode_param(json: &Json, types: &DomainTypeRegistry) -> Result<Param, InvariantError> {
    match json {
        Json::Object(obj) if obj.len() == 1 => {
            let (key, value) = match obj.iter().next() {
                Some((k, v)) => (k.as_str(), v),
                None => return decode_plain_object(obj, types),
            };
            match key {
                "$ref" => value
                    .as_str()
                    .map(|dep| Param::Ref(dep.to_string()))
                    .ok_or_else(|| err("'$ref' must carry a string".to_string())),
                "$cel" => value
                    .as_str()
                    .map(|expr| Param::Cel(expr.to_string()))
                    .ok_or_else(|| err("'$cel' must carry a string".to_string())),
                "$decimal" => {
                    let text = value
                        .as_str()
                        .ok_or_else(|| err("'$decimal' must carry a string".to_string()))?;
                    Decimal::from_str(text)
                        .map(|d| Param::Value(Value::Decimal(d)))
                        .map_err(|_| err(format!("'$decimal' carries invalid literal '{}'", text)))
                }
                "$tuple" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| err("'$tuple' must carry an array".to_string()))?;
                    let decoded = items
                        .iter()
                        .map(|item| decode_param(item, types))
                        .collect::<Result<Vec<Param>, _>>()?;
                    Ok(Param::List(decoded))
                }
                "$literal" => decode_literal(value).map(Param::Value),
                "$icacheable" => decode_icacheable(value, types).map(Param::Value),
                _ => decode_plain_object(obj, types),
            }
        }
        Json::Object(obj) => decode_plain_object(obj, types),
        Json::Array(items) => {
            let decoded = items
                .iter()
                .map(|item| decode_param(item, types))
                .collect::<Result<Vec<Param>, _>>()?;
            Ok(Param::List(decoded))
        }
        scalar => decode_scalar(scalar).map(Param::Value),
    }
}

fn decode_plain_object(
    obj: &serde_json::Map<String, Json>,
    types: &DomainTypeRegistry,
) -> Result<Param, InvariantError> {
    let mut map = IndexMap::new();
    for (key, value) in obj {
        map.insert(key.clone(), decode_param(value, types)?);
    }
    Ok(Param::Map(map))
}

fn decode_scalar(json: &Json) -> Result<Value, InvariantError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(BigInt::from(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Int(BigInt::from(u)))
            } else {
                Err(err(format!(
                    "float {} is forbidden on the wire; use {{\"$decimal\": \"...\"}}",
                    n
                )))
            }
        }
        other => Err(err(format!("unexpected JSON value {}", other))),
    }
}

/// Decode with marker interpretation inhibited: every object is a plain
/// map, every array a list.
fn decode_literal(json: &Json) -> Result<Value, InvariantError> {
    match json {
        Json::Object(obj) => {
            let mut map = IndexMap::new();
            for (key, value) in obj {
                map.insert(key.clone(), decode_literal(value)?);
            }
            Ok(Value::Map(map))
        }
        Json::Array(items) => {
            let decoded = items
                .iter()
                .map(decode_literal)
                .collect::<Result<Vec<Value>, _>>()?;
            Ok(Value::List(decoded))
        }
        scalar => decode_scalar(scalar),
    }
}

fn decode_icacheable(
    json: &Json,
    types: &DomainTypeRegistry,
) -> Result<Value, InvariantError> {
    let obj = json
        .as_object()
        .ok_or_else(|| err("'$icacheable' must carry an object".to_string()))?;
    let type_name = obj
        .get("type")
        .and_then(Json::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| err("'$icacheable' must have a non-empty string 'type'".to_string()))?;

    let payload = obj.get("payload_b64");
    let value = obj.get("value");
    match (payload, value) {
        (Some(_), Some(_)) => Err(err(
            "'$icacheable' must have exactly one of 'payload_b64' or 'value'".to_string(),
        )),
        (None, None) => Err(err(
            "'$icacheable' must have 'payload_b64' or 'value'".to_string(),
        )),
        (Some(payload), None) => {
            let text = payload
                .as_str()
                .ok_or_else(|| err("'payload_b64' must be a string".to_string()))?;
            let bytes = BASE64
                .decode(text)
                .map_err(|e| err(format!("'payload_b64' is invalid base64: {}", e)))?;
            let artifact = types.decode_payload(type_name, &bytes).map_err(|e| {
                err(format!("'$icacheable' decode failed for '{}': {}", type_name, e))
            })?;
            Ok(Value::Domain(artifact))
        }
        (None, Some(json_value)) => {
            let artifact = types.decode_json(type_name, json_value).map_err(|e| {
                err(format!("'$icacheable' decode failed for '{}': {}", type_name, e))
            })?;
            Ok(Value::Domain(artifact))
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a graph into a wire document. Keys are emitted sorted (the
/// JSON object representation orders them), so structurally equal
/// graphs serialize identically.
pub fn encode_document(graph: &Graph) -> Result<Json, InvariantError> {
    Ok(json!({
        "format": FORMAT_ID,
        "version": 1,
        "graph": encode_graph(graph)?,
    }))
}

/// Encode a graph into JSON text.
pub fn encode_document_string(graph: &Graph) -> Result<String, InvariantError> {
    let doc = encode_document(graph)?;
    serde_json::to_string(&doc).map_err(|e| err(format!("JSON serialize error: {}", e)))
}

fn encode_graph(graph: &Graph) -> Result<Json, InvariantError> {
    let mut obj = serde_json::Map::new();
    for (name, vertex) in graph {
        obj.insert(name.clone(), encode_vertex(vertex)?);
    }
    Ok(Json::Object(obj))
}

fn encode_vertex(vertex: &Vertex) -> Result<Json, InvariantError> {
    match vertex {
        Vertex::Op {
            op_name,
            params,
            deps,
            cache,
        } => {
            let mut obj = serde_json::Map::new();
            obj.insert("kind".to_string(), json!("node"));
            obj.insert("op_name".to_string(), json!(op_name));
            obj.insert("params".to_string(), encode_params(params)?);
            obj.insert("deps".to_string(), json!(sorted_deps(deps)));
            if !cache {
                obj.insert("cache".to_string(), json!(false));
            }
            Ok(Json::Object(obj))
        }
        Vertex::SubGraph {
            params,
            deps,
            graph,
            output,
        } => {
            let mut obj = serde_json::Map::new();
            obj.insert("kind".to_string(), json!("subgraph"));
            obj.insert("params".to_string(), encode_params(params)?);
            obj.insert("deps".to_string(), json!(sorted_deps(deps)));
            obj.insert("graph".to_string(), encode_graph(graph)?);
            obj.insert("output".to_string(), json!(output));
            Ok(Json::Object(obj))
        }
    }
}

fn sorted_deps(deps: &[String]) -> Vec<String> {
    let mut out = deps.to_vec();
    out.sort();
    out
}

fn encode_params(params: &IndexMap<String, Param>) -> Result<Json, InvariantError> {
    let mut obj = serde_json::Map::new();
    for (key, param) in params {
        obj.insert(key.clone(), encode_param(param)?);
    }
    Ok(Json::Object(obj))
}

fn encode_param(param: &Param) -> Result<Json, InvariantError> {
    match param {
        Param::Ref(dep) => Ok(json!({ "$ref": dep })),
        Param::Cel(expr) => Ok(json!({ "$cel": expr })),
        Param::List(items) => {
            let encoded = items
                .iter()
                .map(encode_param)
                .collect::<Result<Vec<Json>, _>>()?;
            Ok(Json::Array(encoded))
        }
        Param::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (key, value) in map {
                obj.insert(key.clone(), encode_param(value)?);
            }
            Ok(escape_marker_collision(obj))
        }
        Param::Value(value) => encode_value(value),
    }
}

fn encode_value(value: &Value) -> Result<Json, InvariantError> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(json!(b)),
        Value::Int(i) => {
            let n = i64::try_from(i.clone()).map_err(|_| {
                err(format!("integer {} exceeds the wire format's i64 range", i))
            })?;
            Ok(json!(n))
        }
        Value::Decimal(d) => Ok(json!({ "$decimal": canonical_decimal_string(d) })),
        Value::Str(s) => Ok(json!(s)),
        Value::List(items) => {
            let encoded = items
                .iter()
                .map(encode_value)
                .collect::<Result<Vec<Json>, _>>()?;
            Ok(Json::Array(encoded))
        }
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (key, inner) in map {
                obj.insert(key.clone(), encode_value(inner)?);
            }
            Ok(escape_marker_collision(obj))
        }
        Value::Domain(artifact) => {
            let mut payload = Vec::new();
            artifact.to_stream(&mut payload);
            Ok(json!({
                "$icacheable": {
                    "type": artifact.type_name(),
                    "payload_b64": BASE64.encode(payload),
                }
            }))
        }
    }
}

/// A plain map whose single key is reserved would decode as a marker;
/// wrap it in `$literal` so it round-trips as data.
fn escape_marker_collision(obj: serde_json::Map<String, Json>) -> Json {
    if obj.len() == 1 {
        let is_reserved = obj.keys().next().map(|k| RESERVED_KEYS.contains(&k.as_str()));
        if is_reserved == Some(true) {
            return json!({ "$literal": Json::Object(obj) });
        }
    }
    Json::Object(obj)
}
