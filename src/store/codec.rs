//! IV-012: Binary envelope codec for the full value universe.
//!
//! Envelope layout: `[u32 BE type-name length][type-name UTF-8][payload]`.
//! Reserved type names identify native variants; any other name is a
//! domain artifact whose decoder is looked up in the type registry.
//! Every payload is self-delimiting so envelopes nest inside
//! containers. The envelope is pure transport: digests are computed
//! over the value, never over envelope bytes.

use crate::core::value::{canonical_decimal_string, DomainArtifact, Value};
use crate::errors::InvariantError;
use indexmap::IndexMap;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

const TYPE_NULL: &str = "null";
const TYPE_BOOL: &str = "bool";
const TYPE_INT: &str = "int";
const TYPE_DECIMAL: &str = "decimal";
const TYPE_STR: &str = "str";
const TYPE_LIST: &str = "list";
const TYPE_MAP: &str = "map";

const RESERVED_TYPE_NAMES: [&str; 7] = [
    TYPE_NULL,
    TYPE_BOOL,
    TYPE_INT,
    TYPE_DECIMAL,
    TYPE_STR,
    TYPE_LIST,
    TYPE_MAP,
];

fn err(msg: String) -> InvariantError {
    InvariantError::StoreIo(msg)
}

/// Decoder for one domain type: reads exactly its own serialization
/// from the stream (the inverse of `to_stream`).
pub type DomainDecodeFn =
    Arc<dyn Fn(&mut ByteReader<'_>) -> Result<Arc<dyn DomainArtifact>, InvariantError> + Send + Sync>;

/// Decoder for one domain type from a JSON value (wire-format
/// `$icacheable` objects carrying `value` instead of `payload_b64`).
pub type DomainJsonDecodeFn =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn DomainArtifact>, InvariantError> + Send + Sync>;

/// Maps fully-qualified type names back to deserializers. Type identity
/// on disk and on the wire is a string; no reflection.
#[derive(Default, Clone)]
pub struct DomainTypeRegistry {
    decoders: IndexMap<String, DomainDecodeFn>,
    json_decoders: IndexMap<String, DomainJsonDecodeFn>,
}

impl DomainTypeRegistry {
    pub fn new() -> DomainTypeRegistry {
        DomainTypeRegistry::default()
    }

    pub fn register(&mut self, type_name: &str, decoder: DomainDecodeFn) {
        self.decoders.insert(type_name.to_string(), decoder);
    }

    pub fn register_json(&mut self, type_name: &str, decoder: DomainJsonDecodeFn) {
        self.json_decoders.insert(type_name.to_string(), decoder);
    }

    pub fn has(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Decode a domain artifact from the reader's current position.
    pub fn decode_stream(
        &self,
        type_name: &str,
        reader: &mut ByteReader<'_>,
    ) -> Result<Arc<dyn DomainArtifact>, InvariantError> {
        let decoder = self.decoders.get(type_name).ok_or_else(|| {
            err(format!("type name '{}' is not resolvable", type_name))
        })?;
        decoder(reader)
    }

    /// Decode a domain artifact from a standalone payload, requiring
    /// full consumption.
    pub fn decode_payload(
        &self,
        type_name: &str,
        payload: &[u8],
    ) -> Result<Arc<dyn DomainArtifact>, InvariantError> {
        let mut reader = ByteReader::new(payload);
        let artifact = self.decode_stream(type_name, &mut reader)?;
        if !reader.is_empty() {
            return Err(err(format!(
                "trailing bytes after '{}' payload",
                type_name
            )));
        }
        Ok(artifact)
    }

    pub fn decode_json(
        &self,
        type_name: &str,
        value: &serde_json::Value,
    ) -> Result<Arc<dyn DomainArtifact>, InvariantError> {
        let decoder = self.json_decoders.get(type_name).ok_or_else(|| {
            err(format!(
                "type name '{}' has no JSON-value decoder",
                type_name
            ))
        })?;
        decoder(value)
    }
}

impl std::fmt::Debug for DomainTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainTypeRegistry")
            .field("types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Cursor over a byte slice with length-checked reads.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> ByteReader<'a> {
        ByteReader { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_u8(&mut self) -> Result<u8, InvariantError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, InvariantError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], InvariantError> {
        if self.pos + n > self.data.len() {
            return Err(err(format!(
                "truncated artifact: wanted {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

fn write_u32(out: &mut Vec<u8>, n: usize) -> Result<(), InvariantError> {
    let n = u32::try_from(n).map_err(|_| err("length exceeds u32 range".to_string()))?;
    out.extend_from_slice(&n.to_be_bytes());
    Ok(())
}

fn write_envelope_header(out: &mut Vec<u8>, type_name: &str) -> Result<(), InvariantError> {
    write_u32(out, type_name.len())?;
    out.extend_from_slice(type_name.as_bytes());
    Ok(())
}

/// Serialize a value into envelope bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, InvariantError> {
    let mut out = Vec::new();
    encode_into(value, &mut out)?;
    Ok(out)
}

fn encode_into(value: &Value, out: &mut Vec<u8>) -> Result<(), InvariantError> {
    match value {
        Value::Null => write_envelope_header(out, TYPE_NULL),
        Value::Bool(b) => {
            write_envelope_header(out, TYPE_BOOL)?;
            out.push(if *b { 0x01 } else { 0x00 });
            Ok(())
        }
        Value::Int(i) => {
            write_envelope_header(out, TYPE_INT)?;
            let bytes = i.to_signed_bytes_be();
            write_u32(out, bytes.len())?;
            out.extend_from_slice(&bytes);
            Ok(())
        }
        Value::Decimal(d) => {
            write_envelope_header(out, TYPE_DECIMAL)?;
            let text = canonical_decimal_string(d);
            write_u32(out, text.len())?;
            out.extend_from_slice(text.as_bytes());
            Ok(())
        }
        Value::Str(s) => {
            write_envelope_header(out, TYPE_STR)?;
            write_u32(out, s.len())?;
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        Value::List(items) => {
            write_envelope_header(out, TYPE_LIST)?;
            write_u32(out, items.len())?;
            for item in items {
                encode_into(item, out)?;
            }
            Ok(())
        }
        Value::Map(map) => {
            write_envelope_header(out, TYPE_MAP)?;
            write_u32(out, map.len())?;
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                encode_into(&Value::Str(key.clone()), out)?;
                encode_into(&map[key.as_str()], out)?;
            }
            Ok(())
        }
        Value::Domain(artifact) => {
            let type_name = artifact.type_name();
            if RESERVED_TYPE_NAMES.contains(&type_name) {
                return Err(err(format!(
                    "domain type name '{}' collides with a reserved native name",
                    type_name
                )));
            }
            write_envelope_header(out, type_name)?;
            artifact.to_stream(out);
            Ok(())
        }
    }
}

/// Deserialize envelope bytes back into a value, resolving domain type
/// names through the registry. Trailing bytes are an error.
pub fn decode(data: &[u8], types: &DomainTypeRegistry) -> Result<Value, InvariantError> {
    let mut reader = ByteReader::new(data);
    let value = decode_from(&mut reader, types)?;
    if !reader.is_empty() {
        return Err(err("trailing bytes after artifact".to_string()));
    }
    Ok(value)
}

fn decode_from(
    reader: &mut ByteReader<'_>,
    types: &DomainTypeRegistry,
) -> Result<Value, InvariantError> {
    let name_len = reader.read_u32()? as usize;
    let name_bytes = reader.read_bytes(name_len)?;
    let type_name = std::str::from_utf8(name_bytes)
        .map_err(|_| err("type name is not valid UTF-8".to_string()))?
        .to_string();

    match type_name.as_str() {
        TYPE_NULL => Ok(Value::Null),
        TYPE_BOOL => match reader.read_u8()? {
            0x00 => Ok(Value::Bool(false)),
            0x01 => Ok(Value::Bool(true)),
            other => Err(err(format!("invalid bool byte 0x{:02x}", other))),
        },
        TYPE_INT => {
            let len = reader.read_u32()? as usize;
            let bytes = reader.read_bytes(len)?;
            if bytes.is_empty() {
                return Ok(Value::Int(BigInt::from(0)));
            }
            Ok(Value::Int(BigInt::from_signed_bytes_be(bytes)))
        }
        TYPE_DECIMAL => {
            let len = reader.read_u32()? as usize;
            let bytes = reader.read_bytes(len)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| err("decimal payload is not valid UTF-8".to_string()))?;
            Decimal::from_str(text)
                .map(Value::Decimal)
                .map_err(|_| err(format!("invalid decimal payload '{}'", text)))
        }
        TYPE_STR => {
            let len = reader.read_u32()? as usize;
            let bytes = reader.read_bytes(len)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| err("string payload is not valid UTF-8".to_string()))?;
            Ok(Value::Str(text.to_string()))
        }
        TYPE_LIST => {
            let count = reader.read_u32()? as usize;
            let mut items = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                items.push(decode_from(reader, types)?);
            }
            Ok(Value::List(items))
        }
        TYPE_MAP => {
            let count = reader.read_u32()? as usize;
            let mut map = IndexMap::new();
            for _ in 0..count {
                let key = match decode_from(reader, types)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(err(format!(
                            "map key must be a string envelope, got {}",
                            other.type_name()
                        )))
                    }
                };
                let value = decode_from(reader, types)?;
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        }
        domain_name => {
            let artifact = types.decode_stream(domain_name, reader)?;
            Ok(Value::Domain(artifact))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        let bytes = encode(value).unwrap();
        decode(&bytes, &DomainTypeRegistry::new()).unwrap()
    }

    #[test]
    fn test_iv012_native_roundtrips() {
        assert_eq!(roundtrip(&Value::Null), Value::Null);
        assert_eq!(roundtrip(&Value::Bool(true)), Value::Bool(true));
        assert_eq!(roundtrip(&Value::Bool(false)), Value::Bool(false));
        assert_eq!(roundtrip(&Value::int(0)), Value::int(0));
        assert_eq!(roundtrip(&Value::int(-129)), Value::int(-129));
        assert_eq!(roundtrip(&Value::str("héllo")), Value::str("héllo"));
    }

    #[test]
    fn test_iv012_big_int_roundtrip() {
        let big = BigInt::from_str("-98765432109876543210987654321").unwrap();
        assert_eq!(roundtrip(&Value::Int(big.clone())), Value::Int(big));
    }

    #[test]
    fn test_iv012_decimal_roundtrip_canonicalises() {
        let d = Value::Decimal(Decimal::from_str("1.500").unwrap());
        let back = roundtrip(&d);
        assert_eq!(back, d);
        // The stored text is the canonical form.
        let bytes = encode(&d).unwrap();
        assert!(bytes.windows(3).any(|w| w == b"1.5"));
    }

    #[test]
    fn test_iv012_container_roundtrip() {
        let mut map = IndexMap::new();
        map.insert("b".to_string(), Value::int(2));
        map.insert("a".to_string(), Value::List(vec![Value::Null, Value::str("x")]));
        let v = Value::Map(map);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_iv012_map_encoding_is_key_order_independent() {
        let mut m1 = IndexMap::new();
        m1.insert("a".to_string(), Value::int(1));
        m1.insert("b".to_string(), Value::int(2));
        let mut m2 = IndexMap::new();
        m2.insert("b".to_string(), Value::int(2));
        m2.insert("a".to_string(), Value::int(1));
        assert_eq!(
            encode(&Value::Map(m1)).unwrap(),
            encode(&Value::Map(m2)).unwrap()
        );
    }

    #[test]
    fn test_iv012_truncated_input_fails() {
        let bytes = encode(&Value::str("hello")).unwrap();
        let e = decode(&bytes[..bytes.len() - 2], &DomainTypeRegistry::new()).unwrap_err();
        assert!(matches!(e, InvariantError::StoreIo(_)));
        assert!(e.to_string().contains("truncated"));
    }

    #[test]
    fn test_iv012_trailing_bytes_fail() {
        let mut bytes = encode(&Value::int(1)).unwrap();
        bytes.push(0xFF);
        let e = decode(&bytes, &DomainTypeRegistry::new()).unwrap_err();
        assert!(e.to_string().contains("trailing"));
    }

    #[test]
    fn test_iv012_unknown_type_name() {
        let mut bytes = Vec::new();
        write_envelope_header(&mut bytes, "acme.Widget").unwrap();
        let e = decode(&bytes, &DomainTypeRegistry::new()).unwrap_err();
        assert!(e.to_string().contains("'acme.Widget'"));
        assert!(e.to_string().contains("not resolvable"));
    }

    #[test]
    fn test_iv012_empty_int_payload_reads_as_zero() {
        let mut bytes = Vec::new();
        write_envelope_header(&mut bytes, "int").unwrap();
        write_u32(&mut bytes, 0).unwrap();
        assert_eq!(
            decode(&bytes, &DomainTypeRegistry::new()).unwrap(),
            Value::int(0)
        );
    }
}
