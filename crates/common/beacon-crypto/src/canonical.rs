//! Deterministic JSON encoding used for every signature in the runner.
//!
//! Objects are written with keys in byte order and no insignificant whitespace,
//! independent of how `serde_json::Map` happens to be ordered in the build.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::signing::CryptoError;

/// Fields carrying the signature envelope; never part of the signed bytes.
pub const SIGNATURE_FIELDS: &[&str] = &["signature", "public_key"];

/// Canonical bytes of `value` with the given top-level fields removed.
pub fn canonical_json(value: &Value, exclude: &[&str]) -> Result<Vec<u8>, CryptoError> {
    let mut out = String::new();
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !exclude.contains(&k.as_str()))
                .collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_value(&map[key.as_str()], &mut out)?;
            }
            out.push('}');
        }
        other => write_value(other, &mut out)?,
    }
    Ok(out.into_bytes())
}

/// Serializes `value` then canonicalizes it.
pub fn canonicalize<T: Serialize>(value: &T, exclude: &[&str]) -> Result<Vec<u8>, CryptoError> {
    let value = serde_json::to_value(value)?;
    canonical_json(&value, exclude)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_value(value: &Value, out: &mut String) -> Result<(), CryptoError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_value(v, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(v, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let v = json!({ "b": 1, "a": { "z": [ { "y": 1, "x": 2 } ], "c": "s" } });
        let bytes = canonical_json(&v, &[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"c":"s","z":[{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn excluded_fields_only_at_top_level() {
        let v = json!({ "signature": "x", "public_key": "y", "nested": { "signature": "kept" } });
        let bytes = canonical_json(&v, SIGNATURE_FIELDS).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"nested":{"signature":"kept"}}"#
        );
    }

    #[test]
    fn sha256_is_hex_encoded() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
