//! Document hashing.
//!
//! JSON documents are hashed over a canonical form: object keys sorted
//! recursively, compact separators. Key order and whitespace therefore never
//! change a document's hash. Every other document is hashed over its raw bytes.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical serialization of a JSON value.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hash of the canonical form of a JSON value.
pub fn hash_json(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// True for a 64-character lowercase or uppercase hex string.
pub fn is_sha256_hex(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Normalize a client-supplied hash for comparison.
pub fn normalize_hash(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    is_sha256_hex(trimmed).then(|| trimmed.to_ascii_lowercase())
}
