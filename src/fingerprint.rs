// Content fingerprinting
// SHA-256 over canonical JSON, so key order never changes the hash

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Copy of `value` with every object's keys sorted, at every depth
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Lowercase hex SHA-256 of the canonical serialization
pub fn fingerprint(value: &Value) -> String {
    let canonical = canonicalize(value).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

pub fn fingerprint_of<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(fingerprint(&serde_json::to_value(value)?))
}
