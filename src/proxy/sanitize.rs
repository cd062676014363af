// Request and response sanitizing
//
// Masks deny-listed keys in JSON responses at any depth and drops headers that
// must not be forwarded to the host.
//
// Example:
//   Input:  {"user": {"name": "ada", "Password": "x"}, "tokens": [{"token": "t"}]}
//   Mask:   ["password", "token"]
//   Output: {"user": {"name": "ada", "Password": "********"}, "tokens": [{"token": "********"}]}

use serde_json::Value;
use std::collections::BTreeMap;

pub const MASK: &str = "********";

/// Replace the value of every key in `fields` (case-insensitive), recursing into arrays
pub fn mask_fields(json: &mut Value, fields: &[String]) {
    match json {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if is_listed(k, fields) {
                    *v = Value::String(MASK.to_string());
                } else {
                    mask_fields(v, fields);
                }
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                mask_fields(v, fields);
            }
        }
        _ => {}
    }
}

/// Operator headers minus the never-forward list
pub fn strip_headers(headers: &BTreeMap<String, String>, strip: &[String]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_listed(name, strip))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

pub fn is_listed(name: &str, list: &[String]) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(name))
}
