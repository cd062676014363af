// Request target construction
//
// Example:
//   Template: /api/posts/{post}/comments/{comment?}
//   Params:   {"post": 7}
//   Query:    {"page": 2, "draft": true}   (GET)
//   Output:   /api/posts/7/comments?draft=1&page=2

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ConsoleError;
use crate::models::{param_to_string, Method};

/// Concrete URI for a template, path values and (GET/HEAD only) query
pub fn build_target(
    endpoint: &str,
    method: Method,
    path_params: &BTreeMap<String, Value>,
    query: &BTreeMap<String, Value>,
) -> Result<String, ConsoleError> {
    let mut path = substitute_path(endpoint, path_params)?;
    if method.is_safe() {
        let encoded = encode_query(query);
        if !encoded.is_empty() {
            path.push(if path.contains('?') { '&' } else { '?' });
            path.push_str(&encoded);
        }
    }
    Ok(path)
}

/// Replace `{name}`, `{name?}` and `{*name}` placeholders segment by segment.
/// Optional placeholders without a value drop their segment.
pub fn substitute_path(
    endpoint: &str,
    path_params: &BTreeMap<String, Value>,
) -> Result<String, ConsoleError> {
    let mut segments = Vec::new();
    for segment in endpoint.trim().split('/').filter(|s| !s.is_empty()) {
        let inner = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) => inner,
            None => {
                segments.push(segment.to_string());
                continue;
            }
        };

        let optional = inner.ends_with('?');
        let catch_all = inner.starts_with('*');
        let name = inner.trim_end_matches('?').trim_start_matches('*');

        match path_params.get(name).and_then(param_to_string) {
            Some(value) if catch_all => segments.push(
                value
                    .split('/')
                    .map(encode_segment)
                    .collect::<Vec<_>>()
                    .join("/"),
            ),
            Some(value) => segments.push(encode_segment(&value)),
            None if optional => {}
            None => {
                return Err(ConsoleError::InvalidRequest(format!(
                    "missing path parameter '{}'",
                    name
                )))
            }
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Percent-encode one path segment (spaces as %20)
pub fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// `key=value` pairs in key order; arrays repeat their key with `[]`
pub fn encode_query(query: &BTreeMap<String, Value>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                let name = format!("{}[]", key);
                for item in items.iter().filter_map(param_to_string) {
                    serializer.append_pair(&name, &item);
                }
            }
            other => {
                if let Some(v) = param_to_string(other) {
                    serializer.append_pair(key, &v);
                }
            }
        }
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn fills_required_and_drops_missing_optional() {
        let target = substitute_path(
            "/api/posts/{post}/comments/{comment?}",
            &params(json!({ "post": 7 })),
        )
        .unwrap();
        assert_eq!(target, "/api/posts/7/comments");
    }

    #[test]
    fn missing_required_is_invalid() {
        let err = substitute_path("/api/posts/{post}", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidRequest(_)));
    }

    #[test]
    fn values_are_encoded() {
        let target = substitute_path("/files/{name}", &params(json!({ "name": "a b/c" }))).unwrap();
        assert_eq!(target, "/files/a%20b%2Fc");
    }

    #[test]
    fn catch_all_keeps_slashes() {
        let target = substitute_path("/assets/{*path}", &params(json!({ "path": "css/app.css" }))).unwrap();
        assert_eq!(target, "/assets/css/app.css");
    }

    #[test]
    fn query_only_for_safe_methods() {
        let query = params(json!({ "page": 2, "draft": true, "tags": ["a", "b"], "skip": null }));
        let get = build_target("/api/posts", Method::GET, &BTreeMap::new(), &query).unwrap();
        assert_eq!(get, "/api/posts?draft=1&page=2&tags%5B%5D=a&tags%5B%5D=b");
        let post = build_target("/api/posts", Method::POST, &BTreeMap::new(), &query).unwrap();
        assert_eq!(post, "/api/posts");
    }
}
