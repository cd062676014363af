/// Property tests for Spectra
/// Fingerprint determinism, masking depth and path substitution
use proptest::prelude::*;
use serde_json::{Map, Value};
use spectra::fingerprint::{canonicalize, fingerprint};
use spectra::proxy::target::substitute_path;
use spectra::proxy::{mask_fields, MASK};
use std::collections::BTreeMap;

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        "[a-z0-9 ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z_]{1,8}", inner), 0..6).prop_map(|pairs| {
                Value::Object(pairs.into_iter().collect::<Map<String, Value>>())
            }),
        ]
    })
}

/// Rebuild every object with its keys inserted in reverse order
fn reversed(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map.iter().rev() {
                out.insert(k.clone(), reversed(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(reversed).collect()),
        other => other.clone(),
    }
}

fn holds_unmasked(value: &Value, fields: &[String]) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(k, v)| {
            let listed = fields.iter().any(|f| f.eq_ignore_ascii_case(k));
            (listed && v != &Value::String(MASK.to_string())) || holds_unmasked(v, fields)
        }),
        Value::Array(items) => items.iter().any(|v| holds_unmasked(v, fields)),
        _ => false,
    }
}

proptest! {
    #[test]
    fn fingerprint_ignores_key_order(value in json_value()) {
        prop_assert_eq!(fingerprint(&value), fingerprint(&reversed(&value)));
    }

    #[test]
    fn canonicalize_is_idempotent(value in json_value()) {
        let once = canonicalize(&value);
        prop_assert_eq!(canonicalize(&once), once);
    }

    #[test]
    fn fingerprint_detects_changes(value in json_value(), extra in "[a-z]{1,8}") {
        let mut changed = Map::new();
        changed.insert("original".to_string(), value.clone());
        changed.insert("extra".to_string(), Value::String(extra));
        prop_assert_ne!(fingerprint(&value), fingerprint(&Value::Object(changed)));
    }

    #[test]
    fn masking_reaches_every_depth(mut value in json_value()) {
        let fields = vec!["password".to_string(), "token".to_string(), "a".to_string()];
        mask_fields(&mut value, &fields);
        prop_assert!(!holds_unmasked(&value, &fields));
    }

    #[test]
    fn path_values_fill_their_segment(id in "[A-Za-z0-9_-]{1,16}", slug in "[a-z ]{1,12}") {
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), Value::String(id.clone()));
        params.insert("slug".to_string(), Value::String(slug.clone()));
        let path = substitute_path("/api/{id}/posts/{slug?}", &params).unwrap();
        let expected = format!("/api/{}/posts/{}", id, slug.replace(' ', "%20"));
        prop_assert_eq!(path, expected);
    }
}
