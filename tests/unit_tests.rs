/// Unit tests for core Spectra models
/// Tests methods, execution commands, schema documents and results
use serde_json::json;
use spectra::models::{
    param_to_string, AuthModeKind, ExecutionCommand, ExecutionResult, HeaderValues, Method,
    ParameterDescriptor, RouteDescriptor, SchemaDocument,
};
use spectra::AuthMode;
use std::collections::{BTreeMap, BTreeSet};

#[test]
fn test_method_display() {
    // Test that Method enum can be converted to string
    assert_eq!(Method::GET.to_string(), "GET");
    assert_eq!(Method::POST.to_string(), "POST");
    assert_eq!(Method::PUT.to_string(), "PUT");
    assert_eq!(Method::DELETE.to_string(), "DELETE");
    assert_eq!(Method::PATCH.to_string(), "PATCH");
    assert_eq!(Method::OPTIONS.to_string(), "OPTIONS");
    assert_eq!(Method::HEAD.to_string(), "HEAD");
}

#[test]
fn test_method_parsing_is_case_insensitive() {
    assert_eq!("patch".parse::<Method>().unwrap(), Method::PATCH);
    assert_eq!(" Get ".parse::<Method>().unwrap(), Method::GET);
    assert!("TRACE".parse::<Method>().is_err());
}

#[test]
fn test_method_categories() {
    // HEAD and OPTIONS are never documented
    let documented: Vec<Method> = Method::ALL.iter().copied().filter(Method::is_documented).collect();
    assert_eq!(documented, vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH]);

    // query and body never overlap
    for method in Method::ALL {
        assert!(!(method.takes_query() && method.carries_body()), "{}", method);
    }
}

#[test]
fn test_execution_command_defaults() {
    // Test that a minimal command fills in defaults
    let cmd: ExecutionCommand = serde_json::from_value(json!({
        "endpoint": "/api/items/{item}",
        "method": "post",
        "path_params": { "item": 3 },
    }))
    .unwrap();

    assert_eq!(cmd.method, Method::POST);
    assert_eq!(cmd.auth_mode, AuthModeKind::Current);
    assert!(cmd.query.is_empty());
    assert_eq!(cmd.body, None);
    assert_eq!(cmd.path_params["item"], json!(3));
}

#[test]
fn test_auth_mode_from_command() {
    let cmd: ExecutionCommand = serde_json::from_value(json!({
        "endpoint": "/api/me",
        "auth_mode": "basic",
        "basic_user": "ada@example.com",
        "basic_pass": "correct-horse",
    }))
    .unwrap();

    match AuthMode::from(&cmd) {
        AuthMode::Basic { username, password } => {
            assert_eq!(username.as_deref(), Some("ada@example.com"));
            assert_eq!(password.as_deref(), Some("correct-horse"));
        }
        other => panic!("unexpected mode {:?}", other),
    }
}

#[test]
fn test_param_to_string() {
    assert_eq!(param_to_string(&json!("abc")), Some("abc".to_string()));
    assert_eq!(param_to_string(&json!(42)), Some("42".to_string()));
    assert_eq!(param_to_string(&json!(true)), Some("1".to_string()));
    assert_eq!(param_to_string(&json!(false)), Some("0".to_string()));
    assert_eq!(param_to_string(&json!(null)), None);
}

#[test]
fn test_schema_document_serialization() {
    // Test the JSON-Schema keys are renamed
    let value = serde_json::to_value(SchemaDocument::empty()).unwrap();
    assert_eq!(value["$schema"], json!("https://json-schema.org/draft/2020-12/schema"));
    assert_eq!(value["type"], json!("object"));
    assert_eq!(value["properties"], json!({}));
    assert_eq!(value["required"], json!([]));
}

#[test]
fn test_route_identifier_prefers_name() {
    let mut route = RouteDescriptor {
        uri: "/api/items/{item}".to_string(),
        methods: BTreeSet::from([Method::GET]),
        name: Some("items.show".to_string()),
        handler_ref: "app::show".to_string(),
        middleware: vec![],
        path_parameters: vec![ParameterDescriptor {
            name: "item".to_string(),
            required: true,
            pattern: None,
        }],
    };
    assert_eq!(route.identifier(), "items.show");
    route.name = None;
    assert_eq!(route.identifier(), "/api/items/{item}");

    // pattern is omitted when absent
    let value = serde_json::to_value(&route.path_parameters[0]).unwrap();
    assert_eq!(value, json!({ "name": "item", "required": true }));
}

#[test]
fn test_execution_result_shape() {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), HeaderValues::One("application/json".to_string()));
    headers.insert(
        "set-cookie".to_string(),
        HeaderValues::Many(vec!["a=1".to_string(), "b=2".to_string()]),
    );
    let result = ExecutionResult {
        status: 200,
        time_ms: 1.5,
        size_bytes: 2,
        headers,
        body: json!({}),
    };

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["headers"]["content-type"], json!("application/json"));
    assert_eq!(value["headers"]["set-cookie"], json!(["a=1", "b=2"]));

    let failure = ExecutionResult::failure(500, "boom", 3.0);
    assert_eq!(failure.body, json!({ "error": "boom" }));
    assert_eq!(failure.size_bytes, 0);
}
