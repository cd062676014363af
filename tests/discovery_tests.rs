/// Discovery tests for Spectra
/// Tests route scanning, rule extraction and schema synthesis against the demo host
use serde_json::json;
use spectra::demo;
use spectra::host::{HandlerInfo, HostBuilder, Route};
use spectra::models::Method;
use spectra::field_rules;
use spectra::rules::{DeclaresFieldRules, RawRules, RuleExtractor, RuleStrategy};
use spectra::schema::{SchemaEntry, SchemaSynthesizer};
use spectra::{Console, ConsoleConfig, RouteCatalog};
use std::collections::BTreeSet;
use std::sync::Arc;

fn console(config: ConsoleConfig) -> Console {
    Console::new(config, demo::host(), Arc::new(demo::DemoUsers), Arc::new(demo::DemoGate)).unwrap()
}

fn entry<'a>(entries: &'a [SchemaEntry], route: &str, method: Method) -> &'a SchemaEntry {
    entries
        .iter()
        .find(|e| e.route == route && e.method == method)
        .unwrap_or_else(|| panic!("no schema for {} {}", method, route))
}

async fn ok() -> &'static str {
    "ok"
}

#[test]
fn test_demo_routes_are_discovered() {
    let discovery = console(ConsoleConfig::default()).discover();
    let uris: Vec<(&str, Option<&str>)> = discovery
        .routes
        .iter()
        .map(|r| (r.uri.as_str(), r.name.as_deref()))
        .collect();

    assert_eq!(
        uris,
        vec![
            ("/api/items", Some("items.index")),
            ("/api/items", Some("items.store")),
            ("/api/items/{item}", Some("items.show")),
            ("/api/items/{item}", Some("items.update")),
            ("/api/items/{item}", Some("items.destroy")),
            ("/api/me", Some("me")),
            ("/api/login", Some("login")),
        ]
    );
    // internal tooling prefixes are hidden
    assert!(discovery.routes.iter().all(|r| r.uri != "/_health"));

    let show = &discovery.routes[2];
    assert!(show.methods.contains(&Method::GET));
    assert!(show.methods.contains(&Method::HEAD));
    assert_eq!(show.path_parameters[0].pattern.as_deref(), Some("[0-9]+"));
    assert!(show.handler_ref.ends_with("show_item"));
}

#[test]
fn test_head_and_options_never_documented() {
    let discovery = console(ConsoleConfig::default()).discover();
    assert!(!discovery.schemas.is_empty());
    assert!(discovery
        .schemas
        .iter()
        .all(|e| e.method != Method::HEAD && e.method != Method::OPTIONS));
    // one entry per documented method of every route
    assert_eq!(discovery.schemas.len(), 7);
}

#[test]
fn test_query_and_body_are_exclusive() {
    let discovery = console(ConsoleConfig::default()).discover();
    for e in &discovery.schemas {
        if matches!(e.method, Method::GET | Method::DELETE) {
            assert!(e.schemas.body.is_empty(), "{} {} has a body", e.method, e.route);
        } else {
            assert!(e.schemas.query.is_empty(), "{} {} has a query", e.method, e.route);
        }
    }

    let index = entry(&discovery.schemas, "items.index", Method::GET);
    assert_eq!(index.schemas.query.properties["page"], json!({ "type": "integer", "minimum": 1 }));
    assert!(index.schemas.query.required.is_empty());
}

#[test]
fn test_validator_type_rules() {
    let discovery = console(ConsoleConfig::default()).discover();
    let store = entry(&discovery.schemas, "items.store", Method::POST);
    let body = &store.schemas.body;

    assert_eq!(body.required, vec!["price", "title"]);
    assert_eq!(body.properties["title"], json!({ "type": "string", "maxLength": 120 }));
    assert_eq!(body.properties["price"], json!({ "type": "number", "minimum": 0 }));
    assert_eq!(
        body.properties["tags"],
        json!({ "type": "array", "maxItems": 5, "items": { "type": "string", "maxLength": 30 } })
    );
}

#[test]
fn test_inline_rules_are_found_in_source() {
    let discovery = console(ConsoleConfig::default()).discover();
    let update = entry(&discovery.schemas, "items.update", Method::PATCH);
    let body = &update.schemas.body;

    let mut fields: Vec<&String> = body.properties.keys().collect();
    fields.sort();
    assert_eq!(fields, vec!["price", "tags", "title"]);
    // `sometimes` cancels nothing here because nothing is required
    assert!(body.required.is_empty());
    assert_eq!(body.properties["tags"], json!({ "type": "array" }));

    assert_eq!(
        update.schemas.path.properties["item"],
        json!({ "type": "integer", "pattern": "[0-9]+" })
    );
}

#[test]
fn test_routes_without_rules_get_empty_documents() {
    let discovery = console(ConsoleConfig::default()).discover();
    let destroy = entry(&discovery.schemas, "items.destroy", Method::DELETE);
    assert!(destroy.schemas.query.is_empty());
    assert!(destroy.schemas.body.is_empty());

    let headers = &destroy.schemas.headers;
    assert_eq!(headers.properties["Accept"], json!({ "type": "string", "default": "application/json" }));
    assert_eq!(headers.properties["Content-Type"], json!({ "type": "string", "default": "application/json" }));
}

#[test]
fn test_exclude_globs() {
    let config = ConsoleConfig {
        exclude_routes: vec!["/api/items/**".to_string()],
        ..ConsoleConfig::default()
    };
    let discovery = console(config).discover();
    assert_eq!(discovery.routes.len(), 4);
    assert!(discovery.routes.iter().all(|r| r.uri != "/api/items/{item}"));
}

#[test]
fn test_schema_map_keys() {
    let host = HostBuilder::new()
        .route(Route::get("/api/items", ok).name("api.items.index"))
        .route(Route::post("/api/items", ok).name("api.items.store"))
        .build();
    let routes = RouteCatalog::new("/spectra").scan(&host);
    let schemas = SchemaSynthesizer::default().build(&host, &routes);

    let keys: BTreeSet<&str> = schemas.keys().map(String::as_str).collect();
    assert_eq!(keys, BTreeSet::from(["api.items.index::GET", "api.items.store::POST"]));
}

struct AlphaRequest;

impl DeclaresFieldRules for AlphaRequest {
    fn field_rules() -> RawRules {
        field_rules! { "alpha" => "required|string" }
    }
}

struct BetaRequest;

impl DeclaresFieldRules for BetaRequest {
    fn field_rules() -> RawRules {
        field_rules! { "beta" => "required|integer" }
    }
}

#[test]
fn test_closure_handlers_keep_their_own_rules() {
    let host = HostBuilder::new()
        .route(Route::post("/a", || async { "a" }).validated_by::<AlphaRequest>())
        .route(Route::post("/b", || async { "b" }).validated_by::<BetaRequest>())
        .build();
    let routes = RouteCatalog::new("/spectra").scan(&host);
    let schemas = SchemaSynthesizer::default().build(&host, &routes);

    let fields = |key: &str| -> Vec<String> {
        schemas[key].body.properties.keys().cloned().collect()
    };
    assert_eq!(fields("/a::POST"), vec!["alpha"]);
    assert_eq!(fields("/b::POST"), vec!["beta"]);
}

#[test]
fn test_shared_handler_ref_does_not_mix_rules() {
    let host = HostBuilder::new()
        .route(Route::post("/a", ok).handler_ref("shared").validated_by::<AlphaRequest>())
        .route(Route::put("/a", ok).handler_ref("shared").validated_by::<BetaRequest>())
        .build();
    let routes = RouteCatalog::new("/spectra").scan(&host);
    let schemas = SchemaSynthesizer::default().build(&host, &routes);

    assert!(schemas["/a::POST"].body.properties.contains_key("alpha"));
    assert!(schemas["/a::PUT"].body.properties.contains_key("beta"));
    assert!(!schemas["/a::PUT"].body.properties.contains_key("alpha"));
}

#[test]
fn test_optional_parameters() {
    let host = HostBuilder::new()
        .route(Route::get("/posts/{post}/comments/{comment?}", ok))
        .build();
    let routes = RouteCatalog::new("/spectra").scan(&host);
    let params = &routes[0].path_parameters;
    assert!(params[0].required);
    assert!(!params[1].required);

    let schemas = SchemaSynthesizer::default().entries(&host, &routes);
    assert_eq!(schemas[0].route, "/posts/{post}/comments/{comment?}");
    assert_eq!(schemas[0].schemas.path.required, vec!["post"]);
}

struct Exploding;

impl RuleStrategy for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn extract(&self, _handler: &HandlerInfo) -> Result<RawRules, String> {
        panic!("strategy blew up")
    }
}

struct Failing;

impl RuleStrategy for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn extract(&self, _handler: &HandlerInfo) -> Result<RawRules, String> {
        Err("cannot read".to_string())
    }
}

#[test]
fn test_failing_strategies_yield_empty_schemas() {
    let host = HostBuilder::new()
        .route(Route::post("/api/things", ok).validated_by::<demo::StoreItem>())
        .build();
    let routes = RouteCatalog::new("/spectra").scan(&host);

    for extractor in [
        RuleExtractor::new(vec![Box::new(Exploding)]),
        RuleExtractor::new(vec![Box::new(Failing)]),
    ] {
        let entries = SchemaSynthesizer::new(extractor).entries(&host, &routes);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].schemas.body.is_empty());
    }

    // the structured strategy alone still finds the validator
    let entries = SchemaSynthesizer::new(RuleExtractor::structured_only()).entries(&host, &routes);
    assert!(!entries[0].schemas.body.is_empty());
}

#[test]
fn test_discovery_json_shape() {
    let discovery = console(ConsoleConfig::default()).discover();
    let value = serde_json::to_value(&discovery).unwrap();
    let first = &value["schemas"][0];
    assert_eq!(first["route"], json!("items.index"));
    assert_eq!(first["method"], json!("GET"));
    assert!(first["schemas"]["path"].is_object());
    assert!(first["schemas"]["query"].is_object());
    assert!(first["schemas"]["body"].is_object());
    assert!(first["schemas"]["headers"].is_object());
    assert_eq!(value["routes"][0]["methods"], json!(["GET", "HEAD"]));
}
