// Core data models for Spectra
// Route descriptors, validation rules, schema documents and execution records

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// JSON Schema dialect stamped on every generated document
pub const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::OPTIONS,
        Method::HEAD,
    ];

    /// HEAD and OPTIONS are answered by the host itself and never documented
    pub fn is_documented(&self) -> bool {
        !matches!(self, Method::HEAD | Method::OPTIONS)
    }

    /// Methods whose validated fields travel in the query string
    pub fn takes_query(&self) -> bool {
        matches!(self, Method::GET | Method::DELETE)
    }

    /// Methods whose validated fields travel in the request body
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }

    /// GET and HEAD never send a body and are the only methods the proxy
    /// appends a query string to
    pub fn is_safe(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }

    pub fn to_http(self) -> axum::http::Method {
        match self {
            Method::GET => axum::http::Method::GET,
            Method::POST => axum::http::Method::POST,
            Method::PUT => axum::http::Method::PUT,
            Method::DELETE => axum::http::Method::DELETE,
            Method::PATCH => axum::http::Method::PATCH,
            Method::OPTIONS => axum::http::Method::OPTIONS,
            Method::HEAD => axum::http::Method::HEAD,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
            Method::OPTIONS => write!(f, "OPTIONS"),
            Method::HEAD => write!(f, "HEAD"),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "OPTIONS" => Ok(Method::OPTIONS),
            "HEAD" => Ok(Method::HEAD),
            other => Err(format!("Unsupported HTTP method: {}", other)),
        }
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A placeholder in a route's URI template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One registered route as seen by a discovery pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub uri: String,
    pub methods: BTreeSet<Method>,
    pub name: Option<String>,
    pub handler_ref: String,
    pub middleware: Vec<String>,
    pub path_parameters: Vec<ParameterDescriptor>,
}

impl RouteDescriptor {
    /// Schema key identifier: the declared name, or the URI when unnamed
    pub fn identifier(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.uri)
    }
}

/// Base type inferred from a field's rule keywords
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

/// A validated input field recovered from a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub inferred_type: FieldType,
    pub required: bool,
    pub raw_rule_expression: String,
    pub rules: Vec<String>,
}

/// A JSON-Schema-like description of one part of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(rename = "$schema")]
    pub dialect: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl SchemaDocument {
    pub fn empty() -> Self {
        Self {
            dialect: SCHEMA_DIALECT.to_string(),
            kind: "object".to_string(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl Default for SchemaDocument {
    fn default() -> Self {
        Self::empty()
    }
}

/// The four documents generated for one route and method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSchemas {
    pub path: SchemaDocument,
    pub query: SchemaDocument,
    pub body: SchemaDocument,
    pub headers: SchemaDocument,
}

/// Authentication mode chosen by the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthModeKind {
    #[default]
    Current,
    Impersonate,
    Bearer,
    Basic,
}

/// An operator request to execute against the live application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionCommand {
    pub endpoint: String,
    pub method: Method,
    pub path_params: BTreeMap<String, Value>,
    pub query: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub auth_mode: AuthModeKind,
    pub impersonate_id: Option<Value>,
    pub bearer_token: Option<String>,
    pub basic_user: Option<String>,
    pub basic_pass: Option<String>,
}

impl ExecutionCommand {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            ..Self::default()
        }
    }
}

/// Render a scalar JSON value the way it appears in a URL
pub fn param_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        other => Some(other.to_string()),
    }
}

/// A response header with one or several values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

/// Outcome of one proxied dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: u16,
    pub time_ms: f64,
    pub size_bytes: usize,
    pub headers: BTreeMap<String, HeaderValues>,
    pub body: Value,
}

impl ExecutionResult {
    /// Result assembled when the dispatch itself failed
    pub fn failure(status: u16, message: &str, time_ms: f64) -> Self {
        Self {
            status,
            time_ms,
            size_bytes: 0,
            headers: BTreeMap::new(),
            body: serde_json::json!({ "error": message }),
        }
    }
}
