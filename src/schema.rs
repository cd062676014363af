// Schema synthesis for Spectra
// Converts route parameters and field rules into JSON-Schema-like documents

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::host::HostApp;
use crate::models::{
    FieldRule, Method, ParameterDescriptor, RouteDescriptor, RouteSchemas, SchemaDocument,
    SCHEMA_DIALECT,
};
use crate::rules::parse::{rule_args, rule_argument, rule_name};
use crate::rules::RuleExtractor;

lazy_static! {
    // [0-9]+, \d+, ^\d{1,6}$ ...
    static ref NUMERIC_PATTERN: Regex =
        Regex::new(r"^\^?(?:\[0-9\]|\\d)(?:[+*]|\{\d+(?:,\d*)?\})?\$?$").unwrap();
}

/// Schemas keyed by `"<route id>::<METHOD>"`
pub type SchemaMap = BTreeMap<String, RouteSchemas>;

/// One schema entry in discovery output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub route: String,
    pub method: Method,
    pub schemas: RouteSchemas,
}

pub struct SchemaSynthesizer {
    extractor: RuleExtractor,
}

impl Default for SchemaSynthesizer {
    fn default() -> Self {
        Self::new(RuleExtractor::default())
    }
}

impl SchemaSynthesizer {
    pub fn new(extractor: RuleExtractor) -> Self {
        Self { extractor }
    }

    pub fn build(&self, host: &HostApp, routes: &[RouteDescriptor]) -> SchemaMap {
        self.entries(host, routes)
            .into_iter()
            .map(|entry| (format!("{}::{}", entry.route, entry.method), entry.schemas))
            .collect()
    }

    /// Documents for every documented method of every route, in route order
    pub fn entries(&self, host: &HostApp, routes: &[RouteDescriptor]) -> Vec<SchemaEntry> {
        let mut entries = Vec::new();
        for route in routes {
            let rules = host
                .handler_for(route)
                .map(|handler| self.extractor.extract(handler))
                .unwrap_or_default();
            for method in route.methods.iter().filter(|m| m.is_documented()) {
                entries.push(SchemaEntry {
                    route: route.identifier().to_string(),
                    method: *method,
                    schemas: route_schemas(route, *method, &rules),
                });
            }
        }
        entries
    }
}

/// The four documents for one route and method
pub fn route_schemas(
    route: &RouteDescriptor,
    method: Method,
    rules: &BTreeMap<String, FieldRule>,
) -> RouteSchemas {
    RouteSchemas {
        path: path_schema(&route.path_parameters),
        query: if method.takes_query() {
            rules_schema(rules)
        } else {
            SchemaDocument::empty()
        },
        body: if method.carries_body() {
            rules_schema(rules)
        } else {
            SchemaDocument::empty()
        },
        headers: headers_schema(),
    }
}

pub fn path_schema(parameters: &[ParameterDescriptor]) -> SchemaDocument {
    let mut doc = SchemaDocument::empty();
    for param in parameters {
        let kind = match &param.pattern {
            Some(pattern) if NUMERIC_PATTERN.is_match(pattern) => "integer",
            _ => "string",
        };
        let mut node = Map::new();
        node.insert("type".to_string(), json!(kind));
        if let Some(pattern) = &param.pattern {
            node.insert("pattern".to_string(), json!(pattern));
        }
        doc.properties.insert(param.name.clone(), Value::Object(node));
        if param.required {
            doc.required.push(param.name.clone());
        }
    }
    doc.required.sort();
    doc
}

pub fn headers_schema() -> SchemaDocument {
    let mut doc = SchemaDocument::empty();
    for name in ["Accept", "Content-Type"] {
        doc.properties.insert(
            name.to_string(),
            json!({ "type": "string", "default": "application/json" }),
        );
    }
    doc
}

/// Object document built from field rules, nesting dotted and wildcard names
pub fn rules_schema(rules: &BTreeMap<String, FieldRule>) -> SchemaDocument {
    let mut root = Node::default();
    for rule in rules.values() {
        let segments: Vec<&str> = rule.field.split('.').collect();
        root.insert(&segments, &rule.rules);
    }

    SchemaDocument {
        dialect: SCHEMA_DIALECT.to_string(),
        kind: "object".to_string(),
        properties: root
            .properties
            .into_iter()
            .map(|(name, node)| (name, node.render()))
            .collect(),
        required: root.required.into_iter().collect(),
    }
}

#[derive(Debug, Default)]
struct Node {
    constraints: Map<String, Value>,
    nullable: bool,
    properties: BTreeMap<String, Node>,
    required: BTreeSet<String>,
    items: Option<Box<Node>>,
}

impl Node {
    fn insert(&mut self, segments: &[&str], rules: &[String]) {
        match segments.split_first() {
            None => self.apply(rules),
            Some((&"*", rest)) => self
                .items
                .get_or_insert_with(Default::default)
                .insert(rest, rules),
            Some((segment, rest)) => {
                if rest.is_empty() && crate::rules::is_required(rules) {
                    self.required.insert(segment.to_string());
                }
                self.properties
                    .entry(segment.to_string())
                    .or_default()
                    .insert(rest, rules);
            }
        }
    }

    /// Apply one field's rules in order; later rules win on the same key
    fn apply(&mut self, rules: &[String]) {
        let base = base_type(rules);
        for rule in rules {
            let name = rule_name(rule);
            match name {
                "nullable" => self.nullable = true,
                "string" | "integer" | "boolean" | "bool" | "array" => {
                    let kind = if name == "bool" { "boolean" } else { name };
                    self.set("type", json!(kind));
                }
                "numeric" => self.set("type", json!("number")),
                "email" => self.set("format", json!("email")),
                "url" => self.set("format", json!("uri")),
                "date" => self.set("format", json!("date")),
                "date_format" => self.set("format", json!("date-time")),
                "uuid" => self.set("format", json!("uuid")),
                "file" | "image" => {
                    self.set("type", json!("string"));
                    self.set("format", json!("binary"));
                }
                "min" | "max" => {
                    if let Some(bound) = rule_args(rule).first().and_then(|a| number(a)) {
                        let (lower, upper) = bound_keys(base);
                        self.set(if name == "min" { lower } else { upper }, bound);
                    }
                }
                "between" => {
                    let args = rule_args(rule);
                    if let (Some(lo), Some(hi)) = (
                        args.first().and_then(|a| number(a)),
                        args.get(1).and_then(|a| number(a)),
                    ) {
                        let (lower, upper) = bound_keys(base);
                        self.set(lower, lo);
                        self.set(upper, hi);
                    }
                }
                "in" => {
                    let values: Vec<Value> = rule_args(rule)
                        .into_iter()
                        .map(|v| enum_value(v, base))
                        .collect();
                    self.set("enum", Value::Array(values));
                }
                "regex" => {
                    if let Some(pattern) = rule_argument(rule) {
                        self.set("pattern", json!(strip_delimiters(pattern)));
                    }
                }
                "mimes" => {
                    let suffixes: Vec<Value> = rule_args(rule).into_iter().map(|m| json!(m)).collect();
                    self.set("x-mimes", Value::Array(suffixes));
                }
                _ => {}
            }
        }
    }

    fn set(&mut self, key: &str, value: Value) {
        self.constraints.insert(key.to_string(), value);
    }

    fn render(self) -> Value {
        let mut out = self.constraints;

        if let Some(items) = self.items {
            out.insert("type".to_string(), json!("array"));
            out.insert("items".to_string(), items.render());
        } else if !self.properties.is_empty() {
            out.insert("type".to_string(), json!("object"));
        }

        if !self.properties.is_empty() {
            let properties: Map<String, Value> = self
                .properties
                .into_iter()
                .map(|(name, node)| (name, node.render()))
                .collect();
            out.insert("properties".to_string(), Value::Object(properties));
            if !self.required.is_empty() {
                let required: Vec<Value> = self.required.into_iter().map(Value::String).collect();
                out.insert("required".to_string(), Value::Array(required));
            }
        }

        if !out.contains_key("type") {
            out.insert("type".to_string(), json!("string"));
        }
        if self.nullable {
            if let Some(kind) = out.remove("type") {
                out.insert("type".to_string(), json!([kind, "null"]));
            }
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base {
    String,
    Number,
    Array,
}

/// The type bounds and enums are interpreted against; last type rule wins
fn base_type(rules: &[String]) -> Base {
    rules
        .iter()
        .filter_map(|rule| match rule_name(rule) {
            "integer" | "numeric" => Some(Base::Number),
            "array" => Some(Base::Array),
            "string" | "file" | "image" => Some(Base::String),
            _ => None,
        })
        .last()
        .unwrap_or(Base::String)
}

fn bound_keys(base: Base) -> (&'static str, &'static str) {
    match base {
        Base::String => ("minLength", "maxLength"),
        Base::Number => ("minimum", "maximum"),
        Base::Array => ("minItems", "maxItems"),
    }
}

fn number(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

fn enum_value(raw: &str, base: Base) -> Value {
    let trimmed = raw.trim_matches('"');
    match base {
        Base::Number => number(trimmed).unwrap_or_else(|| json!(trimmed)),
        _ => json!(trimmed),
    }
}

/// `/^[a-z]+$/i` -> `^[a-z]+$`
fn strip_delimiters(pattern: &str) -> String {
    let mut chars = pattern.chars();
    match chars.next() {
        Some(delim) if !delim.is_alphanumeric() && delim != '\\' && delim != '^' => {
            match pattern.rfind(delim) {
                Some(end) if end > 0 => pattern[delim.len_utf8()..end].to_string(),
                _ => pattern.to_string(),
            }
        }
        _ => pattern.to_string(),
    }
}
