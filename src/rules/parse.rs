// Rule String Parsing
//
// Turns raw rule lists into FieldRules.
//
// Example:
//   Input:  ("email", ["required", "email", "max:255"])
//   Output: FieldRule { inferred_type: String, required: true, raw: "required|email|max:255" }

use std::collections::BTreeMap;

use super::RawRules;
use crate::models::{FieldRule, FieldType};

/// Split a pipe-delimited rule expression into individual rules
pub fn split_rules(expression: &str) -> Vec<String> {
    expression
        .split('|')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rule keyword, without its arguments (`max:255` -> `max`)
pub fn rule_name(rule: &str) -> &str {
    rule.split_once(':').map(|(name, _)| name).unwrap_or(rule).trim()
}

/// Rule arguments (`between:1,10` -> `["1", "10"]`)
pub fn rule_args(rule: &str) -> Vec<&str> {
    match rule.split_once(':') {
        Some((_, args)) => args.split(',').map(str::trim).collect(),
        None => Vec::new(),
    }
}

/// Raw argument string, kept whole for rules whose argument may contain commas
pub fn rule_argument(rule: &str) -> Option<&str> {
    rule.split_once(':').map(|(_, arg)| arg)
}

/// A field is required when it says so and is not merely `sometimes` present
pub fn is_required(rules: &[String]) -> bool {
    let has = |keyword: &str| rules.iter().any(|r| rule_name(r) == keyword);
    has("required") && !has("sometimes")
}

/// First rule keyword found in the type table decides the type
pub fn infer_type(rules: &[String]) -> FieldType {
    for rule in rules {
        match rule_name(rule) {
            "integer" | "numeric" => return FieldType::Integer,
            "boolean" | "bool" => return FieldType::Boolean,
            "array" => return FieldType::Array,
            "email" | "url" | "date" => return FieldType::String,
            _ => {}
        }
    }
    FieldType::String
}

pub fn build_field_rules(raw: RawRules) -> BTreeMap<String, FieldRule> {
    raw.into_iter()
        .filter(|(field, _)| !field.trim().is_empty())
        .map(|(field, rules)| {
            let rule = FieldRule {
                field: field.clone(),
                inferred_type: infer_type(&rules),
                required: is_required(&rules),
                raw_rule_expression: rules.join("|"),
                rules,
            };
            (field, rule)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(expr: &str) -> Vec<String> {
        split_rules(expr)
    }

    #[test]
    fn splits_and_trims() {
        assert_eq!(rules(" required | string ||max:5"), vec!["required", "string", "max:5"]);
    }

    #[test]
    fn rule_names_and_args() {
        assert_eq!(rule_name("between:1,10"), "between");
        assert_eq!(rule_args("between:1,10"), vec!["1", "10"]);
        assert!(rule_args("required").is_empty());
        assert_eq!(rule_argument("regex:/^a,b$/"), Some("/^a,b$/"));
    }

    #[test]
    fn sometimes_cancels_required() {
        assert!(is_required(&rules("required|string")));
        assert!(!is_required(&rules("sometimes|required|string")));
        assert!(!is_required(&rules("nullable|string")));
    }

    #[test]
    fn type_table() {
        assert_eq!(infer_type(&rules("required|integer|min:1")), FieldType::Integer);
        assert_eq!(infer_type(&rules("numeric")), FieldType::Integer);
        assert_eq!(infer_type(&rules("bool")), FieldType::Boolean);
        assert_eq!(infer_type(&rules("array|min:1")), FieldType::Array);
        assert_eq!(infer_type(&rules("required|email")), FieldType::String);
        assert_eq!(infer_type(&rules("uuid")), FieldType::String);
    }

    #[test]
    fn builds_sorted_map() {
        let built = build_field_rules(vec![
            ("title".to_string(), rules("required|string")),
            ("age".to_string(), rules("integer")),
        ]);
        let keys: Vec<_> = built.keys().cloned().collect();
        assert_eq!(keys, vec!["age", "title"]);
        assert_eq!(built["title"].raw_rule_expression, "required|string");
        assert!(built["title"].required);
        assert!(!built["age"].required);
    }
}
