// Validation Rule Extraction
//
// Recovers the declared field-validation rules of a route handler.
//
// - reflect: structured path, rules declared by a validator type
// - lexical: fallback, inline `field_rules!` invocations in handler source
// - parse:   rule-string parsing and type inference
//
// Strategies run in order and the first non-empty result wins. A strategy
// that errors or panics yields "no rules" for that handler.

pub mod lexical;
pub mod parse;
pub mod reflect;

pub use lexical::LexicalRules;
pub use parse::{build_field_rules, infer_type, is_required, split_rules};
pub use reflect::{DeclaresFieldRules, ReflectedRules};

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::host::HandlerInfo;
use crate::models::FieldRule;

/// Field name paired with its individual rules, in declaration order
pub type RawRules = Vec<(String, Vec<String>)>;

/// One way of recovering a handler's rules
pub trait RuleStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, handler: &HandlerInfo) -> Result<RawRules, String>;
}

/// Runs rule strategies in order
pub struct RuleExtractor {
    strategies: Vec<Box<dyn RuleStrategy>>,
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new(vec![Box::new(ReflectedRules), Box::new(LexicalRules::default())])
    }
}

impl RuleExtractor {
    pub fn new(strategies: Vec<Box<dyn RuleStrategy>>) -> Self {
        Self { strategies }
    }

    /// Extractor for hosts without source-declared handlers
    pub fn structured_only() -> Self {
        Self::new(vec![Box::new(ReflectedRules)])
    }

    pub fn extract(&self, handler: &HandlerInfo) -> BTreeMap<String, FieldRule> {
        for strategy in &self.strategies {
            match catch_unwind(AssertUnwindSafe(|| strategy.extract(handler))) {
                Ok(Ok(raw)) if !raw.is_empty() => return build_field_rules(raw),
                Ok(Ok(_)) => continue,
                Ok(Err(reason)) => {
                    tracing::debug!(handler = %handler.handler_ref, strategy = strategy.name(), %reason, "rule extraction failed");
                    return BTreeMap::new();
                }
                Err(_) => {
                    tracing::debug!(handler = %handler.handler_ref, strategy = strategy.name(), "rule extraction panicked");
                    return BTreeMap::new();
                }
            }
        }
        BTreeMap::new()
    }
}

/// Build a field rule list in either of the two declaration forms:
///
/// ```
/// let rules = spectra::field_rules! {
///     "title" => "required|string|max:120",
///     "tags" => ["array", "min:1"],
///     "tags.*" => "string",
/// };
/// assert_eq!(rules[1].1, vec!["array".to_string(), "min:1".to_string()]);
/// ```
#[macro_export]
macro_rules! field_rules {
    (@rules [$($rule:expr),* $(,)?]) => {
        vec![$(::std::string::String::from($rule)),*]
    };
    (@rules $rules:expr) => {
        $crate::rules::split_rules($rules)
    };
    ($($field:literal => $rules:tt),* $(,)?) => {
        vec![$((::std::string::String::from($field), $crate::field_rules!(@rules $rules))),*]
    };
}
