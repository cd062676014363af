// Structured rule discovery
//
// Validator types declare their rules through an associated function, so
// reading them never constructs a value or runs side effects.

use super::{RawRules, RuleStrategy};
use crate::host::HandlerInfo;

/// Implemented by request types that know their own validation rules
pub trait DeclaresFieldRules {
    fn field_rules() -> RawRules;
}

/// Reads the rules of the validator type registered for a route
pub struct ReflectedRules;

impl RuleStrategy for ReflectedRules {
    fn name(&self) -> &'static str {
        "reflect"
    }

    fn extract(&self, handler: &HandlerInfo) -> Result<RawRules, String> {
        Ok(handler.validator.map(|rules| rules()).unwrap_or_default())
    }
}
