//! Record validation with per-field messages
//!
//! Shipment and account records arrive as loosely-typed JSON from external
//! collaborators. Checking them field by field yields a `ValidationError`
//! whose map points at every offending path instead of stopping at the
//! first serde error.

use std::collections::BTreeMap;

use serde_json::Value;

/// Schema mismatch on a record, keyed by dotted field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {}", render(.fields))]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

fn render(fields: &BTreeMap<String, String>) -> String {
    serde_json::to_string(fields).unwrap_or_default()
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry error, used for whole-document failures such as bad JSON.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.insert(path, message);
        err
    }

    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(path.into(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(value)` if no field failed, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// JSON type expected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldType::String => "expected string",
            FieldType::Number => "expected number",
            FieldType::Bool => "expected boolean",
        }
    }
}

/// One field rule: name, type, required.
pub type FieldRule = (&'static str, FieldType, bool);

/// Check `value` (expected to be an object at `path`) against `rules`,
/// recording every failure into `errors`.
///
/// Optional fields may be absent or `null`. Unknown fields are ignored.
pub fn check_object(value: &Value, path: &str, rules: &[FieldRule], errors: &mut ValidationError) {
    let Some(object) = value.as_object() else {
        errors.insert(path, "expected object");
        return;
    };

    for (name, field_type, required) in rules {
        let field_path = if path.is_empty() {
            (*name).to_string()
        } else {
            format!("{path}.{name}")
        };
        match object.get(*name) {
            None | Some(Value::Null) if *required => {
                errors.insert(field_path, "required");
            }
            None | Some(Value::Null) => {}
            Some(v) if !field_type.matches(v) => {
                errors.insert(field_path, field_type.expected());
            }
            Some(_) => {}
        }
    }
}
