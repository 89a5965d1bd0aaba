//! Validation of model output against signature field specs.

use super::types::{FieldSpec, FieldType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error that occurs during signature validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum ValidationError {
    /// A required field is missing.
    MissingField { field: String, expected: String },

    /// Field value has the wrong JSON type.
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    /// Enum field has a value outside the allowed set.
    EnumInvalid {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// The value is not a JSON object.
    NotAnObject,
}

impl ValidationError {
    fn missing_field(field: &str, expected: &FieldType) -> Self {
        Self::MissingField {
            field: field.to_string(),
            expected: expected.to_prompt_hint(),
        }
    }

    fn type_mismatch(field: &str, expected: &FieldType, value: &Value) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_prompt_hint(),
            got: value_type_name(value).to_string(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field, expected } => {
                write!(f, "missing required field '{field}' (expected {expected})")
            }
            Self::TypeMismatch {
                field,
                expected,
                got,
            } => write!(f, "field '{field}' has wrong type: expected {expected}, got {got}"),
            Self::EnumInvalid {
                field,
                value,
                allowed,
            } => write!(
                f,
                "field '{field}' has invalid value '{value}' (allowed: {})",
                allowed.join(", ")
            ),
            Self::NotAnObject => write!(f, "expected a JSON object"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a value against field specs.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate a JSON object against a list of field specifications.
///
/// All errors are collected; nested paths are reported as `parent.child` and
/// list items as `field[i]`.
pub fn validate_fields(value: &Value, fields: &[FieldSpec]) -> ValidationResult {
    let mut errors = Vec::new();
    collect_object_errors(value, fields, None, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn collect_object_errors(
    value: &Value,
    fields: &[FieldSpec],
    parent: Option<&str>,
    errors: &mut Vec<ValidationError>,
) {
    let Some(obj) = value.as_object() else {
        errors.push(ValidationError::NotAnObject);
        return;
    };

    for field in fields {
        let path = match parent {
            Some(p) => format!("{p}.{}", field.name),
            None => field.name.clone(),
        };
        match obj.get(&field.name) {
            // Models often emit null for optional values
            Some(Value::Null) if !field.required => {}
            Some(field_value) => collect_value_errors(field_value, &field.field_type, &path, errors),
            None if field.required => {
                errors.push(ValidationError::missing_field(&path, &field.field_type))
            }
            None => {}
        }
    }
}

fn collect_value_errors(
    value: &Value,
    field_type: &FieldType,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    match field_type {
        FieldType::String if !value.is_string() => {
            errors.push(ValidationError::type_mismatch(path, field_type, value))
        }
        FieldType::List(inner) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    collect_value_errors(item, inner, &format!("{path}[{i}]"), errors);
                }
            }
            None => errors.push(ValidationError::type_mismatch(path, field_type, value)),
        },
        FieldType::Object(fields) => {
            if value.is_object() {
                collect_object_errors(value, fields, Some(path), errors);
            } else {
                errors.push(ValidationError::type_mismatch(path, field_type, value));
            }
        }
        FieldType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => {}
            Some(s) => errors.push(ValidationError::EnumInvalid {
                field: path.to_string(),
                value: s.to_string(),
                allowed: allowed.clone(),
            }),
            None => errors.push(ValidationError::type_mismatch(path, field_type, value)),
        },
        _ => {}
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
