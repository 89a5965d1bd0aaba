//! Typed signatures for agent I/O contracts.
//!
//! A signature fixes what an agent is told (instructions), what it is given
//! (input fields) and the JSON it must answer with (output fields). The
//! [`Predict`](crate::module::Predict) module renders the prompt from a
//! signature and validates the model's answer against it.
//!
//! ```rust,ignore
//! struct ExtractClaims;
//!
//! impl Signature for ExtractClaims {
//!     type Inputs = ExtractClaimsInputs;
//!     type Outputs = ExtractClaimsOutputs;
//!
//!     fn instructions() -> &'static str {
//!         "Extract every discrete factual claim from the article"
//!     }
//!
//!     fn input_fields() -> Vec<FieldSpec> {
//!         vec![FieldSpec::new("text", FieldType::String)]
//!     }
//!
//!     fn output_fields() -> Vec<FieldSpec> {
//!         vec![FieldSpec::new("claims", FieldType::list(FieldType::String))]
//!     }
//! }
//! ```

pub mod types;
pub mod validation;

pub use types::{FieldSpec, FieldType};
pub use validation::{validate_fields, ValidationError, ValidationResult};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;

/// Error that occurs when parsing a model response into outputs.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Response was not valid JSON
    InvalidJson {
        message: String,
        response_preview: String,
    },

    /// JSON parsed but did not deserialize into the output type
    StructureMismatch { expected: String, got: String },

    /// Validation against the output fields failed
    ValidationFailed(Vec<ValidationError>),

    /// Response was empty
    EmptyResponse,
}

impl ParseError {
    fn invalid_json(err: &serde_json::Error, response: &str) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
            response_preview: truncate(response, 200),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson {
                message,
                response_preview,
            } => write!(
                f,
                "Failed to parse response as JSON: {message}. Response: {response_preview}"
            ),
            Self::StructureMismatch { expected, got } => {
                write!(f, "Response structure mismatch: expected {expected}, got {got}")
            }
            Self::ValidationFailed(errors) => {
                let messages: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "Validation failed: {}", messages.join("; "))
            }
            Self::EmptyResponse => write!(f, "LLM returned an empty response"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Core trait defining a typed LLM I/O contract.
pub trait Signature: Send + Sync + 'static {
    /// Input type.
    type Inputs: Serialize + DeserializeOwned + Clone + Send + Sync;

    /// Output type.
    type Outputs: Serialize + DeserializeOwned + Clone + Send + Sync;

    /// Task instructions for the model.
    fn instructions() -> &'static str;

    /// Input field specifications.
    fn input_fields() -> Vec<FieldSpec>;

    /// Output field specifications.
    fn output_fields() -> Vec<FieldSpec>;

    /// Render the system prompt: instructions, input field descriptions and
    /// the required JSON answer shape.
    fn system_prompt() -> String
    where
        Self: Sized,
    {
        let mut prompt = String::new();

        prompt.push_str(Self::instructions().trim());
        prompt.push_str("\n\n## Input Fields\n\n");
        for field in Self::input_fields() {
            prompt.push_str(&format!("- {}\n", field.describe()));
        }

        prompt.push_str("\n## Required Output\n\n");
        prompt.push_str("Respond with a JSON object containing:\n\n");
        for field in Self::output_fields() {
            prompt.push_str(&format!("- {}\n", field.describe()));
        }
        prompt.push_str("\n```json\n");
        prompt.push_str(&output_template::<Self>());
        prompt.push_str("\n```\n\nRespond with only the JSON object, no additional text.\n");

        prompt
    }

    /// Render the user message holding the input values.
    fn to_prompt(inputs: &Self::Inputs) -> String
    where
        Self: Sized,
    {
        let input_json = serde_json::to_value(inputs).unwrap_or(Value::Null);
        let mut prompt = String::new();

        for field in Self::input_fields() {
            let label = field.display_label();
            match input_json.get(&field.name) {
                Some(Value::Null) | None if !field.required => {}
                Some(v) => prompt.push_str(&format!("**{}**:\n{}\n\n", label, format_value(v))),
                None => prompt.push_str(&format!("**{}**: (not provided)\n\n", label)),
            }
        }

        prompt.trim_end().to_string()
    }

    /// Parse outputs from a model response.
    ///
    /// Extracts JSON (also from fenced code blocks), validates it against the
    /// output field specs and deserializes it.
    fn from_response(response: &str) -> Result<Self::Outputs, ParseError>
    where
        Self: Sized,
    {
        let response = response.trim();
        if response.is_empty() {
            return Err(ParseError::EmptyResponse);
        }

        let json_str = extract_json(response);
        let value: Value =
            serde_json::from_str(json_str).map_err(|e| ParseError::invalid_json(&e, json_str))?;

        validate_fields(&value, &Self::output_fields()).map_err(ParseError::ValidationFailed)?;

        serde_json::from_value(value).map_err(|e| ParseError::StructureMismatch {
            expected: std::any::type_name::<Self::Outputs>().to_string(),
            got: e.to_string(),
        })
    }
}

/// Extract JSON from a response that may contain markdown or other text.
pub fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        // skip a language tag
        let content_start = response[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if end > start {
            return &response[start..=end];
        }
    }

    response
}

fn output_template<S: Signature>() -> String {
    let template = FieldType::object(S::output_fields()).placeholder();
    serde_json::to_string_pretty(&template).unwrap_or_default()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}. {}", i + 1, v.as_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
