//! Field metadata for agent signatures.
//!
//! A [`FieldSpec`] names one field of a signature's input or output object;
//! its [`FieldType`] is the JSON shape the value must have. Both are used to
//! describe the fields to the model and to validate what comes back.

use serde_json::Value;

/// One field of a signature.
///
/// ```
/// use claimcheck_core::signature::{FieldSpec, FieldType};
///
/// let field = FieldSpec::new("claims", FieldType::list(FieldType::String))
///     .with_description("Discrete factual claims made by the article")
///     .with_prefix("Claims");
/// assert_eq!(field.display_label(), "Claims");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Key in the JSON object
    pub name: String,
    pub field_type: FieldType,
    pub description: String,
    /// Label shown instead of the name in the user prompt
    pub prefix: Option<String>,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
            prefix: None,
            required: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// The field may be missing or null.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn display_label(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.name)
    }

    /// Describe the field for the system prompt, e.g.
    /// `` `url`: string, optional. Review URL ``.
    pub fn describe(&self) -> String {
        let mut line = format!("`{}`: {}", self.name, self.field_type.to_prompt_hint());
        if !self.required {
            line.push_str(", optional");
        }
        if !self.description.is_empty() {
            line.push_str(". ");
            line.push_str(&self.description);
        }
        line
    }
}

/// JSON shape of a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldType {
    #[default]
    String,
    List(Box<FieldType>),
    Object(Vec<FieldSpec>),
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
}

impl FieldType {
    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn object(fields: Vec<FieldSpec>) -> Self {
        Self::Object(fields)
    }

    pub fn enum_of(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Compact shape description, e.g. `list of {claim, reviews}` or
    /// `one of "True", "False"`.
    pub fn to_prompt_hint(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::List(inner) => format!("list of {}", inner.to_prompt_hint()),
            Self::Object(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                format!("{{{}}}", names.join(", "))
            }
            Self::Enum(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("\"{v}\"")).collect();
                format!("one of {}", quoted.join(", "))
            }
        }
    }

    /// Value shown in the JSON answer template.
    pub fn placeholder(&self) -> Value {
        match self {
            Self::String => Value::String("...".to_string()),
            Self::List(inner) => Value::Array(vec![inner.placeholder()]),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|f| (f.name.clone(), f.field_type.placeholder()))
                    .collect(),
            ),
            Self::Enum(values) => Value::String(values.join(" | ")),
        }
    }
}
