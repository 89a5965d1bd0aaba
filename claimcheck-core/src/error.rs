//! Error types for claimcheck-core.

use thiserror::Error;

/// Result type alias using claimcheck-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while analyzing a text.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM API error reported by a provider
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// LLM error (transport, empty candidates, ...)
    #[error("LLM error: {0}")]
    LLM(String),

    /// A search or fact-check capability failed
    #[error("Tool error: {tool} - {message}")]
    Tool { tool: String, message: String },

    /// Model output could not be parsed into the expected shape
    #[error("Parse error in {stage}: {message}")]
    Parse { stage: String, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Task graph is malformed or a stage broke its contract
    #[error("Task graph error: {0}")]
    Graph(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a parse error attributed to a stage.
    pub fn parse(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Short machine-readable name of the variant, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LlmApi { .. } => "llm_api",
            Self::LLM(_) => "llm",
            Self::Tool { .. } => "tool",
            Self::Parse { .. } => "parse",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::InvalidInput(_) => "invalid_input",
            Self::Timeout { .. } => "timeout",
            Self::Graph(_) => "graph",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the failure originated in an upstream service (model or tool).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::LlmApi { .. } | Self::LLM(_) | Self::Tool { .. } | Self::Parse { .. }
        )
    }
}
