//! LLM client abstraction.
//!
//! One [`LLMClient`] trait over the Gemini, Anthropic and OpenAI HTTP APIs,
//! plus [`TrackedClient`], which tallies token and cost usage per run and agent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use claimcheck_core::llm::{ChatMessage, ClientConfig, CompletionRequest, GoogleClient};
//!
//! let client = GoogleClient::new(
//!     ClientConfig::new("your-api-key").with_default_model("gemini-2.0-flash"),
//! )?;
//!
//! let request = CompletionRequest::new()
//!     .with_system("Extract factual claims")
//!     .with_message(ChatMessage::user("The Great Wall is visible from space."));
//!
//! let response = client.complete(request).await?;
//! ```

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod types;

pub(crate) use client::{build_http_client, describe_google_error};
pub use client::{
    client_for, AnthropicClient, ClientConfig, GoogleClient, LLMClient, OpenAIClient,
    TrackedClient,
};
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ModelSpec, Provider, StopReason,
    TokenUsage, UsageReport, UsageTotals,
};
