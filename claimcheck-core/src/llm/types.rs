//! Provider-neutral request, response and usage types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;

/// Hosted model API an [`LLMClient`](super::LLMClient) talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Google,
    Anthropic,
    OpenAI,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Google => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
        })
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Google),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!(
                "unknown provider '{other}' (expected gemini, anthropic or openai)"
            ))),
        }
    }
}

/// Pricing of a model the clients know about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelSpec {
    pub id: &'static str,
    pub provider: Provider,
    pub context_window: u32,
    /// USD per million prompt tokens
    pub input_price: f64,
    /// USD per million generated tokens
    pub output_price: f64,
}

impl ModelSpec {
    pub const GEMINI_FLASH: Self = Self::spec("gemini-2.0-flash", Provider::Google, 1_048_576, 0.10, 0.40);
    pub const GEMINI_PRO: Self = Self::spec("gemini-1.5-pro", Provider::Google, 2_097_152, 1.25, 5.0);
    pub const CLAUDE_SONNET: Self =
        Self::spec("claude-3-5-sonnet-20241022", Provider::Anthropic, 200_000, 3.0, 15.0);
    pub const CLAUDE_HAIKU: Self =
        Self::spec("claude-3-5-haiku-20241022", Provider::Anthropic, 200_000, 0.8, 4.0);
    pub const GPT_4O: Self = Self::spec("gpt-4o", Provider::OpenAI, 128_000, 2.5, 10.0);
    pub const GPT_4O_MINI: Self = Self::spec("gpt-4o-mini", Provider::OpenAI, 128_000, 0.15, 0.60);

    const CATALOG: [Self; 6] = [
        Self::GEMINI_FLASH,
        Self::GEMINI_PRO,
        Self::CLAUDE_SONNET,
        Self::CLAUDE_HAIKU,
        Self::GPT_4O,
        Self::GPT_4O_MINI,
    ];

    const fn spec(
        id: &'static str,
        provider: Provider,
        context_window: u32,
        input_price: f64,
        output_price: f64,
    ) -> Self {
        Self {
            id,
            provider,
            context_window,
            input_price,
            output_price,
        }
    }

    pub fn catalog() -> &'static [Self] {
        &Self::CATALOG
    }

    /// Model the agents use when none is configured.
    pub fn default_for(provider: Provider) -> Self {
        match provider {
            Provider::Google => Self::GEMINI_FLASH,
            Provider::Anthropic => Self::CLAUDE_SONNET,
            Provider::OpenAI => Self::GPT_4O,
        }
    }

    /// Finds the spec for `model`, accepting versioned ids such as
    /// `gemini-2.0-flash-001`. The longest matching id wins.
    pub fn lookup(model: &str) -> Option<&'static Self> {
        Self::catalog()
            .iter()
            .filter(|m| model.starts_with(m.id))
            .max_by_key(|m| m.id.len())
    }

    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_price + usage.output_tokens as f64 * self.output_price)
            / 1_000_000.0
    }
}

/// Author of a conversation turn. The system prompt travels separately in
/// [`CompletionRequest::system`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One model call. Every agent asks for a JSON object back, so clients
/// switch their provider into JSON output mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Falls back to the client's default model
    pub model: Option<String>,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Agent issuing the call, used to attribute usage
    pub agent: Option<String>,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Model to call, given the client's default.
    pub(crate) fn model_or(&self, default: Option<&str>, provider: Provider) -> String {
        self.model
            .as_deref()
            .or(default)
            .unwrap_or(ModelSpec::default_for(provider).id)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Model that answered, as reported by the provider
    pub model: String,
    pub content: String,
    pub stop_reason: Option<StopReason>,
    pub usage: TokenUsage,
    /// USD; `None` when the model is not in the pricing catalog
    pub cost: Option<f64>,
}

impl CompletionResponse {
    pub(crate) fn priced(
        model: String,
        content: String,
        stop_reason: Option<StopReason>,
        usage: TokenUsage,
    ) -> Self {
        let cost = ModelSpec::lookup(&model).map(|spec| spec.cost(&usage));
        Self {
            model,
            content,
            stop_reason,
            usage,
            cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    /// Output was cut at the token limit, so its JSON is likely incomplete
    MaxTokens,
    /// Provider withheld output (e.g. Gemini SAFETY / RECITATION)
    ContentFilter,
}

/// Request, token and cost counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl UsageTotals {
    fn add(&mut self, response: &CompletionResponse) {
        self.requests += 1;
        self.input_tokens += response.usage.input_tokens;
        self.output_tokens += response.usage.output_tokens;
        self.cost_usd += response.cost.unwrap_or_default();
    }
}

/// Model usage of one analysis run, overall and per agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    #[serde(flatten)]
    pub total: UsageTotals,
    #[serde(default)]
    pub by_agent: BTreeMap<String, UsageTotals>,
}

impl UsageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, agent: Option<&str>, response: &CompletionResponse) {
        self.total.add(response);
        if let Some(agent) = agent {
            self.by_agent.entry(agent.to_string()).or_default().add(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(model: &str, input_tokens: u64, output_tokens: u64) -> CompletionResponse {
        CompletionResponse::priced(
            model.to_string(),
            "{}".to_string(),
            Some(StopReason::EndTurn),
            TokenUsage {
                input_tokens,
                output_tokens,
            },
        )
    }

    #[test]
    fn test_provider_parse_and_display() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("google".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!(" openai ".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert!(matches!("mistral".parse::<Provider>(), Err(Error::Config(_))));
        assert_eq!(Provider::Google.to_string(), "gemini");
        assert_eq!(Provider::default(), Provider::Google);
    }

    #[test]
    fn test_lookup_prefers_longest_id() {
        assert_eq!(ModelSpec::lookup("gemini-2.0-flash-001"), Some(&ModelSpec::GEMINI_FLASH));
        assert_eq!(ModelSpec::lookup("gpt-4o-mini-2024-07-18"), Some(&ModelSpec::GPT_4O_MINI));
        assert_eq!(ModelSpec::lookup("gpt-4o"), Some(&ModelSpec::GPT_4O));
        assert!(ModelSpec::lookup("mistral-large").is_none());

        for provider in [Provider::Google, Provider::Anthropic, Provider::OpenAI] {
            assert_eq!(ModelSpec::default_for(provider).provider, provider);
        }
    }

    #[test]
    fn test_unknown_model_has_no_cost() {
        // 1M * $0.10/M + 0.5M * $0.40/M
        let flash = response("gemini-2.0-flash", 1_000_000, 500_000);
        assert!((flash.cost.unwrap() - 0.30).abs() < 1e-9);
        assert!(response("local-llama", 10, 10).cost.is_none());
    }

    #[test]
    fn test_request_model_fallback() {
        let request = CompletionRequest::new().with_temperature(1.7);
        assert_eq!(request.temperature, Some(1.0));
        assert_eq!(request.model_or(None, Provider::Anthropic), ModelSpec::CLAUDE_SONNET.id);
        assert_eq!(request.model_or(Some("gemini-1.5-pro"), Provider::Google), "gemini-1.5-pro");

        let pinned = CompletionRequest {
            model: Some("gpt-4o-mini".into()),
            ..CompletionRequest::new()
        };
        assert_eq!(pinned.model_or(Some("gpt-4o"), Provider::OpenAI), "gpt-4o-mini");
    }

    #[test]
    fn test_usage_report_by_agent() {
        let mut usage = UsageReport::new();
        usage.record(Some("claims_extractor_agent"), &response("gemini-2.0-flash", 1000, 500));
        usage.record(Some("fact_checker_agent"), &response("gemini-2.0-flash", 2000, 1000));
        usage.record(Some("fact_checker_agent"), &response("local-llama", 10, 10));
        usage.record(None, &response("gemini-2.0-flash", 0, 0));

        assert_eq!(usage.total.requests, 4);
        assert_eq!(usage.total.input_tokens, 3010);
        assert_eq!(usage.by_agent.len(), 2);
        assert_eq!(usage.by_agent["fact_checker_agent"].requests, 2);
        assert_eq!(usage.by_agent["claims_extractor_agent"].output_tokens, 500);

        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["requests"], 4);
        assert_eq!(json["by_agent"]["fact_checker_agent"]["requests"], 2);
    }
}
