//! The [`LLMClient`] trait and its Gemini, Anthropic and OpenAI clients.
//!
//! Each provider client converts a [`CompletionRequest`] into its wire
//! format, posts it through a shared [`Endpoint`] and converts the reply
//! back into a priced [`CompletionResponse`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::types::{
    ChatRole, CompletionRequest, CompletionResponse, Provider, StopReason, TokenUsage, UsageReport,
};

/// A chat model that answers one request at a time.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    fn provider(&self) -> Provider;
}

/// Credentials and connection settings of a provider client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Overrides the provider's public endpoint
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Build the shared reqwest client used by model and tool clients.
pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let timeout = Duration::from_secs(timeout_secs);

    // Proxy auto-detection can panic in some sandboxes; retry without it.
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}"))),
    }
}

/// HTTP plumbing shared by the provider clients.
struct Endpoint {
    provider: Provider,
    config: ClientConfig,
    http: Client,
    default_base: &'static str,
}

impl Endpoint {
    fn new(provider: Provider, config: ClientConfig, default_base: &'static str) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;
        Ok(Self {
            provider,
            config,
            http,
            default_base,
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(self.default_base);
        format!("{}{path}", base.trim_end_matches('/'))
    }

    fn model(&self, request: &CompletionRequest) -> String {
        request.model_or(self.config.default_model.as_deref(), self.provider)
    }

    /// Post `body` and decode the JSON reply. Non-2xx replies become
    /// [`Error::LlmApi`], described by `describe_error` when it understands
    /// the provider's error body.
    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        auth: impl FnOnce(RequestBuilder, &str) -> RequestBuilder,
        describe_error: impl FnOnce(&str) -> Option<String>,
    ) -> Result<T> {
        let provider = self.provider;
        let request = auth(self.http.post(url), &self.config.api_key).json(body);
        let response = request
            .send()
            .await
            .map_err(|e| Error::LLM(format!("HTTP request to {provider} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::LLM(format!("Failed to read {provider} response: {e}")))?;

        if !status.is_success() {
            let message = describe_error(&text).unwrap_or_else(|| format!("{status}: {text}"));
            return Err(Error::llm_api(provider.to_string(), message));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::LLM(format!("Failed to parse {provider} response: {e}")))
    }
}

// Gemini `generateContent`

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

impl GeminiContent {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![GeminiPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    response_mime_type: &'static str,
}

impl GeminiRequest {
    fn from_request(request: &CompletionRequest) -> Self {
        let contents = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                GeminiContent::text(role, m.content.as_str())
            })
            .collect();

        Self {
            contents,
            system_instruction: request
                .system
                .as_deref()
                .map(|s| GeminiContent::text("user", s)),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                response_mime_type: "application/json",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: GeminiUsageMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GeminiResponse {
    /// Gemini does not echo the model id, so the requested one is kept.
    fn into_completion(self, model: String) -> Result<CompletionResponse> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::LLM("No candidates in Gemini response".to_string()))?;

        let stop_reason = candidate.finish_reason.as_deref().map(|reason| match reason {
            "MAX_TOKENS" => StopReason::MaxTokens,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                StopReason::ContentFilter
            }
            _ => StopReason::EndTurn,
        });
        let content: String = candidate
            .content
            .into_iter()
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect();

        if content.is_empty() && stop_reason == Some(StopReason::ContentFilter) {
            return Err(Error::llm_api("gemini", "response blocked by safety filters"));
        }

        let usage = TokenUsage {
            input_tokens: self.usage_metadata.prompt_token_count,
            output_tokens: self.usage_metadata.candidates_token_count,
        };
        Ok(CompletionResponse::priced(model, content, stop_reason, usage))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleApiError {
    error: GoogleApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleApiErrorDetail {
    message: String,
    status: Option<String>,
}

/// `STATUS: message` out of a Google API error body.
pub(crate) fn describe_google_error(body: &str) -> Option<String> {
    serde_json::from_str::<GoogleApiError>(body)
        .ok()
        .map(|e| match e.error.status {
            Some(status) => format!("{status}: {}", e.error.message),
            None => e.error.message,
        })
}

/// Google Gemini client.
pub struct GoogleClient {
    endpoint: Endpoint,
}

impl GoogleClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::new(
            Provider::Google,
            config,
            "https://generativelanguage.googleapis.com",
        )?;
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl LLMClient for GoogleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = self.endpoint.model(&request);
        let url = self
            .endpoint
            .url(&format!("/v1beta/models/{model}:generateContent"));

        let reply: GeminiResponse = self
            .endpoint
            .post(
                &url,
                &GeminiRequest::from_request(&request),
                |r, key| r.header("x-goog-api-key", key),
                describe_google_error,
            )
            .await?;
        reply.into_completion(model)
    }

    fn provider(&self) -> Provider {
        Provider::Google
    }
}

// Anthropic Messages and OpenAI chat completions

/// `{role, content}` message shared by the Anthropic and OpenAI wire formats.
#[derive(Debug, Serialize)]
struct RoleMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

fn role_messages(request: &CompletionRequest) -> impl Iterator<Item = RoleMessage> + '_ {
    request.messages.iter().map(|m| RoleMessage {
        role: match m.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        },
        content: m.content.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct TypedApiError {
    error: TypedApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct TypedApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

fn describe_typed_error(body: &str) -> Option<String> {
    serde_json::from_str::<TypedApiError>(body)
        .ok()
        .map(|e| match e.error.error_type {
            Some(kind) => format!("{kind}: {}", e.error.message),
            None => e.error.message,
        })
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<RoleMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

impl AnthropicRequest {
    /// The Messages API requires `max_tokens`.
    const DEFAULT_MAX_TOKENS: u32 = 4096;

    fn from_request(request: &CompletionRequest, model: String) -> Self {
        Self {
            model,
            messages: role_messages(request).collect(),
            max_tokens: request.max_tokens.unwrap_or(Self::DEFAULT_MAX_TOKENS),
            system: request.system.clone(),
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicBlock>,
    stop_reason: Option<String>,
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

impl AnthropicResponse {
    fn into_completion(self) -> CompletionResponse {
        let content = self.content.into_iter().filter_map(|b| b.text).collect();
        let stop_reason = self.stop_reason.as_deref().map(|reason| match reason {
            "max_tokens" => StopReason::MaxTokens,
            "refusal" => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        });
        CompletionResponse::priced(self.model, content, stop_reason, self.usage)
    }
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    endpoint: Endpoint,
}

impl AnthropicClient {
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::new(Provider::Anthropic, config, "https://api.anthropic.com")?;
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = AnthropicRequest::from_request(&request, self.endpoint.model(&request));

        let reply: AnthropicResponse = self
            .endpoint
            .post(
                &self.endpoint.url("/v1/messages"),
                &body,
                |r, key| {
                    r.header("x-api-key", key)
                        .header("anthropic-version", Self::API_VERSION)
                },
                describe_typed_error,
            )
            .await?;
        Ok(reply.into_completion())
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<RoleMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    response_format: serde_json::Value,
}

impl OpenAIRequest {
    fn from_request(request: &CompletionRequest, model: String) -> Self {
        let system = request.system.as_ref().map(|content| RoleMessage {
            role: "system",
            content: content.clone(),
        });

        Self {
            model,
            messages: system.into_iter().chain(role_messages(request)).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: serde_json::json!({ "type": "json_object" }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAIResponse {
    fn into_completion(self) -> Result<CompletionResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::LLM("No choices in OpenAI response".to_string()))?;

        let stop_reason = choice.finish_reason.as_deref().map(|reason| match reason {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        });
        let usage = TokenUsage {
            input_tokens: self.usage.prompt_tokens,
            output_tokens: self.usage.completion_tokens,
        };
        Ok(CompletionResponse::priced(
            self.model,
            choice.message.content.unwrap_or_default(),
            stop_reason,
            usage,
        ))
    }
}

/// OpenAI chat completions client.
pub struct OpenAIClient {
    endpoint: Endpoint,
}

impl OpenAIClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::new(Provider::OpenAI, config, "https://api.openai.com")?;
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = OpenAIRequest::from_request(&request, self.endpoint.model(&request));

        let reply: OpenAIResponse = self
            .endpoint
            .post(
                &self.endpoint.url("/v1/chat/completions"),
                &body,
                |r, key| r.bearer_auth(key),
                describe_typed_error,
            )
            .await?;
        reply.into_completion()
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }
}

/// Build the client for a provider.
pub fn client_for(provider: Provider, config: ClientConfig) -> Result<Arc<dyn LLMClient>> {
    Ok(match provider {
        Provider::Google => Arc::new(GoogleClient::new(config)?),
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)?),
        Provider::OpenAI => Arc::new(OpenAIClient::new(config)?),
    })
}

/// Client wrapper that tallies the usage of every completion it forwards.
///
/// The pipeline wraps the shared client in a fresh `TrackedClient` per run,
/// so each [`UsageReport`] covers exactly one analysis.
pub struct TrackedClient {
    inner: Arc<dyn LLMClient>,
    usage: RwLock<UsageReport>,
}

impl TrackedClient {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            inner: client,
            usage: RwLock::new(UsageReport::new()),
        }
    }

    pub async fn usage(&self) -> UsageReport {
        self.usage.read().await.clone()
    }
}

#[async_trait]
impl LLMClient for TrackedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let agent = request.agent.clone();
        let response = self.inner.complete(request).await?;

        self.usage.write().await.record(agent.as_deref(), &response);
        Ok(response)
    }

    fn provider(&self) -> Provider {
        self.inner.provider()
    }
}
