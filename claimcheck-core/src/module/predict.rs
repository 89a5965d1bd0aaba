//! Typed model calls.
//!
//! `Predict` renders the prompt from a signature and its inputs, calls the
//! model, and parses and validates the answer. A failed call or an
//! unparseable answer is retried up to `max_retries` times; after a parse
//! failure the model is shown its previous answer and the parse error.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Module;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, LLMClient};
use crate::signature::Signature;

/// Model call settings of a [`Predict`].
#[derive(Debug, Clone)]
pub struct PredictConfig {
    /// Model id; the client's default model when unset
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Extra attempts after a failed call or an unusable answer
    pub max_retries: u32,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.2,
            max_tokens: None,
            max_retries: 2,
        }
    }
}

impl PredictConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Runs one signature against a model.
pub struct Predict<S: Signature> {
    _phantom: PhantomData<S>,
    lm: Arc<dyn LLMClient>,
    config: PredictConfig,
    name: String,
}

impl<S: Signature> Predict<S> {
    pub fn new(lm: Arc<dyn LLMClient>) -> Self {
        Self {
            _phantom: PhantomData,
            lm,
            config: PredictConfig::default(),
            name: format!("Predict<{}>", std::any::type_name::<S>()),
        }
    }

    pub fn with_config(mut self, config: PredictConfig) -> Self {
        self.config = config;
        self
    }

    /// Name used in logs, usage attribution and parse errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &PredictConfig {
        &self.config
    }

    fn base_request(&self, inputs: &S::Inputs) -> CompletionRequest {
        let mut request = CompletionRequest::new()
            .with_system(S::system_prompt())
            .with_message(ChatMessage::user(S::to_prompt(inputs)))
            .with_temperature(self.config.temperature)
            .with_agent(self.name.clone());
        request.model = self.config.model.clone();
        request.max_tokens = self.config.max_tokens;
        request
    }
}

#[async_trait]
impl<S: Signature> Module for Predict<S> {
    type Sig = S;

    async fn forward(&self, inputs: S::Inputs) -> Result<S::Outputs> {
        let base = self.base_request(&inputs);
        let mut request = base.clone();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if let Some(error) = &last_error {
                warn!(module = %self.name, attempt, %error, "retrying model call");
            }

            let response = match self.lm.complete(request.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(e);
                    request = base.clone();
                    continue;
                }
            };

            debug!(
                module = %self.name,
                model = %response.model,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                stop_reason = ?response.stop_reason,
                "model call completed"
            );

            match S::from_response(&response.content) {
                Ok(outputs) => return Ok(outputs),
                Err(parse_error) => {
                    request = base
                        .clone()
                        .with_message(ChatMessage::assistant(response.content))
                        .with_message(ChatMessage::user(format!(
                            "Your previous answer could not be used: {parse_error}. \
                             Respond again with only the JSON object in the required shape."
                        )));
                    last_error = Some(Error::parse(&self.name, parse_error.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Internal("retry loop exited without result".into())))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
