//! Runtime configuration.
//!
//! Everything the server needs is read once at startup into a [`Config`]
//! and handed to constructors from there.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::{client_for, ClientConfig, LLMClient, ModelSpec, Provider};
use crate::module::PredictConfig;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::tools::{GoogleFactCheckTool, GoogleSearchTool};

/// Settings for the server and the analysis pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    /// Model id; the provider's default model when unset
    pub model: Option<String>,
    pub google_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub fact_check_api_key: Option<String>,
    pub search_results: usize,
    pub fact_check_results: usize,
    pub max_retries: u32,
    pub temperature: f64,
    /// Per HTTP call to a model or tool
    pub timeout_secs: u64,
    /// Whole analysis run
    pub run_timeout_secs: Option<u64>,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Google,
            model: None,
            google_api_key: None,
            anthropic_api_key: None,
            openai_api_key: None,
            search_api_key: None,
            search_engine_id: None,
            fact_check_api_key: None,
            search_results: 5,
            fact_check_results: 5,
            max_retries: 2,
            temperature: 0.2,
            timeout_secs: 120,
            run_timeout_secs: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let google_api_key = get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY"));

        Ok(Self {
            provider: get("CLAIMCHECK_PROVIDER")
                .map(|p| p.parse::<Provider>())
                .transpose()?
                .unwrap_or(defaults.provider),
            model: get("CLAIMCHECK_MODEL"),
            search_api_key: get("GOOGLE_SEARCH_API_KEY").or_else(|| google_api_key.clone()),
            fact_check_api_key: get("GOOGLE_FACTCHECK_API_KEY").or_else(|| google_api_key.clone()),
            google_api_key,
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            search_engine_id: get("GOOGLE_SEARCH_ENGINE_ID"),
            search_results: parse_var(&get, "CLAIMCHECK_SEARCH_RESULTS")?
                .unwrap_or(defaults.search_results),
            fact_check_results: parse_var(&get, "CLAIMCHECK_FACTCHECK_RESULTS")?
                .unwrap_or(defaults.fact_check_results),
            max_retries: parse_var(&get, "CLAIMCHECK_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            temperature: parse_var(&get, "CLAIMCHECK_TEMPERATURE")?.unwrap_or(defaults.temperature),
            timeout_secs: parse_var(&get, "CLAIMCHECK_TIMEOUT_SECS")?.unwrap_or(defaults.timeout_secs),
            run_timeout_secs: parse_var(&get, "CLAIMCHECK_RUN_TIMEOUT_SECS")?,
            host: get("CLAIMCHECK_HOST").unwrap_or(defaults.host),
            port: parse_var(&get, "CLAIMCHECK_PORT")?.unwrap_or(defaults.port),
        })
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_run_timeout(mut self, secs: u64) -> Self {
        self.run_timeout_secs = Some(secs);
        self
    }

    /// Model the agents use.
    pub fn model_id(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| ModelSpec::default_for(self.provider).id.to_string())
    }

    fn llm_api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::Google => self.google_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::OpenAI => self.openai_api_key.as_deref(),
        }
    }

    /// Check that every credential the pipeline needs is present and the
    /// numeric settings are usable.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.llm_api_key().is_none() {
            missing.push(match self.provider {
                Provider::Google => "GOOGLE_API_KEY",
                Provider::Anthropic => "ANTHROPIC_API_KEY",
                Provider::OpenAI => "OPENAI_API_KEY",
            });
        }
        if self.search_api_key.is_none() {
            missing.push("GOOGLE_SEARCH_API_KEY");
        }
        if self.search_engine_id.is_none() {
            missing.push("GOOGLE_SEARCH_ENGINE_ID");
        }
        if self.fact_check_api_key.is_none() {
            missing.push("GOOGLE_FACTCHECK_API_KEY");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing credentials: {}",
                missing.join(", ")
            )));
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature must be between 0 and 1, got {}",
                self.temperature
            )));
        }
        if self.search_results == 0 || self.fact_check_results == 0 {
            return Err(Error::Config(
                "results per claim must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.run_timeout_secs == Some(0) {
            return Err(Error::Config("timeouts must be at least 1 second".to_string()));
        }
        Ok(())
    }

    /// Model call settings shared by all agents.
    pub fn predict_config(&self) -> PredictConfig {
        PredictConfig::new()
            .with_model(self.model_id())
            .with_temperature(self.temperature)
            .with_max_retries(self.max_retries)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            predict: self.predict_config(),
            search_results: self.search_results,
            fact_check_results: self.fact_check_results,
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Build the client for the selected provider.
    pub fn llm_client(&self) -> Result<Arc<dyn LLMClient>> {
        let key = self.llm_api_key().ok_or_else(|| {
            Error::Config(format!("no API key configured for provider {}", self.provider))
        })?;
        client_for(
            self.provider,
            ClientConfig::new(key)
                .with_default_model(self.model_id())
                .with_timeout(self.timeout_secs),
        )
    }

    pub fn search_tool(&self) -> Result<GoogleSearchTool> {
        match (&self.search_api_key, &self.search_engine_id) {
            (Some(key), Some(engine)) => GoogleSearchTool::new(key, engine, self.timeout_secs),
            _ => Err(Error::Config(
                "web search needs GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_ENGINE_ID".to_string(),
            )),
        }
    }

    pub fn fact_check_tool(&self) -> Result<GoogleFactCheckTool> {
        let key = self.fact_check_api_key.as_ref().ok_or_else(|| {
            Error::Config("fact checking needs GOOGLE_FACTCHECK_API_KEY".to_string())
        })?;
        GoogleFactCheckTool::new(key, self.timeout_secs)
    }

    /// Validate and assemble the pipeline with the real model and tools.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        self.validate()?;
        Ok(Pipeline::new(
            self.pipeline_settings(),
            self.llm_client()?,
            Arc::new(self.search_tool()?),
            Arc::new(self.fact_check_tool()?),
        ))
    }
}

fn parse_var<T: std::str::FromStr>(
    get: impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse()
                .map_err(|e| Error::Config(format!("{key}={raw:?} is invalid: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_SEARCH_ENGINE_ID", "engine"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.provider, Provider::Google);
        assert_eq!(config.model_id(), "gemini-2.0-flash");
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.search_results, 5);
        assert!(config.run_timeout_secs.is_none());
    }

    #[test]
    fn test_google_key_covers_tools() {
        let config = Config::from_lookup(lookup(&complete_env())).unwrap();

        assert_eq!(config.search_api_key.as_deref(), Some("g-key"));
        assert_eq!(config.fact_check_api_key.as_deref(), Some("g-key"));
        config.validate().unwrap();
    }

    #[test]
    fn test_gemini_key_alias_and_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "gemini-key"),
            ("GOOGLE_SEARCH_API_KEY", "search-key"),
            ("CLAIMCHECK_SEARCH_RESULTS", "3"),
            ("CLAIMCHECK_RUN_TIMEOUT_SECS", "90"),
            ("CLAIMCHECK_PORT", " 9000 "),
        ]))
        .unwrap();

        assert_eq!(config.google_api_key.as_deref(), Some("gemini-key"));
        assert_eq!(config.search_api_key.as_deref(), Some("search-key"));
        assert_eq!(config.fact_check_api_key.as_deref(), Some("gemini-key"));
        assert_eq!(config.search_results, 3);
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.pipeline_settings().run_timeout,
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = Config::from_lookup(lookup(&[("CLAIMCHECK_PROVIDER", "mistral")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_lookup(lookup(&[("CLAIMCHECK_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("CLAIMCHECK_PORT"));
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let config = Config::from_lookup(lookup(&[("CLAIMCHECK_PROVIDER", "anthropic")]))
            .unwrap();

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("ANTHROPIC_API_KEY"));
        assert!(message.contains("GOOGLE_SEARCH_ENGINE_ID"));
        assert_eq!(config.model_id(), ModelSpec::CLAUDE_SONNET.id);
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let config = Config::from_lookup(lookup(&complete_env()))
            .unwrap()
            .with_temperature(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_predict_config_carries_model_settings() {
        let config = Config::default()
            .with_model("gemini-1.5-pro")
            .with_temperature(0.0);
        let predict = config.predict_config();

        assert_eq!(predict.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(predict.temperature, 0.0);
        assert_eq!(predict.max_retries, 2);
    }

    #[test]
    fn test_build_pipeline_requires_credentials() {
        assert!(Config::default().build_pipeline().is_err());

        let pipeline = Config::from_lookup(lookup(&complete_env()))
            .unwrap()
            .build_pipeline()
            .unwrap();
        assert_eq!(pipeline.settings().search_results, 5);
    }
}
