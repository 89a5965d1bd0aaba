//! Google Fact Check Tools `claims:search` lookup.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{parse_reply, FactCheckRecord, FactCheckTool};
use crate::error::{Error, Result};
use crate::llm::{build_http_client, describe_google_error};

const TOOL_NAME: &str = "google_fact_check";

/// Fact-check lookup against the ClaimReview index.
pub struct GoogleFactCheckTool {
    api_key: String,
    base_url: String,
    language_code: Option<String>,
    http: Client,
}

impl GoogleFactCheckTool {
    const DEFAULT_BASE_URL: &'static str =
        "https://factchecktools.googleapis.com/v1alpha1/claims:search";

    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            language_code: None,
            http: build_http_client(timeout_secs)?,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Restrict reviews to a BCP-47 language, e.g. `en-US`.
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language_code = Some(code.into());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimSearchResponse {
    #[serde(default)]
    claims: Vec<ClaimEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimEntry {
    #[serde(default)]
    text: String,
    claimant: Option<String>,
    #[serde(default)]
    claim_review: Vec<ClaimReview>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimReview {
    publisher: Option<ReviewPublisher>,
    url: String,
    title: Option<String>,
    #[serde(default)]
    textual_rating: String,
}

#[derive(Debug, Deserialize)]
struct ReviewPublisher {
    name: Option<String>,
    site: Option<String>,
}

#[async_trait]
impl FactCheckTool for GoogleFactCheckTool {
    async fn lookup(&self, claim: &str, limit: usize) -> Result<Vec<FactCheckRecord>> {
        if limit == 0 || claim.trim().is_empty() {
            return Ok(Vec::new());
        }

        let page_size = limit.to_string();
        let mut params = vec![
            ("query", claim),
            ("key", self.api_key.as_str()),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(code) = &self.language_code {
            params.push(("languageCode", code.as_str()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::tool(TOOL_NAME, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::tool(TOOL_NAME, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let message = describe_google_error(&body).unwrap_or_else(|| format!("{status}: {body}"));
            return Err(Error::tool(TOOL_NAME, message));
        }

        let records = parse_records(&body, limit)?;
        debug!(claim, reviews = records.len(), "fact-check lookup completed");
        Ok(records)
    }

    fn name(&self) -> &str {
        TOOL_NAME
    }
}

/// Flatten claims and their reviews into one record per review.
fn parse_records(body: &str, limit: usize) -> Result<Vec<FactCheckRecord>> {
    let parsed: ClaimSearchResponse = parse_reply(TOOL_NAME, body)?;

    Ok(parsed
        .claims
        .into_iter()
        .flat_map(|entry| {
            let ClaimEntry {
                text,
                claimant,
                claim_review,
            } = entry;
            claim_review.into_iter().map(move |review| {
                let publisher = review
                    .publisher
                    .and_then(|p| p.name.or(p.site))
                    .unwrap_or_else(|| super::extract_domain(&review.url));
                FactCheckRecord {
                    claim_text: text.clone(),
                    claimant: claimant.clone(),
                    publisher,
                    url: review.url,
                    rating: review.textual_rating,
                    title: review.title,
                }
            })
        })
        .take(limit)
        .collect())
}
