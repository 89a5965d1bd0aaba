//! Research capabilities the agents call: web search and the fact-check
//! database lookup.
//!
//! Both are traits so the pipeline can be run against in-memory tools in
//! tests. The production implementations talk to Google Custom Search and
//! the Google Fact Check Tools API.

mod fact_check;
#[cfg(test)]
pub(crate) mod mock;
mod search;

pub use fact_check::GoogleFactCheckTool;
pub use search::GoogleSearchTool;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single web search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            domain: extract_domain(&url),
            url,
            snippet: snippet.into(),
        }
    }
}

/// A published fact-check review of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckRecord {
    /// The claim as worded by the reviewer
    pub claim_text: String,
    /// Who made the claim, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimant: Option<String>,
    /// Reviewing organisation (e.g. "PolitiFact")
    pub publisher: String,
    /// Link to the review article
    pub url: String,
    /// Textual rating given by the reviewer (e.g. "False", "Mostly true")
    pub rating: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Web search capability.
#[async_trait]
pub trait SearchTool: Send + Sync {
    /// Run a query and return at most `limit` hits, most relevant first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    fn name(&self) -> &str {
        "web_search"
    }
}

/// Fact-check database lookup.
#[async_trait]
pub trait FactCheckTool: Send + Sync {
    /// Published reviews matching `claim`, at most `limit`.
    async fn lookup(&self, claim: &str, limit: usize) -> Result<Vec<FactCheckRecord>>;

    fn name(&self) -> &str {
        "fact_check"
    }
}

/// Decode a Google API reply, which is always a JSON object. Anything else
/// (an array, a bare value, HTML) is a tool error rather than "no results".
pub(crate) fn parse_reply<T: DeserializeOwned>(tool: &str, body: &str) -> Result<T> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::tool(tool, format!("unexpected response: {e}")))?;
    if !value.is_object() {
        return Err(Error::tool(tool, "unexpected response: expected a JSON object"));
    }
    serde_json::from_value(value).map_err(|e| Error::tool(tool, format!("unexpected response: {e}")))
}

/// Host part of a URL without a leading `www.`.
pub fn extract_domain(url: &str) -> String {
    let domain = url
        .split('/')
        .nth(2)
        .unwrap_or(url)
        .trim_start_matches("www.")
        .to_string();
    if domain.is_empty() {
        url.to_string()
    } else {
        domain
    }
}
