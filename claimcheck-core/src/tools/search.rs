//! Google Programmable Search (Custom Search JSON API).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{parse_reply, SearchHit, SearchTool};
use crate::error::{Error, Result};
use crate::llm::{build_http_client, describe_google_error};

const TOOL_NAME: &str = "google_search";
/// The API returns at most ten results per page.
const MAX_PAGE_SIZE: usize = 10;

/// Web search backed by a Programmable Search Engine.
pub struct GoogleSearchTool {
    api_key: String,
    engine_id: String,
    base_url: String,
    http: Client,
}

impl GoogleSearchTool {
    const DEFAULT_BASE_URL: &'static str = "https://www.googleapis.com/customsearch/v1";

    pub fn new(
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            http: build_http_client(timeout_secs)?,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomSearchItem {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
    display_link: Option<String>,
}

impl From<CustomSearchItem> for SearchHit {
    fn from(item: CustomSearchItem) -> Self {
        let mut hit = SearchHit::new(item.title, item.link, item.snippet.replace('\n', " "));
        if let Some(display) = item.display_link {
            hit.domain = display.trim_start_matches("www.").to_string();
        }
        hit
    }
}

#[async_trait]
impl SearchTool for GoogleSearchTool {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let limit = limit.min(MAX_PAGE_SIZE);
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let num = limit.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
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

        let hits = parse_hits(&body, limit)?;
        debug!(query, hits = hits.len(), "web search completed");
        Ok(hits)
    }

    fn name(&self) -> &str {
        TOOL_NAME
    }
}

fn parse_hits(body: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let parsed: CustomSearchResponse = parse_reply(TOOL_NAME, body)?;
    Ok(parsed
        .items
        .into_iter()
        .take(limit)
        .map(SearchHit::from)
        .collect())
}
