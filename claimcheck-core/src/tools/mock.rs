//! In-memory tools for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{FactCheckRecord, FactCheckTool, SearchHit, SearchTool};
use crate::error::{Error, Result};

/// Returns canned hits for every query and records the queries.
#[derive(Default)]
pub struct StaticSearch {
    hits: Vec<SearchHit>,
    fail_on: Option<String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl StaticSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Fail any query containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchTool for StaticSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push((query.to_string(), limit));
        tokio::task::yield_now().await;

        if let Some(needle) = &self.fail_on {
            if query.contains(needle.as_str()) {
                return Err(Error::tool(self.name(), "quota exceeded"));
            }
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Returns reviews keyed by exact claim text; unknown claims have none.
#[derive(Default)]
pub struct StaticFactCheck {
    records: HashMap<String, Vec<FactCheckRecord>>,
    lookups: Mutex<Vec<String>>,
}

impl StaticFactCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_review(mut self, claim: &str, publisher: &str, url: &str, rating: &str) -> Self {
        self.records
            .entry(claim.to_string())
            .or_default()
            .push(FactCheckRecord {
                claim_text: claim.to_string(),
                claimant: None,
                publisher: publisher.to_string(),
                url: url.to_string(),
                rating: rating.to_string(),
                title: None,
            });
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl FactCheckTool for StaticFactCheck {
    async fn lookup(&self, claim: &str, limit: usize) -> Result<Vec<FactCheckRecord>> {
        self.lookups.lock().unwrap().push(claim.to_string());
        tokio::task::yield_now().await;

        Ok(self
            .records
            .get(claim)
            .map(|r| r.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
