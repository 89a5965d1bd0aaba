//! Scripted in-memory client for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};

use super::client::LLMClient;
use super::types::{CompletionRequest, CompletionResponse, Provider, StopReason, TokenUsage};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
}

struct Rule {
    needle: String,
    replies: Vec<Reply>,
    served: AtomicUsize,
}

/// Answers each request with the replies of the first rule whose needle
/// occurs in the system prompt. A rule with several replies serves them in
/// order and then repeats the last one.
#[derive(Default)]
pub struct ScriptedClient {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub const INPUT_TOKENS: u64 = 40;
    pub const OUTPUT_TOKENS: u64 = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_to(self, needle: &str, reply: &str) -> Self {
        self.respond_with(needle, [Reply::Text(reply.to_string())])
    }

    pub fn fail_on(self, needle: &str, message: &str) -> Self {
        self.respond_with(needle, [Reply::Fail(message.to_string())])
    }

    pub fn respond_with(mut self, needle: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            replies: replies.into_iter().collect(),
            served: AtomicUsize::new(0),
        });
        self
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Position of the first call whose system prompt contains `needle`.
    pub fn call_index(&self, needle: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|c| c.system.as_deref().unwrap_or_default().contains(needle))
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.calls.lock().unwrap().push(request.clone());
        // let sibling tasks interleave like real I/O would
        tokio::task::yield_now().await;

        let system = request.system.as_deref().unwrap_or_default();
        let rule = self
            .rules
            .iter()
            .find(|r| system.contains(&r.needle))
            .ok_or_else(|| Error::LLM("no scripted reply for request".to_string()))?;

        let n = rule.served.fetch_add(1, Ordering::SeqCst);
        let reply = rule
            .replies
            .get(n)
            .or_else(|| rule.replies.last())
            .cloned()
            .ok_or_else(|| Error::LLM("scripted rule has no replies".to_string()))?;

        match reply {
            Reply::Fail(message) => Err(Error::llm_api("scripted", message)),
            Reply::Text(content) => Ok(CompletionResponse {
                model: request.model.unwrap_or_else(|| "scripted".to_string()),
                content,
                stop_reason: Some(StopReason::EndTurn),
                usage: TokenUsage {
                    input_tokens: Self::INPUT_TOKENS,
                    output_tokens: Self::OUTPUT_TOKENS,
                },
                cost: Some(0.0),
            }),
        }
    }

    fn provider(&self) -> Provider {
        Provider::Google
    }
}
