//! Per-run execution trace.
//!
//! Every stage start, finish, failure and tool call is recorded as a
//! [`TraceEvent`] attributed to the agent that caused it. The trace is
//! returned with the analysis so callers can see what ran, in which order
//! and for how long.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::StageId;

/// Types of trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEventType {
    StageStart,
    StageEnd,
    StageError,
    ToolUse,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StageStart => "STAGE_START",
            Self::StageEnd => "STAGE_END",
            Self::StageError => "STAGE_ERROR",
            Self::ToolUse => "TOOL_USE",
        };
        f.write_str(s)
    }
}

/// One event in a run trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_type: TraceEventType,
    /// Agent name, e.g. `web_scraper_agent`
    pub author: String,
    pub stage: StageId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    pub timestamp: DateTime<Utc>,
}

impl TraceEvent {
    pub fn new(event_type: TraceEventType, stage: StageId, content: impl Into<String>) -> Self {
        Self {
            event_type,
            author: stage.agent_name().to_string(),
            stage,
            content: content.into(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref()?.get(key)
    }

    pub fn stage_start(stage: StageId) -> Self {
        Self::new(TraceEventType::StageStart, stage, format!("{stage} started"))
    }

    pub fn stage_end(stage: StageId, duration_ms: u64) -> Self {
        Self::new(TraceEventType::StageEnd, stage, format!("{stage} finished"))
            .with_metadata("duration_ms", duration_ms)
            .with_metadata("output_key", stage.output_key())
    }

    pub fn stage_error(stage: StageId, duration_ms: u64, error: &crate::error::Error) -> Self {
        Self::new(TraceEventType::StageError, stage, error.to_string())
            .with_metadata("duration_ms", duration_ms)
            .with_metadata("kind", error.kind())
    }

    pub fn tool_use(stage: StageId, tool: &str, query: impl Into<String>, results: usize) -> Self {
        Self::new(TraceEventType::ToolUse, stage, query)
            .with_metadata("tool", tool)
            .with_metadata("results", results)
    }
}

/// Shared, append-only event log for one run.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TraceEvent) {
        // a poisoned log is still a valid log
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }

    /// Events recorded so far, in order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let start = TraceEvent::stage_start(StageId::WebScraper);
        assert_eq!(start.author, "web_scraper_agent");
        assert_eq!(start.event_type.to_string(), "STAGE_START");

        let end = TraceEvent::stage_end(StageId::FactChecker, 42);
        assert_eq!(end.get_metadata("duration_ms"), Some(&Value::from(42u64)));
        assert_eq!(
            end.get_metadata("output_key"),
            Some(&Value::from("fact_check_results"))
        );

        let tool = TraceEvent::tool_use(StageId::WebScraper, "google_search", "moon landing", 3);
        assert_eq!(tool.get_metadata("results"), Some(&Value::from(3usize)));
    }

    #[test]
    fn test_trace_is_shared_between_clones() {
        let trace = Trace::new();
        let clone = trace.clone();
        clone.record(TraceEvent::stage_start(StageId::ClaimsExtractor));
        trace.record(TraceEvent::stage_end(StageId::ClaimsExtractor, 1));

        let events = trace.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, TraceEventType::StageEnd);
    }

    #[test]
    fn test_event_serializes_type_in_screaming_case() {
        let json = serde_json::to_value(TraceEvent::stage_start(StageId::ReportGenerator)).unwrap();
        assert_eq!(json["event_type"], "STAGE_START");
        assert_eq!(json["stage"], "report_generator");
        assert!(json.get("metadata").is_none());
    }
}
