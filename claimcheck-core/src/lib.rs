//! # claimcheck-core
//!
//! Misinformation analysis over a small pipeline of LLM agents.
//!
//! ## Core Components
//!
//! - **Agents**: claims extractor, web scraper, fact checker and report generator
//! - **Pipeline**: task graph running the agents, with per-run results and trace
//! - **Report**: structured truthfulness report and its rendered text
//! - **LLM / Module / Signature**: typed prompting over Gemini, Anthropic or OpenAI
//! - **Tools**: web search and fact-check database lookups
//! - **Server**: `GET /?text=...` over HTTP
//!
//! ## Example
//!
//! ```rust,ignore
//! use claimcheck_core::Config;
//!
//! let pipeline = Config::from_env()?.build_pipeline()?;
//! let response = pipeline
//!     .analyze("The Great Wall of China is visible from space.")
//!     .await?;
//! println!("{}", response.final_report);
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod module;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod signature;
pub mod tools;

// Re-exports for convenience
pub use agents::{ClaimsExtractorAgent, FactCheckerAgent, ReportGeneratorAgent, WebScraperAgent};
pub use config::Config;
pub use error::{Error, Result};
pub use llm::{
    client_for, ClientConfig, CompletionRequest, CompletionResponse, LLMClient, ModelSpec,
    Provider, TrackedClient, UsageReport,
};
pub use module::{Module, Predict, PredictConfig};
pub use pipeline::{
    AnalysisResponse, Pipeline, PipelineSettings, Stage, StageId, StageInput, StageOutput,
    StageResults, TaskGraph, Trace, TraceEvent, TraceEventType,
};
pub use report::{
    check_report_shape, web_search_text, AnalyzedClaim, Claim, ClaimEvidence, Conclusion,
    EvidenceItem, FactCheckVerdict, FactCheckingResult, Report, SectionCounts, Stance,
};
pub use server::{router, AppState};
pub use signature::{FieldSpec, FieldType, Signature};
pub use tools::{
    FactCheckRecord, FactCheckTool, GoogleFactCheckTool, GoogleSearchTool, SearchHit, SearchTool,
};
