//! Analysis pipeline: typed stages, the task graph that runs them and the
//! [`Pipeline`] entry point.
//!
//! The fixed topology is
//!
//! ```text
//! claims_extractor ──┬── web_scraper ──┬── report_generator
//!                    └── fact_checker ─┘
//! ```
//!
//! Each run gets its own [`StageResults`], [`Trace`] and usage tracker, so
//! concurrent requests share nothing mutable.

mod context;
mod graph;
mod trace;

pub use context::{StageInput, StageResults};
pub use graph::TaskGraph;
pub use trace::{Trace, TraceEvent, TraceEventType};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::agents::{ClaimsExtractorAgent, FactCheckerAgent, ReportGeneratorAgent, WebScraperAgent};
use crate::error::{Error, Result};
use crate::llm::{LLMClient, TrackedClient, UsageReport};
use crate::module::PredictConfig;
use crate::report::{check_report_shape, Claim, ClaimEvidence, FactCheckVerdict, Report};
use crate::tools::{FactCheckTool, SearchTool};

/// Identifies a stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ClaimsExtractor,
    WebScraper,
    FactChecker,
    ReportGenerator,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::ClaimsExtractor,
        StageId::WebScraper,
        StageId::FactChecker,
        StageId::ReportGenerator,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::ClaimsExtractor => "claims_extractor",
            Self::WebScraper => "web_scraper",
            Self::FactChecker => "fact_checker",
            Self::ReportGenerator => "report_generator",
        }
    }

    /// Name of the agent behind the stage, used as trace author.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::ClaimsExtractor => "claims_extractor_agent",
            Self::WebScraper => "web_scraper_agent",
            Self::FactChecker => "fact_checker_agent",
            Self::ReportGenerator => "report_generator_agent",
        }
    }

    /// Key the stage's output is stored under.
    pub fn output_key(&self) -> &'static str {
        match self {
            Self::ClaimsExtractor => "claims",
            Self::WebScraper => "scraped_evidence",
            Self::FactChecker => "fact_check_results",
            Self::ReportGenerator => "final_report",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one stage, tagged with its output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_key", content = "value", rename_all = "snake_case")]
pub enum StageOutput {
    Claims(Vec<Claim>),
    ScrapedEvidence(Vec<ClaimEvidence>),
    FactCheckResults(Vec<FactCheckVerdict>),
    FinalReport(Report),
}

impl StageOutput {
    /// The stage that produces this kind of output.
    pub fn stage(&self) -> StageId {
        match self {
            Self::Claims(_) => StageId::ClaimsExtractor,
            Self::ScrapedEvidence(_) => StageId::WebScraper,
            Self::FactCheckResults(_) => StageId::FactChecker,
            Self::FinalReport(_) => StageId::ReportGenerator,
        }
    }
}

/// A unit of work in the task graph.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Stages whose outputs this stage reads. It only starts after all of
    /// them have finished.
    fn dependencies(&self) -> Vec<StageId>;

    async fn run(&self, input: StageInput<'_>) -> Result<StageOutput>;
}

/// Tunables shared by every run of a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Model call settings for every agent
    pub predict: PredictConfig,
    /// Search hits requested per claim
    pub search_results: usize,
    /// Published reviews requested per claim
    pub fact_check_results: usize,
    /// Limit on a whole run
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            predict: PredictConfig::new(),
            search_results: 5,
            fact_check_results: 5,
            run_timeout: None,
        }
    }
}

/// Everything one analysis produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub run_id: Uuid,
    pub text: String,
    pub claims: Vec<Claim>,
    pub scraped_evidence: Vec<ClaimEvidence>,
    pub fact_check_results: Vec<FactCheckVerdict>,
    pub report: Report,
    /// Rendered form of `report`
    pub final_report: String,
    pub usage: UsageReport,
    pub trace: Vec<TraceEvent>,
}

/// Runs the claims extractor, the two research stages and the report
/// generator over a text.
pub struct Pipeline {
    settings: PipelineSettings,
    llm: Arc<dyn LLMClient>,
    search: Arc<dyn SearchTool>,
    fact_check: Arc<dyn FactCheckTool>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        llm: Arc<dyn LLMClient>,
        search: Arc<dyn SearchTool>,
        fact_check: Arc<dyn FactCheckTool>,
    ) -> Self {
        Self {
            settings,
            llm,
            search,
            fact_check,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn stages(&self, lm: Arc<dyn LLMClient>) -> Vec<Box<dyn Stage>> {
        let predict = &self.settings.predict;
        vec![
            Box::new(ClaimsExtractorAgent::new(lm.clone(), predict.clone())),
            Box::new(WebScraperAgent::new(
                lm.clone(),
                self.search.clone(),
                self.settings.search_results,
                predict.clone(),
            )),
            Box::new(FactCheckerAgent::new(
                lm.clone(),
                self.fact_check.clone(),
                self.settings.fact_check_results,
                predict.clone(),
            )),
            Box::new(ReportGeneratorAgent::new(lm, predict.clone())),
        ]
    }

    /// The task graph a run executes.
    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::build(self.stages(self.llm.clone()))
    }

    /// Analyze `text` and return the report with everything gathered for it.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput(
                "text must be a non-empty string".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("analysis", %run_id);
        self.run(run_id, text).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, text: &str) -> Result<AnalysisResponse> {
        info!(chars = text.chars().count(), "analysis started");
        let started = Instant::now();

        let tracked = Arc::new(TrackedClient::new(self.llm.clone()));
        let graph = TaskGraph::build(self.stages(tracked.clone()))?;
        let trace = Trace::new();

        let run = graph.run(text, &trace);
        let mut results = match self.settings.run_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::timeout(limit.as_millis() as u64))??,
            None => run.await?,
        };

        let claims = take_output(&mut results, StageId::ClaimsExtractor, |o| match o {
            StageOutput::Claims(c) => Some(c),
            _ => None,
        })?;
        let scraped_evidence = take_output(&mut results, StageId::WebScraper, |o| match o {
            StageOutput::ScrapedEvidence(e) => Some(e),
            _ => None,
        })?;
        let fact_check_results = take_output(&mut results, StageId::FactChecker, |o| match o {
            StageOutput::FactCheckResults(v) => Some(v),
            _ => None,
        })?;
        let report = take_output(&mut results, StageId::ReportGenerator, |o| match o {
            StageOutput::FinalReport(r) => Some(r),
            _ => None,
        })?;

        let final_report = report.render();
        check_report_shape(&final_report, claims.len())?;

        let usage = tracked.usage().await;
        info!(
            claims = claims.len(),
            tag = %report.tag,
            model_calls = usage.total.requests,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );

        Ok(AnalysisResponse {
            run_id,
            text: text.to_string(),
            claims,
            scraped_evidence,
            fact_check_results,
            report,
            final_report,
            usage,
            trace: trace.events(),
        })
    }
}

fn take_output<T>(
    results: &mut StageResults,
    stage: StageId,
    extract: impl FnOnce(StageOutput) -> Option<T>,
) -> Result<T> {
    results.take(stage).and_then(extract).ok_or_else(|| {
        Error::Internal(format!("run finished without '{}'", stage.output_key()))
    })
}
