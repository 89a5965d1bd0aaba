//! Per-run stage results and the dependency-scoped view stages read from.

use std::collections::HashMap;

use super::trace::{Trace, TraceEvent};
use super::{StageId, StageOutput};
use crate::error::{Error, Result};
use crate::report::{Claim, ClaimEvidence, FactCheckVerdict, Report};

/// Outputs of the stages that have finished in the current run.
///
/// Each stage writes exactly once, under its own id.
#[derive(Debug, Default)]
pub struct StageResults {
    outputs: HashMap<StageId, StageOutput>,
}

impl StageResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the output of `stage`. Writing a second time, or writing an
    /// output that belongs to another stage, is an error.
    pub fn insert(&mut self, stage: StageId, output: StageOutput) -> Result<()> {
        if output.stage() != stage {
            return Err(Error::Graph(format!(
                "stage {stage} produced output for {}",
                output.stage()
            )));
        }
        if self.outputs.contains_key(&stage) {
            return Err(Error::Graph(format!(
                "output key '{}' was already written in this run",
                stage.output_key()
            )));
        }
        self.outputs.insert(stage, output);
        Ok(())
    }

    pub fn get(&self, stage: StageId) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.outputs.contains_key(&stage)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Take ownership of a stage's output.
    pub fn take(&mut self, stage: StageId) -> Option<StageOutput> {
        self.outputs.remove(&stage)
    }
}

/// What a stage may read while it runs: the original text and the outputs of
/// the stages it declared as dependencies.
pub struct StageInput<'a> {
    stage: StageId,
    text: &'a str,
    dependencies: &'a [StageId],
    results: &'a StageResults,
    trace: &'a Trace,
}

impl<'a> StageInput<'a> {
    pub(crate) fn new(
        stage: StageId,
        text: &'a str,
        dependencies: &'a [StageId],
        results: &'a StageResults,
        trace: &'a Trace,
    ) -> Self {
        Self {
            stage,
            text,
            dependencies,
            results,
            trace,
        }
    }

    /// The stage this view was built for.
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// The text submitted for analysis.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Record a trace event attributed to this stage.
    pub fn record(&self, event: TraceEvent) {
        self.trace.record(event);
    }

    fn dependency(&self, on: StageId) -> Result<&'a StageOutput> {
        if !self.dependencies.contains(&on) {
            return Err(Error::Graph(format!(
                "stage {} read '{}' without declaring a dependency on {on}",
                self.stage,
                on.output_key()
            )));
        }
        self.results.get(on).ok_or_else(|| {
            Error::Graph(format!(
                "stage {} started before '{}' was available",
                self.stage,
                on.output_key()
            ))
        })
    }

    pub fn claims(&self) -> Result<&'a [Claim]> {
        match self.dependency(StageId::ClaimsExtractor)? {
            StageOutput::Claims(claims) => Ok(claims.as_slice()),
            other => Err(mismatch(StageId::ClaimsExtractor, other)),
        }
    }

    pub fn scraped_evidence(&self) -> Result<&'a [ClaimEvidence]> {
        match self.dependency(StageId::WebScraper)? {
            StageOutput::ScrapedEvidence(evidence) => Ok(evidence.as_slice()),
            other => Err(mismatch(StageId::WebScraper, other)),
        }
    }

    pub fn fact_check_results(&self) -> Result<&'a [FactCheckVerdict]> {
        match self.dependency(StageId::FactChecker)? {
            StageOutput::FactCheckResults(verdicts) => Ok(verdicts.as_slice()),
            other => Err(mismatch(StageId::FactChecker, other)),
        }
    }

    pub fn report(&self) -> Result<&'a Report> {
        match self.dependency(StageId::ReportGenerator)? {
            StageOutput::FinalReport(report) => Ok(report),
            other => Err(mismatch(StageId::ReportGenerator, other)),
        }
    }
}

fn mismatch(expected: StageId, got: &StageOutput) -> Error {
    Error::Graph(format!(
        "expected output of {expected}, found output of {}",
        got.stage()
    ))
}
