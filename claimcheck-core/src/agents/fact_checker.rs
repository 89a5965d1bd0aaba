use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{align_to_claims, predictor};
use crate::error::Result;
use crate::llm::LLMClient;
use crate::module::{Module, Predict, PredictConfig};
use crate::pipeline::{Stage, StageId, StageInput, StageOutput, TraceEvent};
use crate::report::{Claim, FactCheckVerdict};
use crate::signature::{FieldSpec, FieldType, Signature};
use crate::tools::{FactCheckRecord, FactCheckTool};

/// Signature: claims with their published reviews in, one verdict per
/// claim out.
pub struct InterpretFactChecks;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReviews {
    pub claim: String,
    pub reviews: Vec<FactCheckRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretFactChecksInputs {
    pub claims: Vec<ClaimReviews>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictEntry {
    pub claim: String,
    pub inference: String,
    pub url: String,
    #[serde(default)]
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretFactChecksOutputs {
    pub verdicts: Vec<VerdictEntry>,
}

impl Signature for InterpretFactChecks {
    type Inputs = InterpretFactChecksInputs;
    type Outputs = InterpretFactChecksOutputs;

    fn instructions() -> &'static str {
        "You are the Fact Checker Agent. Your task is to take a set of extracted claims together \
with the reviews that professional fact-checking organisations have published about them, and \
state what those reviews conclude about each claim.

Your responsibilities:
1. For each claim, read the reviews returned by the fact-checking database. A review may be \
worded differently from the claim; use it only if it addresses the same assertion.
2. Write an inference: one or two sentences saying what the reviewers found and how they \
rated the claim (for example debunked, misleading, accurate, missing context).
3. Give the URL of the review your inference relies on. Only use URLs present in the reviews.
4. Name the publisher of that review.
5. If none of the reviews address the claim, say that no published fact-check addresses it \
and leave the URL empty.
6. Return one entry per claim, using the claim text exactly as given.

Example:
Claim: \"Global temperatures have declined since 1998.\"
Inference: The claim has been widely debunked as misleading; it relies on cherry-picked start \
years.
URL: https://www.factcheck.org/2023/10/climate-change-claims-debunked/
Publisher: FactCheck.org"
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            "claims",
            FieldType::list(FieldType::object(vec![
                FieldSpec::new("claim", FieldType::String),
                FieldSpec::new(
                    "reviews",
                    FieldType::list(FieldType::object(vec![
                        FieldSpec::new("claim_text", FieldType::String),
                        FieldSpec::new("publisher", FieldType::String),
                        FieldSpec::new("url", FieldType::String),
                        FieldSpec::new("rating", FieldType::String),
                    ])),
                ),
            ])),
        )
        .with_prefix("Claims and published reviews")]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            "verdicts",
            FieldType::list(FieldType::object(vec![
                FieldSpec::new("claim", FieldType::String),
                FieldSpec::new("inference", FieldType::String),
                FieldSpec::new("url", FieldType::String)
                    .with_description("Review URL, empty when none applies"),
                FieldSpec::new("publisher", FieldType::String).optional(),
            ])),
        )
        .with_description("One verdict per claim")]
    }
}

/// Looks every claim up in the fact-check database and interprets the
/// published reviews.
pub struct FactCheckerAgent {
    predict: Predict<InterpretFactChecks>,
    fact_check: Arc<dyn FactCheckTool>,
    results_per_claim: usize,
}

impl FactCheckerAgent {
    pub fn new(
        lm: Arc<dyn LLMClient>,
        fact_check: Arc<dyn FactCheckTool>,
        results_per_claim: usize,
        config: PredictConfig,
    ) -> Self {
        Self {
            predict: predictor(StageId::FactChecker.agent_name(), lm, config),
            fact_check,
            results_per_claim,
        }
    }

    async fn lookup_claim(&self, input: &StageInput<'_>, claim: &Claim) -> Result<ClaimReviews> {
        let reviews = self
            .fact_check
            .lookup(&claim.text, self.results_per_claim)
            .await?;
        input.record(TraceEvent::tool_use(
            input.stage(),
            self.fact_check.name(),
            claim.text.clone(),
            reviews.len(),
        ));
        Ok(ClaimReviews {
            claim: claim.text.clone(),
            reviews,
        })
    }
}

#[async_trait]
impl Stage for FactCheckerAgent {
    fn id(&self) -> StageId {
        StageId::FactChecker
    }

    fn dependencies(&self) -> Vec<StageId> {
        vec![StageId::ClaimsExtractor]
    }

    async fn run(&self, input: StageInput<'_>) -> Result<StageOutput> {
        let claims = input.claims()?;
        let looked_up = try_join_all(claims.iter().map(|c| self.lookup_claim(&input, c))).await?;

        let reviewed: Vec<ClaimReviews> = looked_up
            .iter()
            .filter(|c| !c.reviews.is_empty())
            .cloned()
            .collect();

        // claims without reviews never reach the model
        let entries = if reviewed.is_empty() {
            Vec::new()
        } else {
            let reviewed_claims: Vec<Claim> = Claim::from_texts(reviewed.iter().map(|c| &c.claim));
            let outputs = self
                .predict
                .forward(InterpretFactChecksInputs { claims: reviewed })
                .await?;
            reviewed_claims
                .iter()
                .map(|c| c.text.clone())
                .zip(align_to_claims(&reviewed_claims, outputs.verdicts, |v| {
                    v.claim.as_str()
                }))
                .collect()
        };

        let verdicts: Vec<FactCheckVerdict> = looked_up
            .iter()
            .map(|c| {
                let entry = entries
                    .iter()
                    .find(|(claim, _)| *claim == c.claim)
                    .and_then(|(_, v)| v.clone());
                to_verdict(c, entry)
            })
            .collect();

        info!(
            claims = verdicts.len(),
            with_source = verdicts.iter().filter(|v| v.has_source()).count(),
            "fact checks interpreted"
        );
        Ok(StageOutput::FactCheckResults(verdicts))
    }
}

/// Build the verdict for one claim, keeping only URLs that came from the
/// database.
fn to_verdict(looked_up: &ClaimReviews, entry: Option<VerdictEntry>) -> FactCheckVerdict {
    let Some(first) = looked_up.reviews.first() else {
        return FactCheckVerdict::not_found(&looked_up.claim);
    };

    let (inference, cited) = match entry {
        Some(entry) if !entry.inference.trim().is_empty() => {
            let url = entry.url.trim().to_string();
            let cited = looked_up.reviews.iter().find(|r| r.url == url);
            // an empty URL means the model found no applicable review
            if url.is_empty() {
                (entry.inference.trim().to_string(), None)
            } else {
                (entry.inference.trim().to_string(), Some(cited.unwrap_or(first)))
            }
        }
        _ => (
            format!("Rated \"{}\" by {}", first.rating, first.publisher),
            Some(first),
        ),
    };

    FactCheckVerdict {
        claim: looked_up.claim.clone(),
        inference,
        url: cited.map(|r| r.url.clone()).unwrap_or_default(),
        publisher: cited.map(|r| r.publisher.clone()),
        rating: cited.map(|r| r.rating.clone()),
    }
}
