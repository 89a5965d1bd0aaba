use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{align_to_claims, claim_key, predictor};
use crate::error::Result;
use crate::llm::LLMClient;
use crate::module::{Module, Predict, PredictConfig};
use crate::pipeline::{Stage, StageId, StageInput, StageOutput};
use crate::report::{
    web_search_text, AnalyzedClaim, Claim, ClaimEvidence, Conclusion, EvidenceItem,
    FactCheckVerdict, FactCheckingResult, Report, Stance,
};
use crate::signature::{FieldSpec, FieldType, Signature};
use crate::tools::extract_domain;

pub(crate) const NO_CLAIMS_SUMMARY: &str = "No verifiable factual claims were found in the text.";

/// Signature: per-claim dossiers in, per-claim judgements and an overall
/// verdict out.
pub struct GenerateReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcedPoint {
    pub summary: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDossier {
    pub claim: String,
    pub supporting_evidence: Vec<SourcedPoint>,
    pub opposing_evidence: Vec<SourcedPoint>,
    pub fact_checks: Vec<FactCheckingResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReportInputs {
    pub claims: Vec<ClaimDossier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimJudgement {
    pub claim_text: String,
    pub reliability_analysis: String,
    pub conclusion: Conclusion,
    pub conclusion_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReportOutputs {
    pub analyzed_claims: Vec<ClaimJudgement>,
    pub tag: Conclusion,
    pub overall_summary: String,
}

fn sourced_point() -> FieldType {
    FieldType::object(vec![
        FieldSpec::new("summary", FieldType::String),
        FieldSpec::new("source", FieldType::String),
    ])
}

impl Signature for GenerateReport {
    type Inputs = GenerateReportInputs;
    type Outputs = GenerateReportOutputs;

    fn instructions() -> &'static str {
        "You are the Report Generator Agent. Your task is to take the extracted claims and the \
evidence collected for them, and assess the truthfulness of each claim. Be detailed, impartial \
and logical.

Each claim comes with the supporting and opposing evidence found by web search and the \
inferences published by fact-checking organisations. Those sections are reported as given; \
your job is the assessment.

Your responsibilities:
1. For each claim, analyze the reliability of the evidence: consider credibility of the \
sources, consistency across sources, and relevance to the claim.
2. Give a reasoned conclusion about the likely truthfulness of the claim: True, False, \
Partially True, or Unverified when the evidence is insufficient.
3. Explain the conclusion in one or two sentences.
4. Tag the text as a whole with one of the same four labels.
5. Write an overall summary of how credible the text is as a whole.
6. Write in a clear, professional and objective tone. Return one entry per claim, using the \
claim text exactly as given.

Example (shortened):
Claim: \"Global temperatures rose by 1.2°C in the last century.\"
Reliability analysis: NASA and the IPCC are authoritative and consistent; the opposing study \
only notes regional variability.
Conclusion: True, strongly supported by scientific consensus and confirmed by fact-checking \
organizations.
Overall summary: The text's claims are largely accurate and supported by scientific research."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            "claims",
            FieldType::list(FieldType::object(vec![
                FieldSpec::new("claim", FieldType::String),
                FieldSpec::new("supporting_evidence", FieldType::list(sourced_point())),
                FieldSpec::new("opposing_evidence", FieldType::list(sourced_point())),
                FieldSpec::new(
                    "fact_checks",
                    FieldType::list(FieldType::object(vec![
                        FieldSpec::new("source", FieldType::String),
                        FieldSpec::new("url", FieldType::String),
                        FieldSpec::new("summary", FieldType::String),
                    ])),
                ),
            ])),
        )
        .with_prefix("Claims and collected evidence")]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new(
                "analyzed_claims",
                FieldType::list(FieldType::object(vec![
                    FieldSpec::new("claim_text", FieldType::String),
                    FieldSpec::new("reliability_analysis", FieldType::String),
                    FieldSpec::new("conclusion", FieldType::enum_of(Conclusion::labels())),
                    FieldSpec::new("conclusion_reason", FieldType::String),
                ])),
            )
            .with_description("One entry per claim"),
            FieldSpec::new("tag", FieldType::enum_of(Conclusion::labels()))
                .with_description("Overall verdict for the text"),
            FieldSpec::new("overall_summary", FieldType::String),
        ]
    }
}

/// Writes the structured truthfulness report from everything gathered.
pub struct ReportGeneratorAgent {
    predict: Predict<GenerateReport>,
}

impl ReportGeneratorAgent {
    pub fn new(lm: Arc<dyn LLMClient>, config: PredictConfig) -> Self {
        Self {
            predict: predictor(StageId::ReportGenerator.agent_name(), lm, config),
        }
    }
}

#[async_trait]
impl Stage for ReportGeneratorAgent {
    fn id(&self) -> StageId {
        StageId::ReportGenerator
    }

    fn dependencies(&self) -> Vec<StageId> {
        vec![
            StageId::ClaimsExtractor,
            StageId::WebScraper,
            StageId::FactChecker,
        ]
    }

    async fn run(&self, input: StageInput<'_>) -> Result<StageOutput> {
        let claims = input.claims()?;
        let evidence = input.scraped_evidence()?;
        let verdicts = input.fact_check_results()?;

        if claims.is_empty() {
            return Ok(StageOutput::FinalReport(Report {
                analyzed_claims: Vec::new(),
                tag: Conclusion::Unverified,
                overall_summary: NO_CLAIMS_SUMMARY.to_string(),
            }));
        }

        let dossiers: Vec<ClaimDossier> = claims
            .iter()
            .map(|c| dossier(c, evidence, verdicts))
            .collect();
        let outputs = self
            .predict
            .forward(GenerateReportInputs {
                claims: dossiers.clone(),
            })
            .await?;

        let judged = outputs.analyzed_claims.len();
        let aligned = align_to_claims(claims, outputs.analyzed_claims, |j| j.claim_text.as_str());
        let analyzed_claims: Vec<AnalyzedClaim> = claims
            .iter()
            .zip(dossiers)
            .zip(aligned)
            .map(|((claim, dossier), judgement)| analyzed(claim, dossier, judgement))
            .collect();

        if judged != claims.len() {
            warn!(judged, claims = claims.len(), "report judged a different number of claims");
        }
        info!(claims = analyzed_claims.len(), tag = %outputs.tag, "report generated");

        Ok(StageOutput::FinalReport(Report {
            analyzed_claims,
            tag: outputs.tag,
            overall_summary: outputs.overall_summary.trim().to_string(),
        }))
    }
}

/// Find the entry for `claim`, by text first and then by position.
fn for_claim<'a, T>(
    claim: &Claim,
    entries: &'a [T],
    claim_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    let key = claim_key(&claim.text);
    entries
        .iter()
        .find(|e| claim_key(claim_of(e)) == key)
        .or_else(|| claim.index.checked_sub(1).and_then(|i| entries.get(i)))
}

fn dossier(claim: &Claim, evidence: &[ClaimEvidence], verdicts: &[FactCheckVerdict]) -> ClaimDossier {
    let items = for_claim(claim, evidence, |e| e.claim.as_str());
    let points = |stance: Stance| -> Vec<SourcedPoint> {
        items
            .map(|e| {
                e.with_stance(stance)
                    .map(|i| SourcedPoint {
                        summary: i.summary.clone(),
                        source: i.source.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let fact_checks = for_claim(claim, verdicts, |v| v.claim.as_str())
        .filter(|v| v.has_source())
        .map(|v| {
            vec![FactCheckingResult {
                source: verdict_source(v),
                url: v.url.clone(),
                summary: v.inference.clone(),
            }]
        })
        .unwrap_or_default();

    ClaimDossier {
        claim: claim.text.clone(),
        supporting_evidence: points(Stance::Supporting),
        opposing_evidence: points(Stance::Opposing),
        fact_checks,
    }
}

fn verdict_source(verdict: &FactCheckVerdict) -> String {
    match verdict.publisher.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ if verdict.has_source() => extract_domain(verdict.url.trim()),
        _ => "Fact-check database".to_string(),
    }
}

fn analyzed(claim: &Claim, dossier: ClaimDossier, judgement: Option<ClaimJudgement>) -> AnalyzedClaim {
    let web_evidence: Vec<EvidenceItem> = dossier
        .supporting_evidence
        .into_iter()
        .map(|p| (Stance::Supporting, p))
        .chain(
            dossier
                .opposing_evidence
                .into_iter()
                .map(|p| (Stance::Opposing, p)),
        )
        .map(|(stance, p)| EvidenceItem {
            stance,
            summary: p.summary,
            source: p.source,
        })
        .collect();

    let (reliability_analysis, conclusion, conclusion_reason) = match judgement {
        Some(j) => (j.reliability_analysis, j.conclusion, j.conclusion_reason),
        None => (
            "The evidence for this claim was not assessed.".to_string(),
            Conclusion::Unverified,
            "No assessment was produced for this claim.".to_string(),
        ),
    };

    AnalyzedClaim {
        claim_text: claim.text.clone(),
        web_search_results: web_search_text(&web_evidence),
        web_evidence,
        fact_checking_results: dossier.fact_checks,
        reliability_analysis,
        conclusion,
        conclusion_reason,
    }
}
