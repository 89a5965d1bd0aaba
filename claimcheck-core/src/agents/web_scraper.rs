use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{align_to_claims, predictor};
use crate::error::Result;
use crate::llm::LLMClient;
use crate::module::{Module, Predict, PredictConfig};
use crate::pipeline::{Stage, StageId, StageInput, StageOutput, TraceEvent};
use crate::report::{Claim, ClaimEvidence, EvidenceItem, Stance};
use crate::signature::{FieldSpec, FieldType, Signature};
use crate::tools::{extract_domain, SearchHit, SearchTool};

/// Signature: claims with their search results in, per-claim supporting and
/// opposing evidence out.
pub struct SummarizeEvidence;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSearchResults {
    pub claim: String,
    pub search_results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeEvidenceInputs {
    pub claims: Vec<ClaimSearchResults>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePoint {
    pub summary: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimEvidenceSummary {
    pub claim: String,
    #[serde(default)]
    pub supporting_evidence: Vec<EvidencePoint>,
    #[serde(default)]
    pub opposing_evidence: Vec<EvidencePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeEvidenceOutputs {
    pub evidence: Vec<ClaimEvidenceSummary>,
}

fn evidence_point() -> FieldType {
    FieldType::object(vec![
        FieldSpec::new("summary", FieldType::String),
        FieldSpec::new("source", FieldType::String).with_description("URL or publication"),
    ])
}

impl Signature for SummarizeEvidence {
    type Inputs = SummarizeEvidenceInputs;
    type Outputs = SummarizeEvidenceOutputs;

    fn instructions() -> &'static str {
        "You are the Web Scraper Agent. Your task is to take a set of extracted claims together \
with the web search results gathered for each of them, and summarize the information that \
either supports or refutes each claim.

Your responsibilities:
1. For each claim, use the credible, recent and relevant search results (research papers, \
reputable news articles, journals, official statistics).
2. Summarize the evidence found. Do not copy whole passages; extract only the most relevant facts.
3. Clearly distinguish between supporting evidence and opposing evidence for each claim.
4. For each piece of supporting or opposing evidence, give its source (the result URL or the \
publication name) alongside the summarized point. Only cite sources present in the search results.
5. Give enough context that the evidence can be understood without opening the source.
6. Return one entry per claim, using the claim text exactly as given. Leave a list empty when \
the results contain no evidence of that kind.

Example:
Claim: \"Global temperatures rose by 1.2°C in the last century.\"
Supporting evidence:
- NASA's Goddard Institute for Space Studies reports that the Earth's average temperature has \
increased by about 1.2°C since the late 19th century. Source: https://climate.nasa.gov/
Opposing evidence:
- Some critics argue that urban heat island effects inflate readings from stations in densely \
populated areas. Source: https://wattsupwiththat.com/"
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            "claims",
            FieldType::list(FieldType::object(vec![
                FieldSpec::new("claim", FieldType::String),
                FieldSpec::new(
                    "search_results",
                    FieldType::list(FieldType::object(vec![
                        FieldSpec::new("title", FieldType::String),
                        FieldSpec::new("url", FieldType::String),
                        FieldSpec::new("domain", FieldType::String),
                        FieldSpec::new("snippet", FieldType::String),
                    ])),
                ),
            ])),
        )
        .with_prefix("Claims and search results")]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            "evidence",
            FieldType::list(FieldType::object(vec![
                FieldSpec::new("claim", FieldType::String),
                FieldSpec::new("supporting_evidence", FieldType::list(evidence_point())),
                FieldSpec::new("opposing_evidence", FieldType::list(evidence_point())),
            ])),
        )
        .with_description("One entry per claim")]
    }
}

/// Gathers web evidence for every claim.
pub struct WebScraperAgent {
    predict: Predict<SummarizeEvidence>,
    search: Arc<dyn SearchTool>,
    results_per_claim: usize,
}

impl WebScraperAgent {
    pub fn new(
        lm: Arc<dyn LLMClient>,
        search: Arc<dyn SearchTool>,
        results_per_claim: usize,
        config: PredictConfig,
    ) -> Self {
        Self {
            predict: predictor(StageId::WebScraper.agent_name(), lm, config),
            search,
            results_per_claim,
        }
    }

    async fn search_claim(&self, input: &StageInput<'_>, claim: &Claim) -> Result<ClaimSearchResults> {
        let hits = self.search.search(&claim.text, self.results_per_claim).await?;
        debug!(claim = claim.index, hits = hits.len(), "search results received");
        input.record(TraceEvent::tool_use(
            input.stage(),
            self.search.name(),
            claim.text.clone(),
            hits.len(),
        ));
        Ok(ClaimSearchResults {
            claim: claim.text.clone(),
            search_results: hits,
        })
    }
}

#[async_trait]
impl Stage for WebScraperAgent {
    fn id(&self) -> StageId {
        StageId::WebScraper
    }

    fn dependencies(&self) -> Vec<StageId> {
        vec![StageId::ClaimsExtractor]
    }

    async fn run(&self, input: StageInput<'_>) -> Result<StageOutput> {
        let claims = input.claims()?;
        if claims.is_empty() {
            return Ok(StageOutput::ScrapedEvidence(Vec::new()));
        }

        let searched = try_join_all(claims.iter().map(|c| self.search_claim(&input, c))).await?;
        let hits: Vec<Vec<SearchHit>> = searched.iter().map(|s| s.search_results.clone()).collect();
        let outputs = self
            .predict
            .forward(SummarizeEvidenceInputs { claims: searched })
            .await?;

        let aligned = align_to_claims(claims, outputs.evidence, |e| e.claim.as_str());
        let evidence: Vec<ClaimEvidence> = claims
            .iter()
            .zip(aligned)
            .zip(&hits)
            .map(|((claim, summary), hits)| ClaimEvidence {
                claim: claim.text.clone(),
                evidence: summary.map(|s| into_items(s, hits)).unwrap_or_default(),
            })
            .collect();

        info!(
            claims = evidence.len(),
            items = evidence.iter().map(|e| e.evidence.len()).sum::<usize>(),
            "evidence summarized"
        );
        Ok(StageOutput::ScrapedEvidence(evidence))
    }
}

/// Source as cited when it names one of the claim's search hits, by URL or
/// by domain. Anything else is blanked and renders as an unknown source.
fn cited_source(source: &str, hits: &[SearchHit]) -> String {
    let source = source.trim();
    let domain = extract_domain(source);
    if hits.iter().any(|h| h.url == source || h.domain == domain) {
        source.to_string()
    } else {
        if !source.is_empty() {
            warn!(source, "evidence cites a source outside the search results");
        }
        String::new()
    }
}

fn into_items(summary: ClaimEvidenceSummary, hits: &[SearchHit]) -> Vec<EvidenceItem> {
    let supporting = summary
        .supporting_evidence
        .into_iter()
        .map(|p| (Stance::Supporting, p));
    let opposing = summary
        .opposing_evidence
        .into_iter()
        .map(|p| (Stance::Opposing, p));

    supporting
        .chain(opposing)
        .filter(|(_, p)| !p.summary.trim().is_empty())
        .map(|(stance, p)| EvidenceItem {
            stance,
            summary: p.summary.trim().to_string(),
            source: cited_source(&p.source, hits),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedClient;
    use crate::pipeline::{StageResults, Trace, TraceEventType};
    use crate::tools::mock::StaticSearch;
    use pretty_assertions::assert_eq;

    const REPLY: &str = r#"{"evidence": [
        {
            "claim": "The Great Wall of China is visible from space",
            "supporting_evidence": [],
            "opposing_evidence": [
                {"summary": "NASA says it is not visible to the naked eye from orbit", "source": "https://www.nasa.gov/great-wall"},
                {"summary": "   ", "source": "blank"}
            ]
        }
    ]}"#;

    fn hits() -> Vec<SearchHit> {
        vec![
            SearchHit::new("NASA", "https://www.nasa.gov/great-wall", "Not visible."),
            SearchHit::new("Myth", "https://example.org/myth", "A myth."),
        ]
    }

    fn results_with(claims: &[&str]) -> StageResults {
        let mut results = StageResults::new();
        results
            .insert(
                StageId::ClaimsExtractor,
                StageOutput::Claims(Claim::from_texts(claims.iter().copied())),
            )
            .unwrap();
        results
    }

    #[tokio::test]
    async fn test_searches_each_claim_and_summarizes() {
        let client = Arc::new(ScriptedClient::new().respond_to("Web Scraper Agent", REPLY));
        let search = Arc::new(StaticSearch::new(hits()));
        let agent = WebScraperAgent::new(client.clone(), search.clone(), 1, PredictConfig::new());

        let results = results_with(&[
            "The Great Wall of China is visible from space",
            "Goldfish have a three-second memory",
        ]);
        let trace = Trace::new();
        let deps = agent.dependencies();
        let input = StageInput::new(StageId::WebScraper, "", &deps, &results, &trace);

        let StageOutput::ScrapedEvidence(evidence) = agent.run(input).await.unwrap() else {
            panic!("expected scraped evidence");
        };

        assert_eq!(evidence.len(), 2);
        assert_eq!(
            evidence[0].evidence,
            vec![EvidenceItem {
                stance: Stance::Opposing,
                summary: "NASA says it is not visible to the naked eye from orbit".into(),
                source: "https://www.nasa.gov/great-wall".into(),
            }]
        );
        // the model skipped the second claim
        assert!(evidence[1].evidence.is_empty());
        assert_eq!(evidence[1].claim, "Goldfish have a three-second memory");

        let mut queries = search.queries();
        queries.sort();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|(_, limit)| *limit == 1));

        let calls = client.calls();
        let prompt = &calls[0].messages[0].content;
        assert!(prompt.contains("https://www.nasa.gov/great-wall"));
        assert!(!prompt.contains("https://example.org/myth"));

        let tool_events = trace
            .events()
            .into_iter()
            .filter(|e| e.event_type == TraceEventType::ToolUse)
            .count();
        assert_eq!(tool_events, 2);
    }

    #[test]
    fn test_sources_outside_search_results_are_dropped() {
        let hits = hits();
        assert_eq!(
            cited_source(" https://www.nasa.gov/great-wall ", &hits),
            "https://www.nasa.gov/great-wall"
        );
        assert_eq!(cited_source("nasa.gov", &hits), "nasa.gov");
        assert_eq!(
            cited_source("https://example.org/other-page", &hits),
            "https://example.org/other-page"
        );
        assert_eq!(cited_source("https://made-up.example.com/story", &hits), "");
        assert_eq!(cited_source("", &hits), "");

        let summary = ClaimEvidenceSummary {
            claim: "The Great Wall of China is visible from space".into(),
            supporting_evidence: vec![EvidencePoint {
                summary: "A blog says it is visible".into(),
                source: "https://invented.blog/wall".into(),
            }],
            opposing_evidence: Vec::new(),
        };
        let items = into_items(summary, &hits);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "");
    }

    #[tokio::test]
    async fn test_no_claims_skips_tools_and_model() {
        let client = Arc::new(ScriptedClient::new());
        let search = Arc::new(StaticSearch::new(hits()));
        let agent = WebScraperAgent::new(client.clone(), search.clone(), 5, PredictConfig::new());

        let results = results_with(&[]);
        let trace = Trace::new();
        let deps = agent.dependencies();
        let input = StageInput::new(StageId::WebScraper, "", &deps, &results, &trace);

        assert!(matches!(
            agent.run(input).await.unwrap(),
            StageOutput::ScrapedEvidence(e) if e.is_empty()
        ));
        assert!(client.calls().is_empty());
        assert!(search.queries().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_fails_stage() {
        let client = Arc::new(ScriptedClient::new().respond_to("Web Scraper Agent", REPLY));
        let search = Arc::new(StaticSearch::new(hits()).failing_on("Goldfish"));
        let agent = WebScraperAgent::new(client.clone(), search, 5, PredictConfig::new());

        let results = results_with(&["Sharks are fish", "Goldfish have a three-second memory"]);
        let trace = Trace::new();
        let deps = agent.dependencies();
        let input = StageInput::new(StageId::WebScraper, "", &deps, &results, &trace);

        let err = agent.run(input).await.unwrap_err();
        assert_eq!(err.kind(), "tool");
        assert!(client.calls().is_empty());
    }
}
