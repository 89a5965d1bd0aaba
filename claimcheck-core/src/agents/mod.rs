//! The four LLM agents of the analysis pipeline.
//!
//! Each agent is a [`Stage`](crate::pipeline::Stage): it reads its declared
//! dependencies from the run, calls its tools, and runs one typed
//! [`Predict`](crate::module::Predict) over the results.
//!
//! | agent | reads | writes |
//! |---|---|---|
//! | `claims_extractor_agent` | input text | `claims` |
//! | `web_scraper_agent` | `claims` | `scraped_evidence` |
//! | `fact_checker_agent` | `claims` | `fact_check_results` |
//! | `report_generator_agent` | all three | `final_report` |

mod claims_extractor;
mod fact_checker;
mod report_generator;
mod web_scraper;

pub use claims_extractor::{ClaimsExtractorAgent, ExtractClaims};
pub use fact_checker::{FactCheckerAgent, InterpretFactChecks};
pub use report_generator::{GenerateReport, ReportGeneratorAgent};
pub use web_scraper::{SummarizeEvidence, WebScraperAgent};

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::LLMClient;
use crate::module::{Predict, PredictConfig};
use crate::report::Claim;
use crate::signature::Signature;

fn predictor<S: Signature>(name: &str, lm: Arc<dyn LLMClient>, config: PredictConfig) -> Predict<S> {
    Predict::new(lm).with_name(name).with_config(config)
}

fn claim_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Line up model entries with the claims they describe.
///
/// Entries are matched on claim text first; entries whose text matches no
/// claim fill the still-unmatched claims in order. The result has one slot
/// per claim.
fn align_to_claims<T>(
    claims: &[Claim],
    entries: Vec<T>,
    claim_of: impl Fn(&T) -> &str,
) -> Vec<Option<T>> {
    let mut slots: Vec<Option<T>> = claims.iter().map(|_| None).collect();
    let by_key: HashMap<String, usize> = claims
        .iter()
        .enumerate()
        .map(|(i, c)| (claim_key(&c.text), i))
        .collect();

    let mut unmatched = Vec::new();
    for entry in entries {
        match by_key.get(&claim_key(claim_of(&entry))) {
            Some(&i) if slots[i].is_none() => slots[i] = Some(entry),
            _ => unmatched.push(entry),
        }
    }

    let mut leftovers = unmatched.into_iter();
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        match leftovers.next() {
            Some(entry) => *slot = Some(entry),
            None => break,
        }
    }

    slots
}
