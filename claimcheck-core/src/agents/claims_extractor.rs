use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::predictor;
use crate::error::Result;
use crate::llm::LLMClient;
use crate::module::{Module, Predict, PredictConfig};
use crate::pipeline::{Stage, StageId, StageInput, StageOutput};
use crate::report::Claim;
use crate::signature::{FieldSpec, FieldType, Signature};

/// Signature: article text in, discrete factual claims out.
pub struct ExtractClaims;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractClaimsInputs {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractClaimsOutputs {
    pub claims: Vec<String>,
}

impl Signature for ExtractClaims {
    type Inputs = ExtractClaimsInputs;
    type Outputs = ExtractClaimsOutputs;

    fn instructions() -> &'static str {
        "You are the Claims Extractor Agent. Your task is to read the given text (an article, \
post or statement) and extract every discrete factual claim it makes that can be checked \
against external evidence.

Your responsibilities:
1. Extract statements of fact: events, statistics, dates, quantities, causal and scientific \
assertions, and attributed quotes.
2. Skip opinions, predictions, rhetorical questions and value judgements.
3. Rewrite each claim so it stands on its own: resolve pronouns and keep the numbers, names \
and dates it depends on.
4. State each claim once, in the order it appears in the text.
5. If the text makes no checkable claim, return an empty list.

Example:
Text: \"Global temperatures rose by 1.2°C in the last century, and it is the biggest threat \
we face.\"
Claims: [\"Global temperatures rose by 1.2°C in the last century.\"]"
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new("text", FieldType::String)
            .with_prefix("Text")
            .with_description("The text to analyze")]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new("claims", FieldType::list(FieldType::String))
            .with_description("Self-contained factual claims, in order of appearance")]
    }
}

/// Turns the input text into the ordered claim list.
pub struct ClaimsExtractorAgent {
    predict: Predict<ExtractClaims>,
}

impl ClaimsExtractorAgent {
    pub fn new(lm: Arc<dyn LLMClient>, config: PredictConfig) -> Self {
        Self {
            predict: predictor(StageId::ClaimsExtractor.agent_name(), lm, config),
        }
    }
}

#[async_trait]
impl Stage for ClaimsExtractorAgent {
    fn id(&self) -> StageId {
        StageId::ClaimsExtractor
    }

    fn dependencies(&self) -> Vec<StageId> {
        Vec::new()
    }

    async fn run(&self, input: StageInput<'_>) -> Result<StageOutput> {
        let outputs = self
            .predict
            .forward(ExtractClaimsInputs {
                text: input.text().to_string(),
            })
            .await?;

        let returned = outputs.claims.len();
        let claims = Claim::from_texts(outputs.claims);
        info!(returned, kept = claims.len(), "claims extracted");

        Ok(StageOutput::Claims(claims))
    }
}
