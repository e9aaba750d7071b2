use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{BpStructuredData, ValuationOutput};
use crate::service_clients::{GenerationConfig, LlmGatewayClient, WebSearchClient};

use super::{extract_json_object, AnalysisAgent};

pub struct ValuationInput {
    pub bp: BpStructuredData,
}

pub struct ValuationAgent {
    llm: Arc<dyn LlmGatewayClient>,
    web_search: Arc<dyn WebSearchClient>,
    config: GenerationConfig,
}

impl ValuationAgent {
    pub fn new(llm: Arc<dyn LlmGatewayClient>, web_search: Arc<dyn WebSearchClient>, config: GenerationConfig) -> Self {
        Self { llm, web_search, config }
    }
}

#[derive(Debug, Deserialize)]
struct RawValuation {
    #[serde(default)]
    low: f64,
    #[serde(default)]
    high: f64,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    methodology: String,
    #[serde(default)]
    comparables: Vec<String>,
    #[serde(default)]
    assumptions: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[async_trait]
impl AnalysisAgent for ValuationAgent {
    type Input = ValuationInput;
    type Output = ValuationOutput;

    #[tracing::instrument(skip(self, input), fields(company_name = %input.bp.company_name))]
    async fn analyze(&self, input: Self::Input) -> Self::Output {
        let bp = input.bp;
        let industry = bp.target_market.clone().unwrap_or_else(|| "the relevant industry".to_string());
        let query = format!("{industry} valuation multiples comparable companies");

        let multiples_context = match self.web_search.search(&query, 5).await {
            Ok(results) => results.into_iter().map(|r| format!("{}: {}", r.title, r.snippet)).collect::<Vec<_>>().join("\n"),
            Err(err) => {
                tracing::warn!(error = %err, query, "valuation multiples search failed");
                "unavailable".to_string()
            }
        };

        let prompt = format!(
            "Company: {}\nStated funding request: {}\nIndustry multiples findings:\n{multiples_context}\n\n\
             Reason a valuation band for this company. Return a JSON object with fields: \
             low, high (numbers), currency, methodology, comparables (array), \
             assumptions (array), risks (array).",
            bp.company_name,
            bp.funding_request.as_deref().unwrap_or("not stated"),
        );

        let raw_response = match self.llm.generate(&prompt, &self.config).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "valuation agent LLM call failed, falling back");
                return ValuationOutput::fallback(&err.to_string());
            }
        };

        match extract_json_object(&raw_response).and_then(|s| serde_json::from_str::<RawValuation>(s).ok()) {
            Some(raw) if raw.high >= raw.low => ValuationOutput {
                low: raw.low,
                high: raw.high,
                currency: raw.currency,
                methodology: raw.methodology,
                comparables: raw.comparables,
                assumptions: raw.assumptions,
                risks: raw.risks,
                degraded: false,
            },
            _ => {
                tracing::warn!(raw_response = %raw_response, "valuation agent produced invalid output, falling back");
                ValuationOutput::fallback("invalid LLM output schema")
            }
        }
    }
}
