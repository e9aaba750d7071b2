use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{BpStructuredData, ExitOutput, MarketAnalysisOutput, ValuationOutput};
use crate::service_clients::{GenerationConfig, LlmGatewayClient};

use super::{extract_json_object, AnalysisAgent};

pub struct ExitAgentInput {
    pub bp: BpStructuredData,
    pub market_output: MarketAnalysisOutput,
    pub valuation_output: ValuationOutput,
}

pub struct ExitAgent {
    llm: Arc<dyn LlmGatewayClient>,
    config: GenerationConfig,
}

impl ExitAgent {
    pub fn new(llm: Arc<dyn LlmGatewayClient>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }
}

#[derive(Debug, Deserialize)]
struct RawExit {
    #[serde(default)]
    primary_path: String,
    #[serde(default)]
    ipo_analysis: String,
    #[serde(default)]
    ma_opportunities: Vec<String>,
    #[serde(default)]
    exit_risks: Vec<String>,
}

#[async_trait]
impl AnalysisAgent for ExitAgent {
    type Input = ExitAgentInput;
    type Output = ExitOutput;

    #[tracing::instrument(skip(self, input), fields(company_name = %input.bp.company_name))]
    async fn analyze(&self, input: Self::Input) -> Self::Output {
        let prompt = format!(
            "Company: {}\nMarket analysis:\n{}\nValuation band: {} - {} {}\n\n\
             Produce a JSON object with fields: primary_path, ipo_analysis, \
             ma_opportunities (array), exit_risks (array).",
            input.bp.company_name,
            input.market_output.summary,
            input.valuation_output.low,
            input.valuation_output.high,
            input.valuation_output.currency,
        );

        let raw_response = match self.llm.generate(&prompt, &self.config).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "exit agent LLM call failed, falling back");
                return ExitOutput::fallback(&err.to_string());
            }
        };

        match extract_json_object(&raw_response).and_then(|s| serde_json::from_str::<RawExit>(s).ok()) {
            Some(raw) => ExitOutput {
                primary_path: raw.primary_path,
                ipo_analysis: raw.ipo_analysis,
                ma_opportunities: raw.ma_opportunities,
                exit_risks: raw.exit_risks,
                degraded: false,
            },
            None => {
                tracing::warn!(raw_response = %raw_response, "exit agent produced invalid JSON, falling back");
                ExitOutput::fallback("invalid LLM output schema")
            }
        }
    }
}
