use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{BpStructuredData, MarketAnalysisOutput};
use crate::service_clients::{GenerationConfig, InternalKnowledgeClient, LlmGatewayClient, WebSearchClient};

use super::{extract_json_object, AnalysisAgent};

pub struct MarketAnalystInput {
    pub bp: BpStructuredData,
}

pub struct MarketAnalystAgent {
    llm: Arc<dyn LlmGatewayClient>,
    web_search: Arc<dyn WebSearchClient>,
    internal_knowledge: Arc<dyn InternalKnowledgeClient>,
    config: GenerationConfig,
}

impl MarketAnalystAgent {
    pub fn new(
        llm: Arc<dyn LlmGatewayClient>,
        web_search: Arc<dyn WebSearchClient>,
        internal_knowledge: Arc<dyn InternalKnowledgeClient>,
        config: GenerationConfig,
    ) -> Self {
        Self { llm, web_search, internal_knowledge, config }
    }
}

#[derive(Debug, Deserialize)]
struct RawMarketAnalysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    market_validation: String,
    #[serde(default)]
    competitive_landscape: String,
    #[serde(default)]
    red_flags: Vec<String>,
}

#[async_trait]
impl AnalysisAgent for MarketAnalystAgent {
    type Input = MarketAnalystInput;
    type Output = MarketAnalysisOutput;

    #[tracing::instrument(skip(self, input), fields(company_name = %input.bp.company_name))]
    async fn analyze(&self, input: Self::Input) -> Self::Output {
        let bp = input.bp;
        let market = bp.target_market.clone().unwrap_or_else(|| "unspecified market".to_string());

        let size_query = format!("{market} market size");
        let competitors_query = format!("{market} competitors");
        let internal_query = format!("similar projects in {market}");

        let (size_results, competitor_results, internal_results) = tokio::join!(
            self.web_search.search(&size_query, 5),
            self.web_search.search(&competitors_query, 5),
            self.internal_knowledge.search(&internal_query, 5),
        );

        let size_snippets = summarize_search(size_results, &size_query);
        let competitor_snippets = summarize_search(competitor_results, &competitors_query);
        let internal_snippets = match internal_results {
            Ok(hits) => hits.into_iter().map(|h| h.content).collect::<Vec<_>>().join("\n"),
            Err(err) => {
                tracing::warn!(error = %err, internal_query, "internal knowledge search failed");
                "unavailable".to_string()
            }
        };

        let bp_tam = bp.tam_estimate.clone().unwrap_or_else(|| "not stated".to_string());

        let prompt = format!(
            "Company: {}\nMarket: {market}\nBP-claimed TAM: {bp_tam}\n\n\
             Web-sourced market size findings:\n{size_snippets}\n\n\
             Web-sourced competitor findings:\n{competitor_snippets}\n\n\
             Internal knowledge base findings:\n{internal_snippets}\n\n\
             Produce a JSON object with fields: summary, market_validation, \
             competitive_landscape, red_flags (array). Explicitly flag any \
             discrepancy between the BP-claimed TAM and the web-sourced figures \
             as a red_flags entry.",
            bp.company_name,
        );

        let raw_response = match self.llm.generate(&prompt, &self.config).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "market analyst LLM call failed, falling back");
                return MarketAnalysisOutput::fallback(&err.to_string());
            }
        };

        match extract_json_object(&raw_response).and_then(|s| serde_json::from_str::<RawMarketAnalysis>(s).ok()) {
            Some(raw) => MarketAnalysisOutput {
                summary: raw.summary,
                market_validation: raw.market_validation,
                competitive_landscape: raw.competitive_landscape,
                red_flags: raw.red_flags,
                data_sources: vec![size_query, competitors_query, internal_query],
                degraded: false,
            },
            None => {
                tracing::warn!(raw_response = %raw_response, "market analyst produced invalid JSON, falling back");
                MarketAnalysisOutput::fallback("invalid LLM output schema")
            }
        }
    }
}

fn summarize_search(
    results: crate::error::Result<Vec<crate::service_clients::SearchResult>>,
    query: &str,
) -> String {
    match results {
        Ok(results) if !results.is_empty() => results
            .into_iter()
            .map(|r| format!("{}: {}", r.title, r.snippet))
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(_) => "no results".to_string(),
        Err(err) => {
            tracing::warn!(error = %err, query, "market search failed");
            "unavailable".to_string()
        }
    }
}
