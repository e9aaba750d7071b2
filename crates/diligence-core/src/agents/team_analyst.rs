use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use crate::model::{BpStructuredData, TeamAnalysisOutput};
use crate::service_clients::{GenerationConfig, LlmGatewayClient, WebSearchClient};

use super::{extract_json_object, AnalysisAgent};

/// Up to this many team members get a web-search lookup (`spec.md` §4.3.b).
const MAX_MEMBERS_SEARCHED: usize = 5;

pub struct TeamAnalystInput {
    pub bp: BpStructuredData,
}

pub struct TeamAnalystAgent {
    llm: Arc<dyn LlmGatewayClient>,
    web_search: Arc<dyn WebSearchClient>,
    config: GenerationConfig,
}

impl TeamAnalystAgent {
    pub fn new(
        llm: Arc<dyn LlmGatewayClient>,
        web_search: Arc<dyn WebSearchClient>,
        config: GenerationConfig,
    ) -> Self {
        Self { llm, web_search, config }
    }
}

#[derive(Debug, Deserialize)]
struct RawTeamAnalysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    concerns: Vec<String>,
    #[serde(default)]
    experience_match_score: f32,
    #[serde(default)]
    key_findings: Vec<String>,
}

#[async_trait]
impl AnalysisAgent for TeamAnalystAgent {
    type Input = TeamAnalystInput;
    type Output = TeamAnalysisOutput;

    #[tracing::instrument(skip(self, input), fields(company_name = %input.bp.company_name))]
    async fn analyze(&self, input: Self::Input) -> Self::Output {
        let bp = input.bp;
        let members: Vec<_> = bp.team.iter().take(MAX_MEMBERS_SEARCHED).collect();

        let searches = members.iter().map(|member| {
            let query = format!("{} {} background", member.name, member.title);
            let web_search = Arc::clone(&self.web_search);
            async move {
                match web_search.search(&query, 3).await {
                    Ok(results) => results
                        .into_iter()
                        .map(|r| format!("{}: {}", r.title, r.snippet))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(err) => {
                        tracing::warn!(error = %err, query, "team member search failed");
                        "unavailable".to_string()
                    }
                }
            }
        });
        let snippets = join_all(searches).await;

        let mut context = format!("Company: {}\n\nTeam:\n", bp.company_name);
        for (member, snippet) in members.iter().zip(snippets.iter()) {
            context.push_str(&format!(
                "- {} ({}), background: {}\n  web findings: {}\n",
                member.name, member.title, member.background, snippet
            ));
        }

        let prompt = format!(
            "{context}\n\nProduce a JSON object with fields: summary, strengths (array), \
             concerns (array), experience_match_score (0-10), key_findings (array)."
        );

        let raw_response = match self.llm.generate(&prompt, &self.config).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "team analyst LLM call failed, falling back");
                return TeamAnalysisOutput::fallback(&err.to_string());
            }
        };

        match extract_json_object(&raw_response).and_then(|s| serde_json::from_str::<RawTeamAnalysis>(s).ok()) {
            Some(raw) => {
                let mut output = TeamAnalysisOutput {
                    summary: raw.summary,
                    strengths: raw.strengths,
                    concerns: raw.concerns,
                    experience_match_score: raw.experience_match_score,
                    key_findings: raw.key_findings,
                    data_sources: members.iter().map(|m| m.name.clone()).collect(),
                    degraded: false,
                };
                output.clamp_score();
                output
            }
            None => {
                tracing::warn!(raw_response = %raw_response, "team analyst produced invalid JSON, falling back");
                TeamAnalysisOutput::fallback("invalid LLM output schema")
            }
        }
    }
}
