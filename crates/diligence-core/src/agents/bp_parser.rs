use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{BpStructuredData, TeamMember};
use crate::service_clients::{GenerationConfig, LlmGatewayClient};

use super::{extract_json_object, AnalysisAgent};

pub struct BpParserInput {
    pub company_name: String,
    pub file_bytes: Vec<u8>,
    pub mime: String,
}

const EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract structured company data from the attached business plan.
Emit a single JSON object matching this schema exactly:
{
  "company_name": string,
  "founding_date": string | null,
  "team": [{"name": string, "title": string, "background": string}],
  "product_description": string | null,
  "target_market": string | null,
  "tam_estimate": string | null,
  "competitors": [string],
  "funding_request": string | null,
  "current_valuation": string | null,
  "projected_financials": {string: string}
}
All numeric fields must be emitted as strings."#;

/// `spec.md` §4.3.a.
pub struct BpParserAgent {
    llm: Arc<dyn LlmGatewayClient>,
    config: GenerationConfig,
}

impl BpParserAgent {
    pub fn new(llm: Arc<dyn LlmGatewayClient>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }
}

#[derive(Debug, Deserialize)]
struct RawBp {
    company_name: Option<String>,
    founding_date: Option<String>,
    #[serde(default)]
    team: Vec<RawTeamMember>,
    product_description: Option<String>,
    target_market: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    tam_estimate: Option<String>,
    #[serde(default)]
    competitors: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    funding_request: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    current_valuation: Option<String>,
    #[serde(default, deserialize_with = "string_or_number_map")]
    projected_financials: std::collections::HashMap<String, String>,
}

/// A value the LLM may emit as either a JSON string or a JSON number despite
/// `EXTRACTION_PROMPT_TEMPLATE` asking for strings (`spec.md` §4.3.a).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

fn string_or_number_map<'de, D>(
    deserializer: D,
) -> std::result::Result<std::collections::HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = std::collections::HashMap::<String, StringOrNumber>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, String::from(v))).collect())
}

#[derive(Debug, Deserialize)]
struct RawTeamMember {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    background: String,
}

#[async_trait]
impl AnalysisAgent for BpParserAgent {
    type Input = BpParserInput;
    type Output = BpStructuredData;

    #[tracing::instrument(skip(self, input), fields(company_name = %input.company_name))]
    async fn analyze(&self, input: Self::Input) -> Self::Output {
        let raw_response = self
            .llm
            .generate_with_file(
                EXTRACTION_PROMPT_TEMPLATE,
                &input.file_bytes,
                &input.mime,
                &self.config,
            )
            .await;

        let raw_response = match raw_response {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "bp parser LLM call failed, falling back to minimal BP");
                return BpStructuredData::minimal(input.company_name);
            }
        };

        match parse_bp(&raw_response) {
            Some(parsed) => {
                let mut structured = parsed_into_structured(parsed);
                if structured.company_name.trim().is_empty() {
                    structured.company_name = input.company_name;
                }
                structured
            }
            None => {
                tracing::warn!(raw_response = %raw_response, "bp parser produced invalid JSON, falling back to minimal BP");
                BpStructuredData::minimal(input.company_name)
            }
        }
    }
}

fn parse_bp(raw_response: &str) -> Option<RawBp> {
    let json_slice = extract_json_object(raw_response)?;
    serde_json::from_str(json_slice).ok().map(|raw: RawBp| raw)
}

fn parsed_into_structured(raw: RawBp) -> BpStructuredData {
    BpStructuredData {
        company_name: raw.company_name.unwrap_or_default(),
        founding_date: raw.founding_date,
        team: raw
            .team
            .into_iter()
            .map(|m| TeamMember { name: m.name, title: m.title, background: m.background })
            .collect(),
        product_description: raw.product_description,
        target_market: raw.target_market,
        tam_estimate: raw.tam_estimate,
        competitors: raw.competitors,
        funding_request: raw.funding_request,
        current_valuation: raw.current_valuation,
        projected_financials: raw.projected_financials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bp_tolerates_fenced_json() {
        let raw = "```json\n{\"company_name\": \"Acme AI\", \"team\": [{\"name\": \"Jane\", \"title\": \"CEO\", \"background\": \"ex-FAANG\"}]}\n```";
        let parsed = parse_bp(raw).unwrap();
        assert_eq!(parsed.company_name.as_deref(), Some("Acme AI"));
        assert_eq!(parsed.team.len(), 1);
    }

    #[test]
    fn parse_bp_returns_none_for_garbage() {
        assert!(parse_bp("not json at all").is_none());
    }

    #[test]
    fn parse_bp_coerces_numeric_fields_emitted_as_json_numbers() {
        let raw = r#"{
            "company_name": "Acme AI",
            "tam_estimate": 5000000000,
            "funding_request": 2000000,
            "current_valuation": 15000000.5,
            "projected_financials": {"2025": 100000, "2026": "250000"}
        }"#;
        let parsed = parse_bp(raw).unwrap();
        assert_eq!(parsed.tam_estimate.as_deref(), Some("5000000000"));
        assert_eq!(parsed.funding_request.as_deref(), Some("2000000"));
        assert_eq!(parsed.current_valuation.as_deref(), Some("15000000.5"));
        assert_eq!(parsed.projected_financials.get("2025").map(String::as_str), Some("100000"));
        assert_eq!(parsed.projected_financials.get("2026").map(String::as_str), Some("250000"));
    }
}
