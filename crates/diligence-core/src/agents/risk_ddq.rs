use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{BpStructuredData, DdQuestion, DdQuestionCategory, MarketAnalysisOutput, Priority, TeamAnalysisOutput};
use crate::service_clients::{GenerationConfig, LlmGatewayClient};

use super::{extract_json_object, AnalysisAgent};

const MIN_QUESTIONS: usize = 10;
const MAX_QUESTIONS: usize = 20;

pub struct RiskDdqInput {
    pub bp: BpStructuredData,
    pub team_output: TeamAnalysisOutput,
    pub market_output: MarketAnalysisOutput,
}

pub struct RiskDdqAgent {
    llm: Arc<dyn LlmGatewayClient>,
    config: GenerationConfig,
}

impl RiskDdqAgent {
    pub fn new(llm: Arc<dyn LlmGatewayClient>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    category: String,
    question: String,
    #[serde(default)]
    reasoning: String,
    bp_reference: Option<String>,
    #[serde(default = "default_priority")]
    priority: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Deserialize)]
struct RawQuestionSet {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

fn parse_category(raw: &str) -> Option<DdQuestionCategory> {
    match raw.to_lowercase().as_str() {
        "team" => Some(DdQuestionCategory::Team),
        "market" => Some(DdQuestionCategory::Market),
        "product" => Some(DdQuestionCategory::Product),
        "financial" => Some(DdQuestionCategory::Financial),
        "risk" => Some(DdQuestionCategory::Risk),
        _ => None,
    }
}

fn parse_priority(raw: &str) -> Priority {
    match raw.to_lowercase().as_str() {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

#[async_trait]
impl AnalysisAgent for RiskDdqAgent {
    type Input = RiskDdqInput;
    type Output = Vec<DdQuestion>;

    #[tracing::instrument(skip(self, input), fields(company_name = %input.bp.company_name))]
    async fn analyze(&self, input: Self::Input) -> Self::Output {
        let prompt = format!(
            "Company: {}\n\nTeam analysis:\n{}\n\nMarket analysis:\n{}\n\n\
             Generate between {MIN_QUESTIONS} and {MAX_QUESTIONS} due-diligence \
             follow-up questions spanning the categories team, market, product, \
             financial, and risk. Return a JSON object: \
             {{\"questions\": [{{\"category\": string, \"question\": string, \
             \"reasoning\": string, \"bp_reference\": string|null, \
             \"priority\": \"high\"|\"medium\"|\"low\"}}]}}.",
            input.bp.company_name, input.team_output.summary, input.market_output.summary,
        );

        let mut questions: Vec<DdQuestion> = match self.llm.generate(&prompt, &self.config).await {
            Ok(raw_response) => extract_json_object(&raw_response)
                .and_then(|s| serde_json::from_str::<RawQuestionSet>(s).ok())
                .map(|raw| {
                    raw.questions
                        .into_iter()
                        .filter_map(|q| {
                            Some(DdQuestion {
                                category: parse_category(&q.category)?,
                                question: q.question,
                                reasoning: q.reasoning,
                                bp_reference: q.bp_reference,
                                priority: parse_priority(&q.priority),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "risk/DDQ LLM call failed, using template pool only");
                Vec::new()
            }
        };

        top_up_with_templates(&mut questions, &input.bp);
        questions.truncate(MAX_QUESTIONS);
        questions
    }
}

/// Deterministic template pool (`spec.md` §4.3.d): ensures at least
/// [`MIN_QUESTIONS`] and full category coverage even if the LLM emits none.
fn top_up_with_templates(questions: &mut Vec<DdQuestion>, bp: &BpStructuredData) {
    for category in DdQuestionCategory::ALL {
        if !questions.iter().any(|q| q.category == category) {
            questions.push(template_question(category, bp));
        }
    }
    let mut extra_index = 0;
    while questions.len() < MIN_QUESTIONS {
        let category = DdQuestionCategory::ALL[extra_index % DdQuestionCategory::ALL.len()];
        questions.push(template_question(category, bp));
        extra_index += 1;
    }
}

fn template_question(category: DdQuestionCategory, bp: &BpStructuredData) -> DdQuestion {
    let (question, reasoning) = match category {
        DdQuestionCategory::Team => (
            format!("What is {}'s plan for filling any remaining key leadership roles?", bp.company_name),
            "Team completeness is a standard DD checkpoint.".to_string(),
        ),
        DdQuestionCategory::Market => (
            "What evidence supports the stated total addressable market?".to_string(),
            "Market sizing claims require independent substantiation.".to_string(),
        ),
        DdQuestionCategory::Product => (
            "What is the current state of product-market fit validation?".to_string(),
            "Product maturity directly affects execution risk.".to_string(),
        ),
        DdQuestionCategory::Financial => (
            "What are the key assumptions behind the projected financials?".to_string(),
            "Financial projections should be traceable to explicit assumptions.".to_string(),
        ),
        DdQuestionCategory::Risk => (
            "What are the top three risks to this company's twelve-month plan?".to_string(),
            "Explicit risk enumeration is a standard DD checkpoint.".to_string(),
        ),
    };
    DdQuestion {
        category,
        question,
        reasoning,
        bp_reference: None,
        priority: Priority::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_up_guarantees_minimum_and_coverage() {
        let bp = BpStructuredData::minimal("Acme AI");
        let mut questions = Vec::new();
        top_up_with_templates(&mut questions, &bp);
        assert!(questions.len() >= MIN_QUESTIONS);
        for category in DdQuestionCategory::ALL {
            assert!(questions.iter().any(|q| q.category == category));
        }
    }

    #[test]
    fn top_up_fills_only_missing_categories() {
        let bp = BpStructuredData::minimal("Acme AI");
        let mut questions = vec![DdQuestion {
            category: DdQuestionCategory::Team,
            question: "custom team question".into(),
            reasoning: "from LLM".into(),
            bp_reference: None,
            priority: Priority::High,
        }];
        top_up_with_templates(&mut questions, &bp);
        let team_questions: Vec<_> = questions.iter().filter(|q| q.category == DdQuestionCategory::Team).collect();
        assert_eq!(team_questions.len(), 1);
        assert_eq!(team_questions[0].question, "custom team question");
    }
}
