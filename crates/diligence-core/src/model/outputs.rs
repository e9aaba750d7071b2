use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `spec.md` §3: team due-diligence output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TeamAnalysisOutput {
    pub summary: String,
    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
    /// Clamped to `[0, 10]` after parsing (`spec.md` §4.3.b).
    pub experience_match_score: f32,
    pub key_findings: Vec<String>,
    pub data_sources: Vec<String>,
    /// `true` when this output was produced by the deterministic fallback
    /// path rather than a successful LLM call.
    pub degraded: bool,
}

impl TeamAnalysisOutput {
    pub fn clamp_score(&mut self) {
        self.experience_match_score = self.experience_match_score.clamp(0.0, 10.0);
    }

    /// Deterministic fallback per `spec.md` §4.3 step 5: preserves
    /// BP-derived facts and marks derived fields unknown; never raises.
    pub fn fallback(reason: &str) -> Self {
        Self {
            summary: format!("Team analysis unavailable: {reason}"),
            strengths: Vec::new(),
            concerns: Vec::new(),
            experience_match_score: 5.0,
            key_findings: vec!["unknown".to_string()],
            data_sources: Vec::new(),
            degraded: true,
        }
    }
}

/// `spec.md` §3: market due-diligence output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketAnalysisOutput {
    pub summary: String,
    pub market_validation: String,
    pub competitive_landscape: String,
    /// Discrepancies between BP-claimed figures and web-sourced figures
    /// (`spec.md` §4.3.c), e.g. TAM magnitude exaggeration.
    pub red_flags: Vec<String>,
    pub data_sources: Vec<String>,
    pub degraded: bool,
}

impl MarketAnalysisOutput {
    pub fn fallback(reason: &str) -> Self {
        Self {
            summary: format!("Market analysis unavailable: {reason}"),
            market_validation: "unknown".to_string(),
            competitive_landscape: "unknown".to_string(),
            red_flags: Vec::new(),
            data_sources: Vec::new(),
            degraded: true,
        }
    }
}

/// `spec.md` §3: a single due-diligence question category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdQuestionCategory {
    Team,
    Market,
    Product,
    Financial,
    Risk,
}

impl DdQuestionCategory {
    pub const ALL: [DdQuestionCategory; 5] = [
        DdQuestionCategory::Team,
        DdQuestionCategory::Market,
        DdQuestionCategory::Product,
        DdQuestionCategory::Financial,
        DdQuestionCategory::Risk,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// `spec.md` §3: a generated follow-up due-diligence question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdQuestion {
    pub category: DdQuestionCategory,
    pub question: String,
    pub reasoning: String,
    pub bp_reference: Option<String>,
    pub priority: Priority,
}

/// `spec.md` §3 / §4.2: preference-match result. `recommendation` is
/// `Proceed` iff `score >= 60` and no exclusion dimension was hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceMatchResult {
    pub score: f32,
    pub matched_criteria: Vec<String>,
    pub mismatched_criteria: Vec<String>,
    pub recommendation: Recommendation,
    pub mismatch_reasons: Vec<String>,
    pub dimension_scores: Vec<DimensionScore>,
}

impl PreferenceMatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self.recommendation, Recommendation::Proceed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Proceed,
    Abort,
}

/// Per-dimension score + reason, surfaced whenever score < 100
/// (`spec.md` §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    pub score: f32,
    pub reason: Option<String>,
}

/// `spec.md` §3: the final preliminary Investment Memorandum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreliminaryIm {
    pub company_name: String,
    pub team_section: Option<TeamAnalysisOutput>,
    pub market_section: Option<MarketAnalysisOutput>,
    pub dd_questions: Vec<DdQuestion>,
    pub preference_match: Option<PreferenceMatchResult>,
    pub generated_at: DateTime<Utc>,
}

/// `spec.md` §4.3.e: valuation agent output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationOutput {
    pub low: f64,
    pub high: f64,
    pub currency: String,
    pub methodology: String,
    pub comparables: Vec<String>,
    pub assumptions: Vec<String>,
    pub risks: Vec<String>,
    pub degraded: bool,
}

impl ValuationOutput {
    pub fn fallback(reason: &str) -> Self {
        Self {
            low: 0.0,
            high: 0.0,
            currency: "USD".to_string(),
            methodology: format!("unavailable: {reason}"),
            comparables: Vec::new(),
            assumptions: Vec::new(),
            risks: Vec::new(),
            degraded: true,
        }
    }
}

/// `spec.md` §4.3.f: exit agent output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitOutput {
    pub primary_path: String,
    pub ipo_analysis: String,
    pub ma_opportunities: Vec<String>,
    pub exit_risks: Vec<String>,
    pub degraded: bool,
}

impl ExitOutput {
    pub fn fallback(reason: &str) -> Self {
        Self {
            primary_path: "unknown".to_string(),
            ipo_analysis: format!("unavailable: {reason}"),
            ma_opportunities: Vec::new(),
            exit_risks: Vec::new(),
            degraded: true,
        }
    }
}
