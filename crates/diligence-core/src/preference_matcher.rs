//! Pure function, no I/O: weighs a business plan against an institution's
//! stated preferences (`spec.md` §4.2).

use serde::{Deserialize, Serialize};

use crate::model::{BpStructuredData, DimensionScore, PreferenceMatchResult, Recommendation};

const MATCH_THRESHOLD: f32 = 60.0;

/// An institution's stated investment preferences (`spec.md` §4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstitutionPreferences {
    pub focus_industries: Vec<String>,
    pub excluded_industries: Vec<String>,
    pub preferred_stages: Vec<String>,
    pub preferred_geographies: Vec<String>,
    pub min_investment: Option<f64>,
    pub max_investment: Option<f64>,
    pub min_team_size: Option<u32>,
    pub requires_revenue: bool,
    pub requires_product: bool,
}

struct Weighted {
    dimension: &'static str,
    weight: f32,
}

const WEIGHTS: &[Weighted] = &[
    Weighted { dimension: "industry", weight: 0.30 },
    Weighted { dimension: "stage", weight: 0.20 },
    Weighted { dimension: "geography", weight: 0.10 },
    Weighted { dimension: "investment_amount", weight: 0.15 },
    Weighted { dimension: "team_size", weight: 0.10 },
    Weighted { dimension: "has_revenue", weight: 0.075 },
    Weighted { dimension: "has_product", weight: 0.075 },
];

fn weight_of(dimension: &str) -> f32 {
    WEIGHTS
        .iter()
        .find(|w| w.dimension == dimension)
        .map(|w| w.weight)
        .unwrap_or(0.0)
}

/// Score `industry`: exclusion dominates (score 0, flagged separately so the
/// caller can force an `Abort` regardless of the weighted total); a focus
/// match scores 100; anything else is neutral.
fn score_industry(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, bool, Option<String>) {
    let inferred_industry = bp.target_market.as_deref().unwrap_or("");
    if inferred_industry.is_empty() {
        return (50.0, false, Some("no inferred industry; defaulting to neutral".to_string()));
    }
    let excluded = prefs
        .excluded_industries
        .iter()
        .any(|i| inferred_industry.to_lowercase().contains(&i.to_lowercase()));
    if excluded {
        return (0.0, true, Some(format!("industry '{inferred_industry}' is on the exclusion list")));
    }
    let focused = prefs
        .focus_industries
        .iter()
        .any(|i| inferred_industry.to_lowercase().contains(&i.to_lowercase()));
    if focused {
        (100.0, false, None)
    } else {
        (50.0, false, Some(format!("industry '{inferred_industry}' is neither excluded nor a focus area")))
    }
}

fn score_stage(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, Option<String>) {
    if prefs.preferred_stages.is_empty() {
        return (50.0, Some("no stage preferences configured".to_string()));
    }
    let inferred_stage = infer_stage(bp);
    if prefs
        .preferred_stages
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&inferred_stage))
    {
        (100.0, None)
    } else {
        (0.0, Some(format!("inferred stage '{inferred_stage}' not in preferred stages")))
    }
}

/// Infers an investment stage label from BP fields available post-parse.
/// Best-effort: absent signals default to "seed".
fn infer_stage(bp: &BpStructuredData) -> String {
    if bp.current_valuation.is_some() && !bp.projected_financials.is_empty() {
        "growth".to_string()
    } else if !bp.projected_financials.is_empty() {
        "series_a".to_string()
    } else {
        "seed".to_string()
    }
}

fn score_geography(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, Option<String>) {
    let target = bp.target_market.as_deref();
    match target {
        None => (50.0, Some("geography unknown".to_string())),
        Some(target) => {
            if prefs.preferred_geographies.is_empty() {
                return (50.0, Some("no geography preferences configured".to_string()));
            }
            let matched = prefs
                .preferred_geographies
                .iter()
                .any(|g| target.to_lowercase().contains(&g.to_lowercase()));
            if matched {
                (100.0, None)
            } else {
                (0.0, Some(format!("'{target}' does not match preferred geographies")))
            }
        }
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok()
}

fn score_investment_amount(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, Option<String>) {
    let (Some(min), Some(max)) = (prefs.min_investment, prefs.max_investment) else {
        return (50.0, Some("no investment range configured".to_string()));
    };
    let Some(requested) = bp.funding_request.as_deref().and_then(parse_amount) else {
        return (50.0, Some("funding request amount unknown".to_string()));
    };

    if requested >= min && requested <= max {
        (100.0, None)
    } else {
        let band = (max - min).max(1.0);
        let taper_window = band * 0.20;
        let distance = if requested < min { min - requested } else { requested - max };
        if distance <= taper_window {
            let score = 100.0 * (1.0 - distance / taper_window);
            (score.max(0.0), Some(format!("requested amount {requested} is outside [{min}, {max}] but within taper range")))
        } else {
            (0.0, Some(format!("requested amount {requested} is far outside [{min}, {max}]")))
        }
    }
}

fn score_team_size(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, Option<String>) {
    let Some(min_size) = prefs.min_team_size else {
        return (100.0, None);
    };
    if bp.team.len() as u32 >= min_size {
        (100.0, None)
    } else {
        (0.0, Some(format!("team size {} is below minimum {min_size}", bp.team.len())))
    }
}

fn score_has_revenue(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, Option<String>) {
    if !prefs.requires_revenue {
        return (100.0, None);
    }
    let has_revenue = bp
        .projected_financials
        .keys()
        .any(|k| k.to_lowercase().contains("revenue"));
    if has_revenue {
        (100.0, None)
    } else {
        (0.0, Some("institution requires revenue; none found in BP".to_string()))
    }
}

fn score_has_product(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> (f32, Option<String>) {
    if !prefs.requires_product {
        return (100.0, None);
    }
    if bp.product_description.is_some() {
        (100.0, None)
    } else {
        (0.0, Some("institution requires a product description; none found in BP".to_string()))
    }
}

/// Weighs `bp` against `prefs` and returns the match result (`spec.md`
/// §4.2). Missing BP fields score neutral (50) rather than blocking the
/// computation.
pub fn match_preferences(bp: &BpStructuredData, prefs: &InstitutionPreferences) -> PreferenceMatchResult {
    let (industry_score, exclusion_hit, industry_reason) = score_industry(bp, prefs);
    let (stage_score, stage_reason) = score_stage(bp, prefs);
    let (geography_score, geography_reason) = score_geography(bp, prefs);
    let (amount_score, amount_reason) = score_investment_amount(bp, prefs);
    let (team_score, team_reason) = score_team_size(bp, prefs);
    let (revenue_score, revenue_reason) = score_has_revenue(bp, prefs);
    let (product_score, product_reason) = score_has_product(bp, prefs);

    let dimension_scores = vec![
        DimensionScore { dimension: "industry".into(), score: industry_score, reason: industry_reason },
        DimensionScore { dimension: "stage".into(), score: stage_score, reason: stage_reason },
        DimensionScore { dimension: "geography".into(), score: geography_score, reason: geography_reason },
        DimensionScore { dimension: "investment_amount".into(), score: amount_score, reason: amount_reason },
        DimensionScore { dimension: "team_size".into(), score: team_score, reason: team_reason },
        DimensionScore { dimension: "has_revenue".into(), score: revenue_score, reason: revenue_reason },
        DimensionScore { dimension: "has_product".into(), score: product_score, reason: product_reason },
    ];

    let weighted_sum: f32 = dimension_scores
        .iter()
        .map(|d| d.score * weight_of(&d.dimension))
        .sum();

    let mut matched_criteria = Vec::new();
    let mut mismatched_criteria = Vec::new();
    let mut mismatch_reasons = Vec::new();
    for d in &dimension_scores {
        if d.score >= 100.0 {
            matched_criteria.push(d.dimension.clone());
        } else if d.score < MATCH_THRESHOLD {
            mismatched_criteria.push(d.dimension.clone());
            if let Some(reason) = &d.reason {
                mismatch_reasons.push(reason.clone());
            }
        }
    }

    let recommendation = if exclusion_hit || weighted_sum < MATCH_THRESHOLD {
        Recommendation::Abort
    } else {
        Recommendation::Proceed
    };

    PreferenceMatchResult {
        score: weighted_sum,
        matched_criteria,
        mismatched_criteria,
        recommendation,
        mismatch_reasons,
        dimension_scores,
    }
}
