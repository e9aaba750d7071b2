use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One team member entry extracted from the business plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMember {
    pub name: String,
    pub title: String,
    pub background: String,
}

/// Business-plan structured data, the output of `DOC_PARSE` (`spec.md`
/// §3). Every field except `company_name` may be absent; downstream agents
/// must tolerate missing fields rather than failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BpStructuredData {
    pub company_name: String,
    pub founding_date: Option<String>,
    pub team: Vec<TeamMember>,
    pub product_description: Option<String>,
    pub target_market: Option<String>,
    pub tam_estimate: Option<String>,
    pub competitors: Vec<String>,
    pub funding_request: Option<String>,
    pub current_valuation: Option<String>,
    /// Free-form map (e.g. "revenue_2024" -> "1.2M").
    pub projected_financials: HashMap<String, String>,
}

impl BpStructuredData {
    /// Minimal fallback used when the LLM gateway's file-understanding call
    /// fails or its output fails schema validation (`spec.md` §4.3.a):
    /// only `company_name` is populated, from the caller-provided name.
    pub fn minimal(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            ..Default::default()
        }
    }

    /// `company_name` is the one field this type requires to be non-empty.
    pub fn is_valid(&self) -> bool {
        !self.company_name.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_fallback_populates_only_company_name() {
        let bp = BpStructuredData::minimal("Acme AI");
        assert_eq!(bp.company_name, "Acme AI");
        assert!(bp.team.is_empty());
        assert!(bp.founding_date.is_none());
        assert!(bp.is_valid());
    }

    #[test]
    fn round_trip_through_json_is_structurally_equal() {
        let mut bp = BpStructuredData::minimal("Acme AI");
        bp.team.push(TeamMember {
            name: "Jane Doe".into(),
            title: "CEO".into(),
            background: "Ex-FAANG".into(),
        });
        bp.projected_financials
            .insert("revenue_2025".into(), "2.0M".into());

        let json = serde_json::to_string(&bp).unwrap();
        let round_tripped: BpStructuredData = serde_json::from_str(&json).unwrap();
        assert_eq!(bp, round_tripped);
    }

    #[test]
    fn empty_company_name_is_invalid() {
        let bp = BpStructuredData::default();
        assert!(!bp.is_valid());
    }
}
