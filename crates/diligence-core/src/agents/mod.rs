//! The six analysis agents (`spec.md` §4.3), each following the same
//! gather → context build → LLM call → parse → fallback shape via
//! [`AnalysisAgent`].

mod bp_parser;
mod exit_agent;
mod market_analyst;
mod risk_ddq;
mod team_analyst;
mod valuation;

pub use bp_parser::{BpParserAgent, BpParserInput};
pub use exit_agent::ExitAgent;
pub use market_analyst::MarketAnalystAgent;
pub use risk_ddq::RiskDdqAgent;
pub use team_analyst::TeamAnalystAgent;
pub use valuation::ValuationAgent;

use async_trait::async_trait;

/// Common shape for every analysis agent. `analyze` never returns an error:
/// a gather or LLM failure is handled internally and results in a
/// `degraded`-flagged fallback output (`spec.md` §4.3 step 5).
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    type Input: Send + Sync;
    type Output: Send + Sync;

    async fn analyze(&self, input: Self::Input) -> Self::Output;
}

/// Extracts the first top-level JSON object from LLM output, tolerating
/// markdown code fences (`spec.md` §4.3 step 4).
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let without_fence = raw
        .trim()
        .strip_prefix("```json")
        .or_else(|| raw.trim().strip_prefix("```"))
        .unwrap_or(raw.trim());
    let without_fence = without_fence.strip_suffix("```").unwrap_or(without_fence).trim();

    let start = without_fence.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in without_fence[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&without_fence[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_fenced_markdown() {
        let raw = "Here is the result:\n```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```\n";
        let extracted = extract_json_object(raw).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(extracted).unwrap();
        assert_eq!(parsed["a"], 1);
        assert_eq!(parsed["b"]["c"], 2);
    }

    #[test]
    fn extracts_object_from_bare_json() {
        let raw = "{\"x\": true}";
        assert_eq!(extract_json_object(raw).unwrap(), "{\"x\": true}");
    }

    #[test]
    fn returns_none_when_no_object_present() {
        assert!(extract_json_object("no json here").is_none());
    }
}
