use std::env;
use std::time::Duration;

use crate::error::{DiligenceError, Result};

/// Process-wide configuration, read once at startup from environment
/// variables (`spec.md` §6.4).
#[derive(Debug, Clone)]
pub struct DiligenceConfig {
    pub llm_gateway_url: String,
    pub web_search_url: String,
    pub external_data_url: String,
    pub internal_knowledge_url: String,
    pub llm_model_id: String,
    pub llm_timeout: Duration,
    pub max_concurrent_sessions: usize,
    pub per_session_fanout_limit: usize,
}

impl DiligenceConfig {
    /// Reads every key from the process environment, applying the same
    /// defaults described in `spec.md` §6.4 / `SPEC_FULL.md` §10.
    pub fn from_env() -> Result<Self> {
        let llm_timeout_secs: u64 = env_or("LLM_TIMEOUT_SECONDS", "30")
            .parse()
            .map_err(|_| DiligenceError::InternalError("LLM_TIMEOUT_SECONDS must be an integer".into()))?;

        let max_concurrent_sessions: usize = env_or("MAX_CONCURRENT_SESSIONS", "256")
            .parse()
            .map_err(|_| {
                DiligenceError::InternalError("MAX_CONCURRENT_SESSIONS must be an integer".into())
            })?;

        let per_session_fanout_limit: usize = env_or("PER_SESSION_FANOUT_LIMIT", "16")
            .parse()
            .map_err(|_| {
                DiligenceError::InternalError("PER_SESSION_FANOUT_LIMIT must be an integer".into())
            })?;

        Ok(Self {
            llm_gateway_url: env_or("LLM_GATEWAY_URL", "http://localhost:8081"),
            web_search_url: env_or("WEB_SEARCH_URL", "http://localhost:8082"),
            external_data_url: env_or("EXTERNAL_DATA_URL", "http://localhost:8083"),
            internal_knowledge_url: env_or("INTERNAL_KNOWLEDGE_URL", "http://localhost:8084"),
            llm_model_id: env_or("LLM_MODEL_ID", "default-model"),
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            max_concurrent_sessions,
            per_session_fanout_limit,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
