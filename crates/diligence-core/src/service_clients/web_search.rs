use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DiligenceError, Result};

/// `spec.md` §4.1: one web search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// `spec.md` §4.1: the web search client surface. Empty results are a
/// success, not a failure — only `timeout`/`quota_exceeded` surface as
/// errors.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

pub struct HttpWebSearchClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpWebSearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl WebSearchClient for HttpWebSearchClient {
    #[tracing::instrument(skip(self, query), fields(limit))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match response {
            Ok(response) => {
                let parsed: SearchResponse = response.json().await.map_err(|err| {
                    DiligenceError::invalid_llm_response("web_search", err.to_string())
                })?;
                Ok(parsed.results)
            }
            // `spec.md` §9 Open Question resolution: a failing web search
            // degrades to no results rather than aborting the caller.
            Err(err) => {
                tracing::warn!(error = %err, query, "web search failed, returning empty result set");
                Ok(Vec::new())
            }
        }
    }
}
