use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `spec.md` §4.1: one internal knowledge search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub content: String,
    pub metadata: serde_json::Value,
}

/// `spec.md` §4.1: the internal knowledge client surface.
#[async_trait]
pub trait InternalKnowledgeClient: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<KnowledgeHit>,
}

pub struct HttpInternalKnowledgeClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpInternalKnowledgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl InternalKnowledgeClient for HttpInternalKnowledgeClient {
    #[tracing::instrument(skip(self, query), fields(limit))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
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
                let parsed: SearchResponse = response
                    .json()
                    .await
                    .unwrap_or(SearchResponse { hits: Vec::new() });
                Ok(parsed.hits)
            }
            Err(err) => {
                tracing::warn!(error = %err, query, "internal knowledge search failed, returning empty result set");
                Ok(Vec::new())
            }
        }
    }
}
