//! Mock web search client for testing agents without hitting a live index.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diligence_core::error::Result;
use diligence_core::service_clients::{SearchResult, WebSearchClient};

/// A configurable mock [`WebSearchClient`]. Defaults to an empty result set,
/// matching the production client's "a failed search degrades to no
/// results" contract.
#[derive(Clone, Default)]
pub struct MockWebSearchClient {
    results: Arc<Mutex<Vec<SearchResult>>>,
    queries_seen: Arc<Mutex<Vec<String>>>,
}

impl MockWebSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, results: Vec<SearchResult>) -> Self {
        *self.results.lock().unwrap() = results;
        self
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.queries_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearchClient for MockWebSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.queries_seen.lock().unwrap().push(query.to_string());
        Ok(self.results.lock().unwrap().iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_empty_results() {
        let client = MockWebSearchClient::new();
        let results = client.search("Acme AI", 5).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(client.queries_seen(), vec!["Acme AI".to_string()]);
    }

    #[tokio::test]
    async fn respects_limit() {
        let seeded = vec![
            SearchResult { title: "a".into(), url: "u1".into(), snippet: "s1".into() },
            SearchResult { title: "b".into(), url: "u2".into(), snippet: "s2".into() },
        ];
        let client = MockWebSearchClient::new().with_results(seeded);
        let results = client.search("q", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
