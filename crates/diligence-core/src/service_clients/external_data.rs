use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `spec.md` §4.1: a company record from the external data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub industry: Option<String>,
    pub founded_year: Option<u32>,
    pub employee_count: Option<u32>,
    pub total_funding: Option<String>,
}

/// `spec.md` §4.1: a person record from the external data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub current_title: Option<String>,
    pub past_companies: Vec<String>,
}

/// `spec.md` §4.1: the external data client surface. Cached by
/// `(operation, key)`; misses and failures both yield `None` rather than an
/// error, since a missing external record should never block the workflow.
#[async_trait]
pub trait ExternalDataClient: Send + Sync {
    async fn lookup_company(&self, name: &str) -> Result<Option<CompanyRecord>>;
    async fn lookup_person(&self, name: &str) -> Result<Option<PersonRecord>>;
}

#[derive(Clone, Eq, PartialEq, Hash)]
enum CacheKey {
    Company(String),
    Person(String),
}

pub struct HttpExternalDataClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    cache: Arc<DashMap<CacheKey, Option<serde_json::Value>>>,
}

impl HttpExternalDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            cache: Arc::new(DashMap::new()),
        }
    }

    async fn fetch(&self, path: &str, key: &str) -> Option<serde_json::Value> {
        let url = format!("{}/{}/{}", self.base_url, path, key);
        match self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response.json::<serde_json::Value>().await.ok(),
            Err(err) => {
                tracing::warn!(error = %err, path, key, "external data lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ExternalDataClient for HttpExternalDataClient {
    #[tracing::instrument(skip(self))]
    async fn lookup_company(&self, name: &str) -> Result<Option<CompanyRecord>> {
        let cache_key = CacheKey::Company(name.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached
                .clone()
                .and_then(|v| serde_json::from_value(v).ok()));
        }
        let raw = self.fetch("companies", name).await;
        self.cache.insert(cache_key, raw.clone());
        Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
    }

    #[tracing::instrument(skip(self))]
    async fn lookup_person(&self, name: &str) -> Result<Option<PersonRecord>> {
        let cache_key = CacheKey::Person(name.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached
                .clone()
                .and_then(|v| serde_json::from_value(v).ok()));
        }
        let raw = self.fetch("people", name).await;
        self.cache.insert(cache_key, raw.clone());
        Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_equality_is_operation_scoped() {
        let company_key = CacheKey::Company("Acme".to_string());
        let person_key = CacheKey::Person("Acme".to_string());
        assert_ne!(company_key, person_key);
    }
}
