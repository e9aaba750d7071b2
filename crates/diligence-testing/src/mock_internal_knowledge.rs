//! Mock internal-knowledge client for testing agents without a live index.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diligence_core::error::Result;
use diligence_core::service_clients::{InternalKnowledgeClient, KnowledgeHit};

/// A configurable mock [`InternalKnowledgeClient`]. Defaults to an empty hit
/// set.
#[derive(Clone, Default)]
pub struct MockInternalKnowledgeClient {
    hits: Arc<Mutex<Vec<KnowledgeHit>>>,
}

impl MockInternalKnowledgeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(self, hits: Vec<KnowledgeHit>) -> Self {
        *self.hits.lock().unwrap() = hits;
        self
    }
}

#[async_trait]
impl InternalKnowledgeClient for MockInternalKnowledgeClient {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        Ok(self.hits.lock().unwrap().iter().take(limit).cloned().collect())
    }
}
