//! Typed clients for the four external services the workflow depends on
//! (`spec.md` §4.1): LLM gateway, web search, external data, and internal
//! knowledge. Each trait has one `reqwest`-backed production implementation
//! here and a mock counterpart in `diligence-testing`.

mod external_data;
mod internal_knowledge;
mod llm_gateway;
mod web_search;

pub use external_data::{CompanyRecord, ExternalDataClient, HttpExternalDataClient, PersonRecord};
pub use internal_knowledge::{HttpInternalKnowledgeClient, InternalKnowledgeClient, KnowledgeHit};
pub use llm_gateway::{
    GenerationConfig, HttpLlmGatewayClient, LlmGatewayClient, ToolSpec, ToolUseResult,
};
pub use web_search::{HttpWebSearchClient, SearchResult, WebSearchClient};

use std::future::Future;
use std::time::Duration;

/// Capped exponential backoff retry helper shared by all four HTTP clients.
/// Retries are safe for every operation these clients expose: reads, or
/// append-only writes to systems we do not own (`spec.md` §4.1 contract).
pub(crate) async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = base_delay;
    let mut tries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tries += 1;
                if tries >= max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}
