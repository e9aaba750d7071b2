//! Minimal standalone server, wired against the real HTTP-backed service
//! clients instead of mocks.
//!
//! Run with: cargo run --example basic_skeleton -p diligence-server

use std::sync::Arc;

use diligence_core::agents::{
    BpParserAgent, ExitAgent, MarketAnalystAgent, RiskDdqAgent, TeamAnalystAgent, ValuationAgent,
};
use diligence_core::service_clients::{
    GenerationConfig, HttpExternalDataClient, HttpInternalKnowledgeClient, HttpLlmGatewayClient,
    HttpWebSearchClient, InternalKnowledgeClient, LlmGatewayClient, WebSearchClient,
};
use diligence_core::workflow::{DdWorkflow, SessionManager};
use diligence_core::DiligenceConfig;
use diligence_server::handler::AppState;
use diligence_server::create_server;
use tokio::sync::Semaphore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = DiligenceConfig::from_env()?;

    let llm: Arc<dyn LlmGatewayClient> = Arc::new(HttpLlmGatewayClient::new(&config.llm_gateway_url));
    let web_search: Arc<dyn WebSearchClient> = Arc::new(HttpWebSearchClient::new(&config.web_search_url));
    let external_data = Arc::new(HttpExternalDataClient::new(&config.external_data_url));
    let internal_knowledge: Arc<dyn InternalKnowledgeClient> =
        Arc::new(HttpInternalKnowledgeClient::new(&config.internal_knowledge_url));
    let _ = external_data; // no analysis agent consumes external data directly today

    let generation_config = GenerationConfig {
        model_id: config.llm_model_id.clone(),
        timeout: config.llm_timeout,
        ..GenerationConfig::default()
    };

    let workflow = Arc::new(DdWorkflow {
        bp_parser: Arc::new(BpParserAgent::new(Arc::clone(&llm), generation_config.clone())),
        team_analyst: Arc::new(TeamAnalystAgent::new(
            Arc::clone(&llm),
            web_search.clone(),
            generation_config.clone(),
        )),
        market_analyst: Arc::new(MarketAnalystAgent::new(
            Arc::clone(&llm),
            web_search.clone(),
            internal_knowledge.clone(),
            generation_config.clone(),
        )),
        risk_ddq: Arc::new(RiskDdqAgent::new(Arc::clone(&llm), generation_config.clone())),
        valuation: Arc::new(ValuationAgent::new(
            Arc::clone(&llm),
            web_search.clone(),
            generation_config.clone(),
        )),
        exit_agent: Arc::new(ExitAgent::new(Arc::clone(&llm), generation_config.clone())),
        fanout_limit: Arc::new(Semaphore::new(config.per_session_fanout_limit)),
    });

    let state = AppState {
        session_manager: Arc::new(SessionManager::new(workflow)),
        config: Arc::new(config),
        llm_gateway: llm,
    };

    let app = create_server(state);

    println!("Due-diligence orchestrator API");
    println!();
    println!("  GET  /dd/stream              WebSocket: start + stream a DD session");
    println!("  POST /dd/run                 multipart: run a DD session to completion");
    println!("  GET  /dd/sessions/:id         fetch a session snapshot");
    println!("  POST /dd/sessions/:id/resume  resume a paused session");
    println!("  GET  /roundtable/stream       WebSocket: start + stream a roundtable");
    println!("  GET  /health, /ready, /metrics");
    println!();
    println!("Starting server on 0.0.0.0:8000...");

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    axum::serve(listener, app).await?;
    Ok(())
}
