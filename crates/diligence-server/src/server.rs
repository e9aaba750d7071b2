//! Router assembly for the due-diligence orchestrator's HTTP/WebSocket API
//! (`spec.md` §6.1, `SPEC_FULL.md` §6).

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::handler::{
    dd_run_handler, dd_stream_handler, get_session_handler, health_handler, metrics_handler,
    ready_handler, resume_session_handler, roundtable_stream_handler, AppState,
};

/// Builds the full route table against a single shared [`AppState`]. Every
/// endpoint named in `spec.md` §6.1 lives under one router rather than the
/// teacher's per-runnable nested sub-router, since the orchestrator hosts
/// one fixed domain API, not an arbitrary number of mounted runnables.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/dd/stream", get(dd_stream_handler))
        .route("/dd/run", post(dd_run_handler))
        .route("/dd/sessions/:id", get(get_session_handler))
        .route("/dd/sessions/:id/resume", post(resume_session_handler))
        .route("/roundtable/stream", get(roundtable_stream_handler))
        .with_state(state)
}

/// Wires `build_router`'s output up with permissive CORS and the
/// `/health`/`/ready`/`/metrics` endpoints.
///
/// # Security Warning
/// Development-only convenience: allows all origins, methods, and headers.
/// For production use [`create_server_with_cors`] with explicit origins.
pub fn create_server(state: AppState) -> Router {
    tracing::warn!(
        "using create_server() with permissive CORS (allow all origins); \
         for production use create_server_with_cors() with explicit origins"
    );

    build_router(state)
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Production variant of [`create_server`] with an explicit origin
/// allowlist instead of a wildcard.
pub fn create_server_with_cors(state: AppState, allowed_origins: Vec<String>) -> Router {
    use tower_http::cors::AllowOrigin;

    let cors = if allowed_origins.is_empty() {
        tracing::info!("no CORS origins configured, CORS headers will not be added");
        CorsLayer::new()
    } else {
        let origins: Vec<_> = allowed_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    build_router(state)
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use diligence_core::agents::{
        BpParserAgent, ExitAgent, MarketAnalystAgent, RiskDdqAgent, TeamAnalystAgent, ValuationAgent,
    };
    use diligence_core::service_clients::GenerationConfig;
    use diligence_core::workflow::{DdWorkflow, SessionManager};
    use diligence_core::DiligenceConfig;
    use diligence_testing::{MockExternalDataClient, MockInternalKnowledgeClient, MockLlmGatewayClient, MockWebSearchClient};
    use tokio::sync::Semaphore;

    fn test_state() -> AppState {
        let llm: Arc<dyn diligence_core::service_clients::LlmGatewayClient> =
            Arc::new(MockLlmGatewayClient::new());
        let web_search: Arc<dyn diligence_core::service_clients::WebSearchClient> =
            Arc::new(MockWebSearchClient::new());
        let external_data: Arc<dyn diligence_core::service_clients::ExternalDataClient> =
            Arc::new(MockExternalDataClient::new());
        let internal_knowledge: Arc<dyn diligence_core::service_clients::InternalKnowledgeClient> =
            Arc::new(MockInternalKnowledgeClient::new());
        let config = GenerationConfig::default();

        let workflow = Arc::new(DdWorkflow {
            bp_parser: Arc::new(BpParserAgent::new(Arc::clone(&llm), config.clone())),
            team_analyst: Arc::new(TeamAnalystAgent::new(Arc::clone(&llm), Arc::clone(&web_search), config.clone())),
            market_analyst: Arc::new(MarketAnalystAgent::new(
                Arc::clone(&llm),
                Arc::clone(&web_search),
                Arc::clone(&internal_knowledge),
                config.clone(),
            )),
            risk_ddq: Arc::new(RiskDdqAgent::new(Arc::clone(&llm), config.clone())),
            valuation: Arc::new(ValuationAgent::new(Arc::clone(&llm), Arc::clone(&web_search), config.clone())),
            exit_agent: Arc::new(ExitAgent::new(Arc::clone(&llm), config.clone())),
            fanout_limit: Arc::new(Semaphore::new(16)),
        });

        AppState {
            session_manager: Arc::new(SessionManager::new(workflow)),
            config: Arc::new(DiligenceConfig {
                llm_gateway_url: "http://localhost:8081".into(),
                web_search_url: "http://localhost:8082".into(),
                external_data_url: "http://localhost:8083".into(),
                internal_knowledge_url: "http://localhost:8084".into(),
                llm_model_id: "default-model".into(),
                llm_timeout: std::time::Duration::from_secs(30),
                max_concurrent_sessions: 256,
                per_session_fanout_limit: 16,
            }),
            llm_gateway: llm,
        }
    }

    #[test]
    fn build_router_compiles_and_returns_a_router() {
        let _router = build_router(test_state());
    }

    #[test]
    fn create_server_with_cors_empty_origins_compiles() {
        let _router = create_server_with_cors(test_state(), vec![]);
    }

    #[test]
    fn create_server_with_cors_invalid_origin_is_filtered() {
        let _router = create_server_with_cors(
            test_state(),
            vec!["https://valid.example".to_string(), "not a valid origin".to_string()],
        );
    }

    #[tokio::test]
    async fn health_handler_returns_ok() {
        use axum::response::IntoResponse;
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
