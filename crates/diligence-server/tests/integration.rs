//! Integration tests for the due-diligence orchestrator's HTTP surface.
//!
//! WebSocket endpoints (`/dd/stream`, `/roundtable/stream`) are exercised at
//! the unit level in `src/handler.rs`; these tests cover the one-shot
//! JSON/multipart endpoints end to end through the router via
//! `tower::ServiceExt::oneshot`, without binding a real socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use diligence_core::agents::{
    BpParserAgent, ExitAgent, MarketAnalystAgent, RiskDdqAgent, TeamAnalystAgent, ValuationAgent,
};
use diligence_core::service_clients::{
    ExternalDataClient, GenerationConfig, InternalKnowledgeClient, LlmGatewayClient, WebSearchClient,
};
use diligence_core::workflow::{DdWorkflow, SessionManager};
use diligence_core::DiligenceConfig;
use diligence_server::handler::AppState;
use diligence_server::{build_router, create_server};
use diligence_testing::{
    MockExternalDataClient, MockInternalKnowledgeClient, MockLlmGatewayClient, MockWebSearchClient,
};
use tokio::sync::Semaphore;
use tower::ServiceExt;

fn test_state() -> AppState {
    let llm: Arc<dyn LlmGatewayClient> = Arc::new(MockLlmGatewayClient::new());
    let web_search: Arc<dyn WebSearchClient> = Arc::new(MockWebSearchClient::new());
    let external_data: Arc<dyn ExternalDataClient> = Arc::new(MockExternalDataClient::new());
    let internal_knowledge: Arc<dyn InternalKnowledgeClient> =
        Arc::new(MockInternalKnowledgeClient::new());
    let _ = external_data;
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

#[tokio::test]
async fn health_ready_metrics_endpoints_respond() {
    let app = create_server(test_state());

    for path in ["/health", "/ready", "/metrics"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path} did not return 200");
    }
}

#[tokio::test]
async fn get_session_returns_404_for_unknown_id() {
    let app = build_router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/dd/sessions/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resume_session_returns_404_for_unknown_id() {
    let app = build_router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/dd/sessions/does-not-exist/resume")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"user_input": {"action": "approve"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_session_returns_snapshot_for_created_session() {
    let state = test_state();
    let session_id = state.session_manager.create(
        "user-1",
        "Acme Corp",
        diligence_core::preference_matcher::InstitutionPreferences::default(),
        diligence_core::agents::BpParserInput {
            company_name: "Acme Corp".into(),
            file_bytes: Vec::new(),
            mime: "application/octet-stream".into(),
        },
    );
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/dd/sessions/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot["session_id"], session_id);
    assert_eq!(snapshot["company_name"], "Acme Corp");
}

#[tokio::test]
async fn dd_run_rejects_multipart_missing_required_fields() {
    let app = build_router(test_state());

    let body = "--X-BOUNDARY\r\n\
        Content-Disposition: form-data; name=\"company_name\"\r\n\r\n\
        Acme Corp\r\n\
        --X-BOUNDARY--\r\n";

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/dd/run")
                .header("content-type", "multipart/form-data; boundary=X-BOUNDARY")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
