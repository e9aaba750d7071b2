//! HTTP/WebSocket API for the due-diligence orchestrator.
//!
//! Exposes the orchestrator's [`diligence_core::workflow::SessionManager`]
//! over the wire protocol described in `spec.md` §6.1:
//!
//! - `GET /dd/stream` — WebSocket: start a due-diligence run, stream step
//!   events, handle an optional human-in-the-loop round trip.
//! - `POST /dd/run` — multipart request/response: run a session to
//!   completion (or auto-approved) and return the preliminary IM.
//! - `GET /dd/sessions/:id` — fetch a session snapshot.
//! - `POST /dd/sessions/:id/resume` — resume a paused session.
//! - `GET /roundtable/stream` — WebSocket: start a multi-agent roundtable
//!   discussion, stream agent events, accept live interventions.
//! - `GET /health`, `GET /ready`, `GET /metrics` — operational endpoints.
//!
//! # Quick Start
//!
//! ```ignore
//! use diligence_server::{create_server, handler::AppState};
//!
//! let state: AppState = /* build session manager, config, llm gateway */;
//! let app = create_server(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! ```

pub mod error;
pub mod handler;
pub mod metrics;
pub mod schema;
pub mod server;

pub use error::{DiligenceServerError, Result};
pub use handler::AppState;
pub use schema::{
    DdRunResponse, HitlClientFrame, ResumeRequest, RoundtableClientFrame, SessionSnapshot,
    StartDdRequest,
};
pub use server::{build_router, create_server, create_server_with_cors};
