//! Route handlers implementing `spec.md` §6.1's client protocol over axum.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use tokio::sync::mpsc;

use diligence_core::agents::BpParserInput;
use diligence_core::model::AgentProfile;
use diligence_core::preference_matcher::InstitutionPreferences;
use diligence_core::roundtable::{MeetingEvent, RoundtableAgent, RoundtableMeeting};
use diligence_core::service_clients::{GenerationConfig, LlmGatewayClient};
use diligence_core::workflow::{SessionManager, WorkflowEvent};
use diligence_core::DiligenceConfig;

use crate::error::{DiligenceServerError, Result};
use crate::schema::{
    DdRunResponse, HitlClientFrame, ResumeRequest, RoundtableClientFrame, SessionSnapshot,
    StartDdRequest,
};

/// Shared process state, built once at startup from `DiligenceConfig` and
/// handed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub config: Arc<DiligenceConfig>,
    pub llm_gateway: Arc<dyn LlmGatewayClient>,
}

fn mime_for(filename: Option<&str>) -> String {
    match filename.and_then(|name| name.rsplit('.').next()) {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> bool {
    socket.send(Message::Text(value.to_string())).await.is_ok()
}

async fn send_error_frame(socket: &mut WebSocket, message: &str) {
    let _ = send_json(socket, &serde_json::json!({"type": "error", "error": message})).await;
}

/// `GET /dd/stream` — see `spec.md` §6.1 "Start (streaming)".
pub async fn dd_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_dd_stream(socket, state))
}

async fn handle_dd_stream(mut socket: WebSocket, state: AppState) {
    crate::metrics::record_websocket_connection("/dd/stream", 1);
    run_dd_stream(&mut socket, &state).await;
    crate::metrics::record_websocket_connection("/dd/stream", -1);
}

async fn run_dd_stream(socket: &mut WebSocket, state: &AppState) {
    let start: StartDdRequest = match socket.recv().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
            Ok(req) => req,
            Err(err) => {
                send_error_frame(socket, &err.to_string()).await;
                return;
            }
        },
        _ => return,
    };

    let file_bytes = match start.bp_file_base64.as_deref() {
        Some(encoded) => match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(err) => {
                send_error_frame(socket, &err.to_string()).await;
                return;
            }
        },
        None => Vec::new(),
    };
    let mime = mime_for(start.bp_filename.as_deref());

    let bp_input = BpParserInput {
        company_name: start.company_name.clone(),
        file_bytes,
        mime,
    };

    let session_id = state.session_manager.create(
        start.user_id,
        start.company_name,
        InstitutionPreferences::default(),
        bp_input,
    );
    crate::metrics::record_session_created("stream");

    let mut events = match state.session_manager.subscribe(&session_id) {
        Ok(rx) => rx,
        Err(err) => {
            send_error_frame(socket, &err.to_string()).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(WorkflowEvent::HitlRequired { draft_im, .. }) => {
                        let frame = serde_json::json!({"type": "hitl_required", "draft_im": draft_im});
                        if !send_json(socket, &frame).await {
                            return;
                        }
                        match socket.recv().await {
                            Some(Ok(Message::Text(text))) => match serde_json::from_str::<HitlClientFrame>(&text) {
                                Ok(hitl_frame) => {
                                    let _ = state
                                        .session_manager
                                        .resume(&session_id, hitl_frame.into_user_input());
                                }
                                Err(err) => {
                                    send_error_frame(socket, &err.to_string()).await;
                                    return;
                                }
                            },
                            _ => return,
                        }
                    }
                    Some(other) => {
                        let terminal = matches!(other, WorkflowEvent::WorkflowComplete { .. });
                        let payload = serde_json::to_value(&other).unwrap_or_default();
                        if !send_json(socket, &payload).await {
                            return;
                        }
                        if terminal {
                            let _ = socket.close().await;
                            return;
                        }
                    }
                    None => return,
                }
            }
            incoming = socket.recv() => {
                if matches!(incoming, None | Some(Ok(Message::Close(_)))) {
                    return;
                }
            }
        }
    }
}

/// `POST /dd/run` — see `spec.md` §6.1 "Start (request/response)". Runs the
/// same workflow as `/dd/stream` but buffers events internally and returns
/// only the terminal result.
///
/// There is no interactive client mid-flight in this mode, so a
/// `HITL_REVIEW` pause is auto-approved rather than left to hang forever —
/// `spec.md` §6.1 only documents the HITL round-trip for the streaming
/// transport.
pub async fn dd_run_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DdRunResponse>> {
    let mut company_name = None;
    let mut user_id = None;
    let mut bp_filename = None;
    let mut bp_file_bytes = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("company_name") => company_name = Some(field.text().await?),
            Some("user_id") => user_id = Some(field.text().await?),
            Some("bp_file") => {
                bp_filename = field.file_name().map(str::to_string);
                bp_file_bytes = field.bytes().await?.to_vec();
            }
            _ => {}
        }
    }

    let company_name = company_name
        .ok_or_else(|| DiligenceServerError::InvalidRequest("missing company_name".into()))?;
    let user_id =
        user_id.ok_or_else(|| DiligenceServerError::InvalidRequest("missing user_id".into()))?;

    let bp_input = BpParserInput {
        company_name: company_name.clone(),
        file_bytes: bp_file_bytes,
        mime: mime_for(bp_filename.as_deref()),
    };

    let session_id = state.session_manager.create(
        user_id,
        company_name,
        InstitutionPreferences::default(),
        bp_input,
    );
    crate::metrics::record_session_created("run");
    let mut events = state.session_manager.subscribe(&session_id)?;

    loop {
        match events.recv().await {
            Some(WorkflowEvent::WorkflowComplete { preliminary_im: Some(im), .. }) => {
                crate::metrics::record_request("/dd/run", 200);
                return Ok(Json(DdRunResponse::Ok { preliminary_im: *im }));
            }
            Some(WorkflowEvent::WorkflowComplete { error: Some(error), .. }) => {
                crate::metrics::record_request("/dd/run", 200);
                return Ok(Json(DdRunResponse::Error { error }));
            }
            Some(WorkflowEvent::WorkflowComplete { .. }) => {
                return Ok(Json(DdRunResponse::Error {
                    error: "workflow completed without a result".to_string(),
                }));
            }
            Some(WorkflowEvent::HitlRequired { .. }) => {
                let _ = state.session_manager.resume(
                    &session_id,
                    serde_json::json!({"action": "approve", "payload": null}),
                );
            }
            Some(_) => continue,
            None => {
                return Err(DiligenceServerError::InvalidRequest(
                    "session event stream closed unexpectedly".to_string(),
                ))
            }
        }
    }
}

/// `GET /dd/sessions/:id` — see `spec.md` §6.1 "Get session".
pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    let session = state.session_manager.get(&session_id)?;
    Ok(Json(session.into()))
}

/// `POST /dd/sessions/:id/resume` — see `spec.md` §6.1 "Resume session".
pub async fn resume_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Result<StatusCode> {
    state.session_manager.resume(&session_id, req.user_input)?;
    Ok(StatusCode::ACCEPTED)
}

/// The roundtable participants used when a `start_discussion` frame omits
/// `agents` — one seat per analysis domain `spec.md` §4.3 names, plus a
/// leader who can conclude the meeting.
fn default_roundtable_roster() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("team-analyst", "Team Analyst", "Assess the founding team's experience and track record.").as_leader(),
        AgentProfile::new("market-analyst", "Market Analyst", "Assess the target market size and competitive landscape."),
        AgentProfile::new("risk-analyst", "Risk & DDQ Analyst", "Surface open risks and due-diligence questions."),
        AgentProfile::new("valuation-analyst", "Valuation Analyst", "Weigh in on a reasonable valuation range."),
        AgentProfile::new("exit-analyst", "Exit Analyst", "Assess plausible exit paths."),
    ]
}

fn meeting_event_frame(event: &MeetingEvent) -> serde_json::Value {
    match event {
        MeetingEvent::AgentsReady { agent_names } => serde_json::json!({
            "type": "agents_ready",
            "agent_names": agent_names,
        }),
        MeetingEvent::AgentEvent { agent_name, message } => {
            let event_type = if matches!(message.kind, diligence_core::model::MessageKind::Thinking) {
                "thinking"
            } else {
                "message"
            };
            serde_json::json!({
                "type": "agent_event",
                "agent_name": agent_name,
                "event_type": event_type,
                "message": message.content,
                "recipient": message.recipient,
                "message_type": message.kind,
                "timestamp": message.timestamp,
            })
        }
        MeetingEvent::DiscussionComplete { outcome } => serde_json::json!({
            "type": "discussion_complete",
            "summary": outcome,
        }),
    }
}

/// `GET /roundtable/stream` — see `spec.md` §6.1 "Roundtable" /
/// "Roundtable intervention".
pub async fn roundtable_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_roundtable_stream(socket, state))
}

async fn handle_roundtable_stream(mut socket: WebSocket, state: AppState) {
    crate::metrics::record_websocket_connection("/roundtable/stream", 1);
    run_roundtable_stream(&mut socket, state).await;
    crate::metrics::record_websocket_connection("/roundtable/stream", -1);
}

async fn run_roundtable_stream(socket: &mut WebSocket, state: AppState) {
    let first_frame: RoundtableClientFrame = match socket.recv().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(err) => {
                send_error_frame(socket, &err.to_string()).await;
                return;
            }
        },
        _ => return,
    };

    let (topic, company_name, profiles, max_rounds) = match first_frame {
        RoundtableClientFrame::StartDiscussion { topic, company_name, agents, max_rounds, .. } => {
            (topic, company_name, agents.unwrap_or_else(default_roundtable_roster), max_rounds)
        }
        RoundtableClientFrame::Intervene { .. } => {
            send_error_frame(socket, "expected a start_discussion frame first").await;
            return;
        }
    };

    let generation_config = GenerationConfig {
        model_id: state.config.llm_model_id.clone(),
        ..Default::default()
    };
    let agents: Vec<RoundtableAgent> = profiles
        .into_iter()
        .map(|profile| RoundtableAgent::new(profile, Arc::clone(&state.llm_gateway), generation_config.clone()))
        .collect();

    let meeting = Arc::new(RoundtableMeeting::new(agents, max_rounds));
    let (tx, mut rx) = mpsc::channel(64);

    let run_meeting = Arc::clone(&meeting);
    let topic = format!("{topic} ({company_name})");
    let run_handle = tokio::spawn(async move { run_meeting.run(&topic, tx).await });

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        let terminal = matches!(event, MeetingEvent::DiscussionComplete { .. });
                        if !send_json(socket, &meeting_event_frame(&event)).await {
                            break;
                        }
                        if terminal {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(RoundtableClientFrame::Intervene { content }) = serde_json::from_str(&text) {
                            meeting.inject_intervention(content);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = run_handle.await;
    let _ = socket.close().await;
}

pub async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn ready_handler() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn metrics_handler() -> impl IntoResponse {
    match crate::metrics::export() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_for_pdf_extension() {
        assert_eq!(mime_for(Some("plan.pdf")), "application/pdf");
    }

    #[test]
    fn mime_for_unknown_extension_defaults_to_octet_stream() {
        assert_eq!(mime_for(Some("plan.xyz")), "application/octet-stream");
    }

    #[test]
    fn mime_for_missing_filename_defaults_to_octet_stream() {
        assert_eq!(mime_for(None), "application/octet-stream");
    }

    #[test]
    fn default_roundtable_roster_has_one_leader() {
        let roster = default_roundtable_roster();
        assert_eq!(roster.iter().filter(|p| p.is_leader).count(), 1);
        assert!(!roster.is_empty());
    }

    #[test]
    fn meeting_event_frame_tags_thinking_messages() {
        let message = diligence_core::model::Message {
            id: 1,
            kind: diligence_core::model::MessageKind::Thinking,
            sender: "team-analyst".to_string(),
            recipient: None,
            content: "considering...".to_string(),
            timestamp: chrono::Utc::now(),
            parent_id: None,
        };
        let frame = meeting_event_frame(&MeetingEvent::AgentEvent {
            agent_name: "team-analyst".to_string(),
            message,
        });
        assert_eq!(frame["event_type"], "thinking");
    }
}
