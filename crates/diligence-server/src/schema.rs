//! Wire frames for the due-diligence orchestrator's client protocol
//! (`spec.md` §6.1): the `/dd/stream` and `/roundtable/stream` WebSocket
//! frames, plus the `/dd/run` and `/dd/sessions/:id` request/response
//! bodies.

use serde::{Deserialize, Serialize};

use diligence_core::model::AgentProfile;

/// The client's opening frame on `/dd/stream`, and the body of a `/dd/run`
/// multipart request's non-file fields.
#[derive(Debug, Clone, Deserialize)]
pub struct StartDdRequest {
    pub company_name: String,
    /// Base64-encoded business plan file, only present on `/dd/stream`
    /// (`/dd/run` instead carries the file as a multipart part).
    #[serde(default)]
    pub bp_file_base64: Option<String>,
    #[serde(default)]
    pub bp_filename: Option<String>,
    pub user_id: String,
}

/// A client frame sent on `/dd/stream` once the server has emitted
/// `hitl_required`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HitlClientFrame {
    Approve {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Revise {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
}

impl HitlClientFrame {
    /// The `user_input` value `SessionManager::resume` expects.
    pub fn into_user_input(self) -> serde_json::Value {
        match self {
            HitlClientFrame::Approve { payload } => serde_json::json!({
                "action": "approve",
                "payload": payload,
            }),
            HitlClientFrame::Revise { payload } => serde_json::json!({
                "action": "revise",
                "payload": payload,
            }),
        }
    }
}

/// Body of `POST /dd/sessions/:id/resume`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeRequest {
    pub user_input: serde_json::Value,
}

/// The `session_snapshot` returned by `GET /dd/sessions/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub company_name: String,
    pub state: diligence_core::model::WorkflowState,
    pub steps: Vec<diligence_core::model::Step>,
    pub error_reason: Option<String>,
}

impl From<diligence_core::model::Session> for SessionSnapshot {
    fn from(session: diligence_core::model::Session) -> Self {
        Self {
            session_id: session.id,
            company_name: session.company_name,
            state: session.state,
            steps: session.steps,
            error_reason: session.error_reason,
        }
    }
}

/// The client's opening frame on `/roundtable/stream`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RoundtableClientFrame {
    StartDiscussion {
        topic: String,
        company_name: String,
        #[serde(default)]
        context: Option<serde_json::Value>,
        #[serde(default)]
        agents: Option<Vec<AgentProfile>>,
        #[serde(default)]
        max_rounds: Option<u32>,
    },
    Intervene {
        content: String,
    },
}

/// Response body for `POST /dd/run`: the final IM, or a terminal error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DdRunResponse {
    Ok {
        preliminary_im: diligence_core::model::PreliminaryIm,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hitl_approve_frame_deserializes() {
        let frame: HitlClientFrame =
            serde_json::from_str(r#"{"action": "approve", "payload": {"ok": true}}"#).unwrap();
        let input = frame.into_user_input();
        assert_eq!(input["action"], "approve");
    }

    #[test]
    fn hitl_revise_frame_without_payload_deserializes() {
        let frame: HitlClientFrame = serde_json::from_str(r#"{"action": "revise"}"#).unwrap();
        let input = frame.into_user_input();
        assert_eq!(input["action"], "revise");
        assert!(input["payload"].is_null());
    }

    #[test]
    fn start_dd_request_without_bp_file_deserializes() {
        let req: StartDdRequest = serde_json::from_str(
            r#"{"company_name": "Acme AI", "user_id": "user-1"}"#,
        )
        .unwrap();
        assert!(req.bp_file_base64.is_none());
        assert_eq!(req.company_name, "Acme AI");
    }

    #[test]
    fn roundtable_start_discussion_deserializes() {
        let frame: RoundtableClientFrame = serde_json::from_str(
            r#"{"action": "start_discussion", "topic": "Should we invest?", "company_name": "Acme AI"}"#,
        )
        .unwrap();
        assert!(matches!(frame, RoundtableClientFrame::StartDiscussion { agents: None, .. }));
    }

    #[test]
    fn roundtable_intervene_deserializes() {
        let frame: RoundtableClientFrame =
            serde_json::from_str(r#"{"action": "intervene", "content": "refocus on risk"}"#)
                .unwrap();
        assert!(matches!(frame, RoundtableClientFrame::Intervene { .. }));
    }
}
