//! Maps `diligence_core::DiligenceError` onto HTTP responses (`spec.md`
//! §7).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diligence_core::DiligenceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-facing error type: wraps every domain error plus the handful of
/// transport-level failures axum's extractors can surface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiligenceServerError {
    #[error(transparent)]
    Domain(#[from] DiligenceError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("invalid base64 in bp_file_base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, DiligenceServerError>;

/// Error body returned to the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl DiligenceServerError {
    fn status(&self) -> StatusCode {
        match self {
            DiligenceServerError::Domain(DiligenceError::SessionNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            DiligenceServerError::Domain(DiligenceError::ServiceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DiligenceServerError::Domain(DiligenceError::InvalidState { .. }) => {
                StatusCode::CONFLICT
            }
            DiligenceServerError::Domain(DiligenceError::PhaseTimeout { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            DiligenceServerError::Domain(DiligenceError::InvalidLlmResponse { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            DiligenceServerError::Domain(DiligenceError::Canceled) => StatusCode::GONE,
            DiligenceServerError::Domain(
                DiligenceError::InternalError(_)
                | DiligenceError::Engine(_)
                | DiligenceError::Http(_)
                | DiligenceError::Serialization(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            DiligenceServerError::InvalidRequest(_) | DiligenceServerError::InvalidBase64(_) => {
                StatusCode::BAD_REQUEST
            }
            DiligenceServerError::Multipart(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for DiligenceServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        tracing::warn!(status = %status, error = %message, "request failed");
        (
            status,
            Json(ErrorResponse {
                error: message,
                status: status.as_u16(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_maps_to_404() {
        let err = DiligenceServerError::Domain(DiligenceError::SessionNotFound("abc".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn service_unavailable_maps_to_503() {
        let err = DiligenceServerError::Domain(DiligenceError::service_unavailable(
            "llm_gateway",
            "timed out",
        ));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_state_maps_to_409() {
        let err = DiligenceServerError::Domain(DiligenceError::InvalidState {
            from: diligence_core::model::WorkflowState::Init,
            to: diligence_core::model::WorkflowState::Completed,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = DiligenceServerError::InvalidRequest("missing company_name".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_response_serializes_status_and_message() {
        let err = DiligenceServerError::Domain(DiligenceError::SessionNotFound("abc".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
