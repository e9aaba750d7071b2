use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiligenceError>;

/// Domain-level error type for the due-diligence workflow (`spec.md` §7).
///
/// `PreferenceMismatch` is deliberately absent here: a preference mismatch
/// is a successful terminal outcome (`Recommendation::Abort`), not an
/// error, per the spec's own framing.
#[derive(Debug, Error)]
pub enum DiligenceError {
    #[error("{service} is unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("invalid response from LLM gateway for {call}: {reason}")]
    InvalidLlmResponse { call: String, reason: String },

    #[error("invalid state transition: cannot go from {from:?} to {to:?}")]
    InvalidState {
        from: crate::model::WorkflowState,
        to: crate::model::WorkflowState,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("phase {phase:?} exceeded its timeout of {timeout:?}")]
    PhaseTimeout {
        phase: crate::model::WorkflowState,
        timeout: Duration,
    },

    #[error("session was canceled")]
    Canceled,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Engine(#[from] diligence_engine::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl DiligenceError {
    pub fn service_unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_llm_response(call: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLlmResponse {
            call: call.into(),
            reason: reason.into(),
        }
    }

    /// Whether an agent encountering this error should fall back to a
    /// degraded output rather than propagate (`spec.md` §4.3 step 5).
    pub fn is_fallback_recoverable(&self) -> bool {
        matches!(
            self,
            DiligenceError::ServiceUnavailable { .. } | DiligenceError::InvalidLlmResponse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_unavailable_is_fallback_recoverable() {
        let err = DiligenceError::service_unavailable("llm_gateway", "timed out");
        assert!(err.is_fallback_recoverable());
    }

    #[test]
    fn invalid_state_is_not_fallback_recoverable() {
        let err = DiligenceError::InvalidState {
            from: crate::model::WorkflowState::Init,
            to: crate::model::WorkflowState::Completed,
        };
        assert!(!err.is_fallback_recoverable());
    }

    #[test]
    fn session_not_found_renders_id() {
        let err = DiligenceError::SessionNotFound("abc-123".to_string());
        assert!(err.to_string().contains("abc-123"));
    }
}
