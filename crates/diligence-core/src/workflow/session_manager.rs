use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, oneshot, watch};

use crate::agents::BpParserInput;
use crate::error::{DiligenceError, Result};
use crate::model::{Session, WorkflowState};
use crate::preference_matcher::InstitutionPreferences;

use super::event_bus::{EventBus, WorkflowEvent};
use super::state_machine::{DdWorkflow, HitlResumeInput};

struct SessionHandle {
    session: Arc<SyncMutex<Session>>,
    cancel_tx: watch::Sender<bool>,
    hitl_resume_tx: SyncMutex<Option<oneshot::Sender<HitlResumeInput>>>,
}

/// `spec.md` §4.5: create/get/subscribe/resume over opaque session ids,
/// enforcing the single-active-transition invariant per session.
pub struct SessionManager {
    sessions: DashMap<String, Arc<SessionHandle>>,
    events: Arc<EventBus>,
    workflow: Arc<DdWorkflow>,
}

impl SessionManager {
    pub fn new(workflow: Arc<DdWorkflow>) -> Self {
        Self {
            sessions: DashMap::new(),
            events: Arc::new(EventBus::new()),
            workflow,
        }
    }

    /// `spec.md` §4.5 `create(initial_request) -> session_id`. Spawns the DD
    /// workflow on its own task; returns immediately with the new id.
    pub fn create(
        &self,
        user_id: impl Into<String>,
        company_name: impl Into<String>,
        prefs: InstitutionPreferences,
        bp_input: BpParserInput,
    ) -> String {
        let session = Session::new(user_id, company_name);
        let session_id = session.id.clone();
        let session = Arc::new(SyncMutex::new(session));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (hitl_tx, hitl_rx) = oneshot::channel();

        let handle = Arc::new(SessionHandle {
            session: Arc::clone(&session),
            cancel_tx,
            hitl_resume_tx: SyncMutex::new(Some(hitl_tx)),
        });
        self.sessions.insert(session_id.clone(), Arc::clone(&handle));

        let workflow = Arc::clone(&self.workflow);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            workflow.run(session, prefs, bp_input, events, cancel_rx, hitl_rx).await;
        });

        session_id
    }

    /// `spec.md` §4.5 `get(session_id) -> session | not_found`.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.session.lock().clone())
            .ok_or_else(|| DiligenceError::SessionNotFound(session_id.to_string()))
    }

    /// `spec.md` §4.5 `subscribe(session_id) -> event_stream`. The returned
    /// receiver first replays a snapshot of steps to date (as synthetic
    /// `StepStart`/`StepComplete` events), then live events.
    pub fn subscribe(&self, session_id: &str) -> Result<mpsc::Receiver<WorkflowEvent>> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| DiligenceError::SessionNotFound(session_id.to_string()))?;
        let steps_snapshot = handle.session.lock().steps.clone();
        Ok(self.events.subscribe(session_id, &steps_snapshot))
    }

    /// `spec.md` §4.5 `resume(session_id, user_input)`. Valid only when the
    /// session is in `HITL_REVIEW`; a second resume attempt fails with
    /// `invalid_state` (`spec.md` §8 idempotence property).
    pub fn resume(&self, session_id: &str, user_input: serde_json::Value) -> Result<()> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| DiligenceError::SessionNotFound(session_id.to_string()))?;

        let current_state = handle.session.lock().state;
        if current_state != WorkflowState::HitlReview {
            return Err(DiligenceError::InvalidState {
                from: current_state,
                to: WorkflowState::Completed,
            });
        }

        let sender = handle.hitl_resume_tx.lock().take();
        match sender {
            Some(sender) => {
                let _ = sender.send(HitlResumeInput { user_input });
                Ok(())
            }
            None => Err(DiligenceError::InvalidState {
                from: current_state,
                to: WorkflowState::Completed,
            }),
        }
    }

    /// Cancels an in-flight session (`spec.md` §5 "Cancellation").
    pub fn cancel(&self, session_id: &str) -> Result<()> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| DiligenceError::SessionNotFound(session_id.to_string()))?;
        let _ = handle.cancel_tx.send(true);
        Ok(())
    }
}
