use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use diligence_engine::constants::DEFAULT_EVENT_BUFFER_CAPACITY;
use crate::model::{PreliminaryIm, Step, StepStatus};

/// Progress events emitted by the state machine (`spec.md` §4.4 "Progress
/// events").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    StepStart {
        session_id: String,
        step_index: u32,
        title: String,
    },
    StepComplete {
        session_id: String,
        step_index: u32,
        status: StepStatus,
        result_digest: Option<String>,
    },
    HitlRequired {
        session_id: String,
        draft_im: Box<PreliminaryIm>,
    },
    WorkflowComplete {
        session_id: String,
        preliminary_im: Option<Box<PreliminaryIm>>,
        error: Option<String>,
    },
    /// Terminal event sent to a subscriber whose buffer overflowed
    /// (`spec.md` §4.5); the subscriber is dropped immediately after.
    BufferOverflow {
        session_id: String,
    },
}

impl WorkflowEvent {
    pub fn session_id(&self) -> &str {
        match self {
            WorkflowEvent::StepStart { session_id, .. }
            | WorkflowEvent::StepComplete { session_id, .. }
            | WorkflowEvent::HitlRequired { session_id, .. }
            | WorkflowEvent::WorkflowComplete { session_id, .. }
            | WorkflowEvent::BufferOverflow { session_id } => session_id,
        }
    }

    /// Builds the synthetic `StepStart`/`StepComplete` pair representing a
    /// step's current recorded state, for replay to late subscribers
    /// (`spec.md` §4.5, §6.3 "late subscribers receive the step snapshot").
    fn replay_for(session_id: &str, step: &Step) -> Vec<WorkflowEvent> {
        let mut events = vec![WorkflowEvent::StepStart {
            session_id: session_id.to_string(),
            step_index: step.index,
            title: step.title.clone(),
        }];
        if matches!(step.status, StepStatus::Success | StepStatus::Error | StepStatus::Paused) {
            events.push(WorkflowEvent::StepComplete {
                session_id: session_id.to_string(),
                step_index: step.index,
                status: step.status,
                result_digest: step.result.as_ref().map(|_| "replayed".to_string()),
            });
        }
        events
    }
}

/// Per-session `tokio::sync::broadcast` publish/subscribe with a bounded
/// per-subscriber relay (`spec.md` §4.5, `SPEC_FULL.md` §4.5).
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<WorkflowEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    fn sender_for(&self, session_id: &str) -> broadcast::Sender<WorkflowEvent> {
        self.channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(DEFAULT_EVENT_BUFFER_CAPACITY).0)
            .clone()
    }

    /// Publishes an event; silently succeeds even with zero subscribers.
    pub fn publish(&self, event: WorkflowEvent) {
        let sender = self.sender_for(event.session_id());
        let _ = sender.send(event);
    }

    /// Subscribes to a session's events. `steps_snapshot` is the session's
    /// current `steps` list at subscribe time; it is replayed as synthetic
    /// `StepStart`/`StepComplete` events before any live event, so a
    /// subscriber that joins after the workflow has already progressed
    /// still sees the full history (`spec.md` §4.5, §6.3 "late subscribers
    /// receive the step snapshot"). Returns a bounded `mpsc` receiver fed by
    /// a relay task; if the caller falls behind, a `BufferOverflow` event is
    /// delivered (best-effort) and the relay stops.
    pub fn subscribe(&self, session_id: &str, steps_snapshot: &[Step]) -> mpsc::Receiver<WorkflowEvent> {
        let mut broadcast_rx = self.sender_for(session_id).subscribe();
        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_BUFFER_CAPACITY);
        let session_id = session_id.to_string();
        let replay: Vec<WorkflowEvent> = steps_snapshot
            .iter()
            .flat_map(|step| WorkflowEvent::replay_for(&session_id, step))
            .collect();

        tokio::spawn(async move {
            for event in replay {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        let is_terminal = matches!(event, WorkflowEvent::WorkflowComplete { .. });
                        if tx.try_send(event).is_err() {
                            let _ = tx
                                .try_send(WorkflowEvent::BufferOverflow { session_id: session_id.clone() });
                            tracing::warn!(session_id, "event subscriber buffer overflowed, dropping");
                            break;
                        }
                        if is_terminal {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(session_id, skipped, "event subscriber lagged, dropping");
                        let _ = tx.try_send(WorkflowEvent::BufferOverflow { session_id: session_id.clone() });
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("session-1", &[]);

        bus.publish(WorkflowEvent::StepStart {
            session_id: "session-1".into(),
            step_index: 0,
            title: "Parsing business plan".into(),
        });
        bus.publish(WorkflowEvent::StepComplete {
            session_id: "session-1".into(),
            step_index: 0,
            status: StepStatus::Success,
            result_digest: None,
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, WorkflowEvent::StepStart { step_index: 0, .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, WorkflowEvent::StepComplete { step_index: 0, .. }));
    }

    #[tokio::test]
    async fn late_subscriber_receives_a_snapshot_replay_of_past_events() {
        let bus = EventBus::new();
        bus.publish(WorkflowEvent::StepStart {
            session_id: "session-2".into(),
            step_index: 0,
            title: "Parsing business plan".into(),
        });

        let mut completed_step = Step::new(0, "Parsing business plan");
        completed_step.succeed(serde_json::json!({"ok": true}), false);
        let mut rx = bus.subscribe("session-2", &[completed_step]);

        let replayed_start = rx.recv().await.unwrap();
        assert!(matches!(replayed_start, WorkflowEvent::StepStart { step_index: 0, .. }));
        let replayed_complete = rx.recv().await.unwrap();
        assert!(matches!(replayed_complete, WorkflowEvent::StepComplete { step_index: 0, .. }));

        bus.publish(WorkflowEvent::StepComplete {
            session_id: "session-2".into(),
            step_index: 1,
            status: StepStatus::Success,
            result_digest: None,
        });
        let live_event = rx.recv().await.unwrap();
        assert!(matches!(live_event, WorkflowEvent::StepComplete { step_index: 1, .. }));
    }

    #[tokio::test]
    async fn subscriber_with_no_prior_steps_gets_only_live_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("session-3", &[]);
        bus.publish(WorkflowEvent::StepStart {
            session_id: "session-3".into(),
            step_index: 0,
            title: "Parsing business plan".into(),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, WorkflowEvent::StepStart { step_index: 0, .. }));
    }
}
