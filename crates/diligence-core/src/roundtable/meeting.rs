use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::{MeetingEndReason, MeetingOutcome, Message, MessageKind};

use super::agent::RoundtableAgent;
use super::bus::MessageBus;

const DEFAULT_MAX_ROUNDS: u32 = 5;
const MAX_TOTAL_MESSAGES: u64 = 200;
const MAX_MEETING_DURATION: Duration = Duration::from_secs(30 * 60);
/// How much of the bus history each agent sees as "recent discussion".
const HISTORY_TAIL_LEN: usize = 20;

/// An event surfaced to external subscribers while a meeting runs (wired
/// into `diligence-server`'s `/roundtable/stream` endpoint).
#[derive(Debug, Clone)]
pub enum MeetingEvent {
    AgentsReady { agent_names: Vec<String> },
    AgentEvent { agent_name: String, message: Message },
    DiscussionComplete { outcome: MeetingOutcome },
}

/// Orthogonal to the DD workflow (`spec.md` §4.6): a turn-based multi-agent
/// conversation over a shared [`MessageBus`].
pub struct RoundtableMeeting {
    bus: Arc<MessageBus>,
    agents: Vec<RoundtableAgent>,
    max_rounds: u32,
    /// An externally injected `external_intervention` message, taken and
    /// inserted before the next agent's turn.
    pending_intervention: Mutex<Option<String>>,
}

impl RoundtableMeeting {
    pub fn new(agents: Vec<RoundtableAgent>, max_rounds: Option<u32>) -> Self {
        let bus = Arc::new(MessageBus::new());
        for agent in &agents {
            bus.register_agent(&agent.profile.name);
        }
        Self {
            bus,
            agents,
            max_rounds: max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
            pending_intervention: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    /// `spec.md` §4.6 "External intervention": queues a message addressed to
    /// "ALL" to be inserted before the next agent's turn.
    pub fn inject_intervention(&self, content: impl Into<String>) {
        *self.pending_intervention.lock() = Some(content.into());
    }

    /// Runs the meeting to completion, streaming [`MeetingEvent`]s on
    /// `event_tx` as they occur.
    pub async fn run(&self, topic: &str, event_tx: mpsc::Sender<MeetingEvent>) -> MeetingOutcome {
        let _ = event_tx
            .send(MeetingEvent::AgentsReady {
                agent_names: self.agents.iter().map(|a| a.profile.name.clone()).collect(),
            })
            .await;

        let started_at = Instant::now();
        let mut per_agent_counts: HashMap<String, u64> = HashMap::new();
        let mut rounds_completed = 0;
        let mut end_reason = MeetingEndReason::MaxRoundsReached;

        'rounds: for round in 0..self.max_rounds {
            for agent in &self.agents {
                if let Some(content) = self.pending_intervention.lock().take() {
                    let intervention = self.bus.publish(Message {
                        id: 0,
                        kind: MessageKind::ExternalIntervention,
                        sender: "external".to_string(),
                        recipient: Some("ALL".to_string()),
                        content,
                        timestamp: chrono::Utc::now(),
                        parent_id: None,
                    });
                    let _ = event_tx
                        .send(MeetingEvent::AgentEvent { agent_name: "external".to_string(), message: intervention })
                        .await;
                }

                if started_at.elapsed() >= MAX_MEETING_DURATION {
                    end_reason = MeetingEndReason::MaxDurationReached;
                    break 'rounds;
                }
                if self.bus.message_count() >= MAX_TOTAL_MESSAGES {
                    end_reason = MeetingEndReason::MaxMessagesReached;
                    break 'rounds;
                }

                let history_tail = tail(&self.bus.history(), HISTORY_TAIL_LEN);
                let mailbox = self.bus.drain_mailbox(&agent.profile.name);
                let drafted = agent.think_and_act(topic, &history_tail, &mailbox).await;

                let mut leader_concluded = false;
                for draft in drafted {
                    if self.bus.message_count() >= MAX_TOTAL_MESSAGES {
                        break;
                    }
                    let is_conclusion = agent.profile.is_leader
                        && draft.content.to_lowercase().contains("conclusion");
                    let published = self.bus.publish(draft);
                    *per_agent_counts.entry(agent.profile.name.clone()).or_insert(0) += 1;
                    let _ = event_tx
                        .send(MeetingEvent::AgentEvent { agent_name: agent.profile.name.clone(), message: published })
                        .await;
                    if is_conclusion {
                        leader_concluded = true;
                    }
                }

                if leader_concluded {
                    end_reason = MeetingEndReason::LeaderConcluded;
                    rounds_completed = round + 1;
                    break 'rounds;
                }
            }
            rounds_completed = round + 1;
        }

        let outcome = MeetingOutcome {
            end_reason,
            rounds_completed,
            message_count: self.bus.message_count(),
            summary: format!(
                "{rounds_completed} round(s), {} message(s), ended via {end_reason:?}",
                self.bus.message_count()
            ),
        };

        let _ = event_tx.send(MeetingEvent::DiscussionComplete { outcome: outcome.clone() }).await;
        outcome
    }
}

fn tail(history: &[Message], n: usize) -> Vec<Message> {
    let start = history.len().saturating_sub(n);
    history[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentProfile;
    use crate::service_clients::GenerationConfig;
    use async_trait::async_trait;

    struct ScriptedLlm {
        conclude: bool,
    }

    #[async_trait]
    impl crate::service_clients::LlmGatewayClient for ScriptedLlm {
        async fn generate(&self, _: &str, _: &GenerationConfig) -> crate::error::Result<String> {
            if self.conclude {
                Ok(r#"{"messages": [{"kind": "conclusion", "recipient": "ALL", "content": "conclusion: we are done"}]}"#.to_string())
            } else {
                Ok(r#"{"messages": [{"kind": "broadcast", "recipient": "ALL", "content": "thinking out loud"}]}"#.to_string())
            }
        }
        async fn generate_with_file(&self, _: &str, _: &[u8], _: &str, _: &GenerationConfig) -> crate::error::Result<String> {
            unimplemented!()
        }
        async fn generate_with_tools(
            &self,
            _: &str,
            _: &[crate::service_clients::ToolSpec],
            _: u32,
            _: &GenerationConfig,
        ) -> crate::error::Result<crate::service_clients::ToolUseResult> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn meeting_terminates_after_max_rounds_without_conclusion() {
        let llm: Arc<dyn crate::service_clients::LlmGatewayClient> = Arc::new(ScriptedLlm { conclude: false });
        let agents = vec![
            RoundtableAgent::new(AgentProfile::new("team-agent", "Team Analyst", "assess the team"), Arc::clone(&llm), GenerationConfig::default()),
            RoundtableAgent::new(AgentProfile::new("market-agent", "Market Analyst", "assess the market"), llm, GenerationConfig::default()),
        ];
        let meeting = RoundtableMeeting::new(agents, Some(2));
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = meeting.run("Should we invest in Acme AI?", tx).await;

        assert_eq!(outcome.rounds_completed, 2);
        assert_eq!(outcome.end_reason, MeetingEndReason::MaxRoundsReached);

        let mut saw_agents_ready = false;
        let mut saw_complete = false;
        while let Some(event) = rx.recv().await {
            match event {
                MeetingEvent::AgentsReady { .. } => saw_agents_ready = true,
                MeetingEvent::DiscussionComplete { .. } => saw_complete = true,
                MeetingEvent::AgentEvent { .. } => {}
            }
        }
        assert!(saw_agents_ready);
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn leader_conclusion_ends_meeting_early() {
        let llm: Arc<dyn crate::service_clients::LlmGatewayClient> = Arc::new(ScriptedLlm { conclude: true });
        let agents = vec![RoundtableAgent::new(
            AgentProfile::new("lead", "Lead Analyst", "run the meeting").as_leader(),
            llm,
            GenerationConfig::default(),
        )];
        let meeting = RoundtableMeeting::new(agents, Some(5));
        let (tx, _rx) = mpsc::channel(64);
        let outcome = meeting.run("Should we invest in Acme AI?", tx).await;
        assert_eq!(outcome.end_reason, MeetingEndReason::LeaderConcluded);
        assert!(outcome.rounds_completed <= 5);
    }

    #[tokio::test]
    async fn intervention_is_inserted_before_next_turn() {
        let llm: Arc<dyn crate::service_clients::LlmGatewayClient> = Arc::new(ScriptedLlm { conclude: false });
        let agents = vec![
            RoundtableAgent::new(AgentProfile::new("team-agent", "Team Analyst", "assess the team"), Arc::clone(&llm), GenerationConfig::default()),
            RoundtableAgent::new(AgentProfile::new("lead", "Lead Analyst", "run the meeting").as_leader(), llm, GenerationConfig::default()),
        ];
        let meeting = RoundtableMeeting::new(agents, Some(1));
        meeting.inject_intervention("please refocus on financial risk");
        let (tx, _rx) = mpsc::channel(64);
        meeting.run("Should we invest in Acme AI?", tx).await;

        let history = meeting.bus().history();
        assert!(history.iter().any(|m| m.kind == MessageKind::ExternalIntervention));
    }
}
