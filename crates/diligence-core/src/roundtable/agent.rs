use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::model::{AgentProfile, Message, MessageKind};
use crate::service_clients::{GenerationConfig, LlmGatewayClient};

/// Messages per turn are capped at this value to bound verbosity
/// (`spec.md` §4.6, default K=3).
pub const MAX_MESSAGES_PER_TURN: usize = 3;

/// Per-LLM-call budget for a roundtable turn (`spec.md` §4.6).
const TURN_LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RawEmittedMessage {
    kind: String,
    recipient: Option<String>,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RawTurnOutput {
    #[serde(default)]
    messages: Vec<RawEmittedMessage>,
}

fn parse_kind(raw: &str) -> MessageKind {
    match raw.to_lowercase().as_str() {
        "direct" => MessageKind::Direct,
        "privatechat" | "private_chat" => MessageKind::PrivateChat,
        "question" => MessageKind::Question,
        "reply" => MessageKind::Reply,
        "agree" => MessageKind::Agree,
        "disagree" => MessageKind::Disagree,
        "thinking" => MessageKind::Thinking,
        "conclusion" | "broadcast" | _ => MessageKind::Broadcast,
    }
}

/// One seat at the roundtable: a profile plus the LLM client it reasons
/// with. Per `spec.md` §4.6, the agent code never interprets message
/// content — only the typed `kind`/`recipient` fields it emits.
pub struct RoundtableAgent {
    pub profile: AgentProfile,
    llm: Arc<dyn LlmGatewayClient>,
    config: GenerationConfig,
}

impl RoundtableAgent {
    pub fn new(profile: AgentProfile, llm: Arc<dyn LlmGatewayClient>, config: GenerationConfig) -> Self {
        Self { profile, llm, config }
    }

    /// Given the tail of the bus history and this agent's own mailbox,
    /// decides what to say this turn. Never raises: an LLM failure yields
    /// zero messages for the turn.
    #[tracing::instrument(skip(self, history_tail, mailbox), fields(agent = %self.profile.name))]
    pub async fn think_and_act(&self, topic: &str, history_tail: &[Message], mailbox: &[Message]) -> Vec<Message> {
        let history_text = history_tail
            .iter()
            .map(|m| format!("[{}] {} -> {:?}: {}", m.id, m.sender, m.recipient, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let mailbox_text = mailbox
            .iter()
            .map(|m| format!("[{}] {}: {}", m.id, m.sender, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "{}\n\nTopic: {topic}\n\nRecent discussion:\n{history_text}\n\nYour mailbox:\n{mailbox_text}\n\n\
             Emit 0 to {MAX_MESSAGES_PER_TURN} messages as a JSON object: \
             {{\"messages\": [{{\"kind\": string, \"recipient\": string|null, \"content\": string}}]}}. \
             Valid kinds: broadcast, direct, privatechat, question, reply, agree, disagree, thinking, conclusion.",
            self.profile.persona_prompt,
        );

        let raw_response = match tokio::time::timeout(TURN_LLM_TIMEOUT, self.llm.generate(&prompt, &self.config)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "roundtable turn LLM call failed, emitting no messages");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("roundtable turn LLM call exceeded its 60s budget");
                return Vec::new();
            }
        };

        let parsed: RawTurnOutput = match crate::agents::extract_json_object(&raw_response)
            .and_then(|s| serde_json::from_str(s).ok())
        {
            Some(parsed) => parsed,
            None => return Vec::new(),
        };

        parsed
            .messages
            .into_iter()
            .take(MAX_MESSAGES_PER_TURN)
            .map(|raw| Message {
                id: 0,
                kind: parse_kind(&raw.kind),
                sender: self.profile.name.clone(),
                recipient: raw.recipient,
                content: raw.content,
                timestamp: chrono::Utc::now(),
                parent_id: None,
            })
            .collect()
    }
}
