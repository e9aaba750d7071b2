use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `spec.md` §3 "Roundtable": the kind of a single message on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Broadcast,
    Direct,
    PrivateChat,
    Question,
    Reply,
    Agree,
    Disagree,
    Thinking,
    ExternalIntervention,
}

impl MessageKind {
    /// Direct/private/reply message kinds require a concrete `recipient`;
    /// the others are addressed to the whole table.
    pub fn requires_recipient(&self) -> bool {
        matches!(
            self,
            MessageKind::Direct | MessageKind::PrivateChat | MessageKind::Reply
        )
    }
}

/// A single roundtable message. `id` is assigned by the bus in strictly
/// increasing order and is the only ordering guarantee callers may rely on
/// (`spec.md` §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub kind: MessageKind,
    pub sender: String,
    pub recipient: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// The message this one replies to, if any.
    pub parent_id: Option<u64>,
}

impl Message {
    /// Validates the sender/recipient shape for `kind` before handing the
    /// message to the bus; the bus itself assigns `id`/`timestamp`.
    pub fn is_well_formed(&self) -> bool {
        if self.kind.requires_recipient() && self.recipient.is_none() {
            return false;
        }
        !self.sender.trim().is_empty()
    }
}

/// A participant in the roundtable: name, role, and the persona prompt used
/// to seed its LLM context (`spec.md` §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub role: String,
    pub persona_prompt: String,
    /// Names of tools this agent may invoke during the meeting, if any.
    pub tools: Vec<String>,
    pub is_leader: bool,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: impl Into<String>, persona_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            persona_prompt: persona_prompt.into(),
            tools: Vec::new(),
            is_leader: false,
        }
    }

    pub fn as_leader(mut self) -> Self {
        self.is_leader = true;
        self
    }
}

/// Reason a roundtable meeting ended (`spec.md` §4.6 bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeetingEndReason {
    LeaderConcluded,
    MaxRoundsReached,
    MaxMessagesReached,
    MaxDurationReached,
    ExternallyCanceled,
}

/// Summary record produced once a meeting ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingOutcome {
    pub end_reason: MeetingEndReason,
    pub rounds_completed: u32,
    pub message_count: u64,
    pub summary: String,
}
