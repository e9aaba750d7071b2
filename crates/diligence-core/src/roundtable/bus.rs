use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::Message;

const ALL: &str = "ALL";

/// Ordered message history plus per-agent FIFO mailboxes (`spec.md` §4.6).
/// The bus assigns strictly increasing ids; it never interprets message
/// content beyond the typed `kind`/`recipient` fields.
pub struct MessageBus {
    next_id: AtomicU64,
    history: Mutex<Vec<Message>>,
    mailboxes: DashMap<String, Mutex<VecDeque<Message>>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            history: Mutex::new(Vec::new()),
            mailboxes: DashMap::new(),
        }
    }

    pub fn register_agent(&self, name: &str) {
        self.mailboxes.entry(name.to_string()).or_insert_with(|| Mutex::new(VecDeque::new()));
    }

    /// Appends `message` to history and delivers it to the recipient's
    /// mailbox, or every mailbox if `recipient == "ALL"` / absent.
    pub fn publish(&self, mut message: Message) -> Message {
        message.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.history.lock().push(message.clone());

        match message.recipient.as_deref() {
            Some(ALL) | None => {
                for mailbox in self.mailboxes.iter() {
                    mailbox.lock().push_back(message.clone());
                }
            }
            Some(recipient) => {
                if let Some(mailbox) = self.mailboxes.get(recipient) {
                    mailbox.lock().push_back(message.clone());
                }
            }
        }

        message
    }

    /// The full ordered history to date.
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }

    /// Drains `agent_name`'s mailbox.
    pub fn drain_mailbox(&self, agent_name: &str) -> Vec<Message> {
        self.mailboxes
            .get(agent_name)
            .map(|mailbox| mailbox.lock().drain(..).collect())
            .unwrap_or_default()
    }

    pub fn message_count(&self) -> u64 {
        self.history.lock().len() as u64
    }
}

pub type SharedMessageBus = Arc<MessageBus>;
