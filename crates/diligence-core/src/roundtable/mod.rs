//! The roundtable meeting subsystem: a turn-based multi-agent conversation
//! orthogonal to the DD workflow (`spec.md` §4.6).

mod agent;
mod bus;
mod meeting;

pub use agent::{RoundtableAgent, MAX_MESSAGES_PER_TURN};
pub use bus::{MessageBus, SharedMessageBus};
pub use meeting::{MeetingEvent, RoundtableMeeting};
