//! The DD state machine, its event bus, and the session manager that
//! coordinates them (`spec.md` §4.4 / §4.5).

mod event_bus;
mod session_manager;
mod state_machine;

pub use event_bus::{EventBus, WorkflowEvent};
pub use session_manager::SessionManager;
pub use state_machine::{DdWorkflow, HitlResumeInput};
