use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enumerated workflow states. `TDD` and `MDD` execute concurrently inside
/// one logical phase but remain two distinct states for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Init,
    DocParse,
    PreferenceCheck,
    Tdd,
    Mdd,
    CrossCheck,
    DdQuestions,
    HitlReview,
    Completed,
    Error,
}

impl WorkflowState {
    /// Human-readable step title, used when appending a `Step`.
    pub fn title(&self) -> &'static str {
        match self {
            WorkflowState::Init => "Initializing",
            WorkflowState::DocParse => "Parsing business plan",
            WorkflowState::PreferenceCheck => "Checking institutional preferences",
            WorkflowState::Tdd => "Team due diligence",
            WorkflowState::Mdd => "Market due diligence",
            WorkflowState::CrossCheck => "Cross-checking findings",
            WorkflowState::DdQuestions => "Generating due-diligence questions",
            WorkflowState::HitlReview => "Awaiting human review",
            WorkflowState::Completed => "Completed",
            WorkflowState::Error => "Error",
        }
    }
}

/// Status of a single recorded workflow `Step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    Paused,
}

/// A recorded unit of workflow progress corresponding to one state-machine
/// transition. Once `status` is `Success` or `Error` it is immutable
/// (`spec.md` §3 invariant) — the workflow never mutates a terminal step,
/// only appends new ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Strictly increasing index within the owning session.
    pub index: u32,
    pub title: String,
    pub status: StepStatus,
    /// Component-specific result payload, present once the step is terminal.
    pub result: Option<serde_json::Value>,
    /// 0–100, for long-running steps that report sub-progress.
    pub progress_percent: Option<u8>,
    pub sub_steps: Option<Vec<String>>,
    pub error: Option<String>,
    /// Set by the state machine when a step succeeded only via fallback
    /// output (`spec.md` §4.4 "fallback-recoverable failure").
    pub degraded: bool,
}

impl Step {
    pub fn new(index: u32, title: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            status: StepStatus::Running,
            result: None,
            progress_percent: None,
            sub_steps: None,
            error: None,
            degraded: false,
        }
    }

    pub fn succeed(&mut self, result: serde_json::Value, degraded: bool) {
        self.status = StepStatus::Success;
        self.result = Some(result);
        self.degraded = degraded;
        self.progress_percent = Some(100);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Error;
        self.error = Some(error.into());
    }

    pub fn pause(&mut self, result: serde_json::Value) {
        self.status = StepStatus::Paused;
        self.result = Some(result);
    }
}

/// A due-diligence session: identity, accumulated context, and the ordered
/// step log. Lifetime: created on workflow start, destroyed after terminal
/// state plus a grace period for client fetch (enforced by the session
/// manager, not this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub company_name: String,
    pub state: WorkflowState,
    pub steps: Vec<Step>,
    /// Accumulated context keyed by logical name (`"bp"`, `"team_analysis"`,
    /// `"market_analysis"`, `"preference_match"`, `"dd_questions"`, ...).
    pub context: serde_json::Map<String, serde_json::Value>,
    /// Set once the session reaches a terminal state with `reason=canceled`
    /// or any other externally surfaced error kind.
    pub error_reason: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            user_id: user_id.into(),
            company_name: company_name.into(),
            state: WorkflowState::Init,
            steps: Vec::new(),
            context: serde_json::Map::new(),
            error_reason: None,
        }
    }

    /// Append a new running step; its index is the current step count.
    pub fn start_step(&mut self, title: impl Into<String>) -> u32 {
        let index = self.steps.len() as u32;
        self.steps.push(Step::new(index, title));
        index
    }

    pub fn step_mut(&mut self, index: u32) -> Option<&mut Step> {
        self.steps.get_mut(index as usize)
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), value);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, WorkflowState::Completed | WorkflowState::Error)
    }

    /// `spec.md` §8: step indices form a contiguous increasing sequence
    /// starting at 0.
    pub fn steps_are_contiguous(&self) -> bool {
        self.steps
            .iter()
            .enumerate()
            .all(|(i, s)| s.index as usize == i)
    }
}
