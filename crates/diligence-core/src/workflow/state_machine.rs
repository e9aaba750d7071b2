use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{oneshot, watch, Semaphore};

use crate::agents::{
    AnalysisAgent, BpParserAgent, BpParserInput, ExitAgent, ExitAgentInput, MarketAnalystAgent,
    MarketAnalystInput, RiskDdqAgent, RiskDdqInput, TeamAnalystAgent, TeamAnalystInput,
    ValuationAgent, ValuationInput,
};
use crate::model::{PreliminaryIm, Recommendation, Session, StepStatus, WorkflowState};
use crate::preference_matcher::{match_preferences, InstitutionPreferences};

use super::event_bus::{EventBus, WorkflowEvent};

const DOC_PARSE_TIMEOUT: Duration = Duration::from_secs(180);
const DD_PHASE_TIMEOUT: Duration = Duration::from_secs(120);
const DDQ_TIMEOUT: Duration = Duration::from_secs(90);

/// Input delivered by [`super::session_manager::SessionManager::resume`]
/// once a suspended `HITL_REVIEW` session is resumed.
#[derive(Debug, Clone)]
pub struct HitlResumeInput {
    pub user_input: serde_json::Value,
}

/// Bundles the six analysis agents and runs the DD state machine
/// (`spec.md` §4.4) for one session. Hand-rolled as a straight-line async
/// function rather than built on a generic graph-execution engine — see
/// DESIGN.md for the rationale.
pub struct DdWorkflow {
    pub bp_parser: Arc<BpParserAgent>,
    pub team_analyst: Arc<TeamAnalystAgent>,
    pub market_analyst: Arc<MarketAnalystAgent>,
    pub risk_ddq: Arc<RiskDdqAgent>,
    pub valuation: Arc<ValuationAgent>,
    pub exit_agent: Arc<ExitAgent>,
    /// Bounds outstanding concurrent agent calls per session (`spec.md` §5
    /// "per-session concurrency budget", default
    /// `DEFAULT_SESSION_FANOUT_LIMIT`).
    pub fanout_limit: Arc<Semaphore>,
}

impl DdWorkflow {
    /// Runs every transition up to (and including) suspending at
    /// `HITL_REVIEW`, then waits on `hitl_resume_rx` before finishing at
    /// `COMPLETED`. Returns once the session reaches a terminal state.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        session: Arc<SyncMutex<Session>>,
        prefs: InstitutionPreferences,
        bp_input: BpParserInput,
        events: Arc<EventBus>,
        mut cancel: watch::Receiver<bool>,
        hitl_resume_rx: oneshot::Receiver<HitlResumeInput>,
    ) {
        let session_id = session.lock().id.clone();

        macro_rules! canceled {
            () => {
                *cancel.borrow()
            };
        }

        // DOC_PARSE
        let step_index = begin_step(&session, &events, WorkflowState::DocParse);
        let bp = match timeout_or_cancel(DOC_PARSE_TIMEOUT, &mut cancel, self.bp_parser.analyze(bp_input)).await {
            PhaseOutcome::Done(bp) => bp,
            PhaseOutcome::Canceled => return finish_canceled(&session, &events, step_index),
            PhaseOutcome::TimedOut => return finish_error(&session, &events, step_index, "DOC_PARSE phase_timeout"),
        };
        complete_step(&session, &events, step_index, serde_json::to_value(&bp).unwrap_or_default(), false);

        if canceled!() {
            return finish_canceled(&session, &events, step_index);
        }

        // PREFERENCE_CHECK
        let step_index = begin_step(&session, &events, WorkflowState::PreferenceCheck);
        let preference_match = match_preferences(&bp, &prefs);
        complete_step(
            &session,
            &events,
            step_index,
            serde_json::to_value(&preference_match).unwrap_or_default(),
            false,
        );
        {
            let mut session = session.lock();
            session.set_context("preference_match", serde_json::to_value(&preference_match).unwrap_or_default());
            session.set_context("bp", serde_json::to_value(&bp).unwrap_or_default());
        }

        if preference_match.recommendation == Recommendation::Abort {
            let im = PreliminaryIm {
                company_name: bp.company_name.clone(),
                team_section: None,
                market_section: None,
                dd_questions: Vec::new(),
                preference_match: Some(preference_match),
                generated_at: Utc::now(),
            };
            return finish_completed(&session, &events, im);
        }

        if canceled!() {
            return finish_canceled(&session, &events, step_index);
        }

        // TDD ∥ MDD — a failure in one does not cancel the other.
        let tdd_step = begin_step(&session, &events, WorkflowState::Tdd);
        let mdd_step = begin_step(&session, &events, WorkflowState::Mdd);

        let mut team_cancel = cancel.clone();
        let mut market_cancel = cancel.clone();
        let team_fanout_limit = Arc::clone(&self.fanout_limit);
        let team_analyst = Arc::clone(&self.team_analyst);
        let team_bp = bp.clone();
        let team_future = timeout_or_cancel(DD_PHASE_TIMEOUT, &mut team_cancel, async move {
            let _permit = team_fanout_limit.acquire().await.expect("fanout semaphore is never closed");
            team_analyst.analyze(TeamAnalystInput { bp: team_bp }).await
        });
        let market_fanout_limit = Arc::clone(&self.fanout_limit);
        let market_analyst = Arc::clone(&self.market_analyst);
        let market_bp = bp.clone();
        let market_future = timeout_or_cancel(DD_PHASE_TIMEOUT, &mut market_cancel, async move {
            let _permit = market_fanout_limit.acquire().await.expect("fanout semaphore is never closed");
            market_analyst.analyze(MarketAnalystInput { bp: market_bp }).await
        });
        let (team_outcome, market_outcome) = tokio::join!(team_future, market_future);

        if canceled!() {
            return finish_canceled(&session, &events, tdd_step.min(mdd_step));
        }

        let team_output = match team_outcome {
            PhaseOutcome::Done(out) => out,
            _ => crate::model::TeamAnalysisOutput::fallback("team analysis phase timed out"),
        };
        let market_output = match market_outcome {
            PhaseOutcome::Done(out) => out,
            _ => crate::model::MarketAnalysisOutput::fallback("market analysis phase timed out"),
        };

        complete_step(&session, &events, tdd_step, serde_json::to_value(&team_output).unwrap_or_default(), team_output.degraded);
        complete_step(&session, &events, mdd_step, serde_json::to_value(&market_output).unwrap_or_default(), market_output.degraded);
        {
            let mut session = session.lock();
            session.set_context("team_analysis", serde_json::to_value(&team_output).unwrap_or_default());
            session.set_context("market_analysis", serde_json::to_value(&market_output).unwrap_or_default());
        }

        // CROSS_CHECK: valuation + exit analysis, cross-referencing TDD/MDD
        // output. `spec.md`'s state diagram names no dedicated valuation/exit
        // state, so this implementation folds them into CROSS_CHECK (decision
        // recorded in DESIGN.md).
        let step_index = begin_step(&session, &events, WorkflowState::CrossCheck);
        let valuation_output = self.valuation.analyze(ValuationInput { bp: bp.clone() }).await;
        let exit_output = self
            .exit_agent
            .analyze(ExitAgentInput {
                bp: bp.clone(),
                market_output: market_output.clone(),
                valuation_output: valuation_output.clone(),
            })
            .await;
        complete_step(
            &session,
            &events,
            step_index,
            serde_json::json!({"valuation": valuation_output, "exit": exit_output}),
            valuation_output.degraded || exit_output.degraded,
        );

        if canceled!() {
            return finish_canceled(&session, &events, step_index);
        }

        // DD_QUESTIONS
        let step_index = begin_step(&session, &events, WorkflowState::DdQuestions);
        let dd_questions = match timeout_or_cancel(
            DDQ_TIMEOUT,
            &mut cancel,
            self.risk_ddq.analyze(RiskDdqInput {
                bp: bp.clone(),
                team_output: team_output.clone(),
                market_output: market_output.clone(),
            }),
        )
        .await
        {
            PhaseOutcome::Done(questions) => questions,
            PhaseOutcome::Canceled => return finish_canceled(&session, &events, step_index),
            PhaseOutcome::TimedOut => return finish_error(&session, &events, step_index, "DD_QUESTIONS phase_timeout"),
        };
        complete_step(&session, &events, step_index, serde_json::to_value(&dd_questions).unwrap_or_default(), false);

        let draft_im = PreliminaryIm {
            company_name: bp.company_name.clone(),
            team_section: Some(team_output),
            market_section: Some(market_output),
            dd_questions,
            preference_match: Some(preference_match),
            generated_at: Utc::now(),
        };

        // HITL_REVIEW: suspend, persist context, wait for an external resume
        // signal with no enforced timeout (`spec.md` §8 boundary behavior:
        // "remains suspended indefinitely until external cleanup").
        let step_index = begin_step(&session, &events, WorkflowState::HitlReview);
        {
            let mut session = session.lock();
            session.state = WorkflowState::HitlReview;
            if let Some(step) = session.step_mut(step_index) {
                step.pause(serde_json::to_value(&draft_im).unwrap_or_default());
            }
        }
        events.publish(WorkflowEvent::HitlRequired {
            session_id: session_id.clone(),
            draft_im: Box::new(draft_im.clone()),
        });

        tokio::pin!(hitl_resume_rx);
        loop {
            tokio::select! {
                resume = &mut hitl_resume_rx => {
                    if resume.is_err() {
                        return finish_error(&session, &events, step_index, "HITL_REVIEW channel closed unexpectedly");
                    }
                    break;
                }
                changed = cancel.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    if canceled!() {
                        return finish_canceled(&session, &events, step_index);
                    }
                }
            }
        }

        complete_step(&session, &events, step_index, serde_json::to_value(&draft_im).unwrap_or_default(), false);
        finish_completed(&session, &events, draft_im);
    }
}

enum PhaseOutcome<T> {
    Done(T),
    Canceled,
    TimedOut,
}

async fn timeout_or_cancel<T>(
    duration: Duration,
    cancel: &mut watch::Receiver<bool>,
    fut: impl std::future::Future<Output = T>,
) -> PhaseOutcome<T> {
    tokio::pin!(fut);
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            result = &mut fut => return PhaseOutcome::Done(result),
            _ = &mut deadline => return PhaseOutcome::TimedOut,
            changed = cancel.changed() => {
                if changed.is_err() {
                    continue;
                }
                if *cancel.borrow() {
                    return PhaseOutcome::Canceled;
                }
            }
        }
    }
}

fn begin_step(session: &Arc<SyncMutex<Session>>, events: &EventBus, state: WorkflowState) -> u32 {
    let mut session = session.lock();
    session.state = state;
    let index = session.start_step(state.title());
    events.publish(WorkflowEvent::StepStart {
        session_id: session.id.clone(),
        step_index: index,
        title: state.title().to_string(),
    });
    index
}

fn complete_step(
    session: &Arc<SyncMutex<Session>>,
    events: &EventBus,
    step_index: u32,
    result: serde_json::Value,
    degraded: bool,
) {
    let session_id = {
        let mut session = session.lock();
        if let Some(step) = session.step_mut(step_index) {
            step.succeed(result, degraded);
        }
        session.id.clone()
    };
    events.publish(WorkflowEvent::StepComplete {
        session_id,
        step_index,
        status: StepStatus::Success,
        result_digest: None,
    });
}

fn finish_error(session: &Arc<SyncMutex<Session>>, events: &EventBus, step_index: u32, reason: &str) {
    let session_id = {
        let mut session = session.lock();
        if let Some(step) = session.step_mut(step_index) {
            step.fail(reason);
        }
        session.state = WorkflowState::Error;
        session.error_reason = Some(reason.to_string());
        session.id.clone()
    };
    events.publish(WorkflowEvent::StepComplete {
        session_id: session_id.clone(),
        step_index,
        status: StepStatus::Error,
        result_digest: None,
    });
    events.publish(WorkflowEvent::WorkflowComplete {
        session_id,
        preliminary_im: None,
        error: Some(reason.to_string()),
    });
}

fn finish_canceled(session: &Arc<SyncMutex<Session>>, events: &EventBus, step_index: u32) {
    let session_id = {
        let mut session = session.lock();
        if let Some(step) = session.step_mut(step_index) {
            if step.status == StepStatus::Running {
                step.fail("canceled");
            }
        }
        session.state = WorkflowState::Error;
        session.error_reason = Some("canceled".to_string());
        session.id.clone()
    };
    events.publish(WorkflowEvent::WorkflowComplete {
        session_id,
        preliminary_im: None,
        error: Some("canceled".to_string()),
    });
}

fn finish_completed(session: &Arc<SyncMutex<Session>>, events: &EventBus, im: PreliminaryIm) {
    let session_id = {
        let mut session = session.lock();
        session.state = WorkflowState::Completed;
        session.set_context("preliminary_im", serde_json::to_value(&im).unwrap_or_default());
        session.id.clone()
    };
    events.publish(WorkflowEvent::WorkflowComplete {
        session_id,
        preliminary_im: Some(Box::new(im)),
        error: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_clients::{GenerationConfig, LlmGatewayClient, ToolSpec, ToolUseResult};
    use diligence_testing::{MockInternalKnowledgeClient, MockLlmGatewayClient, MockWebSearchClient};

    /// Sleeps on every call before returning a trivial response; used to
    /// keep the TDD/MDD phase open long enough for a cancellation signal to
    /// land mid-flight.
    struct SlowLlm(Duration);

    #[async_trait::async_trait]
    impl LlmGatewayClient for SlowLlm {
        async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> crate::error::Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("{}".to_string())
        }
        async fn generate_with_file(
            &self,
            _prompt: &str,
            _file_bytes: &[u8],
            _mime: &str,
            _config: &GenerationConfig,
        ) -> crate::error::Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("{}".to_string())
        }
        async fn generate_with_tools(
            &self,
            _prompt: &str,
            _tools: &[ToolSpec],
            _max_iterations: u32,
            _config: &GenerationConfig,
        ) -> crate::error::Result<ToolUseResult> {
            tokio::time::sleep(self.0).await;
            Ok(ToolUseResult { final_text: "{}".to_string(), tool_calls: Vec::new() })
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_workflow(
        bp_llm: Arc<dyn LlmGatewayClient>,
        team_llm: Arc<dyn LlmGatewayClient>,
        market_llm: Arc<dyn LlmGatewayClient>,
        ddq_llm: Arc<dyn LlmGatewayClient>,
        valuation_llm: Arc<dyn LlmGatewayClient>,
        exit_llm: Arc<dyn LlmGatewayClient>,
    ) -> DdWorkflow {
        let web_search: Arc<dyn crate::service_clients::WebSearchClient> = Arc::new(MockWebSearchClient::new());
        let internal_knowledge: Arc<dyn crate::service_clients::InternalKnowledgeClient> =
            Arc::new(MockInternalKnowledgeClient::new());
        let config = GenerationConfig::default();

        DdWorkflow {
            bp_parser: Arc::new(BpParserAgent::new(bp_llm, config.clone())),
            team_analyst: Arc::new(TeamAnalystAgent::new(team_llm, Arc::clone(&web_search), config.clone())),
            market_analyst: Arc::new(MarketAnalystAgent::new(
                market_llm,
                Arc::clone(&web_search),
                internal_knowledge,
                config.clone(),
            )),
            risk_ddq: Arc::new(RiskDdqAgent::new(ddq_llm, config.clone())),
            valuation: Arc::new(ValuationAgent::new(valuation_llm, web_search, config.clone())),
            exit_agent: Arc::new(ExitAgent::new(exit_llm, config)),
            fanout_limit: Arc::new(Semaphore::new(16)),
        }
    }

    fn bp_input() -> BpParserInput {
        BpParserInput { company_name: "Acme AI".into(), file_bytes: Vec::new(), mime: "application/pdf".into() }
    }

    async fn poll_until<F: Fn(WorkflowState) -> bool>(
        session: &Arc<SyncMutex<Session>>,
        predicate: F,
    ) -> WorkflowState {
        let mut state = session.lock().state;
        for _ in 0..200 {
            if predicate(state) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            state = session.lock().state;
        }
        state
    }

    #[tokio::test]
    async fn team_analysis_fallback_while_market_analysis_succeeds_reaches_hitl_review() {
        let fast_default: Arc<dyn LlmGatewayClient> = Arc::new(MockLlmGatewayClient::new());
        let team_llm = MockLlmGatewayClient::new().with_response("irrelevant, fail_next short-circuits this");
        team_llm.fail_next();
        let market_llm = MockLlmGatewayClient::new().with_response(
            r#"{"summary": "healthy", "market_validation": "validated", "competitive_landscape": "fragmented", "red_flags": []}"#,
        );

        let workflow = Arc::new(build_workflow(
            Arc::clone(&fast_default),
            Arc::new(team_llm),
            Arc::new(market_llm),
            Arc::clone(&fast_default),
            Arc::clone(&fast_default),
            Arc::clone(&fast_default),
        ));

        let session = Arc::new(SyncMutex::new(Session::new("user-1", "Acme AI")));
        let events = Arc::new(EventBus::new());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let (hitl_tx, hitl_rx) = oneshot::channel();

        let session_for_run = Arc::clone(&session);
        tokio::spawn(async move {
            workflow
                .run(session_for_run, InstitutionPreferences::default(), bp_input(), events, cancel_rx, hitl_rx)
                .await;
        });

        let state = poll_until(&session, |s| s == WorkflowState::HitlReview).await;
        assert_eq!(state, WorkflowState::HitlReview);

        let team_analysis = session.lock().context.get("team_analysis").cloned().unwrap();
        assert_eq!(team_analysis["degraded"], serde_json::json!(true));
        let market_analysis = session.lock().context.get("market_analysis").cloned().unwrap();
        assert_eq!(market_analysis["degraded"], serde_json::json!(false));

        drop(hitl_tx);
    }

    #[tokio::test]
    async fn cancellation_during_tdd_mdd_stops_the_workflow() {
        let fast_default: Arc<dyn LlmGatewayClient> = Arc::new(MockLlmGatewayClient::new());
        let slow: Arc<dyn LlmGatewayClient> = Arc::new(SlowLlm(Duration::from_secs(30)));

        let workflow = Arc::new(build_workflow(
            Arc::clone(&fast_default),
            Arc::clone(&slow),
            Arc::clone(&slow),
            Arc::clone(&fast_default),
            Arc::clone(&fast_default),
            Arc::clone(&fast_default),
        ));

        let session = Arc::new(SyncMutex::new(Session::new("user-1", "Acme AI")));
        let events = Arc::new(EventBus::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (_hitl_tx, hitl_rx) = oneshot::channel();

        let session_for_run = Arc::clone(&session);
        tokio::spawn(async move {
            workflow
                .run(session_for_run, InstitutionPreferences::default(), bp_input(), events, cancel_rx, hitl_rx)
                .await;
        });

        // Let DOC_PARSE / PREFERENCE_CHECK finish and TDD/MDD start, then cancel.
        let state = poll_until(&session, |s| s == WorkflowState::Tdd || s == WorkflowState::Mdd).await;
        assert!(matches!(state, WorkflowState::Tdd | WorkflowState::Mdd));
        cancel_tx.send(true).unwrap();

        let final_state = poll_until(&session, |s| s == WorkflowState::Error).await;
        assert_eq!(final_state, WorkflowState::Error);
        assert_eq!(session.lock().error_reason.as_deref(), Some("canceled"));
    }
}
