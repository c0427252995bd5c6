//! Orchestrator: drives one session's iteration loop end to end —
//! requirement parsing, understand/plan stubs, the CLOSE decision,
//! a TDD execution cycle, completion evaluation, and the Next-Step
//! Planner — over the collaborators passed into its constructor.

mod outcome;
mod planner;

pub use outcome::{ReportScore, SessionOutcome, SessionReport};
pub use planner::{analyze_completion, plan, CompletionAnalysis, CompletionCriteria, NextTask, PlanResult};

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use autoloop_core::{
    AgentInvokeRequest, AgentRole, AppConfig, EventBus, KvStore, LlmAgentClient, ResourceBudget,
    SandboxBackend, Session, SessionState, StateMachine, VcsDriver,
};
use autoloop_decision::{evaluate as evaluate_decision, Action, CloseCriteria, Decision, DecisionType, Risk};
use autoloop_executor::Executor;
use autoloop_metrics::{DecisionOutcome, Metrics, SafetyEvent, TaskOutcome};
use autoloop_queue::{Task, TaskQueue, TaskState as QueuedTaskState};
use autoloop_requirements::{parse_requirements, Requirement, RequirementStatus};
use autoloop_safety::{CheckpointStore, RollbackManager, SafetyCore};
use autoloop_types::{CoreEvent, TaskId};

const RECENT_ERRORS_CAP: usize = 10;

/// Only `surplus` is derived from live resource data; §4.13 step (c)
/// doesn't specify the other four CLOSE dimensions for this opaque
/// understand/plan/decide cycle, so they default to a neutral
/// mid-to-high score. Recorded in DESIGN.md.
const DEFAULT_CONVERGENCE: f64 = 7.0;
const DEFAULT_LEVERAGE: f64 = 7.0;
const DEFAULT_OPTIONALITY: f64 = 7.0;
const DEFAULT_EVOLUTION: f64 = 7.0;

/// Per-session iteration loop. One instance per session; construct with
/// every external collaborator explicit so tests can substitute fakes
/// for all of them.
pub struct Orchestrator<V: VcsDriver> {
    session: Session,
    state_machine: StateMachine,
    events: EventBus,
    agent_client: Arc<dyn LlmAgentClient>,
    queue: TaskQueue,
    task_requirement: HashMap<TaskId, usize>,
    requirements: Vec<Requirement>,
    budget: ResourceBudget,
    safety: SafetyCore,
    metrics: Metrics,
    executor: Executor,
    rollback: RollbackManager<V>,
    kv: Arc<dyn KvStore>,
    config: AppConfig,
    recent_errors: VecDeque<String>,
    last_tests_passed: bool,
    last_verification_passed: bool,
    test_command: String,
    verification_command: Option<String>,
}

impl<V: VcsDriver> Orchestrator<V> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        original_request: impl Into<String>,
        working_directory: PathBuf,
        config: AppConfig,
        agent_client: Arc<dyn LlmAgentClient>,
        sandbox: Arc<dyn SandboxBackend>,
        vcs: V,
        kv: Arc<dyn KvStore>,
        checkpoints_data_dir: PathBuf,
        events: EventBus,
        test_command: impl Into<String>,
        verification_command: Option<String>,
    ) -> Self {
        let session = Session::new(original_request, working_directory, config.autonomy);
        let state_machine = StateMachine::new(session.session_id.clone(), events.clone());
        let budget = ResourceBudget::from(config.budget.clone());
        let safety = SafetyCore::new(budget, config.resource_warn_threshold, true);
        let executor = Executor::new(Arc::clone(&agent_client), sandbox);
        let checkpoints = CheckpointStore::new(checkpoints_data_dir);
        let rollback = RollbackManager::new(checkpoints, vcs);

        let queue = TaskQueue::new(session.session_id.clone(), config.max_concurrent_tasks, events.clone());

        Self {
            session,
            state_machine,
            events,
            agent_client,
            queue,
            task_requirement: HashMap::new(),
            requirements: Vec::new(),
            budget,
            safety,
            metrics: Metrics::new(),
            executor,
            rollback,
            kv,
            config,
            recent_errors: VecDeque::new(),
            last_tests_passed: false,
            last_verification_passed: true,
            test_command: test_command.into(),
            verification_command,
        }
    }

    fn publish(&self, event_type: &str, properties: serde_json::Value) {
        self.events.publish(CoreEvent::new(event_type, self.session.session_id.clone(), properties));
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn current_state(&self) -> SessionState {
        self.state_machine.current().await
    }

    /// IDLE -> PLANNING, publishes `session.started`, then parses
    /// requirements and publishes `requirements.updated`. Must be
    /// called once, before the first [`Self::process`].
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.state_machine.transition(SessionState::Planning, "session started", json!({})).await?;
        self.publish("session.started", json!({"request": self.session.original_request}));

        let (requirements, implicit) = parse_requirements(&self.session.original_request);
        self.requirements = requirements;
        self.seed_tasks();
        self.publish(
            "requirements.updated",
            json!({
                "count": self.requirements.len(),
                "implicit": implicit.iter().map(|r| r.keyword).collect::<Vec<_>>(),
            }),
        );
        Ok(())
    }

    fn seed_tasks(&mut self) {
        for (index, requirement) in self.requirements.iter().enumerate() {
            let task_id = TaskId::new();
            let mut task = Task::new(task_id.clone(), requirement.description.clone(), Vec::new());
            task.gate = Some("tests-pass".to_string());
            task.priority = requirement.priority;
            if self.queue.add(task).is_ok() {
                self.task_requirement.insert(task_id.clone(), index);
                self.publish("task.created", json!({"task_id": task_id.as_str()}));
            }
        }
    }

    /// Runs the iteration loop until the session completes, pauses,
    /// blocks, or fails, per §4.13. Every iteration moves the state
    /// machine from a "loop hub" state (Planning on the first call,
    /// Continuing or Executing thereafter) through
    /// Deciding -> DecisionMade -> Executing and back out to either a
    /// terminal outcome or the next hub state.
    pub async fn process(&mut self) -> anyhow::Result<SessionOutcome> {
        loop {
            self.session.iteration += 1;
            self.publish("iteration.started", json!({"iteration": self.session.iteration}));

            self.run_phase_stub(AgentRole::Explore, "understand the current requirements").await?;
            self.run_phase_stub(AgentRole::Architect, "plan the next implementation step").await?;

            self.state_machine.transition(SessionState::Deciding, "evaluating next action", json!({})).await?;
            let decision = self.decide();
            self.publish("decision.made", json!({"action": decision.action, "score": decision.score.total}));
            self.metrics.record_decision(decision.score.total, decision_outcome(decision.action));
            self.safety.record_decision(&format!("{:?}", decision.action));
            self.persist_decision(&decision).await;
            self.persist_context().await;

            let recent = self.state_machine.recent_transitions(6).await;
            if let Some(kind) = self.safety.record_state_transition(&recent) {
                self.publish("loop.detected", json!({"kind": kind}));
                if self.rollback.should_rollback_loop_detected(kind) {
                    self.maybe_rollback("loop-detected").await?;
                }
            }

            if !decision.is_approved() {
                return self.handle_blocked_decision(&decision).await;
            }
            self.state_machine.transition(SessionState::DecisionMade, "decision approved", json!({})).await?;

            let ended_in_evaluating = self.execute_next_task().await?;

            let criteria = self.completion_criteria();
            self.publish(
                "completion.checked",
                json!({
                    "requirements_completed": criteria.requirements_completed,
                    "tests_passing": criteria.tests_passing,
                    "verification_passing": criteria.verification_passing,
                    "all_complete": criteria.all_complete(),
                }),
            );
            if ended_in_evaluating && criteria.all_complete() {
                return self.complete().await;
            }

            if let Some(outcome) = self.consult_planner(ended_in_evaluating, &criteria).await? {
                return Ok(outcome);
            }
        }
    }

    async fn run_phase_stub(&self, role: AgentRole, task: &str) -> anyhow::Result<()> {
        self.publish("phase.started", json!({"agent": role}));
        self.publish("agent.invoked", json!({"agent": role, "task": task}));
        let response = self
            .agent_client
            .invoke(AgentInvokeRequest { agent: role, task: task.to_string(), context: None, options: None })
            .await?;
        self.publish("phase.completed", json!({"agent": role, "success": response.success}));
        Ok(())
    }

    /// §6 persisted-state layout: `autonomous/decisions/{projectId}/{decisionId}`.
    /// Decisions are immutable after creation, so this is a write-once
    /// put; a write failure is logged but never fails the session.
    async fn persist_decision(&self, decision: &Decision) {
        let key = vec![
            "autonomous".to_string(),
            "decisions".to_string(),
            self.session.session_id.as_str().to_string(),
            decision.id.as_str().to_string(),
        ];
        match serde_json::to_value(decision) {
            Ok(value) => {
                if let Err(error) = self.kv.write(&key, value).await {
                    tracing::warn!(%error, "failed to persist decision");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize decision"),
        }
    }

    /// §6's `autonomous/context/{projectId}` snapshot: current resource
    /// usage and iteration count, refreshed once per iteration so a
    /// resumed session can recover where it left off.
    async fn persist_context(&self) {
        let key = vec!["autonomous".to_string(), "context".to_string(), self.session.session_id.as_str().to_string()];
        let value = json!({
            "iteration": self.session.iteration,
            "resource_usage": self.session.resource_usage,
            "original_request": self.session.original_request,
        });
        if let Err(error) = self.kv.write(&key, value).await {
            tracing::warn!(%error, "failed to persist session context");
        }
    }

    fn decide(&self) -> Decision {
        let surplus = self.budget.surplus_ratio(&self.session.resource_usage) * 10.0;
        let criteria = CloseCriteria {
            convergence: DEFAULT_CONVERGENCE,
            leverage: DEFAULT_LEVERAGE,
            optionality: DEFAULT_OPTIONALITY,
            surplus,
            evolution: DEFAULT_EVOLUTION,
        };
        let context = json!({
            "resource_usage": self.session.resource_usage,
            "recent_errors": self.recent_errors,
        });
        evaluate_decision(
            self.session.session_id.clone(),
            DecisionType::Implementation,
            "continue-session decision",
            context,
            criteria,
            self.session.autonomy,
            Risk::Low,
            self.recent_errors.len() as u32,
        )
    }

    /// Decision not approved: unattended sessions pause and wait for a
    /// human; attended ones block outright. Both transitions are valid
    /// from Deciding, §4.1's transition table.
    async fn handle_blocked_decision(&mut self, decision: &Decision) -> anyhow::Result<SessionOutcome> {
        self.publish("decision.blocked", json!({"action": decision.action}));
        if self.session.autonomy.is_unattended() {
            self.state_machine.transition(SessionState::Paused, "decision not approved", json!({})).await?;
            self.publish("session.paused", json!({"reason": "decision not approved"}));
            Ok(SessionOutcome::Paused { reason: "decision not approved".to_string() })
        } else {
            self.state_machine.transition(SessionState::Blocked, "decision not approved", json!({})).await?;
            Ok(SessionOutcome::Blocked { reason: "decision not approved".to_string() })
        }
    }

    /// Drains up to `max_concurrent` runnable tasks through a TDD cycle
    /// each, per §4.2's selection algorithm. Tasks run one at a time —
    /// the session's safety core, metrics, and queue are single-session
    /// state with no per-task isolation — but every task the scheduler
    /// would hand out this tick is started and executed before the
    /// iteration hands control back to `process`, rather than only the
    /// first. Returns `true` iff at least one task's cycle ended in
    /// Evaluating (passed); `false` when nothing ran or every cycle that
    /// ran ended back in Executing.
    async fn execute_next_task(&mut self) -> anyhow::Result<bool> {
        self.state_machine.transition(SessionState::Executing, "running tdd cycle", json!({})).await?;

        let verdict = self.safety.check_safety(&self.session.resource_usage);
        if !verdict.resource_warnings.is_empty() {
            self.publish("resource.warning", json!({"axes": verdict.resource_warnings}));
        }
        if !verdict.safe {
            self.publish("safety.triggered", json!({"error": verdict.error, "loop": verdict.loop_detected}));
            if verdict.error.is_some() {
                self.publish("resource.exceeded", json!({"error": verdict.error}));
                if self.rollback.should_rollback_resource_exceeded(&self.budget.exceeded_axes(&self.session.resource_usage)) {
                    self.maybe_rollback("resource-exceeded").await?;
                }
            }
        }

        let task_ids: Vec<TaskId> = self.queue.runnable().iter().map(|t| t.id.clone()).collect();
        if task_ids.is_empty() {
            return Ok(false);
        }

        let mut any_passed = false;
        for task_id in task_ids {
            if self.run_one_task(&task_id).await? {
                any_passed = true;
            }
        }
        Ok(any_passed)
    }

    /// Runs a single already-selected task through one TDD cycle. On
    /// success the state machine ends in Evaluating (returns `true`); on
    /// failure it ends back in Executing (returns `false`).
    async fn run_one_task(&mut self, task_id: &TaskId) -> anyhow::Result<bool> {
        let requirement_index = *self.task_requirement.get(task_id).expect("seeded task has a requirement");
        self.queue.start(task_id);

        let working_dir = self.session.working_directory.clone();
        let test_command = self.test_command.clone();
        let requirement = self.requirements[requirement_index].clone();

        self.publish("tdd.cycle_started", json!({"task_id": task_id.as_str(), "requirement_id": requirement.id.as_str()}));
        let cycle = self
            .executor
            .run_tdd_cycle(&mut self.safety, &self.session.resource_usage, &requirement, &working_dir, &test_command, 30_000)
            .await;

        match cycle {
            Ok(cycle) => {
                self.state_machine.transition(SessionState::Testing, "tests ran", json!({})).await?;
                self.publish(
                    "tdd.cycle_completed",
                    json!({"task_id": task_id.as_str(), "passed": cycle.tests.passed, "failed": cycle.tests.failed}),
                );
                self.metrics.record_test_run(cycle.tests.passed, cycle.tests.failed);

                if cycle.tests.all_passed() {
                    self.state_machine.transition(SessionState::Verifying, "running verification", json!({})).await?;
                    let verification = self
                        .executor
                        .run_verification(&working_dir, self.verification_command.as_deref(), None, None, 0.0, 30_000)
                        .await?;
                    self.publish(
                        "verification.completed",
                        json!({"task_id": task_id.as_str(), "success": verification.success, "issues": verification.issues}),
                    );
                    self.last_verification_passed = verification.success;
                    self.state_machine.transition(SessionState::Evaluating, "checking completion criteria", json!({})).await?;
                    self.queue.complete(task_id, cycle.modified_files.iter().map(|p| p.display().to_string()).collect());
                    self.metrics.record_task(TaskOutcome::Passed);
                    self.metrics.record_tdd_cycle(if cycle.refactor_applied { 3 } else { 2 });
                    self.requirements[requirement_index].mark_criterion(0, true);
                    self.requirements[requirement_index].mark_criterion(1, true);
                    self.requirements[requirement_index].mark_criterion(2, true);
                    self.last_tests_passed = true;
                    Ok(true)
                } else {
                    self.state_machine.transition(SessionState::Fixing, "tests failed", json!({})).await?;
                    self.record_error(format!("tests failed for {}", requirement.description));
                    let retryable = self.has_retry_budget(task_id);
                    self.queue.fail(task_id, "tests failed", retryable);
                    self.last_tests_passed = false;

                    if self.rollback.should_rollback_test_failure(cycle.tests.failed, cycle.tests.total) {
                        self.maybe_rollback("tdd-test-failure").await?;
                    }
                    self.state_machine.transition(SessionState::Retrying, "retrying failed task", json!({})).await?;
                    if !self.task_is_pending(task_id) {
                        self.metrics.record_task(TaskOutcome::Failed);
                        self.requirements[requirement_index].mark_failed();
                    }
                    self.state_machine.transition(SessionState::Executing, "re-entering execution", json!({})).await?;
                    Ok(false)
                }
            }
            Err(error) => {
                self.record_error(error.to_string());
                let retryable = self.has_retry_budget(task_id);
                self.queue.fail(task_id, error.to_string(), retryable);
                self.last_tests_passed = false;
                if !self.task_is_pending(task_id) {
                    self.metrics.record_task(TaskOutcome::Failed);
                    self.requirements[requirement_index].mark_failed();
                }
                self.maybe_rollback("tdd-cycle-error").await?;
                Ok(false)
            }
        }
    }

    fn has_retry_budget(&self, task_id: &TaskId) -> bool {
        self.queue
            .get(task_id)
            .map(|t| t.retry_count < t.max_retries)
            .unwrap_or(false)
    }

    fn task_is_pending(&self, task_id: &TaskId) -> bool {
        self.queue
            .get(task_id)
            .map(|t| t.state == QueuedTaskState::Pending)
            .unwrap_or(false)
    }

    fn record_error(&mut self, message: String) {
        self.recent_errors.push_back(message);
        while self.recent_errors.len() > RECENT_ERRORS_CAP {
            self.recent_errors.pop_front();
        }
    }

    /// Composes with [`RollbackManager::with_rollback`] by always
    /// failing its wrapped operation: by the time this is called the
    /// triggering operation (a failed TDD cycle) is already over, so
    /// the guarded closure has nothing left to attempt — it exists only
    /// to drive the pre-op-checkpoint-then-restore sequence.
    async fn maybe_rollback(&mut self, trigger: &str) -> anyhow::Result<()> {
        if !self.config.auto_rollback {
            return Ok(());
        }
        let snapshot = serde_json::to_value(&self.session)?;
        let result: Result<(), autoloop_safety::RollbackOutcome> = self
            .rollback
            .with_rollback(&self.session.session_id, trigger, snapshot, || async { anyhow::bail!("{trigger}") })
            .await?;
        if let Err(outcome) = result {
            self.publish("checkpoint.created", json!({"checkpoint_id": outcome.checkpoint_id, "trigger": trigger}));
            self.metrics.record_safety_event(SafetyEvent::Rollback);
            self.publish("rollback.performed", json!({"success": outcome.success, "checkpoint_id": outcome.checkpoint_id}));
        }
        Ok(())
    }

    fn completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            requirements_completed: self.requirements.iter().all(|r| r.status() == RequirementStatus::Completed),
            tests_passing: self.last_tests_passed,
            verification_passing: self.last_verification_passed,
            blocking_issues: self.queue.has_deadlock(),
            resource_exhausted: !self.budget.all_within_limits(&self.session.resource_usage),
        }
    }

    /// Evaluating -> Scoring -> Completed. Only reachable when the
    /// current task run ended in Evaluating, i.e. the last TDD cycle
    /// passed.
    async fn complete(&mut self) -> anyhow::Result<SessionOutcome> {
        self.state_machine.transition(SessionState::Scoring, "computing final scores", json!({})).await?;
        let quality = self.metrics.quality_score();
        let craziness = self.metrics.craziness_score();
        self.publish("metrics.updated", json!({"quality": quality.total, "craziness": craziness.total}));

        self.state_machine.transition(SessionState::Completed, "all requirements satisfied", json!({})).await?;
        let report = SessionReport {
            iterations: self.session.iteration,
            quality: ReportScore::from(&quality),
            craziness: ReportScore::from(&craziness),
        };
        self.publish("report.generated", json!({"iterations": report.iterations}));
        let report_key = vec!["autonomous".to_string(), "reports".to_string(), self.session.session_id.as_str().to_string()];
        let report_value = json!({
            "iterations": report.iterations,
            "quality": report.quality.total,
            "craziness": report.craziness.total,
        });
        if let Err(error) = self.kv.write(&report_key, report_value).await {
            tracing::warn!(%error, "failed to persist session report");
        }
        self.publish("session.completed", json!({"iterations": report.iterations}));
        Ok(SessionOutcome::Completed(report))
    }

    /// Step (g): returns `Some(outcome)` when the loop should stop,
    /// `None` to continue iterating. `ended_in_evaluating` tells us
    /// which hub state the previous step left the machine in, since
    /// Evaluating and Executing allow different successors.
    async fn consult_planner(&mut self, ended_in_evaluating: bool, criteria: &CompletionCriteria) -> anyhow::Result<Option<SessionOutcome>> {
        let pending: Vec<NextTask> = self
            .requirements
            .iter()
            .filter(|r| r.status() != RequirementStatus::Completed)
            .map(|r| NextTask { subject: r.description.clone(), priority: r.priority })
            .collect();
        let recent_errors: Vec<String> = self.recent_errors.iter().cloned().collect();
        let result = plan(
            &pending,
            &recent_errors,
            &self.budget,
            &self.session.resource_usage,
            self.config.unattended,
            self.config.auto_continue,
        );

        if !result.should_continue {
            if criteria.blocking_issues {
                let reason = "an unresolved blocking issue is present".to_string();
                self.state_machine.transition(SessionState::Failed, &reason, json!({})).await?;
                self.publish("session.failed", json!({"reason": reason}));
                return Ok(Some(SessionOutcome::Failed { reason }));
            }
            let reason = result.reason;
            self.state_machine.transition(SessionState::Paused, &reason, json!({})).await?;
            self.publish("session.paused", json!({"reason": reason}));
            return Ok(Some(SessionOutcome::Paused { reason }));
        }

        if ended_in_evaluating {
            self.state_machine.transition(SessionState::Continuing, &result.reason, json!({})).await?;
        }
        self.publish(
            "next_step.planned",
            json!({
                "next_tasks": result.next_tasks.iter().map(|t| &t.subject).collect::<Vec<_>>(),
                "estimated_cycles": result.estimated_cycles,
                "confidence": result.confidence,
            }),
        );
        self.publish("iteration.completed", json!({"iteration": self.session.iteration}));
        Ok(None)
    }
}

fn decision_outcome(action: Action) -> DecisionOutcome {
    match action {
        Action::Proceed | Action::ProceedWithCaution => DecisionOutcome::Approved,
        Action::Pause => DecisionOutcome::Paused,
        Action::Block | Action::Skip => DecisionOutcome::Blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_core::fakes::{EchoAgentClient, InMemoryKvStore, InMemoryVcsDriver, NoopSandboxBackend};
    use autoloop_core::AppConfig;
    use autoloop_types::AutonomyLevel;

    fn orchestrator(dir: &std::path::Path, autonomy: AutonomyLevel, request: &str) -> Orchestrator<InMemoryVcsDriver> {
        let config = AppConfig { autonomy, unattended: autonomy.is_unattended(), ..Default::default() };
        Orchestrator::new(
            request.to_string(),
            dir.to_path_buf(),
            config,
            Arc::new(EchoAgentClient),
            Arc::new(NoopSandboxBackend),
            InMemoryVcsDriver::new(),
            Arc::new(InMemoryKvStore::new()),
            dir.join("checkpoints"),
            EventBus::new(),
            "echo ok",
            None,
        )
    }

    #[tokio::test]
    async fn linear_success_reaches_completed_in_one_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path(), AutonomyLevel::Crazy, "implement add(a, b) that returns a+b");

        let mut events = orchestrator.events.subscribe();
        orchestrator.start().await.unwrap();
        let outcome = orchestrator.process().await.unwrap();

        match outcome {
            SessionOutcome::Completed(report) => {
                assert_eq!(report.iterations, 1);
                assert!(report.quality.total >= 0.0);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(orchestrator.current_state().await, SessionState::Completed);

        let mut saw_started = 0;
        let mut saw_completed = 0;
        while let Ok(event) = events.try_recv() {
            match event.event_type.as_str() {
                "session.started" => saw_started += 1,
                "session.completed" => saw_completed += 1,
                _ => {}
            }
        }
        assert_eq!(saw_started, 1);
        assert_eq!(saw_completed, 1);
    }

    #[tokio::test]
    async fn exhausted_budget_pauses_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(
            dir.path(),
            AutonomyLevel::Crazy,
            "must implement add(a, b). must implement subtract(a, b).",
        );
        orchestrator.session.resource_usage.tokens_used = orchestrator.budget.max_tokens;
        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.requirements.len(), 2);

        let outcome = orchestrator.process().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Paused { .. }), "expected Paused, got {outcome:?}");
        assert_eq!(orchestrator.current_state().await, SessionState::Paused);
    }
}
