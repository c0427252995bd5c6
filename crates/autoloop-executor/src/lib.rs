//! Executor: drives one red/green/refactor TDD cycle per requirement,
//! consulting the safety core before the red phase and re-running tests
//! through the sandbox backend after any refactor.

mod phases;
mod test_runner;

pub use phases::{green_phase, propose_refactor, red_phase, GreenPhaseOutput, RedPhaseOutput};
pub use test_runner::{run_tests, run_verification, TestRunOutcome, VerificationResult};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use autoloop_core::{LlmAgentClient, ResourceUsage, SandboxBackend};
use autoloop_requirements::Requirement;
use autoloop_safety::{OperationCategory, SafetyCore};

#[derive(Debug, Clone)]
pub struct TddCycleResult {
    pub red: RedPhaseOutput,
    pub green: GreenPhaseOutput,
    pub refactor_applied: bool,
    pub modified_files: Vec<PathBuf>,
    pub tests: TestRunOutcome,
}

pub struct Executor {
    agent_client: Arc<dyn LlmAgentClient>,
    sandbox: Arc<dyn SandboxBackend>,
}

impl Executor {
    pub fn new(agent_client: Arc<dyn LlmAgentClient>, sandbox: Arc<dyn SandboxBackend>) -> Self {
        Self { agent_client, sandbox }
    }

    /// Runs one full red/green/refactor cycle for `requirement`. Returns
    /// an error without touching the filesystem when the safety core
    /// reports the session already over budget.
    pub async fn run_tdd_cycle(
        &self,
        safety: &mut SafetyCore,
        usage: &ResourceUsage,
        requirement: &Requirement,
        working_dir: &Path,
        test_command: &str,
        test_timeout_ms: u64,
    ) -> anyhow::Result<TddCycleResult> {
        let verdict = safety.check_safety(usage);
        if !verdict.safe {
            anyhow::bail!("resource budget exceeded before red phase: {:?}", verdict.error);
        }

        safety.record_tool_call("tdd_guide.red", requirement.id.as_str());
        let red = match phases::red_phase(&self.agent_client, requirement, working_dir).await {
            Ok(red) => red,
            Err(error) => {
                safety.record_tool_error(&error.to_string());
                return Err(error);
            }
        };

        safety.record_tool_call("tdd_guide.green", requirement.id.as_str());
        let green = match phases::green_phase(&self.agent_client, requirement, &red, working_dir).await {
            Ok(green) => green,
            Err(error) => {
                safety.record_tool_error(&error.to_string());
                return Err(error);
            }
        };

        let mut modified_files = vec![red.test_path.clone(), green.impl_path.clone()];
        let tests_after_green =
            test_runner::run_tests(&self.sandbox, working_dir, test_command, test_timeout_ms).await?;

        let (refactor_applied, final_tests) = self
            .refactor_phase(safety, requirement, &green, tests_after_green, working_dir, test_command, test_timeout_ms)
            .await?;

        if refactor_applied {
            modified_files.push(green.impl_path.clone());
        }

        Ok(TddCycleResult {
            red,
            green,
            refactor_applied,
            modified_files,
            tests: final_tests,
        })
    }

    /// Applies the code reviewer's suggestion, re-runs tests, and
    /// reverts on regression (more failures than before the refactor).
    async fn refactor_phase(
        &self,
        safety: &mut SafetyCore,
        requirement: &Requirement,
        green: &GreenPhaseOutput,
        tests_before: TestRunOutcome,
        working_dir: &Path,
        test_command: &str,
        test_timeout_ms: u64,
    ) -> anyhow::Result<(bool, TestRunOutcome)> {
        safety.record_tool_call("code_reviewer.refactor", requirement.id.as_str());
        let Some(refactored) = phases::propose_refactor(&self.agent_client, requirement, green).await? else {
            return Ok((false, tests_before));
        };

        let touched = vec![green.impl_path.display().to_string()];
        if let Err(reason) = safety.check_destructive_operation(
            "write",
            OperationCategory::FileOverwrite,
            "apply code-reviewer refactor",
            &touched,
            false,
        ) {
            tracing::warn!(path = %green.impl_path.display(), %reason, "refactor blocked by destructive gate");
            return Ok((false, tests_before));
        }

        tokio::fs::write(&green.impl_path, &refactored).await?;
        let tests_after =
            test_runner::run_tests(&self.sandbox, working_dir, test_command, test_timeout_ms).await?;

        if tests_after.failed > tests_before.failed {
            tracing::warn!(path = %green.impl_path.display(), "refactor regressed tests, reverting");
            tokio::fs::write(&green.impl_path, &green.impl_code).await?;
            return Ok((false, tests_before));
        }

        Ok((true, tests_after))
    }

    pub async fn run_tests(&self, working_dir: &Path, test_command: &str, timeout_ms: u64) -> anyhow::Result<TestRunOutcome> {
        test_runner::run_tests(&self.sandbox, working_dir, test_command, timeout_ms).await
    }

    pub async fn run_verification(
        &self,
        working_dir: &Path,
        typecheck_command: Option<&str>,
        lint_command: Option<&str>,
        coverage_command: Option<&str>,
        coverage_threshold: f64,
        timeout_ms: u64,
    ) -> anyhow::Result<VerificationResult> {
        test_runner::run_verification(
            &self.sandbox,
            working_dir,
            typecheck_command,
            lint_command,
            coverage_command,
            coverage_threshold,
            timeout_ms,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_core::fakes::{EchoAgentClient, NoopSandboxBackend};
    use autoloop_core::ResourceBudget;
    use autoloop_requirements::parse_requirements;

    fn executor() -> Executor {
        Executor::new(Arc::new(EchoAgentClient), Arc::new(NoopSandboxBackend))
    }

    fn budget() -> ResourceBudget {
        ResourceBudget {
            max_tokens: 100_000,
            max_cost_usd: 50.0,
            max_elapsed_minutes: 120,
            max_files_changed: 100,
            max_actions: 500,
        }
    }

    #[tokio::test]
    async fn full_cycle_over_budget_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor();
        let mut safety = SafetyCore::new(
            ResourceBudget {
                max_tokens: 1,
                max_cost_usd: 0.01,
                max_elapsed_minutes: 1,
                max_files_changed: 1,
                max_actions: 1,
            },
            0.8,
            true,
        );
        let usage = ResourceUsage { tokens_used: 10, ..Default::default() };
        let requirement = parse_requirements("implement add(a, b)").0.remove(0);

        let result = executor
            .run_tdd_cycle(&mut safety, &usage, &requirement, dir.path(), "echo ok", 5_000)
            .await;
        assert!(result.is_err());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn full_cycle_under_budget_writes_test_and_impl_files() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor();
        let mut safety = SafetyCore::new(budget(), 0.8, true);
        let usage = ResourceUsage::default();
        let requirement = parse_requirements("implement add(a, b)").0.remove(0);

        let result = executor
            .run_tdd_cycle(&mut safety, &usage, &requirement, dir.path(), "echo ok", 5_000)
            .await
            .unwrap();

        assert!(result.red.test_path.exists());
        assert!(result.green.impl_path.exists());
        assert!(result.tests.all_passed());
    }
}
