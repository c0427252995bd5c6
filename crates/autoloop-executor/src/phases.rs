use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use autoloop_core::{AgentInvokeRequest, AgentRole, LlmAgentClient};
use autoloop_requirements::Requirement;

#[derive(Debug, Clone)]
pub struct RedPhaseOutput {
    pub test_path: PathBuf,
    pub test_code: String,
}

#[derive(Debug, Clone)]
pub struct GreenPhaseOutput {
    pub impl_path: PathBuf,
    pub impl_code: String,
}

fn slug(requirement: &Requirement) -> String {
    requirement
        .description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(40)
        .collect()
}

/// Asks the TDD guide agent for a failing test covering `requirement`
/// and writes it under `working_dir/tests/`.
pub async fn red_phase(
    agent: &Arc<dyn LlmAgentClient>,
    requirement: &Requirement,
    working_dir: &Path,
) -> anyhow::Result<RedPhaseOutput> {
    let response = agent
        .invoke(AgentInvokeRequest {
            agent: AgentRole::TddGuide,
            task: format!(
                "Write a single failing test that captures this requirement: {}",
                requirement.description
            ),
            context: Some(json!({ "requirement_id": requirement.id.as_str(), "phase": "red" })),
            options: None,
        })
        .await?;

    if !response.success {
        anyhow::bail!("tdd-guide agent failed during red phase: {:?}", response.error);
    }

    let test_path = working_dir.join("tests").join(format!("{}_test.txt", slug(requirement)));
    if let Some(parent) = test_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&test_path, &response.output).await?;

    Ok(RedPhaseOutput { test_path, test_code: response.output })
}

/// Asks the TDD agent for the minimal implementation that satisfies the
/// red-phase test and writes it under `working_dir/src/`.
pub async fn green_phase(
    agent: &Arc<dyn LlmAgentClient>,
    requirement: &Requirement,
    red: &RedPhaseOutput,
    working_dir: &Path,
) -> anyhow::Result<GreenPhaseOutput> {
    let response = agent
        .invoke(AgentInvokeRequest {
            agent: AgentRole::TddGuide,
            task: format!(
                "Write the minimal implementation that makes this test pass:\n{}",
                red.test_code
            ),
            context: Some(json!({ "requirement_id": requirement.id.as_str(), "phase": "green" })),
            options: None,
        })
        .await?;

    if !response.success {
        anyhow::bail!("tdd-guide agent failed during green phase: {:?}", response.error);
    }

    let impl_path = working_dir.join("src").join(format!("{}_impl.txt", slug(requirement)));
    if let Some(parent) = impl_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&impl_path, &response.output).await?;

    Ok(GreenPhaseOutput { impl_path, impl_code: response.output })
}

/// Asks the code-reviewer agent for refactor suggestions on the green
/// implementation. Returns `None` when the reviewer has nothing to add.
pub async fn propose_refactor(
    agent: &Arc<dyn LlmAgentClient>,
    requirement: &Requirement,
    green: &GreenPhaseOutput,
) -> anyhow::Result<Option<String>> {
    let response = agent
        .invoke(AgentInvokeRequest {
            agent: AgentRole::CodeReviewer,
            task: format!("Suggest refactor improvements for:\n{}", green.impl_code),
            context: Some(json!({ "requirement_id": requirement.id.as_str(), "phase": "refactor" })),
            options: None,
        })
        .await?;

    if !response.success || response.output.trim().is_empty() || response.output == green.impl_code {
        return Ok(None);
    }
    Ok(Some(response.output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_core::fakes::EchoAgentClient;
    use autoloop_requirements::{parse_requirements, Requirement};

    fn requirement() -> Requirement {
        parse_requirements("implement add(a, b)").0.remove(0)
    }

    #[tokio::test]
    async fn red_phase_writes_a_test_file() {
        let dir = tempfile::tempdir().unwrap();
        let agent: Arc<dyn LlmAgentClient> = Arc::new(EchoAgentClient);
        let red = red_phase(&agent, &requirement(), dir.path()).await.unwrap();
        assert!(red.test_path.exists());
    }

    #[tokio::test]
    async fn green_phase_writes_an_impl_file() {
        let dir = tempfile::tempdir().unwrap();
        let agent: Arc<dyn LlmAgentClient> = Arc::new(EchoAgentClient);
        let red = red_phase(&agent, &requirement(), dir.path()).await.unwrap();
        let green = green_phase(&agent, &requirement(), &red, dir.path()).await.unwrap();
        assert!(green.impl_path.exists());
    }
}
