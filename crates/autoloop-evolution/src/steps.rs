use std::sync::Arc;
use std::time::Instant;

use autoloop_core::{
    AgentInvokeRequest, AgentRole, LlmAgentClient, SandboxBackend, SandboxExecuteRequest,
};
use autoloop_knowledge::KnowledgeStore;
use autoloop_sandbox::execute_with_reflection;

use crate::types::{Problem, WebContext};

pub const KNOWLEDGE_RELEVANCE_THRESHOLD: f64 = 0.8;

/// Step 2: searches the knowledge store; a hit above
/// [`KNOWLEDGE_RELEVANCE_THRESHOLD`] with an attached code example is
/// taken as a solution, bumping the entry's success count.
pub async fn knowledge_step(
    knowledge: &KnowledgeStore,
    problem: &Problem,
) -> anyhow::Result<Option<(String, String)>> {
    let hits = knowledge.search(&problem.search_query(), 1).await?;
    let Some((entry, score)) = hits.into_iter().next() else {
        return Ok(None);
    };
    if score <= KNOWLEDGE_RELEVANCE_THRESHOLD {
        return Ok(None);
    }
    let Some(example) = entry.code_examples.first().cloned() else {
        return Ok(None);
    };
    knowledge.record_reuse(&entry.id).await?;
    Ok(Some((entry.id, example)))
}

/// Step 3: queries the dynamic tool registry, executes the best match
/// in the sandbox, and records usage statistics regardless of outcome.
/// Only an exit code of zero counts as solving the problem.
pub async fn tool_step(
    knowledge: &KnowledgeStore,
    sandbox: &dyn SandboxBackend,
    problem: &Problem,
    min_similarity: f64,
) -> anyhow::Result<Option<(String, String)>> {
    let language_tag = match problem.language {
        autoloop_core::SandboxLanguage::Python => "python",
        autoloop_core::SandboxLanguage::Nodejs => "nodejs",
        autoloop_core::SandboxLanguage::Bash => "bash",
    };
    let candidates = knowledge.find_tools(&problem.search_query(), language_tag, min_similarity).await?;
    let Some(tool) = candidates.into_iter().next() else {
        return Ok(None);
    };

    let started = Instant::now();
    let result = sandbox
        .execute(SandboxExecuteRequest {
            language: problem.language,
            code: tool.code.clone(),
            timeout_ms: 10_000,
            working_dir: Some(problem.working_dir.to_string_lossy().to_string()),
            env: Default::default(),
            limits: None,
        })
        .await?;
    let duration_ms = started.elapsed().as_millis() as u64;
    let success = result.exit_code == 0;
    knowledge.record_tool_usage(&tool.id, success, duration_ms).await?;

    if success {
        Ok(Some((tool.id, result.stdout)))
    } else {
        Ok(None)
    }
}

/// Step 4: asks the LLM agent to generate code for the problem, folding
/// in web context and prior failed attempts, then runs it with
/// reflection-driven retries.
pub async fn generation_step(
    agent: &dyn LlmAgentClient,
    sandbox: Arc<dyn SandboxBackend>,
    problem: &Problem,
    web_context: &WebContext,
    prior_attempts: &[String],
    max_retries: u32,
) -> anyhow::Result<Option<String>> {
    let mut task = format!("Write code that resolves this problem: {}", problem.description);
    if let Some(error) = &problem.error {
        task.push_str(&format!("\nObserved error: {error}"));
    }
    if !web_context.is_empty() {
        task.push('\n');
        task.push_str(&web_context.as_prompt_fragment());
    }
    if !prior_attempts.is_empty() {
        task.push_str("\nPrior failed attempts:\n");
        for attempt in prior_attempts {
            task.push_str("- ");
            task.push_str(attempt);
            task.push('\n');
        }
    }

    let response = agent
        .invoke(AgentInvokeRequest { agent: AgentRole::General, task, context: None, options: None })
        .await?;
    if !response.success || response.output.trim().is_empty() {
        return Ok(None);
    }

    let request = SandboxExecuteRequest {
        language: problem.language,
        code: response.output,
        timeout_ms: 10_000,
        working_dir: Some(problem.working_dir.to_string_lossy().to_string()),
        env: Default::default(),
        limits: None,
    };
    let outcome = execute_with_reflection(sandbox.as_ref(), request, max_retries, None::<fn(&autoloop_sandbox::ReflectionAttempt)>).await?;
    if outcome.succeeded() {
        Ok(Some(outcome.final_result.stdout))
    } else {
        Ok(None)
    }
}
