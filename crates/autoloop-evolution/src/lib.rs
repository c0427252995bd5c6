//! Evolution Loop: the autonomous self-healing pipeline that tries, in
//! order, reusing knowledge, reusing a learned tool, and generating
//! fresh code before giving up on a problem.

mod steps;
mod types;
mod web;

pub use steps::KNOWLEDGE_RELEVANCE_THRESHOLD;
pub use types::{EvolutionOutcome, Problem, ResolvedBy, WebContext, WebFetchCache, WebSearchClient, WebSearchHit};

use std::sync::Arc;
use std::time::Instant;

use autoloop_core::{LlmAgentClient, SandboxBackend};
use autoloop_knowledge::{DynamicTool, KnowledgeStore, SedimentContext};

/// Tunables for the loop; defaults match the documented thresholds.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub web_search_threshold: f64,
    pub web_search_enabled: bool,
    pub max_web_results: usize,
    pub max_generation_retries: u32,
    pub min_tool_similarity: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            web_search_threshold: 0.4,
            web_search_enabled: true,
            max_web_results: 3,
            max_generation_retries: 3,
            min_tool_similarity: 0.3,
        }
    }
}

pub struct EvolutionLoop {
    agent_client: Arc<dyn LlmAgentClient>,
    sandbox: Arc<dyn SandboxBackend>,
    knowledge: Arc<KnowledgeStore>,
    web_search: Option<Arc<dyn WebSearchClient>>,
    web_cache: Option<Arc<dyn WebFetchCache>>,
    config: EvolutionConfig,
}

impl EvolutionLoop {
    pub fn new(
        agent_client: Arc<dyn LlmAgentClient>,
        sandbox: Arc<dyn SandboxBackend>,
        knowledge: Arc<KnowledgeStore>,
        config: EvolutionConfig,
    ) -> Self {
        Self { agent_client, sandbox, knowledge, web_search: None, web_cache: None, config }
    }

    pub fn with_web_retrieval(mut self, search: Arc<dyn WebSearchClient>, cache: Arc<dyn WebFetchCache>) -> Self {
        self.web_search = Some(search);
        self.web_cache = Some(cache);
        self
    }

    /// Runs the full loop for `problem`. `confidence` is the caller's
    /// prior belief (0.0-1.0) that it already knows the fix without
    /// consulting external documentation; below
    /// `EvolutionConfig::web_search_threshold` the loop fetches web
    /// context before attempting generation.
    pub async fn resolve(&self, problem: &Problem, confidence: f64) -> anyhow::Result<EvolutionOutcome> {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut prior_attempts: Vec<String> = Vec::new();

        let web_context = if confidence < self.config.web_search_threshold
            && self.config.web_search_enabled
        {
            match (&self.web_search, &self.web_cache) {
                (Some(search), Some(cache)) => web::gather_web_context(
                    Arc::clone(search),
                    Arc::clone(cache),
                    &problem.search_query(),
                    problem.technology.as_deref(),
                    self.config.max_web_results,
                )
                .await
                .unwrap_or_default(),
                _ => WebContext::default(),
            }
        } else {
            WebContext::default()
        };

        // Step 2: knowledge reuse.
        attempts += 1;
        if let Some((knowledge_id, solution)) = steps::knowledge_step(&self.knowledge, problem).await? {
            tracing::info!(session_id = %problem.session_id.as_str(), knowledge_id = %knowledge_id, "resolved problem by reusing knowledge");
            return Ok(EvolutionOutcome {
                solved: true,
                solution: Some(solution),
                resolved_by: Some(ResolvedBy::Knowledge),
                attempts,
                knowledge_id: Some(knowledge_id),
                learned_tool_id: None,
                used_tool_id: None,
                duration_ms: started.elapsed().as_millis() as u64,
                summary: "resolved from prior knowledge".to_string(),
            });
        }

        // Step 3: tool discovery.
        attempts += 1;
        if let Some((tool_id, solution)) =
            steps::tool_step(&self.knowledge, self.sandbox.as_ref(), problem, self.config.min_tool_similarity).await?
        {
            tracing::info!(session_id = %problem.session_id.as_str(), tool_id = %tool_id, "resolved problem using a learned tool");
            return Ok(EvolutionOutcome {
                solved: true,
                solution: Some(solution),
                resolved_by: Some(ResolvedBy::Tool),
                attempts,
                knowledge_id: None,
                learned_tool_id: None,
                used_tool_id: Some(tool_id),
                duration_ms: started.elapsed().as_millis() as u64,
                summary: "resolved by reusing a learned tool".to_string(),
            });
        }

        // Step 4: dynamic generation with reflection.
        attempts += 1;
        let generated = steps::generation_step(
            self.agent_client.as_ref(),
            Arc::clone(&self.sandbox),
            problem,
            &web_context,
            &prior_attempts,
            self.config.max_generation_retries,
        )
        .await?;

        match generated {
            Some(solution) => {
                let (knowledge_id, learned_tool_id) = self.sediment_success(problem, &solution).await?;
                tracing::info!(session_id = %problem.session_id.as_str(), "resolved problem by generating new code");
                Ok(EvolutionOutcome {
                    solved: true,
                    solution: Some(solution),
                    resolved_by: Some(ResolvedBy::Generation),
                    attempts,
                    knowledge_id: Some(knowledge_id),
                    learned_tool_id,
                    used_tool_id: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                    summary: "resolved by generating and executing new code".to_string(),
                })
            }
            None => {
                prior_attempts.push(problem.description.clone());
                tracing::warn!(session_id = %problem.session_id.as_str(), "evolution loop exhausted all steps without a solution");
                Ok(EvolutionOutcome::unsolved(
                    attempts,
                    started.elapsed().as_millis() as u64,
                    "knowledge reuse, tool reuse, and generation all failed",
                ))
            }
        }
    }

    /// Step 5: always insert/merge a knowledge entry; additionally
    /// learn a `DynamicTool` when the solution looks reusable — it
    /// actually produced stdout and isn't a one-line echo, which is a
    /// weak but cheap proxy for "this is worth trying again" absent a
    /// real static-analysis quality gate.
    async fn sediment_success(&self, problem: &Problem, solution: &str) -> anyhow::Result<(String, Option<String>)> {
        let context = SedimentContext {
            problem: problem.description.clone(),
            error_type: problem.error.clone(),
            technology: problem.technology.clone(),
            solution: "generated and executed new code".to_string(),
            steps: vec!["dynamic generation".to_string(), "reflection-driven retry".to_string()],
            reflection: None,
            sources: vec![],
            code_example: Some(solution.to_string()),
        };
        let knowledge_id = self.knowledge.sediment(context).await?;

        let passes_quality_gate = solution.trim().len() > 1;
        let learned_tool_id = if passes_quality_gate {
            let tool = DynamicTool {
                id: autoloop_types::new_id(),
                name: format!("auto-tool-{}", problem.session_id.as_str()),
                language: steps_language_tag(problem).to_string(),
                description: problem.description.clone(),
                code: solution.to_string(),
                tags: problem.technology.clone().into_iter().collect(),
                uses: 0,
                successes: 0,
                total_duration_ms: 0,
                created_at: chrono::Utc::now(),
            };
            let id = tool.id.clone();
            self.knowledge.register_tool(tool).await?;
            Some(id)
        } else {
            None
        };

        Ok((knowledge_id, learned_tool_id))
    }
}

fn steps_language_tag(problem: &Problem) -> &'static str {
    match problem.language {
        autoloop_core::SandboxLanguage::Python => "python",
        autoloop_core::SandboxLanguage::Nodejs => "nodejs",
        autoloop_core::SandboxLanguage::Bash => "bash",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_core::fakes::{EchoAgentClient, NoopSandboxBackend};
    use autoloop_types::SessionId;

    fn problem(dir: &std::path::Path) -> Problem {
        Problem {
            session_id: SessionId::new(),
            description: "fix flaky import".to_string(),
            error: Some("ModuleNotFoundError".to_string()),
            technology: Some("python".to_string()),
            language: autoloop_core::SandboxLanguage::Python,
            working_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn falls_through_to_generation_when_knowledge_and_tools_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = Arc::new(KnowledgeStore::open(&dir.path().join("k.sqlite")).await.unwrap());
        let evo = EvolutionLoop::new(
            Arc::new(EchoAgentClient),
            Arc::new(NoopSandboxBackend),
            knowledge,
            EvolutionConfig { web_search_enabled: false, ..Default::default() },
        );
        let outcome = evo.resolve(&problem(dir.path()), 0.9).await.unwrap();
        assert!(outcome.solved);
        assert_eq!(outcome.resolved_by, Some(ResolvedBy::Generation));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn reuses_a_pre_existing_knowledge_entry_above_the_relevance_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = Arc::new(KnowledgeStore::open(&dir.path().join("k.sqlite")).await.unwrap());
        knowledge
            .sediment(SedimentContext {
                problem: "flaky problem solution".to_string(),
                error_type: None,
                technology: None,
                solution: "flaky problem solution".to_string(),
                steps: vec![],
                reflection: None,
                sources: vec![],
                code_example: Some("print('patched')".to_string()),
            })
            .await
            .unwrap();

        let evo = EvolutionLoop::new(
            Arc::new(EchoAgentClient),
            Arc::new(NoopSandboxBackend),
            Arc::clone(&knowledge),
            EvolutionConfig { web_search_enabled: false, ..Default::default() },
        );
        let mut p = problem(dir.path());
        p.description = "flaky problem solution".to_string();
        p.error = None;

        let outcome = evo.resolve(&p, 0.9).await.unwrap();
        assert_eq!(outcome.resolved_by, Some(ResolvedBy::Knowledge));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.solution.as_deref(), Some("print('patched')"));
    }
}
