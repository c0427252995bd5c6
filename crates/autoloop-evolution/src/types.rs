use std::path::PathBuf;

use async_trait::async_trait;
use autoloop_core::SandboxLanguage;
use autoloop_types::SessionId;

/// A problem the evolution loop is asked to resolve: a failing test, a
/// stack trace, or a general "make this work" request.
#[derive(Debug, Clone)]
pub struct Problem {
    pub session_id: SessionId,
    pub description: String,
    pub error: Option<String>,
    pub technology: Option<String>,
    pub language: SandboxLanguage,
    pub working_dir: PathBuf,
}

impl Problem {
    pub fn search_query(&self) -> String {
        match &self.error {
            Some(error) => format!("{} {}", self.description, error),
            None => self.description.clone(),
        }
    }
}

/// One hit from a web search provider.
#[derive(Debug, Clone)]
pub struct WebSearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Trusted documentation/community search, kept behind a trait so the
/// loop never depends on a specific search vendor. Fakeable in tests.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str, technology: Option<&str>) -> anyhow::Result<Vec<WebSearchHit>>;
}

/// Fetches and caches page bodies for the URLs a search returns. A real
/// implementation sits in front of an HTTP client with a TTL cache; the
/// loop only ever calls `fetch`.
#[async_trait]
pub trait WebFetchCache: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

/// Structured sections and code blocks extracted from fetched pages,
/// folded into the dynamic-generation prompt when the loop gets that
/// far.
#[derive(Debug, Clone, Default)]
pub struct WebContext {
    pub sections: Vec<String>,
    pub code_blocks: Vec<String>,
    pub sources: Vec<String>,
}

impl WebContext {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.code_blocks.is_empty()
    }

    pub fn as_prompt_fragment(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from("Web context:\n");
        for section in &self.sections {
            out.push_str("- ");
            out.push_str(section);
            out.push('\n');
        }
        for block in &self.code_blocks {
            out.push_str("```\n");
            out.push_str(block);
            out.push_str("\n```\n");
        }
        out
    }
}

/// Which step of the loop produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Knowledge,
    Tool,
    Generation,
}

#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    pub solved: bool,
    pub solution: Option<String>,
    pub resolved_by: Option<ResolvedBy>,
    pub attempts: u32,
    pub knowledge_id: Option<String>,
    pub learned_tool_id: Option<String>,
    pub used_tool_id: Option<String>,
    pub duration_ms: u64,
    pub summary: String,
}

impl EvolutionOutcome {
    pub fn unsolved(attempts: u32, duration_ms: u64, summary: impl Into<String>) -> Self {
        Self {
            solved: false,
            solution: None,
            resolved_by: None,
            attempts,
            knowledge_id: None,
            learned_tool_id: None,
            used_tool_id: None,
            duration_ms,
            summary: summary.into(),
        }
    }
}
