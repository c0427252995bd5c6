//! Knowledge Store: persistent, rule-based-similarity knowledge base of
//! past problem-solving episodes plus the registry of tools learned
//! from them.

mod db;
mod similarity;
mod types;

pub use db::KnowledgeDb;
pub use types::{DynamicTool, KnowledgeEntry, SedimentContext};

use std::path::Path;

use chrono::Utc;

const MERGE_THRESHOLD: f64 = 0.9;
const SEARCH_CUTOFF: f64 = 0.2;
const MAX_TAGS: usize = 10;

pub struct KnowledgeStore {
    db: KnowledgeDb,
}

fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut words = Vec::new();
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if word.len() > 3 && seen.insert(word.to_string()) {
            words.push(word.to_string());
            if words.len() >= limit {
                break;
            }
        }
    }
    words
}

fn derive_title(context: &SedimentContext) -> String {
    match &context.error_type {
        Some(error_type) => error_type.clone(),
        None => context.problem.chars().take(60).collect(),
    }
}

fn derive_tags(context: &SedimentContext) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(tech) = &context.technology {
        tags.push(tech.to_lowercase());
    }
    tags.extend(top_keywords(&context.problem, MAX_TAGS));
    if let Some(error_type) = &context.error_type {
        tags.push(error_type.to_lowercase());
    }
    tags.extend(top_keywords(&context.solution, MAX_TAGS));
    tags.truncate(MAX_TAGS);
    tags.sort();
    tags.dedup();
    tags
}

fn derive_content(context: &SedimentContext) -> String {
    let mut sections = vec![format!("Problem: {}", context.problem)];
    if let Some(error_type) = &context.error_type {
        sections.push(format!("Error: {error_type}"));
    }
    sections.push(format!("Solution: {}", context.solution));
    if !context.steps.is_empty() {
        sections.push(format!("Steps: {}", context.steps.join(" -> ")));
    }
    if let Some(reflection) = &context.reflection {
        sections.push(format!("Reflection: {reflection}"));
    }
    if !context.sources.is_empty() {
        sections.push(format!("Sources: {}", context.sources.join(", ")));
    }
    sections.join("\n")
}

impl KnowledgeStore {
    pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
        Ok(Self { db: KnowledgeDb::open(db_path).await? })
    }

    /// Distills one problem-solving episode into a knowledge entry,
    /// merging into the closest existing entry above 0.9 similarity
    /// rather than creating a duplicate.
    pub async fn sediment(&self, context: SedimentContext) -> anyhow::Result<String> {
        let title = derive_title(&context);
        let tags = derive_tags(&context);
        let content = derive_content(&context);

        let existing = self.db.all_entries().await?;
        let best_match = existing
            .iter()
            .map(|entry| (entry, similarity::entry_similarity(&tags, &title, entry)))
            .filter(|(_, score)| *score > MERGE_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        match best_match {
            Some((entry, _)) => {
                let mut merged = entry.clone();
                if let Some(example) = &context.code_example {
                    if !merged.code_examples.contains(example) {
                        merged.code_examples.push(example.clone());
                    }
                }
                merged.success_count += 1;
                merged.updated_at = Utc::now();
                self.db.upsert_entry(&merged).await?;
                tracing::debug!(entry_id = %merged.id, "merged sediment into existing knowledge entry");
                Ok(merged.id)
            }
            None => {
                let now = Utc::now();
                let entry = KnowledgeEntry {
                    id: autoloop_types::new_id(),
                    title,
                    tags,
                    content,
                    code_examples: context.code_example.into_iter().collect(),
                    success_count: 1,
                    created_at: now,
                    updated_at: now,
                };
                self.db.upsert_entry(&entry).await?;
                tracing::debug!(entry_id = %entry.id, "sedimented new knowledge entry");
                Ok(entry.id)
            }
        }
    }

    /// `0.5 * tag match + 0.5 * content match + min(success/10, 0.2)`,
    /// keeping only entries scoring above 0.2, sorted descending.
    pub async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<(KnowledgeEntry, f64)>> {
        let entries = self.db.all_entries().await?;
        let mut scored: Vec<(KnowledgeEntry, f64)> = entries
            .into_iter()
            .map(|entry| {
                let score = similarity::search_score(query, &entry);
                (entry, score)
            })
            .filter(|(_, score)| *score > SEARCH_CUTOFF)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(k);
        Ok(scored)
    }

    /// Bumps `success_count`/`updated_at` on a reused entry without
    /// re-scoring or merging anything else about it.
    pub async fn record_reuse(&self, entry_id: &str) -> anyhow::Result<()> {
        let entries = self.db.all_entries().await?;
        if let Some(mut entry) = entries.into_iter().find(|e| e.id == entry_id) {
            entry.success_count += 1;
            entry.updated_at = Utc::now();
            self.db.upsert_entry(&entry).await?;
        }
        Ok(())
    }

    pub async fn register_tool(&self, tool: DynamicTool) -> anyhow::Result<()> {
        self.db.upsert_tool(&tool).await
    }

    pub async fn find_tools(&self, query: &str, language: &str, min_similarity: f64) -> anyhow::Result<Vec<DynamicTool>> {
        let query_tags: Vec<String> = top_keywords(query, MAX_TAGS);
        let tools = self.db.all_tools().await?;
        let mut scored: Vec<(DynamicTool, f64)> = tools
            .into_iter()
            .filter(|tool| tool.language == language)
            .map(|tool| {
                let tag_set: std::collections::HashSet<String> = tool.tags.iter().cloned().collect();
                let query_set: std::collections::HashSet<String> = query_tags.iter().cloned().collect();
                let score = similarity::jaccard(&tag_set, &query_set);
                (tool, score)
            })
            .filter(|(_, score)| *score >= min_similarity)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        Ok(scored.into_iter().map(|(tool, _)| tool).collect())
    }

    pub async fn record_tool_usage(&self, tool_id: &str, success: bool, duration_ms: u64) -> anyhow::Result<()> {
        let tools = self.db.all_tools().await?;
        if let Some(mut tool) = tools.into_iter().find(|t| t.id == tool_id) {
            tool.uses += 1;
            if success {
                tool.successes += 1;
            }
            tool.total_duration_ms += duration_ms;
            self.db.upsert_tool(&tool).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(problem: &str, solution: &str) -> SedimentContext {
        SedimentContext {
            problem: problem.to_string(),
            error_type: Some("ModuleNotFoundError".to_string()),
            technology: Some("python".to_string()),
            solution: solution.to_string(),
            steps: vec!["install package".to_string()],
            reflection: None,
            sources: vec![],
            code_example: Some("pip install requests".to_string()),
        }
    }

    #[tokio::test]
    async fn sediment_creates_a_new_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("k.sqlite")).await.unwrap();
        let id = store.sediment(context("missing requests module", "install requests via pip")).await.unwrap();
        assert!(!id.is_empty());
        let results = store.search("requests module missing", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn identical_sediment_twice_merges_instead_of_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("k.sqlite")).await.unwrap();
        let ctx = context("missing requests module", "install requests via pip");
        let first = store.sediment(ctx.clone()).await.unwrap();
        let second = store.sediment(ctx).await.unwrap();
        assert_eq!(first, second);
        let entries = store.db.all_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].success_count, 2);
    }

    #[tokio::test]
    async fn find_tools_filters_by_language_and_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("k.sqlite")).await.unwrap();
        store
            .register_tool(DynamicTool {
                id: "t1".to_string(),
                name: "retry-fetch".to_string(),
                language: "python".to_string(),
                description: "retries a flaky http fetch".to_string(),
                code: "def retry(): pass".to_string(),
                tags: vec!["retry".to_string(), "http".to_string()],
                uses: 0,
                successes: 0,
                total_duration_ms: 0,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let found = store.find_tools("http retry", "python", 0.1).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
