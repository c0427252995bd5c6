use std::collections::HashSet;

use crate::types::KnowledgeEntry;

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect()
}

pub fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Tag overlap weighted 0.6 plus title-word Jaccard weighted 0.4,
/// matching the entry-merge heuristic rather than the `search` scoring
/// below (they weight content differently).
pub fn entry_similarity(candidate_tags: &[String], candidate_title: &str, existing: &KnowledgeEntry) -> f64 {
    let candidate_tag_set: HashSet<String> = candidate_tags.iter().map(|t| t.to_lowercase()).collect();
    let existing_tag_set: HashSet<String> = existing.tags.iter().map(|t| t.to_lowercase()).collect();
    let tag_overlap = jaccard(&candidate_tag_set, &existing_tag_set);

    let title_overlap = jaccard(&tokenize(candidate_title), &tokenize(&existing.title));

    tag_overlap * 0.6 + title_overlap * 0.4
}

/// `0.5 * tag match + 0.5 * content match + min(success/10, 0.2)`; the
/// caller drops anything scoring at or below 0.2.
pub fn search_score(query: &str, entry: &KnowledgeEntry) -> f64 {
    let query_tokens = tokenize(query);
    let tag_tokens: HashSet<String> = entry.tags.iter().map(|t| t.to_lowercase()).collect();
    let content_tokens = tokenize(&entry.content);

    let tag_match = jaccard(&query_tokens, &tag_tokens);
    let content_match = jaccard(&query_tokens, &content_tokens);
    let success_bonus = (entry.success_count as f64 / 10.0).min(0.2);

    0.5 * tag_match + 0.5 * content_match + success_bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(title: &str, tags: &[&str], content: &str, success_count: u32) -> KnowledgeEntry {
        KnowledgeEntry {
            id: "e1".to_string(),
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            content: content.to_string(),
            code_examples: vec![],
            success_count,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn identical_tags_and_titles_score_one() {
        let e = entry("module not found error", &["python", "import"], "x", 0);
        let score = entry_similarity(&["python".to_string(), "import".to_string()], "module not found error", &e);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_entries_score_near_zero() {
        let e = entry("database migration failed", &["sql", "postgres"], "x", 0);
        let score = entry_similarity(&["javascript".to_string()], "fetch timeout", &e);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn search_score_rewards_high_success_count_within_cap() {
        let e = entry("retry logic", &["network", "retry"], "implement exponential backoff for retries", 50);
        let score = search_score("network retry", &e);
        assert!(score > 0.2);
    }
}
