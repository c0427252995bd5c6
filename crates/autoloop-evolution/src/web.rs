use std::sync::Arc;

use tokio::task::JoinSet;

use crate::types::{WebContext, WebFetchCache, WebSearchClient};

/// Extracts fenced code blocks and the prose around them from a raw
/// page body. No markdown parser crate is pulled in for this — the
/// split is simple enough that a hand-rolled scan is clearer than a
/// dependency.
fn extract_sections(page: &str) -> (Vec<String>, Vec<String>) {
    let mut sections = Vec::new();
    let mut code_blocks = Vec::new();
    let mut in_code = false;
    let mut buffer = String::new();

    for line in page.lines() {
        if line.trim_start().starts_with("```") {
            if in_code {
                if !buffer.trim().is_empty() {
                    code_blocks.push(buffer.trim().to_string());
                }
            } else if !buffer.trim().is_empty() {
                sections.push(buffer.trim().to_string());
            }
            buffer.clear();
            in_code = !in_code;
            continue;
        }
        buffer.push_str(line);
        buffer.push('\n');
    }
    if !buffer.trim().is_empty() {
        if in_code {
            code_blocks.push(buffer.trim().to_string());
        } else {
            sections.push(buffer.trim().to_string());
        }
    }

    sections.truncate(5);
    code_blocks.truncate(5);
    (sections, code_blocks)
}

/// Fans out one fetch per search hit concurrently via `JoinSet`, the
/// one documented point of intra-step parallelism in the loop. A
/// failed fetch is dropped rather than aborting the whole step — a
/// partial web context is still useful context for generation.
pub async fn gather_web_context(
    search: Arc<dyn WebSearchClient>,
    cache: Arc<dyn WebFetchCache>,
    query: &str,
    technology: Option<&str>,
    max_results: usize,
) -> anyhow::Result<WebContext> {
    let hits = search.search(query, technology).await?;
    let urls: Vec<String> = hits.into_iter().take(max_results).map(|hit| hit.url).collect();

    let mut joins: JoinSet<(String, anyhow::Result<String>)> = JoinSet::new();
    for url in urls {
        let cache = Arc::clone(&cache);
        joins.spawn(async move {
            let page = cache.fetch(&url).await;
            (url, page)
        });
    }

    let mut context = WebContext::default();
    while let Some(joined) = joins.join_next().await {
        let Ok((url, page)) = joined else { continue };
        let Ok(page) = page else { continue };
        let (sections, code_blocks) = extract_sections(&page);
        context.sections.extend(sections);
        context.code_blocks.extend(code_blocks);
        context.sources.push(url);
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::types::WebSearchHit;

    struct FakeSearch;

    #[async_trait]
    impl WebSearchClient for FakeSearch {
        async fn search(&self, _query: &str, _technology: Option<&str>) -> anyhow::Result<Vec<WebSearchHit>> {
            Ok(vec![
                WebSearchHit { url: "https://docs.example/a".to_string(), title: "a".to_string(), snippet: String::new() },
                WebSearchHit { url: "https://docs.example/b".to_string(), title: "b".to_string(), snippet: String::new() },
            ])
        }
    }

    struct FakeCache;

    #[async_trait]
    impl WebFetchCache for FakeCache {
        async fn fetch(&self, url: &str) -> anyhow::Result<String> {
            Ok(format!("intro text\n```\nfix for {url}\n```\nmore text"))
        }
    }

    #[tokio::test]
    async fn fans_out_fetches_and_extracts_code_blocks() {
        let context = gather_web_context(Arc::new(FakeSearch), Arc::new(FakeCache), "q", None, 5)
            .await
            .unwrap();
        assert_eq!(context.code_blocks.len(), 2);
        assert_eq!(context.sources.len(), 2);
    }

    #[test]
    fn extract_sections_splits_prose_and_code() {
        let (sections, code) = extract_sections("para one\n```\nlet x = 1;\n```\npara two");
        assert_eq!(sections, vec!["para one".to_string(), "para two".to_string()]);
        assert_eq!(code, vec!["let x = 1;".to_string()]);
    }
}
