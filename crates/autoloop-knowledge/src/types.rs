use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub content: String,
    pub code_examples: Vec<String>,
    pub success_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw inputs for one problem-solving episode, distilled into a
/// [`KnowledgeEntry`] by [`crate::KnowledgeStore::sediment`].
#[derive(Debug, Clone)]
pub struct SedimentContext {
    pub problem: String,
    pub error_type: Option<String>,
    pub technology: Option<String>,
    pub solution: String,
    pub steps: Vec<String>,
    pub reflection: Option<String>,
    pub sources: Vec<String>,
    pub code_example: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicTool {
    pub id: String,
    pub name: String,
    pub language: String,
    pub description: String,
    pub code: String,
    pub tags: Vec<String>,
    pub uses: u32,
    pub successes: u32,
    pub total_duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl DynamicTool {
    pub fn success_rate(&self) -> f64 {
        if self.uses == 0 {
            0.0
        } else {
            self.successes as f64 / self.uses as f64
        }
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.uses == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.uses as f64
        }
    }
}
