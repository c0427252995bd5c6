use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use autoloop_types::{Metadata, Priority, SessionId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Blocked,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub dependencies: Vec<TaskId>,
    /// Reflexive closure of `dependencies`: every task that names this
    /// one as a dependency. Maintained by [`crate::TaskQueue::add`].
    #[serde(default)]
    pub dependent_ids: Vec<TaskId>,
    pub priority: Priority,
    pub assigned_role: String,
    pub template_id: Option<String>,
    /// Name of a quality gate that must pass before this task is
    /// reported complete, e.g. "tests-pass". Evaluated by the caller.
    pub gate: Option<String>,
    pub state: TaskState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub artifacts: Vec<String>,
    pub validation_result: Option<Value>,
    pub error_message: Option<String>,
    pub session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>, dependencies: Vec<TaskId>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            dependencies,
            dependent_ids: Vec::new(),
            priority: Priority::Medium,
            assigned_role: "worker".to_string(),
            template_id: None,
            gate: None,
            state: TaskState::Pending,
            retry_count: 0,
            max_retries: 2,
            artifacts: Vec::new(),
            validation_result: None,
            error_message: None,
            session_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: Metadata::new(),
        }
    }

    pub fn is_runnable(&self, completed: &dyn Fn(&TaskId) -> bool) -> bool {
        self.state == TaskState::Pending && self.dependencies.iter().all(|dep| completed(dep))
    }
}
