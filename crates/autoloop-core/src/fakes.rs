//! In-memory fakes for every collaborator trait, so downstream crates can
//! unit test against `autoloop-core` without a real LLM, Docker, or VCS
//! installed. Mirrors the reference engine's pattern of keeping
//! test doubles alongside the trait definitions they implement.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::collaborators::{
    AgentInvokeRequest, AgentInvokeResponse, KvStore, LlmAgentClient, SandboxBackend,
    SandboxExecuteRequest, SandboxExecuteResult, VcsDriver, VcsStatus,
};

/// Always succeeds, echoing the task as output.
pub struct EchoAgentClient;

#[async_trait]
impl LlmAgentClient for EchoAgentClient {
    async fn invoke(&self, request: AgentInvokeRequest) -> anyhow::Result<AgentInvokeResponse> {
        Ok(AgentInvokeResponse {
            success: true,
            output: format!("[{:?}] {}", request.agent, request.task),
            duration_ms: 1,
            metadata: None,
            error: None,
        })
    }
}

/// Always exits zero without actually running anything.
pub struct NoopSandboxBackend;

#[async_trait]
impl SandboxBackend for NoopSandboxBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn execute(&self, _request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult> {
        Ok(SandboxExecuteResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
            error: None,
        })
    }
}

#[derive(Default)]
pub struct InMemoryVcsDriver {
    clean: Mutex<bool>,
    commits: Mutex<Vec<String>>,
}

impl InMemoryVcsDriver {
    pub fn new() -> Self {
        Self {
            clean: Mutex::new(true),
            commits: Mutex::new(Vec::new()),
        }
    }

    pub fn mark_dirty(&self) {
        *self.clean.lock().unwrap() = false;
    }
}

#[async_trait]
impl VcsDriver for InMemoryVcsDriver {
    async fn get_status(&self) -> anyhow::Result<VcsStatus> {
        Ok(VcsStatus {
            clean: *self.clean.lock().unwrap(),
            changed_files: Vec::new(),
        })
    }

    async fn create_commit(&self, message: &str, _add_all: bool, _allow_empty: bool) -> anyhow::Result<String> {
        let hash = format!("fake-{}", autoloop_types::new_id());
        self.commits.lock().unwrap().push(format!("{hash}: {message}"));
        *self.clean.lock().unwrap() = true;
        Ok(hash)
    }

    async fn reset_to_commit(&self, _commit: &str, _hard: bool) -> anyhow::Result<()> {
        *self.clean.lock().unwrap() = true;
        Ok(())
    }

    async fn get_current_commit(&self) -> anyhow::Result<Option<String>> {
        Ok(self.commits.lock().unwrap().last().cloned())
    }

    async fn is_clean(&self) -> anyhow::Result<bool> {
        Ok(*self.clean.lock().unwrap())
    }

    async fn stash(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unstash(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKvStore {
    data: Mutex<HashMap<Vec<String>, Value>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn read(&self, key: &[String]) -> anyhow::Result<Option<Value>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn write(&self, key: &[String], value: Value) -> anyhow::Result<()> {
        self.data.lock().unwrap().insert(key.to_vec(), value);
        Ok(())
    }

    async fn remove(&self, key: &[String]) -> anyhow::Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &[String]) -> anyhow::Result<Vec<Vec<String>>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_store_round_trips() {
        let store = InMemoryKvStore::new();
        let key = vec!["autonomous".to_string(), "context".to_string()];
        store.write(&key, serde_json::json!({"a": 1})).await.unwrap();
        let value = store.read(&key).await.unwrap();
        assert_eq!(value, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn vcs_driver_commit_clears_dirty_flag() {
        let vcs = InMemoryVcsDriver::new();
        vcs.mark_dirty();
        assert!(!vcs.is_clean().await.unwrap());
        vcs.create_commit("msg", true, false).await.unwrap();
        assert!(vcs.is_clean().await.unwrap());
    }
}
