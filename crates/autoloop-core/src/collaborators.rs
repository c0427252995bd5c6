use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed agent set the LLM agent client dispatches to, §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    CodeReviewer,
    SecurityReviewer,
    TddGuide,
    Architect,
    Explore,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInvokeRequest {
    pub agent: AgentRole,
    pub task: String,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInvokeResponse {
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// *LLM agent client* collaborator contract, §6. Out of scope to
/// implement fully — the core only consumes this interface.
#[async_trait]
pub trait LlmAgentClient: Send + Sync {
    async fn invoke(&self, request: AgentInvokeRequest) -> anyhow::Result<AgentInvokeResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub cpu_quota_percent: Option<u32>,
    #[serde(default)]
    pub allow_network: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxLanguage {
    Python,
    Nodejs,
    Bash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxExecuteRequest {
    pub language: SandboxLanguage,
    pub code: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub limits: Option<SandboxLimits>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxExecuteResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// *Sandbox backend* collaborator contract, §6/§4.8. `autoloop-sandbox`
/// provides the process/container/wasm implementations and the `auto`
/// selection heuristic.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsStatus {
    pub clean: bool,
    pub changed_files: Vec<String>,
}

/// *VCS driver* collaborator contract, §6.
#[async_trait]
pub trait VcsDriver: Send + Sync {
    async fn get_status(&self) -> anyhow::Result<VcsStatus>;
    async fn create_commit(&self, message: &str, add_all: bool, allow_empty: bool) -> anyhow::Result<String>;
    async fn reset_to_commit(&self, commit: &str, hard: bool) -> anyhow::Result<()>;
    async fn get_current_commit(&self) -> anyhow::Result<Option<String>>;
    async fn is_clean(&self) -> anyhow::Result<bool>;
    async fn stash(&self) -> anyhow::Result<()>;
    async fn unstash(&self) -> anyhow::Result<()>;
}

/// *KV storage* collaborator contract, §6. Keys are path segments,
/// namespaced by the caller (e.g. `["autonomous", "context", project_id,
/// session_id]`) per §6's persisted-state layout.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn read(&self, key: &[String]) -> anyhow::Result<Option<Value>>;
    async fn write(&self, key: &[String], value: Value) -> anyhow::Result<()>;
    async fn remove(&self, key: &[String]) -> anyhow::Result<()>;
    async fn list(&self, prefix: &[String]) -> anyhow::Result<Vec<Vec<String>>>;
}
