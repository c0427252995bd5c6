use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;

use autoloop_types::AutonomyLevel;

/// Resource ceilings, §3 `ResourceUsage / ResourceBudget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBudgetConfig {
    pub max_tokens: u64,
    pub max_cost_usd: f64,
    pub max_elapsed_minutes: u64,
    pub max_files_changed: u64,
    pub max_actions: u64,
}

impl Default for ResourceBudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2_000_000,
            max_cost_usd: 25.0,
            max_elapsed_minutes: 120,
            max_files_changed: 200,
            max_actions: 2_000,
        }
    }
}

/// Sandbox backend preference, §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackendPreference {
    Auto,
    Process,
    Container,
    Wasm,
}

impl Default for SandboxBackendPreference {
    fn default() -> Self {
        SandboxBackendPreference::Auto
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub autonomy: AutonomyLevel,
    #[serde(default)]
    pub budget: ResourceBudgetConfig,
    #[serde(default)]
    pub sandbox_backend: SandboxBackendPreference,
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
    #[serde(default = "default_true")]
    pub auto_continue: bool,
    #[serde(default)]
    pub unattended: bool,
    #[serde(default = "default_web_search_threshold")]
    pub web_search_threshold: f64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_warn_threshold")]
    pub resource_warn_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_web_search_threshold() -> f64 {
    0.4
}

fn default_max_concurrent() -> usize {
    3
}

fn default_warn_threshold() -> f64 {
    0.8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            autonomy: AutonomyLevel::default(),
            budget: ResourceBudgetConfig::default(),
            sandbox_backend: SandboxBackendPreference::default(),
            auto_rollback: true,
            auto_continue: true,
            unattended: false,
            web_search_threshold: default_web_search_threshold(),
            max_concurrent_tasks: default_max_concurrent(),
            resource_warn_threshold: default_warn_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ConfigLayers {
    global: Value,
    project: Value,
    env: Value,
    cli: Value,
}

/// Layered configuration: global (`~/.config/autoloop/config.json`) <
/// project (`<project>/.autoloop/config.json`) < environment variables <
/// explicit CLI overrides, merged in increasing priority, mirroring the
/// reference engine's global/project/managed/env/cli `ConfigStore`.
#[derive(Clone)]
pub struct ConfigStore {
    project_path: PathBuf,
    global_path: PathBuf,
    layers: Arc<RwLock<ConfigLayers>>,
}

impl ConfigStore {
    pub async fn load(project_dir: impl AsRef<Path>, cli_overrides: Option<Value>) -> anyhow::Result<Self> {
        let project_path = project_dir.as_ref().join(".autoloop").join("config.json");
        if let Some(parent) = project_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let global_path = global_config_path();

        let global = read_json_file(&global_path).await.unwrap_or_else(empty_object);
        let project = read_json_file(&project_path).await.unwrap_or_else(empty_object);

        let layers = ConfigLayers {
            global,
            project,
            env: env_layer(),
            cli: cli_overrides.unwrap_or_else(empty_object),
        };

        Ok(Self {
            project_path,
            global_path,
            layers: Arc::new(RwLock::new(layers)),
        })
    }

    pub async fn get(&self) -> AppConfig {
        let merged = self.effective_value().await;
        serde_json::from_value(merged).unwrap_or_else(|err| {
            tracing::warn!(%err, "config layer failed to deserialize, falling back to defaults");
            AppConfig::default()
        })
    }

    async fn effective_value(&self) -> Value {
        let layers = self.layers.read().await;
        let mut merged = serde_json::to_value(AppConfig::default()).unwrap_or_else(|_| empty_object());
        for layer in [&layers.global, &layers.project, &layers.env, &layers.cli] {
            merge_json(&mut merged, layer);
        }
        merged
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn global_path(&self) -> &Path {
        &self.global_path
    }
}

fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                merge_json(base_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base_slot, overlay_value) => {
            if !overlay_value.is_null() {
                *base_slot = overlay_value.clone();
            }
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

async fn read_json_file(path: &Path) -> anyhow::Result<Value> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn global_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoloop")
        .join("config.json")
}

fn env_layer() -> Value {
    let mut map = serde_json::Map::new();
    if let Ok(autonomy) = std::env::var("AUTOLOOP_AUTONOMY") {
        map.insert("autonomy".to_string(), Value::String(autonomy.to_lowercase()));
    }
    if let Ok(unattended) = std::env::var("AUTOLOOP_UNATTENDED") {
        map.insert(
            "unattended".to_string(),
            Value::Bool(unattended == "1" || unattended.eq_ignore_ascii_case("true")),
        );
    }
    if let Ok(backend) = std::env::var("AUTOLOOP_SANDBOX_BACKEND") {
        map.insert(
            "sandbox_backend".to_string(),
            Value::String(backend.to_lowercase()),
        );
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_survive_an_empty_project_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path(), None).await.unwrap();
        let cfg = store.get().await;
        assert_eq!(cfg.autonomy, AutonomyLevel::Bold);
        assert_eq!(cfg.max_concurrent_tasks, 3);
    }

    #[tokio::test]
    async fn cli_overrides_win_over_project_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join(".autoloop"))
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join(".autoloop").join("config.json"),
            r#"{"autonomy":"timid"}"#,
        )
        .await
        .unwrap();

        let store = ConfigStore::load(dir.path(), Some(serde_json::json!({"autonomy": "wild"})))
            .await
            .unwrap();
        let cfg = store.get().await;
        assert_eq!(cfg.autonomy, AutonomyLevel::Wild);
    }
}
