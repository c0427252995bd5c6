use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use autoloop_core::{AgentInvokeRequest, AgentInvokeResponse, AgentRole, LlmAgentClient};

use crate::registry::ProviderRegistry;

/// Per-role routing: which configured provider (and, optionally, which
/// model on that provider) answers invocations for a given `AgentRole`.
/// Roles with no entry fall through to the registry's default provider.
#[derive(Debug, Clone, Default)]
pub struct AgentRouting {
    routes: HashMap<AgentRole, (Option<String>, Option<String>)>,
}

impl AgentRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, role: AgentRole, provider_id: impl Into<String>, model_id: Option<String>) -> Self {
        self.routes.insert(role, (Some(provider_id.into()), model_id));
        self
    }

    fn lookup(&self, role: AgentRole) -> (Option<&str>, Option<&str>) {
        match self.routes.get(&role) {
            Some((provider, model)) => (provider.as_deref(), model.as_deref()),
            None => (None, None),
        }
    }
}

fn role_prompt(role: AgentRole, task: &str, context: Option<&serde_json::Value>) -> String {
    let persona = match role {
        AgentRole::CodeReviewer => "You are reviewing a code change for correctness and style.",
        AgentRole::SecurityReviewer => "You are reviewing a code change for security issues.",
        AgentRole::TddGuide => "You are guiding a strict red-green-refactor TDD cycle.",
        AgentRole::Architect => "You are deciding the architecture for the next implementation step.",
        AgentRole::Explore => "You are exploring the codebase to answer a question.",
        AgentRole::General => "You are completing a general coding task.",
    };
    match context {
        Some(ctx) => format!("{persona}\n\nTask: {task}\n\nContext:\n{ctx}"),
        None => format!("{persona}\n\nTask: {task}"),
    }
}

/// [`LlmAgentClient`] backed by a [`ProviderRegistry`], routing each
/// [`AgentRole`] to a configured provider and formatting the invocation
/// as a single role-flavored prompt.
pub struct RoutingAgentClient {
    registry: ProviderRegistry,
    routing: AgentRouting,
}

impl RoutingAgentClient {
    pub fn new(registry: ProviderRegistry, routing: AgentRouting) -> Self {
        Self { registry, routing }
    }
}

#[async_trait]
impl LlmAgentClient for RoutingAgentClient {
    async fn invoke(&self, request: AgentInvokeRequest) -> anyhow::Result<AgentInvokeResponse> {
        let started = Instant::now();
        let prompt = role_prompt(request.agent, &request.task, request.context.as_ref());
        let (provider_id, model_id) = self.routing.lookup(request.agent);

        let result = self
            .registry
            .complete_for_provider(provider_id, &prompt, model_id)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(output) => Ok(AgentInvokeResponse {
                success: true,
                output,
                duration_ms,
                metadata: None,
                error: None,
            }),
            Err(err) => Ok(AgentInvokeResponse {
                success: false,
                output: String::new(),
                duration_ms,
                metadata: None,
                error: Some(err.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProvidersConfig;

    #[tokio::test]
    async fn invoke_echoes_through_local_fallback_when_unconfigured() {
        let registry = ProviderRegistry::new(ProvidersConfig::default());
        let client = RoutingAgentClient::new(registry, AgentRouting::new());
        let response = client
            .invoke(AgentInvokeRequest {
                agent: AgentRole::General,
                task: "say hi".to_string(),
                context: None,
                options: None,
            })
            .await
            .unwrap();
        assert!(response.success);
        assert!(response.output.contains("say hi"));
    }
}
