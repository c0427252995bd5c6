//! HTTP-backed LLM providers and the `LlmAgentClient` implementation
//! that routes each `autoloop-core` agent role to one of them.

mod agent_client;
mod registry;

pub use agent_client::{AgentRouting, RoutingAgentClient};
pub use registry::{
    ModelInfo, Provider, ProviderConfig, ProviderInfo, ProviderRegistry, ProvidersConfig,
    TokenUsage,
};
