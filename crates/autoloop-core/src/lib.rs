//! Session state machine, external-collaborator contracts, layered
//! configuration, and the in-process event bus shared by every other
//! `autoloop-*` crate.

pub mod collaborators;
pub mod config;
pub mod event_bus;
pub mod resource;
pub mod session;
pub mod state_machine;

#[cfg(any(test, feature = "fakes"))]
pub mod fakes;

pub use collaborators::{
    AgentInvokeRequest, AgentInvokeResponse, AgentRole, KvStore, LlmAgentClient, SandboxBackend,
    SandboxExecuteRequest, SandboxExecuteResult, SandboxLanguage, SandboxLimits, VcsDriver,
    VcsStatus,
};
pub use config::{AppConfig, ConfigStore, ResourceBudgetConfig, SandboxBackendPreference};
pub use event_bus::EventBus;
pub use resource::{ResourceAxis, ResourceBudget, ResourceUsage};
pub use session::Session;
pub use state_machine::{
    HandlerMap, InvalidTransitionError, SessionState, StateChangeHandler, StateMachine,
    TransitionHistory,
};
