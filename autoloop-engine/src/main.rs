use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use autoloop_core::fakes::{InMemoryKvStore, InMemoryVcsDriver};
use autoloop_core::{ConfigStore, EventBus, LlmAgentClient, SandboxBackend};
use autoloop_observability::{canonical_logs_dir_from_root, init_process_logging, ProcessKind};
use autoloop_orchestrator::{Orchestrator, SessionOutcome};
use autoloop_providers::{AgentRouting, ProviderRegistry, ProvidersConfig};
use autoloop_sandbox::ProcessBackend;

#[derive(Parser, Debug)]
#[command(name = "autoloop-engine")]
#[command(about = "Headless autonomous coding loop")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a single session to completion, pause, or block.
    Run {
        request: String,
        #[arg(long)]
        working_directory: Option<PathBuf>,
        #[arg(long)]
        autonomy: Option<String>,
        #[arg(long)]
        unattended: bool,
        #[arg(long, default_value = "cargo test")]
        test_command: String,
        #[arg(long)]
        verification_command: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            request,
            working_directory,
            autonomy,
            unattended,
            test_command,
            verification_command,
        } => run(request, working_directory, autonomy, unattended, test_command, verification_command).await,
    }
}

async fn run(
    request: String,
    working_directory: Option<PathBuf>,
    autonomy: Option<String>,
    unattended: bool,
    test_command: String,
    verification_command: Option<String>,
) -> anyhow::Result<()> {
    let working_directory = working_directory
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .context("resolving working directory")?;

    let logs_dir = canonical_logs_dir_from_root(&working_directory);
    let _guard = init_process_logging(ProcessKind::Engine, &logs_dir, 14)
        .context("initializing logging")?;

    let mut cli_overrides = serde_json::Map::new();
    if let Some(autonomy) = &autonomy {
        cli_overrides.insert("autonomy".to_string(), serde_json::Value::String(autonomy.to_lowercase()));
    }
    if unattended {
        cli_overrides.insert("unattended".to_string(), serde_json::Value::Bool(true));
    }
    let config_store = ConfigStore::load(
        &working_directory,
        Some(serde_json::Value::Object(cli_overrides)),
    )
    .await
    .context("loading configuration")?;
    let config = config_store.get().await;

    info!(
        autonomy = ?config.autonomy,
        unattended = config.unattended,
        working_directory = %working_directory.display(),
        "starting autoloop-engine session"
    );

    let agent_client: Arc<dyn LlmAgentClient> = Arc::new(autoloop_providers::RoutingAgentClient::new(
        ProviderRegistry::new(providers_config_from_env()),
        AgentRouting::new(),
    ));
    let sandbox: Arc<dyn SandboxBackend> = Arc::new(ProcessBackend);
    let vcs = InMemoryVcsDriver::new();
    let kv = Arc::new(InMemoryKvStore::new());
    let events = EventBus::new();
    let checkpoints_dir = working_directory.join(".autoloop").join("checkpoints");

    let mut orchestrator = Orchestrator::new(
        request,
        working_directory.clone(),
        config,
        agent_client,
        sandbox,
        vcs,
        kv,
        checkpoints_dir,
        events.clone(),
        test_command,
        verification_command,
    );

    tokio::spawn(log_events(events.subscribe()));

    orchestrator.start().await.context("starting session")?;
    let outcome = orchestrator.process().await.context("running session")?;

    print_outcome(&outcome);
    Ok(())
}

/// Every published [`autoloop_types::CoreEvent`] also lands here as a
/// compact info-level line, mirroring the reference engine's own
/// event-bus-to-log tap.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<autoloop_types::CoreEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(
                event_type = %event.event_type,
                session_id = %event.session_id,
                properties = %event.properties,
                "session event"
            ),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_outcome(outcome: &SessionOutcome) {
    let rendered = match outcome {
        SessionOutcome::Completed(report) => serde_json::json!({
            "outcome": "completed",
            "iterations": report.iterations,
            "quality": report.quality.total,
            "craziness": report.craziness.total,
        }),
        SessionOutcome::Paused { reason } => serde_json::json!({"outcome": "paused", "reason": reason}),
        SessionOutcome::Blocked { reason } => serde_json::json!({"outcome": "blocked", "reason": reason}),
        SessionOutcome::Failed { reason } => serde_json::json!({"outcome": "failed", "reason": reason}),
    };
    println!("{}", serde_json::to_string_pretty(&rendered).unwrap_or_default());
}

/// Probes the usual provider API-key environment variables and wires up
/// a [`ProvidersConfig`] entry for each one that's set, so `run` works
/// unconfigured against whichever provider the caller's environment
/// already has credentials for. Falls back to the registry's built-in
/// echo provider when none are present.
fn providers_config_from_env() -> ProvidersConfig {
    use autoloop_providers::ProviderConfig;

    let mut providers = std::collections::HashMap::new();
    let mut default_provider = None;

    for (id, env_var) in [
        ("anthropic", "ANTHROPIC_API_KEY"),
        ("openai", "OPENAI_API_KEY"),
        ("openrouter", "OPENROUTER_API_KEY"),
        ("groq", "GROQ_API_KEY"),
        ("mistral", "MISTRAL_API_KEY"),
        ("together", "TOGETHER_API_KEY"),
        ("cohere", "COHERE_API_KEY"),
    ] {
        if let Ok(api_key) = std::env::var(env_var) {
            if !api_key.trim().is_empty() {
                providers.insert(
                    id.to_string(),
                    ProviderConfig {
                        api_key: Some(api_key),
                        url: None,
                        default_model: None,
                    },
                );
                default_provider.get_or_insert_with(|| id.to_string());
            }
        }
    }

    if std::env::var("OLLAMA_HOST").is_ok() {
        providers.insert(
            "ollama".to_string(),
            ProviderConfig { api_key: None, url: std::env::var("OLLAMA_HOST").ok(), default_model: None },
        );
        default_provider.get_or_insert_with(|| "ollama".to_string());
    }

    ProvidersConfig { providers, default_provider }
}
