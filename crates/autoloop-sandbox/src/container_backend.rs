use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, WaitContainerOptions,
};
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures_util::StreamExt;

use autoloop_core::{SandboxExecuteRequest, SandboxExecuteResult, SandboxLanguage};
use autoloop_core::SandboxBackend;

use crate::validator;

const DEFAULT_MEMORY_MB: i64 = 256;
const DEFAULT_CPU_PERCENT: f64 = 50.0;
const DEFAULT_PIDS_LIMIT: i64 = 64;
const DEFAULT_FD_LIMIT: i64 = 256;

fn image_for(language: SandboxLanguage) -> &'static str {
    match language {
        SandboxLanguage::Python => "python:3.12-slim",
        SandboxLanguage::Nodejs => "node:20-slim",
        SandboxLanguage::Bash => "debian:bookworm-slim",
    }
}

fn command_for(language: SandboxLanguage, code: &str) -> Vec<String> {
    match language {
        SandboxLanguage::Python => vec!["python3".into(), "-c".into(), code.into()],
        SandboxLanguage::Nodejs => vec!["node".into(), "-e".into(), code.into()],
        SandboxLanguage::Bash => vec!["bash".into(), "-c".into(), code.into()],
    }
}

/// Executes code inside an auto-removed container with a read-only root
/// filesystem, a tmpfs scratch mount, dropped capabilities, and
/// `no-new-privileges`. Network access is disabled unless the caller's
/// limits explicitly allow it.
pub struct ContainerBackend {
    docker: Docker,
}

impl ContainerBackend {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn execute(&self, request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult> {
        if let Err(reason) = validator::validate(request.language, &request.code) {
            return Ok(SandboxExecuteResult {
                exit_code: 126,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
                timed_out: false,
                error: Some(reason),
            });
        }

        let memory_mb = request.limits.as_ref().and_then(|l| l.memory_mb);
        let cpu_quota_percent = request.limits.as_ref().and_then(|l| l.cpu_quota_percent);
        let allow_network = request.limits.as_ref().map(|l| l.allow_network).unwrap_or(false);
        let memory_bytes = (memory_mb.unwrap_or(DEFAULT_MEMORY_MB as u64) as i64) * 1024 * 1024;
        let cpu_quota_percent = cpu_quota_percent.unwrap_or(DEFAULT_CPU_PERCENT as u32);
        let cpu_period: i64 = 100_000;
        let cpu_quota = ((cpu_quota_percent as f64 / 100.0) * cpu_period as f64) as i64;

        let host_config = HostConfig {
            memory: Some(memory_bytes),
            memory_swap: Some(memory_bytes),
            cpu_period: Some(cpu_period),
            cpu_quota: Some(cpu_quota),
            pids_limit: Some(DEFAULT_PIDS_LIMIT),
            readonly_rootfs: Some(true),
            tmpfs: Some(HashMap::from([("/tmp".to_string(), "rw,size=64m".to_string())])),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            network_mode: Some(if allow_network {
                "bridge".to_string()
            } else {
                "none".to_string()
            }),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(DEFAULT_FD_LIMIT),
                hard: Some(DEFAULT_FD_LIMIT),
            }]),
            auto_remove: Some(true),
            ..Default::default()
        };

        let config = Config {
            image: Some(image_for(request.language).to_string()),
            cmd: Some(command_for(request.language, &request.code)),
            env: Some(
                request
                    .env
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect(),
            ),
            working_dir: request.working_dir.clone(),
            host_config: Some(host_config),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let name = format!("autoloop-sbx-{}", autoloop_types::new_id());
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;

        let started = tokio::time::Instant::now();
        self.docker
            .start_container::<String>(&created.id, None)
            .await?;

        let wait_future = async {
            let mut stream = self
                .docker
                .wait_container(&created.id, None::<WaitContainerOptions<String>>);
            stream.next().await
        };

        let timed_out;
        let exit_code;
        match tokio::time::timeout(Duration::from_millis(request.timeout_ms), wait_future).await {
            Ok(Some(Ok(result))) => {
                timed_out = false;
                exit_code = result.status_code as i32;
            }
            Ok(Some(Err(_))) | Ok(None) => {
                timed_out = false;
                exit_code = -1;
            }
            Err(_) => {
                tracing::warn!(container_id = %created.id, "container backend deadline exceeded, forcing removal");
                timed_out = true;
                exit_code = 124;
                let _ = self
                    .docker
                    .remove_container(
                        &created.id,
                        Some(RemoveContainerOptions {
                            force: true,
                            ..Default::default()
                        }),
                    )
                    .await;
            }
        }

        let (stdout, stderr) = self.collect_logs(&created.id).await.unwrap_or_default();

        Ok(SandboxExecuteResult {
            exit_code,
            stdout,
            stderr,
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out,
            error: if timed_out {
                Some("container execution deadline exceeded".to_string())
            } else {
                None
            },
        })
    }
}

impl ContainerBackend {
    async fn collect_logs(&self, container_id: &str) -> anyhow::Result<(String, String)> {
        let options = bollard::container::LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.docker.logs(container_id, Some(options));
        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
                LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
                _ => {}
            }
        }
        Ok((stdout, stderr))
    }
}
