use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;

use autoloop_core::{SandboxBackend, SandboxExecuteRequest, SandboxExecuteResult, SandboxLanguage};

use crate::validator;

const MAX_CAPTURE_BYTES: usize = 100 * 1024;
const SENSITIVE_ENV_PREFIXES: &[&str] = &["AWS_", "AZURE_", "GCP_", "OPENAI_", "ANTHROPIC_"];
const SENSITIVE_ENV_NAMES: &[&str] = &["GITHUB_TOKEN", "NPM_TOKEN", "SSH_AUTH_SOCK"];

fn interpreter_for(language: SandboxLanguage) -> (&'static str, Vec<&'static str>) {
    match language {
        SandboxLanguage::Python => ("python3", vec!["-c"]),
        SandboxLanguage::Nodejs => ("node", vec!["-e"]),
        SandboxLanguage::Bash => ("bash", vec!["-c"]),
    }
}

fn truncate(mut bytes: Vec<u8>) -> String {
    bytes.truncate(MAX_CAPTURE_BYTES);
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Direct spawn via `tokio::process::Command`, mirroring the reference
/// engine's bash tool: a pattern-based validator runs first, sensitive
/// environment variables are stripped, and a `tokio::select!` race
/// against the deadline sends `SIGKILL` on timeout.
pub struct ProcessBackend;

#[async_trait]
impl SandboxBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
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

        let (program, mut args) = interpreter_for(request.language);
        args.push(&request.code);

        let mut command = Command::new(program);
        command.args(&args);
        command.env_clear();
        for (key, value) in &request.env {
            if SENSITIVE_ENV_PREFIXES.iter().any(|p| key.starts_with(p))
                || SENSITIVE_ENV_NAMES.contains(&key.as_str())
            {
                continue;
            }
            command.env(key, value);
        }
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }
        command.kill_on_drop(true);
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        let started = Instant::now();

        if request.timeout_ms == 0 {
            return Ok(SandboxExecuteResult {
                exit_code: 124,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
                timed_out: true,
                error: Some("zero-duration deadline".to_string()),
            });
        }

        let mut child = command.spawn()?;
        let deadline = tokio::time::sleep(Duration::from_millis(request.timeout_ms));
        tokio::pin!(deadline);

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                Ok(SandboxExecuteResult {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: truncate(output.stdout),
                    stderr: truncate(output.stderr),
                    duration_ms: started.elapsed().as_millis() as u64,
                    timed_out: false,
                    error: None,
                })
            }
            _ = &mut deadline => {
                tracing::warn!(program, timeout_ms = request.timeout_ms, "process backend deadline exceeded, killing child");
                Ok(SandboxExecuteResult {
                    exit_code: 124,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    timed_out: true,
                    error: Some("execution deadline exceeded".to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn dangerous_python_is_rejected_before_spawn() {
        let backend = ProcessBackend;
        let result = backend
            .execute(SandboxExecuteRequest {
                language: SandboxLanguage::Python,
                code: "import os".to_string(),
                timeout_ms: 1000,
                working_dir: None,
                env: HashMap::new(),
                limits: None,
            })
            .await
            .unwrap();
        assert_eq!(result.exit_code, 126);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn zero_deadline_times_out_with_124() {
        let backend = ProcessBackend;
        let result = backend
            .execute(SandboxExecuteRequest {
                language: SandboxLanguage::Bash,
                code: "echo hi".to_string(),
                timeout_ms: 0,
                working_dir: None,
                env: HashMap::new(),
                limits: None,
            })
            .await
            .unwrap();
        assert_eq!(result.exit_code, 124);
        assert!(result.timed_out);
    }
}
