use autoloop_core::{SandboxBackend, SandboxExecuteRequest, SandboxExecuteResult, SandboxLanguage};

/// Coarse classification of a sandbox run, used to decide whether a
/// retry with a patched snippet is worth attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Timeout,
    Syntax,
    Dependency,
    Runtime,
    Unknown,
}

pub fn classify_outcome(result: &SandboxExecuteResult) -> OutcomeKind {
    if result.timed_out {
        return OutcomeKind::Timeout;
    }
    if result.exit_code == 0 {
        return OutcomeKind::Success;
    }
    let combined = format!("{} {}", result.stdout, result.stderr).to_lowercase();
    if combined.contains("syntaxerror")
        || combined.contains("indentationerror")
        || combined.contains("unexpected token")
    {
        OutcomeKind::Syntax
    } else if combined.contains("modulenotfounderror")
        || combined.contains("no module named")
        || combined.contains("cannot find module")
        || combined.contains("command not found")
    {
        OutcomeKind::Dependency
    } else if !combined.trim().is_empty() {
        OutcomeKind::Runtime
    } else {
        OutcomeKind::Unknown
    }
}

/// Attempts a single known textual fix for a classified outcome.
/// Returns `None` when no fix is known for the (language, outcome) pair,
/// which ends the reflection loop early rather than retrying blind.
fn apply_known_fix(language: SandboxLanguage, kind: OutcomeKind, code: &str) -> Option<String> {
    match (language, kind) {
        (SandboxLanguage::Python, OutcomeKind::Syntax) => {
            // A common LLM-generated mistake: mixed tabs and spaces.
            if code.contains('\t') {
                Some(code.replace('\t', "    "))
            } else {
                None
            }
        }
        (_, OutcomeKind::Timeout) => {
            // Wrap the snippet so a runaway loop yields a clear signal
            // instead of silently re-timing-out identically.
            Some(format!("{}\n# reflection: prior attempt exceeded its deadline", code))
        }
        (SandboxLanguage::Python, OutcomeKind::Dependency) => {
            Some(format!("# reflection: missing dependency, run `pip install <package>` first\n{code}"))
        }
        (SandboxLanguage::Nodejs, OutcomeKind::Dependency) => {
            Some(format!("// reflection: missing dependency, run `npm install <package>` first\n{code}"))
        }
        (SandboxLanguage::Bash, OutcomeKind::Dependency) => {
            Some(format!("# reflection: missing dependency, install the command with your package manager first\n{code}"))
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ReflectionAttempt {
    pub outcome: OutcomeKind,
    pub result: SandboxExecuteResult,
}

#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub attempts: Vec<ReflectionAttempt>,
    pub final_result: SandboxExecuteResult,
}

impl ReflectionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(classify_outcome(&self.final_result), OutcomeKind::Success)
    }
}

/// Runs `request` against `backend`, and on a recognizably-fixable
/// failure, patches the code and retries up to `max_retries` additional
/// times. `on_reflection` is invoked with each failed attempt before a
/// retry is tried, so a caller can log or surface the intermediate
/// outcome.
pub async fn execute_with_reflection<F>(
    backend: &dyn SandboxBackend,
    mut request: SandboxExecuteRequest,
    max_retries: u32,
    mut on_reflection: Option<F>,
) -> anyhow::Result<ReflectionOutcome>
where
    F: FnMut(&ReflectionAttempt),
{
    let mut attempts = Vec::new();
    let mut retries_left = max_retries;

    loop {
        let result = backend.execute(request.clone()).await?;
        let kind = classify_outcome(&result);
        let attempt = ReflectionAttempt { outcome: kind, result: result.clone() };

        if let Some(handler) = on_reflection.as_mut() {
            handler(&attempt);
        }
        attempts.push(attempt);

        if kind == OutcomeKind::Success || retries_left == 0 {
            return Ok(ReflectionOutcome { attempts, final_result: result });
        }

        match apply_known_fix(request.language, kind, &request.code) {
            Some(fixed) => {
                request.code = fixed;
                retries_left -= 1;
            }
            None => return Ok(ReflectionOutcome { attempts, final_result: result }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SandboxBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn execute(&self, request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(SandboxExecuteResult {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "IndentationError: mixed tabs".to_string(),
                    duration_ms: 1,
                    timed_out: false,
                    error: None,
                })
            } else {
                Ok(SandboxExecuteResult {
                    exit_code: 0,
                    stdout: "ok".to_string(),
                    stderr: String::new(),
                    duration_ms: 1,
                    timed_out: false,
                    error: None,
                })
            }
        }
    }

    #[test]
    fn classifies_dependency_errors() {
        let result = SandboxExecuteResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "ModuleNotFoundError: no module named 'requests'".to_string(),
            duration_ms: 1,
            timed_out: false,
            error: None,
        };
        assert_eq!(classify_outcome(&result), OutcomeKind::Dependency);
    }

    struct DependencyThenSuccessBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SandboxBackend for DependencyThenSuccessBackend {
        fn name(&self) -> &'static str {
            "dependency-then-success"
        }

        async fn execute(&self, request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(SandboxExecuteResult {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "ModuleNotFoundError: no module named 'requests'".to_string(),
                    duration_ms: 1,
                    timed_out: false,
                    error: None,
                })
            } else {
                assert!(request.code.contains("pip install"));
                Ok(SandboxExecuteResult {
                    exit_code: 0,
                    stdout: "ok".to_string(),
                    stderr: String::new(),
                    duration_ms: 1,
                    timed_out: false,
                    error: None,
                })
            }
        }
    }

    #[tokio::test]
    async fn retries_once_on_missing_dependency_with_an_install_hint() {
        let backend = DependencyThenSuccessBackend { calls: AtomicU32::new(0) };
        let request = SandboxExecuteRequest {
            language: SandboxLanguage::Python,
            code: "import requests".to_string(),
            timeout_ms: 1000,
            working_dir: None,
            env: Default::default(),
            limits: None,
        };
        let outcome = execute_with_reflection(&backend, request, 2, None::<fn(&ReflectionAttempt)>)
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[tokio::test]
    async fn retries_once_on_fixable_syntax_error_then_succeeds() {
        let backend = FlakyBackend { calls: AtomicU32::new(0) };
        let request = SandboxExecuteRequest {
            language: SandboxLanguage::Python,
            code: "\tprint(1)".to_string(),
            timeout_ms: 1000,
            working_dir: None,
            env: Default::default(),
            limits: None,
        };
        let outcome = execute_with_reflection(&backend, request, 2, None::<fn(&ReflectionAttempt)>)
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts.len(), 2);
    }
}
