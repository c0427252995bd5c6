use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use autoloop_core::{SandboxBackend, SandboxExecuteRequest, SandboxExecuteResult, SandboxLanguage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestRunOutcome {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

impl TestRunOutcome {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.failed == 0
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub success: bool,
    pub typecheck_ok: bool,
    pub lint_ok: bool,
    pub coverage_percent: Option<f64>,
    pub issues: Vec<String>,
}

static PASSED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s+passed").unwrap());
static FAILED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s+failed").unwrap());
static COVERAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:coverage|total)\D{0,10}(\d+(?:\.\d+)?)%").unwrap());

fn parse_count(regex: &Regex, text: &str) -> Option<u32> {
    regex.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Parses a pytest/jest-style summary line out of combined stdout+stderr.
/// Falls back to treating a zero exit code as a single passing test when
/// no summary line is recognized, since some runners print nothing on
/// success.
fn parse_test_output(result: &SandboxExecuteResult) -> TestRunOutcome {
    let combined = format!("{}\n{}", result.stdout, result.stderr);
    let passed = parse_count(&PASSED_RE, &combined);
    let failed = parse_count(&FAILED_RE, &combined);

    match (passed, failed) {
        (Some(p), Some(f)) => TestRunOutcome { total: p + f, passed: p, failed: f },
        (Some(p), None) => TestRunOutcome { total: p, passed: p, failed: 0 },
        (None, Some(f)) => TestRunOutcome { total: f, passed: 0, failed: f },
        (None, None) if result.exit_code == 0 => TestRunOutcome { total: 1, passed: 1, failed: 0 },
        (None, None) => TestRunOutcome { total: 1, passed: 0, failed: 1 },
    }
}

fn parse_coverage(text: &str) -> Option<f64> {
    COVERAGE_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Runs the project's test command through the sandbox backend and
/// parses its summary output.
pub async fn run_tests(
    sandbox: &Arc<dyn SandboxBackend>,
    working_dir: &Path,
    test_command: &str,
    timeout_ms: u64,
) -> anyhow::Result<TestRunOutcome> {
    let result = sandbox
        .execute(SandboxExecuteRequest {
            language: SandboxLanguage::Bash,
            code: test_command.to_string(),
            timeout_ms,
            working_dir: Some(working_dir.display().to_string()),
            env: HashMap::new(),
            limits: None,
        })
        .await?;
    Ok(parse_test_output(&result))
}

/// Runs type-check, lint, and (optionally) a coverage command through
/// the sandbox backend, matching every sub-step to a boolean success and
/// any reported percentage against `coverage_threshold`.
pub async fn run_verification(
    sandbox: &Arc<dyn SandboxBackend>,
    working_dir: &Path,
    typecheck_command: Option<&str>,
    lint_command: Option<&str>,
    coverage_command: Option<&str>,
    coverage_threshold: f64,
    timeout_ms: u64,
) -> anyhow::Result<VerificationResult> {
    let mut issues = Vec::new();

    let typecheck_ok = if let Some(cmd) = typecheck_command {
        let result = run_one(sandbox, working_dir, cmd, timeout_ms).await?;
        if result.exit_code != 0 {
            issues.push(format!("typecheck failed: {}", result.stderr.trim()));
        }
        result.exit_code == 0
    } else {
        true
    };

    let lint_ok = if let Some(cmd) = lint_command {
        let result = run_one(sandbox, working_dir, cmd, timeout_ms).await?;
        if result.exit_code != 0 {
            issues.push(format!("lint failed: {}", result.stderr.trim()));
        }
        result.exit_code == 0
    } else {
        true
    };

    let coverage_percent = if let Some(cmd) = coverage_command {
        let result = run_one(sandbox, working_dir, cmd, timeout_ms).await?;
        let percent = parse_coverage(&format!("{}\n{}", result.stdout, result.stderr));
        if let Some(percent) = percent {
            if percent < coverage_threshold {
                issues.push(format!(
                    "coverage {percent:.1}% below threshold {coverage_threshold:.1}%"
                ));
            }
        }
        percent
    } else {
        None
    };

    let coverage_ok = coverage_percent.map(|p| p >= coverage_threshold).unwrap_or(true);

    Ok(VerificationResult {
        success: typecheck_ok && lint_ok && coverage_ok,
        typecheck_ok,
        lint_ok,
        coverage_percent,
        issues,
    })
}

async fn run_one(
    sandbox: &Arc<dyn SandboxBackend>,
    working_dir: &Path,
    command: &str,
    timeout_ms: u64,
) -> anyhow::Result<SandboxExecuteResult> {
    sandbox
        .execute(SandboxExecuteRequest {
            language: SandboxLanguage::Bash,
            code: command.to_string(),
            timeout_ms,
            working_dir: Some(working_dir.display().to_string()),
            env: HashMap::new(),
            limits: None,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pytest_style_summary() {
        let result = SandboxExecuteResult {
            exit_code: 1,
            stdout: "3 passed, 1 failed in 0.12s".to_string(),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
            error: None,
        };
        let outcome = parse_test_output(&result);
        assert_eq!(outcome, TestRunOutcome { total: 4, passed: 3, failed: 1 });
    }

    #[test]
    fn zero_exit_with_no_summary_counts_as_one_pass() {
        let result = SandboxExecuteResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
            error: None,
        };
        assert!(parse_test_output(&result).all_passed());
    }

    #[test]
    fn parses_coverage_percentage() {
        let text = "TOTAL coverage: 87.5%";
        assert_eq!(parse_coverage(text), Some(87.5));
    }
}
