use once_cell::sync::Lazy;
use regex::Regex;

use autoloop_core::SandboxLanguage;

struct Pattern {
    regex: Lazy<Regex>,
    reason: &'static str,
}

macro_rules! pattern {
    ($source:expr, $reason:expr) => {
        Pattern {
            regex: Lazy::new(|| Regex::new($source).unwrap()),
            reason: $reason,
        }
    };
}

static PYTHON_PATTERNS: [Pattern; 4] = [
    pattern!(r"\bimport\s+subprocess\b", "subprocess is not allowed"),
    pattern!(r"\bimport\s+os\b", "os is not allowed"),
    pattern!(r"\beval\s*\(", "eval is not allowed"),
    pattern!(r"\bimport\s+socket\b", "socket is not allowed"),
];

static JS_PATTERNS: [Pattern; 5] = [
    pattern!(r"\brequire\(\s*['\"]child_process['\"]\s*\)", "child_process is not allowed"),
    pattern!(r"\brequire\(\s*['\"]fs['\"]\s*\)", "fs is not allowed"),
    pattern!(r"\brequire\(\s*['\"]net['\"]\s*\)", "net is not allowed"),
    pattern!(r"\beval\s*\(", "eval is not allowed"),
    pattern!(r"\bnew\s+Function\s*\(", "Function constructor is not allowed"),
];

static SHELL_PATTERNS: [Pattern; 4] = [
    pattern!(r"rm\s+-rf\s+/(\s|$)", "rm -rf / is not allowed"),
    pattern!(r"\bdd\s+if=", "dd if= is not allowed"),
    pattern!(r"\b(curl|wget)\b", "network retrieval is not allowed"),
    pattern!(r"\$\([^)]*\)|`[^`]*`", "command substitution is not allowed"),
];

/// Blocks known-dangerous idioms per language before a script ever
/// reaches the process backend. Not a substitute for the container/wasm
/// backends' kernel-level isolation — this is the process backend's
/// only line of defense.
pub fn validate(language: SandboxLanguage, code: &str) -> Result<(), String> {
    let patterns: &[Pattern] = match language {
        SandboxLanguage::Python => &PYTHON_PATTERNS,
        SandboxLanguage::Nodejs => &JS_PATTERNS,
        SandboxLanguage::Bash => &SHELL_PATTERNS,
    };

    for pattern in patterns {
        if pattern.regex.is_match(code) {
            tracing::warn!(reason = pattern.reason, "sandbox code rejected by validator");
            return Err(pattern.reason.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_subprocess_is_rejected() {
        assert!(validate(SandboxLanguage::Python, "import subprocess").is_err());
    }

    #[test]
    fn shell_rm_rf_root_is_rejected() {
        assert!(validate(SandboxLanguage::Bash, "rm -rf / --no-preserve-root").is_err());
    }

    #[test]
    fn benign_python_passes() {
        assert!(validate(SandboxLanguage::Python, "print(1 + 1)").is_ok());
    }
}
