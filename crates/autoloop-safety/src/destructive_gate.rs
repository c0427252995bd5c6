use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    FileDeletion,
    FileOverwrite,
    DependencyChange,
    DatabaseChange,
    ConfigChange,
    Other,
}

/// Classifies a tool call by name/category into a risk level.
pub fn classify_risk(tool: &str, category: OperationCategory) -> RiskLevel {
    match category {
        OperationCategory::FileDeletion => RiskLevel::High,
        OperationCategory::FileOverwrite => RiskLevel::Medium,
        OperationCategory::DependencyChange
        | OperationCategory::DatabaseChange
        | OperationCategory::ConfigChange => RiskLevel::Medium,
        OperationCategory::Other => match tool {
            "shell" | "bash" | "exec" => RiskLevel::Medium,
            "read" | "list" | "search" => RiskLevel::Safe,
            _ => RiskLevel::Low,
        },
    }
}

/// `shouldAutoApprove`: false for critical, else true iff risk <=
/// threshold under `safe < low < medium < high < critical`.
pub fn should_auto_approve(risk: RiskLevel, threshold: RiskLevel) -> bool {
    risk != RiskLevel::Critical && risk <= threshold
}

#[derive(Debug, Clone)]
struct SeenOperation {
    category: OperationCategory,
    description: String,
    touched_files: Vec<String>,
}

/// (c) Destructive-op gate. A destructive op is rejected when its risk
/// is critical/high, when it is irreversible medium risk, or when the
/// same (category, description, touched files) was recorded twice
/// recently.
pub struct DestructiveGate {
    recent: VecDeque<SeenOperation>,
}

impl DestructiveGate {
    pub fn new() -> Self {
        Self {
            recent: VecDeque::with_capacity(32),
        }
    }

    pub fn check(
        &mut self,
        risk: RiskLevel,
        category: OperationCategory,
        description: &str,
        touched_files: &[String],
        irreversible: bool,
    ) -> Result<(), String> {
        if matches!(risk, RiskLevel::Critical | RiskLevel::High) {
            return Err(format!("{risk:?} risk operation blocked: {description}"));
        }
        if risk == RiskLevel::Medium && irreversible {
            return Err(format!(
                "irreversible medium-risk operation blocked: {description}"
            ));
        }

        let repeat_count = self
            .recent
            .iter()
            .filter(|op| {
                op.category == category && op.description == description && op.touched_files == touched_files
            })
            .count();
        if repeat_count >= 2 {
            return Err(format!(
                "operation repeated {repeat_count} times recently, blocked: {description}"
            ));
        }

        if self.recent.len() == 32 {
            self.recent.pop_front();
        }
        self.recent.push_back(SeenOperation {
            category,
            description: description.to_string(),
            touched_files: touched_files.to_vec(),
        });

        Ok(())
    }
}

impl Default for DestructiveGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_rm_rf_is_high_risk_and_blocked() {
        let risk = classify_risk("shell", OperationCategory::FileDeletion);
        assert_eq!(risk, RiskLevel::High);

        let mut gate = DestructiveGate::new();
        let result = gate.check(risk, OperationCategory::FileDeletion, "rm -rf /tmp/data", &[], true);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("blocked"));
    }

    #[test]
    fn auto_approve_respects_threshold_ordering() {
        assert!(should_auto_approve(RiskLevel::Low, RiskLevel::Medium));
        assert!(!should_auto_approve(RiskLevel::High, RiskLevel::Medium));
        assert!(!should_auto_approve(RiskLevel::Critical, RiskLevel::Critical));
    }

    #[test]
    fn third_repeat_of_same_operation_is_blocked() {
        let mut gate = DestructiveGate::new();
        let files = vec!["a.txt".to_string()];
        assert!(gate
            .check(RiskLevel::Low, OperationCategory::Other, "touch a.txt", &files, false)
            .is_ok());
        assert!(gate
            .check(RiskLevel::Low, OperationCategory::Other, "touch a.txt", &files, false)
            .is_ok());
        assert!(gate
            .check(RiskLevel::Low, OperationCategory::Other, "touch a.txt", &files, false)
            .is_err());
    }
}
