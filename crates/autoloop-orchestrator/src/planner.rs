//! Next-Step Planner: decides whether a session should keep iterating
//! and, if so, what to work on next.

use serde::{Deserialize, Serialize};

use autoloop_core::{ResourceBudget, ResourceUsage};
use autoloop_types::Priority;

/// Inputs `analyzeCompletion` weighs to decide whether a session is
/// actually done.
#[derive(Debug, Clone, Copy)]
pub struct CompletionCriteria {
    pub requirements_completed: bool,
    pub tests_passing: bool,
    pub verification_passing: bool,
    pub blocking_issues: bool,
    pub resource_exhausted: bool,
}

impl CompletionCriteria {
    pub fn all_complete(&self) -> bool {
        self.requirements_completed
            && self.tests_passing
            && self.verification_passing
            && !self.blocking_issues
    }
}

#[derive(Debug, Clone)]
pub struct CompletionAnalysis {
    pub can_continue: bool,
    pub should_pause: bool,
    pub reasons: Vec<String>,
}

/// `analyzeCompletion(criteria)`, §4.12. A session can continue unless
/// resources are exhausted or a blocking issue stands in the way;
/// "should pause" mirrors the same two gates, since neither is
/// something another iteration can work around on its own.
pub fn analyze_completion(criteria: &CompletionCriteria) -> CompletionAnalysis {
    let mut reasons = Vec::new();
    if criteria.resource_exhausted {
        reasons.push("a resource budget axis is exhausted".to_string());
    }
    if criteria.blocking_issues {
        reasons.push("an unresolved blocking issue is present".to_string());
    }
    if !criteria.requirements_completed {
        reasons.push("requirements are not all completed".to_string());
    }
    if !criteria.tests_passing {
        reasons.push("tests are not passing".to_string());
    }
    if !criteria.verification_passing {
        reasons.push("verification is not passing".to_string());
    }

    let blocked = criteria.resource_exhausted || criteria.blocking_issues;
    CompletionAnalysis {
        can_continue: !blocked,
        should_pause: blocked,
        reasons,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTask {
    pub subject: String,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct PlanResult {
    pub should_continue: bool,
    pub reason: String,
    pub next_tasks: Vec<NextTask>,
    pub estimated_cycles: u32,
    pub confidence: f64,
}

/// Builds the next iteration's plan from the session's pending work and
/// recent trouble signals. Confidence degrades with each recent error
/// and never fully recovers within a session — repeated trouble is
/// itself evidence the remaining work is harder than it looked.
pub fn plan(
    pending: &[NextTask],
    recent_errors: &[String],
    budget: &ResourceBudget,
    usage: &ResourceUsage,
    unattended: bool,
    auto_continue: bool,
) -> PlanResult {
    let resource_exhausted = !budget.all_within_limits(usage);
    let explicit_block = recent_errors.len() >= 3;

    let confidence = (1.0 - recent_errors.len() as f64 * 0.15).clamp(0.1, 1.0);

    if resource_exhausted {
        return PlanResult {
            should_continue: false,
            reason: "resource budget exhausted".to_string(),
            next_tasks: pending.to_vec(),
            estimated_cycles: pending.len() as u32,
            confidence,
        };
    }
    if explicit_block {
        return PlanResult {
            should_continue: false,
            reason: "repeated failures block further progress".to_string(),
            next_tasks: pending.to_vec(),
            estimated_cycles: pending.len() as u32,
            confidence,
        };
    }

    // Unattended + auto-continue only pauses for the two hard gates
    // above; any other hesitation (e.g. a single recent error, or
    // nothing left to plan) is not itself a reason to stop.
    if pending.is_empty() && !(unattended && auto_continue) {
        return PlanResult {
            should_continue: false,
            reason: "no further work is planned".to_string(),
            next_tasks: Vec::new(),
            estimated_cycles: 0,
            confidence,
        };
    }

    PlanResult {
        should_continue: true,
        reason: "pending requirements remain and no blocking condition was found".to_string(),
        next_tasks: pending.to_vec(),
        estimated_cycles: pending.len().max(1) as u32,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> ResourceBudget {
        ResourceBudget {
            max_tokens: 1000,
            max_cost_usd: 10.0,
            max_elapsed_minutes: 60,
            max_files_changed: 50,
            max_actions: 100,
        }
    }

    #[test]
    fn all_criteria_satisfied_completes() {
        let criteria = CompletionCriteria {
            requirements_completed: true,
            tests_passing: true,
            verification_passing: true,
            blocking_issues: false,
            resource_exhausted: false,
        };
        assert!(criteria.all_complete());
        let analysis = analyze_completion(&criteria);
        assert!(analysis.can_continue);
        assert!(!analysis.should_pause);
    }

    #[test]
    fn resource_exhaustion_forces_a_pause_even_when_unattended() {
        let usage = ResourceUsage { tokens_used: 1000, ..Default::default() };
        let plan = plan(&[], &[], &budget(), &usage, true, true);
        assert!(!plan.should_continue);
        assert_eq!(plan.reason, "resource budget exhausted");
    }

    #[test]
    fn unattended_auto_continue_ignores_empty_plan_pause() {
        let usage = ResourceUsage::default();
        let plan = plan(&[], &[], &budget(), &usage, true, true);
        assert!(plan.should_continue);
    }

    #[test]
    fn attended_mode_pauses_once_pending_work_runs_out() {
        let usage = ResourceUsage::default();
        let plan = plan(&[], &[], &budget(), &usage, false, false);
        assert!(!plan.should_continue);
        assert_eq!(plan.reason, "no further work is planned");
    }

    #[test]
    fn three_recent_errors_block_further_progress() {
        let usage = ResourceUsage::default();
        let errors = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let pending = vec![NextTask { subject: "x".to_string(), priority: Priority::High }];
        let plan = plan(&pending, &errors, &budget(), &usage, false, false);
        assert!(!plan.should_continue);
        assert_eq!(plan.reason, "repeated failures block further progress");
    }

    #[test]
    fn confidence_degrades_with_recent_errors() {
        let usage = ResourceUsage::default();
        let pending = vec![NextTask { subject: "x".to_string(), priority: Priority::High }];
        let clean = plan(&pending, &[], &budget(), &usage, false, false);
        let noisy = plan(&pending, &["e".to_string()], &budget(), &usage, false, false);
        assert!(noisy.confidence < clean.confidence);
    }
}
