//! Safety Core: resource guard, loop/guardrail detection, and the
//! destructive-operation gate, combined into a single `check_safety`
//! verdict. Checkpoint Store and Rollback Manager live alongside it.

mod checkpoint;
mod destructive_gate;
mod errors;
mod loop_detection;
mod resource_guard;
mod rollback;

pub use checkpoint::{
    atomic_write, Checkpoint, CheckpointKind, CheckpointStore, SessionCheckpoint, SessionCheckpointMetadata,
    SessionCheckpointStore,
};
pub use destructive_gate::{classify_risk, should_auto_approve, DestructiveGate, OperationCategory, RiskLevel};
pub use errors::SafetyError;
pub use loop_detection::{LoopGuard, LoopKind};
pub use resource_guard::ResourceGuard;
pub use rollback::{RollbackManager, RollbackOutcome};

use autoloop_core::{ResourceAxis, ResourceBudget, ResourceUsage};

#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub resource_warnings: Vec<ResourceAxis>,
    pub loop_detected: Option<LoopKind>,
    pub error: Option<String>,
}

/// Combines the resource guard, loop guard, and destructive-op gate
/// into the single `checkSafety(op?)` verdict described in §4.5.
/// Callers feed tool activity in through `record_tool_call` /
/// `record_tool_error` / `record_decision` as it happens; the next
/// `check_safety` call folds whatever loop the guard most recently
/// flagged into its verdict, then clears it so it's reported once.
pub struct SafetyCore {
    pub resources: ResourceGuard,
    pub loops: LoopGuard,
    pub gate: DestructiveGate,
    pending_loop: Option<LoopKind>,
}

impl SafetyCore {
    pub fn new(budget: ResourceBudget, warn_threshold: f64, auto_break_loops: bool) -> Self {
        Self {
            resources: ResourceGuard::new(budget, warn_threshold),
            loops: LoopGuard::new(auto_break_loops),
            gate: DestructiveGate::new(),
            pending_loop: None,
        }
    }

    /// `checkSafety(op?)`. Invariant 6 of §8: `safe=true` implies every
    /// tracked resource axis is strictly below its limit and no loop is
    /// currently flagged.
    pub fn check_safety(&mut self, usage: &ResourceUsage) -> SafetyVerdict {
        let (warnings, resource_error) = self.resources.check(usage);
        let loop_detected = self.pending_loop.take();
        SafetyVerdict {
            safe: resource_error.is_none() && loop_detected.is_none(),
            resource_warnings: warnings,
            loop_detected,
            error: resource_error.map(|e| e.to_string()),
        }
    }

    pub fn record_tool_call(&mut self, tool: &str, serialized_input: &str) -> Option<LoopKind> {
        let kind = self.loops.record_tool_call(tool, serialized_input);
        self.pending_loop = self.pending_loop.or(kind);
        kind
    }

    pub fn record_tool_error(&mut self, raw_message: &str) -> Option<LoopKind> {
        let kind = self.loops.record_tool_error(raw_message);
        self.pending_loop = self.pending_loop.or(kind);
        kind
    }

    pub fn record_decision(&mut self, action: &str) -> Option<LoopKind> {
        let kind = self.loops.record_decision(action);
        self.pending_loop = self.pending_loop.or(kind);
        kind
    }

    pub fn record_state_transition(&mut self, recent: &[(String, String)]) -> Option<LoopKind> {
        let kind = self.loops.detect_state_oscillation(recent);
        self.pending_loop = self.pending_loop.or(kind);
        kind
    }

    /// Consults the destructive-op gate for one proposed operation,
    /// classifying its risk first. Kept separate from `check_safety`
    /// since it needs per-call operation details the generic resource
    /// and loop checks don't carry.
    pub fn check_destructive_operation(
        &mut self,
        tool: &str,
        category: OperationCategory,
        description: &str,
        touched_files: &[String],
        irreversible: bool,
    ) -> Result<(), String> {
        let risk = classify_risk(tool, category);
        self.gate.check(risk, category, description, touched_files, irreversible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_verdict_implies_all_axes_below_limit() {
        let budget = ResourceBudget {
            max_tokens: 1000,
            max_cost_usd: 10.0,
            max_elapsed_minutes: 60,
            max_files_changed: 50,
            max_actions: 100,
        };
        let mut core = SafetyCore::new(budget, 0.8, true);
        let verdict = core.check_safety(&ResourceUsage::default());
        assert!(verdict.safe);
        assert!(budget.all_within_limits(&ResourceUsage::default()));
    }

    fn ample_budget() -> ResourceBudget {
        ResourceBudget {
            max_tokens: 100_000,
            max_cost_usd: 50.0,
            max_elapsed_minutes: 120,
            max_files_changed: 100,
            max_actions: 500,
        }
    }

    #[test]
    fn a_detected_loop_surfaces_in_the_next_safety_check() {
        let mut core = SafetyCore::new(ample_budget(), 0.8, true);
        core.record_tool_call("write", "x");
        core.record_tool_call("write", "x");
        core.record_tool_call("write", "x");

        let verdict = core.check_safety(&ResourceUsage::default());
        assert_eq!(verdict.loop_detected, Some(LoopKind::ExactRepeat));
        assert!(!verdict.safe);

        let next = core.check_safety(&ResourceUsage::default());
        assert_eq!(next.loop_detected, None);
    }

    #[test]
    fn destructive_gate_rejects_high_risk_operations() {
        let mut core = SafetyCore::new(ample_budget(), 0.8, true);
        let result = core.check_destructive_operation(
            "shell",
            OperationCategory::FileDeletion,
            "rm -rf build/",
            &[],
            true,
        );
        assert!(result.is_err());
    }
}
