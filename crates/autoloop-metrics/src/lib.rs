//! Per-session counters plus the two composite scores (quality,
//! craziness) derived from them at report time.

use std::collections::HashMap;

use autoloop_types::AutonomyLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved,
    Paused,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyEvent {
    Rollback,
    LoopDetected,
    Warning,
}

/// Tracks every counter named in the report, keyed loosely as
/// `(type, name)` for ad hoc events and as dedicated fields for the
/// ones the two composite scores are computed from.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: HashMap<(String, String), u64>,

    tasks_total: u32,
    tasks_passed: u32,
    tasks_failed: u32,
    tasks_skipped: u32,

    decisions_total: u32,
    decision_score_sum: f64,
    approvals: u32,
    pauses: u32,
    blocks: u32,

    tests_run: u32,
    tests_passed: u32,

    tdd_cycles: u32,
    tdd_phase_successes: u32,

    rollbacks: u32,
    loops_detected: u32,
    warnings: u32,
    state_transitions: u32,

    tokens_used: u64,
    elapsed_minutes: f64,
}

#[derive(Debug, Clone, Default)]
pub struct QualityBreakdown {
    pub test_coverage: f64,
    pub code_quality: f64,
    pub decision_quality: f64,
    pub efficiency: f64,
    pub safety: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CrazinessBreakdown {
    pub autonomy: f64,
    pub self_correction: f64,
    pub speed: f64,
    pub risk_taking: f64,
    pub total: f64,
    pub level: Option<AutonomyLevel>,
}

const QUALITY_WEIGHTS: (f64, f64, f64, f64, f64) = (0.25, 0.25, 0.20, 0.15, 0.15);
const CRAZINESS_WEIGHTS: (f64, f64, f64, f64) = (0.35, 0.25, 0.20, 0.20);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, kind: impl Into<String>, name: impl Into<String>) {
        *self.counters.entry((kind.into(), name.into())).or_insert(0) += 1;
    }

    pub fn counter(&self, kind: &str, name: &str) -> u64 {
        self.counters.get(&(kind.to_string(), name.to_string())).copied().unwrap_or(0)
    }

    pub fn record_task(&mut self, outcome: TaskOutcome) {
        self.tasks_total += 1;
        match outcome {
            TaskOutcome::Passed => self.tasks_passed += 1,
            TaskOutcome::Failed => self.tasks_failed += 1,
            TaskOutcome::Skipped => self.tasks_skipped += 1,
        }
    }

    pub fn record_decision(&mut self, score: f64, outcome: DecisionOutcome) {
        self.decisions_total += 1;
        self.decision_score_sum += score;
        match outcome {
            DecisionOutcome::Approved => self.approvals += 1,
            DecisionOutcome::Paused => self.pauses += 1,
            DecisionOutcome::Blocked => self.blocks += 1,
        }
    }

    pub fn record_test_run(&mut self, passed: u32, failed: u32) {
        self.tests_run += passed + failed;
        self.tests_passed += passed;
    }

    pub fn record_tdd_cycle(&mut self, phases_succeeded: u32) {
        self.tdd_cycles += 1;
        self.tdd_phase_successes += phases_succeeded;
    }

    pub fn record_safety_event(&mut self, event: SafetyEvent) {
        match event {
            SafetyEvent::Rollback => self.rollbacks += 1,
            SafetyEvent::LoopDetected => self.loops_detected += 1,
            SafetyEvent::Warning => self.warnings += 1,
        }
    }

    pub fn record_state_transition(&mut self) {
        self.state_transitions += 1;
    }

    pub fn record_tokens(&mut self, tokens: u64) {
        self.tokens_used += tokens;
    }

    pub fn set_elapsed_minutes(&mut self, minutes: f64) {
        self.elapsed_minutes = minutes;
    }

    fn pass_rate(&self) -> f64 {
        if self.tests_run == 0 {
            0.0
        } else {
            self.tests_passed as f64 / self.tests_run as f64
        }
    }

    fn task_completion_rate(&self) -> f64 {
        if self.tasks_total == 0 {
            0.0
        } else {
            self.tasks_passed as f64 / self.tasks_total as f64
        }
    }

    fn approval_rate(&self) -> f64 {
        if self.decisions_total == 0 {
            0.0
        } else {
            self.approvals as f64 / self.decisions_total as f64
        }
    }

    fn average_decision_score(&self) -> f64 {
        if self.decisions_total == 0 {
            0.0
        } else {
            self.decision_score_sum / self.decisions_total as f64
        }
    }

    fn tasks_per_minute(&self) -> f64 {
        if self.elapsed_minutes <= 0.0 {
            0.0
        } else {
            self.tasks_total as f64 / self.elapsed_minutes
        }
    }

    fn tokens_per_task(&self) -> f64 {
        if self.tasks_total == 0 {
            0.0
        } else {
            self.tokens_used as f64 / self.tasks_total as f64
        }
    }

    /// Weighted mean of test-coverage, code-quality, decision-quality,
    /// efficiency, and safety sub-scores, each in [0, 100].
    pub fn quality_score(&self) -> QualityBreakdown {
        let tdd_phase_completion = if self.tdd_cycles == 0 {
            0.0
        } else {
            (self.tdd_phase_successes as f64 / (self.tdd_cycles as f64 * 3.0)).clamp(0.0, 1.0)
        };
        let test_coverage =
            self.pass_rate() * 40.0 + tdd_phase_completion * 30.0 + (self.tests_run as f64).min(30.0);

        let code_quality = self.task_completion_rate() * 100.0;

        let decision_quality =
            0.6 * self.approval_rate() * 100.0 + 0.4 * (self.average_decision_score() / 10.0) * 100.0;

        let speed_component = (self.tasks_per_minute() * 20.0).clamp(0.0, 100.0);
        let token_component = (100.0 - self.tokens_per_task() / 50.0).clamp(0.0, 100.0);
        let efficiency = 0.5 * speed_component + 0.5 * token_component;

        let penalty = self.rollbacks as f64 * 10.0
            + self.loops_detected as f64 * 15.0
            + self.warnings as f64 * 5.0
            + self.tasks_failed as f64 * 5.0;
        let safety = (100.0 - penalty).max(0.0);

        let (wt, wc, wd, we, ws) = QUALITY_WEIGHTS;
        let total = wt * test_coverage + wc * code_quality + wd * decision_quality + we * efficiency + ws * safety;

        QualityBreakdown { test_coverage, code_quality, decision_quality, efficiency, safety, total }
    }

    /// Weighted mean of autonomy, self-correction, speed, and
    /// risk-taking sub-scores, mapped to an [`AutonomyLevel`] by a fixed
    /// threshold table.
    pub fn craziness_score(&self) -> CrazinessBreakdown {
        let interventions = (self.pauses + self.blocks) as f64;
        let autonomy = (100.0 * (1.0 - (interventions / self.tasks_total.max(1) as f64))).clamp(0.0, 100.0);
        let self_correction = (self.rollbacks as f64 * 20.0).clamp(0.0, 100.0);
        let speed = (self.tasks_per_minute() * 25.0).clamp(0.0, 100.0);
        let risk_taking =
            0.5 * (self.average_decision_score() / 10.0) * 100.0 + 0.5 * self.approval_rate() * 100.0;

        let (wa, ws, wsp, wr) = CRAZINESS_WEIGHTS;
        let total = wa * autonomy + ws * self_correction + wsp * speed + wr * risk_taking;

        CrazinessBreakdown {
            autonomy,
            self_correction,
            speed,
            risk_taking,
            total,
            level: Some(level_for_score(total)),
        }
    }
}

fn level_for_score(score: f64) -> AutonomyLevel {
    if score < 20.0 {
        AutonomyLevel::Timid
    } else if score < 35.0 {
        AutonomyLevel::Bold
    } else if score < 50.0 {
        AutonomyLevel::Wild
    } else if score < 65.0 {
        AutonomyLevel::Crazy
    } else if score < 80.0 {
        AutonomyLevel::Insane
    } else {
        AutonomyLevel::Lunatic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_yield_zero_quality() {
        let metrics = Metrics::new();
        assert_eq!(metrics.quality_score().total, 0.0);
    }

    #[test]
    fn perfect_session_scores_highly() {
        let mut metrics = Metrics::new();
        for _ in 0..5 {
            metrics.record_task(TaskOutcome::Passed);
        }
        metrics.record_test_run(10, 0);
        metrics.record_tdd_cycle(3);
        metrics.record_decision(9.0, DecisionOutcome::Approved);
        metrics.set_elapsed_minutes(1.0);
        let breakdown = metrics.quality_score();
        assert!(breakdown.total > 70.0, "total was {}", breakdown.total);
    }

    #[test]
    fn rollbacks_push_craziness_self_correction_up() {
        let mut metrics = Metrics::new();
        metrics.record_safety_event(SafetyEvent::Rollback);
        metrics.record_safety_event(SafetyEvent::Rollback);
        assert!(metrics.craziness_score().self_correction > 0.0);
    }

    #[test]
    fn generic_counters_accumulate_by_key() {
        let mut metrics = Metrics::new();
        metrics.incr("resource", "tokens_warning");
        metrics.incr("resource", "tokens_warning");
        assert_eq!(metrics.counter("resource", "tokens_warning"), 2);
    }
}
